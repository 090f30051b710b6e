//! 模拟硬件 (Synthetic Arena)
//!
//! 无相机时的帧来源: 带均匀噪声的暗背景 + 绕圆轨道运动的亮盘.
//! 前 `empty_frames` 帧只有背景, 供背景标定使用.

use image::{GrayImage, Luma};
use imageproc::drawing::draw_filled_circle_mut;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::FrameSource;
use crate::error::Result;

/// 模拟相机分辨率
pub const ARENA_WIDTH: u32 = 640;
pub const ARENA_HEIGHT: u32 = 360;

/// 一个绕 `center` 做圆周运动的陀螺
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Spinner {
    pub center: (f32, f32),
    pub orbit_radius: f32,

    /// 弧度/帧
    pub angular_speed: f32,
    pub phase: f32,

    /// 亮盘半径 (像素)
    pub radius: i32,
}

impl Spinner {
    /// 第 `t` 帧 (从陀螺出现开始计) 的位置
    pub fn position_at(&self, t: u64) -> (i32, i32) {
        let angle = self.phase + self.angular_speed * t as f32;
        (
            (self.center.0 + self.orbit_radius * angle.cos()).round() as i32,
            (self.center.1 + self.orbit_radius * angle.sin()).round() as i32,
        )
    }
}

pub struct SyntheticArena {
    width: u32,
    height: u32,
    background: u8,
    noise: u8,
    brightness: u8,
    spinners: Vec<Spinner>,
    empty_frames: u64,
    frame: u64,
    rng: StdRng,
}

impl SyntheticArena {
    pub fn new(width: u32, height: u32, seed: u64) -> Self {
        Self {
            width,
            height,
            background: 40,
            noise: 3,
            brightness: 220,
            spinners: Vec::new(),
            empty_frames: 0,
            frame: 0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// 两个陀螺在场地中央附近对转, 轨道相交处会发生碰撞
    pub fn two_spinners(seed: u64, empty_frames: u64) -> Self {
        let cx = ARENA_WIDTH as f32 / 2.0;
        let cy = ARENA_HEIGHT as f32 / 2.0;
        Self::new(ARENA_WIDTH, ARENA_HEIGHT, seed)
            .with_empty_frames(empty_frames)
            .with_spinner(Spinner {
                center: (cx - 60.0, cy),
                orbit_radius: 80.0,
                angular_speed: 0.08,
                phase: 0.0,
                radius: 12,
            })
            .with_spinner(Spinner {
                center: (cx + 60.0, cy),
                orbit_radius: 80.0,
                angular_speed: -0.08,
                phase: std::f32::consts::PI,
                radius: 12,
            })
    }

    pub fn with_spinner(mut self, spinner: Spinner) -> Self {
        self.spinners.push(spinner);
        self
    }

    pub fn with_empty_frames(mut self, frames: u64) -> Self {
        self.empty_frames = frames;
        self
    }

    pub fn with_noise(mut self, noise: u8) -> Self {
        self.noise = noise;
        self
    }

    pub fn spinners(&self) -> &[Spinner] {
        &self.spinners
    }

    /// 已生成帧数
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// 陀螺在当前 (下一次生成的) 帧中的位置, 尚未出现时为空
    pub fn expected_positions(&self) -> Vec<(i32, i32)> {
        if self.frame < self.empty_frames {
            return Vec::new();
        }
        let t = self.frame - self.empty_frames;
        self.spinners.iter().map(|s| s.position_at(t)).collect()
    }

    fn render(&mut self) -> GrayImage {
        let noise = self.noise as i16;
        let background = self.background as i16;
        let mut frame = GrayImage::new(self.width, self.height);
        for p in frame.pixels_mut() {
            let n = if noise > 0 {
                self.rng.gen_range(-noise..=noise)
            } else {
                0
            };
            p[0] = (background + n).clamp(0, 255) as u8;
        }

        let color = Luma([self.brightness]);
        for (spinner, pos) in self.spinners.iter().zip(self.expected_positions()) {
            draw_filled_circle_mut(&mut frame, pos, spinner.radius, color);
        }
        frame
    }
}

impl FrameSource for SyntheticArena {
    fn next_frame(&mut self) -> Result<GrayImage> {
        let frame = self.render();
        self.frame += 1;
        Ok(frame)
    }
}
