//! 检测器 (FrameDetector)
//! 职责: 背景差分 → 二值化 → 开运算去噪 → 轮廓提取 → 粘连分割 → 碰撞候选

use std::sync::atomic::AtomicBool;

use image::{imageops, GrayImage, Luma};
use imageproc::contours::{find_contours, BorderType, Contour};
use imageproc::distance_transform::{euclidean_squared_distance_transform, Norm};
use imageproc::morphology::open;
use tracing::{debug, info};

use super::background::BackgroundModel;
use super::collision::{pair_candidates, HitCandidate};
use super::types::Detection;
use crate::error::{Result, TrackerError};
use crate::input::FrameSource;

/// 开运算半径: 3x3核迭代2次 ≡ 切比雪夫距离2
const OPENING_RADIUS: u8 = 2;

/// 分割种子阈值 (距离变换最大值的比例)
const SEED_RATIO: f64 = 0.8;

/// 单帧检测结果
#[derive(Clone, Debug, Default)]
pub struct FrameDetections {
    pub detections: Vec<Detection>,

    /// 碰撞候选, 下标指向 `detections`
    pub candidates: Vec<HitCandidate>,

    /// 去噪后前景像素占比 (自适应阈值用)
    pub foreground_ratio: f32,
}

pub struct FrameDetector {
    background: Option<BackgroundModel>,

    /// z-score 阈值
    pub threshold: i32,

    /// 外接矩形面积下限 (小于此值丢弃)
    pub min_area: u32,

    /// 外接矩形面积上限 (大于等于此值视为多个陀螺粘连)
    pub max_area: u32,
}

impl FrameDetector {
    pub fn new(threshold: i32, min_area: u32, max_area: u32) -> Self {
        Self {
            background: None,
            threshold,
            min_area,
            max_area,
        }
    }

    /// 标定背景 (阻塞, 约 n / 帧率 秒)
    pub fn calibrate<S: FrameSource + ?Sized>(&mut self, source: &mut S, n: usize) -> Result<()> {
        info!("📷 开始背景标定 ({} 帧)", n);
        self.background = Some(BackgroundModel::calibrate(source, n)?);
        Ok(())
    }

    pub fn calibrate_cancellable<S: FrameSource + ?Sized>(
        &mut self,
        source: &mut S,
        n: usize,
        cancel: &AtomicBool,
    ) -> Result<()> {
        info!("📷 开始背景标定 ({} 帧, 可取消)", n);
        self.background = Some(BackgroundModel::calibrate_cancellable(source, n, cancel)?);
        Ok(())
    }

    pub fn set_background(&mut self, background: BackgroundModel) {
        self.background = Some(background);
    }

    pub fn background(&self) -> Option<&BackgroundModel> {
        self.background.as_ref()
    }

    pub fn is_calibrated(&self) -> bool {
        self.background.is_some()
    }

    /// 检测一帧
    pub fn detect(&self, frame: &GrayImage) -> Result<FrameDetections> {
        let mask = self.clean_mask(frame)?;

        let total = (mask.width() as usize * mask.height() as usize).max(1);
        let foreground = mask.as_raw().iter().filter(|&&v| v != 0).count();

        let detections = extract_objects(&mask, self.min_area, self.max_area);
        let candidates = pair_candidates(&detections);
        debug!(
            "检测: {} 个目标, {} 个碰撞候选",
            detections.len(),
            candidates.len()
        );

        Ok(FrameDetections {
            detections,
            candidates,
            foreground_ratio: foreground as f32 / total as f32,
        })
    }

    /// 阈值化 + 开运算后的二值图
    pub fn clean_mask(&self, frame: &GrayImage) -> Result<GrayImage> {
        let background = self.background.as_ref().ok_or(TrackerError::NotCalibrated)?;
        let mask = background.foreground_mask(frame, self.threshold as f32)?;
        Ok(open(&mask, Norm::LInf, OPENING_RADIUS))
    }
}

// ========== 轮廓处理 ==========

/// 轮廓外接矩形 (含端点, 与像素计数一致)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoundingRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl BoundingRect {
    pub fn of(contour: &Contour<i32>) -> Option<Self> {
        let first = contour.points.first()?;
        let (mut x0, mut y0, mut x1, mut y1) = (first.x, first.y, first.x, first.y);
        for p in &contour.points {
            x0 = x0.min(p.x);
            y0 = y0.min(p.y);
            x1 = x1.max(p.x);
            y1 = y1.max(p.y);
        }
        Some(Self {
            x: x0,
            y: y0,
            width: (x1 - x0 + 1) as u32,
            height: (y1 - y0 + 1) as u32,
        })
    }

    pub fn area(&self) -> u32 {
        self.width * self.height
    }

    /// 以 `origin` 为偏移构造检测
    fn to_detection(self, origin: (i32, i32)) -> Detection {
        Detection::new(
            (
                self.x + self.width as i32 / 2 + origin.0,
                self.y + self.height as i32 / 2 + origin.1,
            ),
            (self.width, self.height),
        )
    }
}

/// 外轮廓 (不含孔洞及孔洞内的轮廓)
fn external_contours(mask: &GrayImage) -> Vec<Contour<i32>> {
    find_contours::<i32>(mask)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .collect()
}

/// 从去噪后的二值图提取目标
///
/// - 面积 < `min_area`: 丢弃
/// - `min_area` <= 面积 < `max_area`: 一个目标
/// - 面积 >= `max_area`: 按距离变换种子分割, 只分割一层
pub fn extract_objects(mask: &GrayImage, min_area: u32, max_area: u32) -> Vec<Detection> {
    let mut detections = Vec::new();
    // 距离变换只在出现粘连轮廓时计算
    let mut seeds: Option<GrayImage> = None;

    for contour in external_contours(mask) {
        let Some(rect) = BoundingRect::of(&contour) else {
            continue;
        };
        let area = rect.area();
        if area < min_area {
            continue;
        }
        if area < max_area {
            detections.push(rect.to_detection((0, 0)));
            continue;
        }

        let seeds: &GrayImage = seeds.get_or_insert_with(|| sure_foreground(mask));
        let crop = imageops::crop_imm(
            seeds,
            rect.x as u32,
            rect.y as u32,
            rect.width,
            rect.height,
        )
        .to_image();

        let before = detections.len();
        for sub in find_contours::<i32>(&crop)
            .iter()
            .filter(|c| c.border_type == BorderType::Outer)
        {
            if let Some(sub_rect) = BoundingRect::of(sub) {
                if sub_rect.area() < max_area {
                    detections.push(sub_rect.to_detection((rect.x, rect.y)));
                }
            }
        }
        debug!(
            "粘连轮廓 {:?} (面积 {}) 分割为 {} 个目标",
            rect,
            area,
            detections.len() - before
        );
    }
    detections
}

/// 确定前景: 距离变换 > 0.8 * 最大值
pub fn sure_foreground(mask: &GrayImage) -> GrayImage {
    // 距离变换计算到最近前景像素的距离, 先反相使其变为到最近背景像素的距离
    let mut background = mask.clone();
    imageops::invert(&mut background);
    let dist = euclidean_squared_distance_transform(&background);

    let max = dist
        .pixels()
        .map(|p| p[0])
        .filter(|d| d.is_finite())
        .fold(0.0f64, f64::max)
        .sqrt();

    let (w, h) = mask.dimensions();
    let mut seeds = GrayImage::new(w, h);
    if max <= 0.0 {
        return seeds;
    }
    let cut = SEED_RATIO * max;
    for (x, y, p) in dist.enumerate_pixels() {
        let d = p[0];
        if d.is_finite() && d.sqrt() > cut {
            seeds.put_pixel(x, y, Luma([255]));
        }
    }
    seeds
}
