//! 背景模型 (逐像素均值/标准差)
//! Per-pixel background statistics learned from a calibration sample

use std::sync::atomic::{AtomicBool, Ordering};

use image::GrayImage;
use ndarray::{Array2, Zip};
use tracing::{debug, info};

use crate::error::{Result, TrackerError};
use crate::input::FrameSource;

/// 标定帧数默认值
pub const DEFAULT_CALIBRATION_FRAMES: usize = 120;

/// 防止除零
const STD_EPSILON: f64 = 1e-16;

#[derive(Clone, Debug)]
pub struct BackgroundModel {
    /// 形状: (高, 宽)
    mean: Array2<f32>,
    std: Array2<f32>,
}

impl BackgroundModel {
    /// 阻塞采集 `n` 帧并统计背景, 任意一帧失败立即返回错误
    pub fn calibrate<S: FrameSource + ?Sized>(source: &mut S, n: usize) -> Result<Self> {
        Self::calibrate_until(source, n, None)
    }

    /// 可取消的标定: 每帧之间检查 `cancel`
    pub fn calibrate_cancellable<S: FrameSource + ?Sized>(
        source: &mut S,
        n: usize,
        cancel: &AtomicBool,
    ) -> Result<Self> {
        Self::calibrate_until(source, n, Some(cancel))
    }

    fn calibrate_until<S: FrameSource + ?Sized>(
        source: &mut S,
        n: usize,
        cancel: Option<&AtomicBool>,
    ) -> Result<Self> {
        if n == 0 {
            return Err(TrackerError::EmptyCalibration);
        }

        let mut acc: Option<Accumulator> = None;
        for i in 0..n {
            if cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
                return Err(TrackerError::CalibrationCancelled(i));
            }
            let frame = source.next_frame()?;
            let acc = acc.get_or_insert_with(|| Accumulator::new(frame.width(), frame.height()));
            acc.add(&frame)?;
            debug!("calibration {} / {}", i + 1, n);
        }

        // n > 0, 至少累积了一帧
        let model = acc.ok_or(TrackerError::EmptyCalibration)?.finish();
        let (w, h) = model.dimensions();
        info!("✅ 背景标定完成: {} 帧, {}x{}", n, w, h);
        Ok(model)
    }

    /// 直接由帧列表统计 (测试/离线)
    pub fn from_frames(frames: &[GrayImage]) -> Result<Self> {
        let first = frames.first().ok_or(TrackerError::EmptyCalibration)?;
        let mut acc = Accumulator::new(first.width(), first.height());
        for frame in frames {
            acc.add(frame)?;
        }
        Ok(acc.finish())
    }

    /// (宽, 高)
    pub fn dimensions(&self) -> (u32, u32) {
        let (h, w) = self.mean.dim();
        (w as u32, h as u32)
    }

    pub fn mean(&self) -> &Array2<f32> {
        &self.mean
    }

    pub fn std(&self) -> &Array2<f32> {
        &self.std
    }

    /// 二值前景: z = (帧 - 均值) / 标准差 >= threshold → 255
    pub fn foreground_mask(&self, frame: &GrayImage, threshold: f32) -> Result<GrayImage> {
        check_dimensions(self.dimensions(), frame)?;

        let (w, h) = self.dimensions();
        let data: Vec<u8> = self
            .mean
            .iter()
            .zip(self.std.iter())
            .zip(frame.as_raw().iter())
            .map(|((mean, std), &value)| {
                let z = (value as f32 - mean) / std;
                if z >= threshold {
                    255
                } else {
                    0
                }
            })
            .collect();

        GrayImage::from_raw(w, h, data).ok_or(TrackerError::DimensionMismatch {
            expected: (w, h),
            actual: frame.dimensions(),
        })
    }
}

fn check_dimensions(expected: (u32, u32), frame: &GrayImage) -> Result<()> {
    if frame.dimensions() != expected {
        return Err(TrackerError::DimensionMismatch {
            expected,
            actual: frame.dimensions(),
        });
    }
    Ok(())
}

/// 流式累加和/平方和, 不保存全部帧
struct Accumulator {
    width: u32,
    height: u32,
    count: usize,
    sum: Array2<f64>,
    sum_sq: Array2<f64>,
}

impl Accumulator {
    fn new(width: u32, height: u32) -> Self {
        let shape = (height as usize, width as usize);
        Self {
            width,
            height,
            count: 0,
            sum: Array2::zeros(shape),
            sum_sq: Array2::zeros(shape),
        }
    }

    fn add(&mut self, frame: &GrayImage) -> Result<()> {
        check_dimensions((self.width, self.height), frame)?;
        for ((s, sq), &value) in self
            .sum
            .iter_mut()
            .zip(self.sum_sq.iter_mut())
            .zip(frame.as_raw().iter())
        {
            let v = value as f64;
            *s += v;
            *sq += v * v;
        }
        self.count += 1;
        Ok(())
    }

    fn finish(self) -> BackgroundModel {
        let n = self.count.max(1) as f64;
        let mut mean = Array2::<f32>::zeros(self.sum.dim());
        let mut std = Array2::<f32>::zeros(self.sum.dim());
        Zip::from(&mut mean)
            .and(&mut std)
            .and(&self.sum)
            .and(&self.sum_sq)
            .for_each(|m, s, &sum, &sum_sq| {
                let mu = sum / n;
                // 总体标准差 (ddof = 0)
                let var = (sum_sq / n - mu * mu).max(0.0);
                *m = mu as f32;
                *s = (var.sqrt() + STD_EPSILON) as f32;
            });
        BackgroundModel { mean, std }
    }
}
