/// 跟踪流水线 (Tracking Pipeline)
///
/// 单帧处理: 检测 → 注册 → 帧计数 → 自适应阈值
/// - TrackingEngine: 同步处理核心 (可在任意线程使用)
/// - TrackingWorker: 独立工作线程, 通过 channel 接收控制消息/发送结果
pub mod worker;

pub use worker::{ControlMessage, TrackingWorker, WorkerEvent};

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use image::GrayImage;
use tracing::{debug, info};

use crate::config::TrackerConfig;
use crate::detection::{FrameDetector, FrameOutput, Registry, SmoothingAlpha};
use crate::error::Result;
use crate::input::FrameSource;

/// 前景占比过高 → 阈值+1
const ADAPTIVE_HIGH_RATIO: f32 = 0.015;
/// 前景占比过低 → 阈值-1
const ADAPTIVE_LOW_RATIO: f32 = 0.0005;
const ADAPTIVE_MAX_THRESHOLD: i32 = 40;
const ADAPTIVE_MIN_THRESHOLD: i32 = 5;

pub struct TrackingEngine {
    detector: FrameDetector,
    registry: Registry,
    adaptive_threshold: bool,
    calibration_frames: usize,
}

impl TrackingEngine {
    pub fn new(config: &TrackerConfig) -> Self {
        let alpha = Arc::new(SmoothingAlpha::new(config.smoothing_alpha));
        Self {
            detector: FrameDetector::new(config.threshold, config.min_area, config.max_area),
            registry: Registry::new(config.kalman_params(), alpha),
            adaptive_threshold: config.adaptive_threshold,
            calibration_frames: config.calibration_frames,
        }
    }

    pub fn calibrate<S: FrameSource + ?Sized>(&mut self, source: &mut S) -> Result<()> {
        self.detector.calibrate(source, self.calibration_frames)
    }

    pub fn calibrate_cancellable<S: FrameSource + ?Sized>(
        &mut self,
        source: &mut S,
        cancel: &AtomicBool,
    ) -> Result<()> {
        self.detector
            .calibrate_cancellable(source, self.calibration_frames, cancel)
    }

    pub fn is_calibrated(&self) -> bool {
        self.detector.is_calibrated()
    }

    /// 处理一帧, 返回该帧的跟踪快照
    pub fn process(&mut self, frame: &GrayImage) -> Result<FrameOutput> {
        let detections = self.detector.detect(frame)?;
        let ratio = detections.foreground_ratio;

        let output = self
            .registry
            .register(detections.detections, &detections.candidates);
        self.registry.next_frame();

        if self.adaptive_threshold {
            self.adapt_threshold(ratio);
        }
        Ok(output)
    }

    fn adapt_threshold(&mut self, ratio: f32) {
        let threshold = self.detector.threshold;
        if ratio > ADAPTIVE_HIGH_RATIO && threshold < ADAPTIVE_MAX_THRESHOLD {
            self.detector.threshold += 1;
        } else if ratio < ADAPTIVE_LOW_RATIO && threshold > ADAPTIVE_MIN_THRESHOLD {
            self.detector.threshold -= 1;
        } else {
            return;
        }
        debug!(
            "自适应阈值: 前景占比 {:.4}, 阈值 {} → {}",
            ratio, threshold, self.detector.threshold
        );
    }

    // ========== 运行时调参 ==========

    pub fn threshold(&self) -> i32 {
        self.detector.threshold
    }

    pub fn set_threshold(&mut self, threshold: i32) {
        self.detector.threshold = threshold;
        info!("🎚️  阈值: {}", threshold);
    }

    pub fn threshold_up(&mut self) -> i32 {
        self.set_threshold(self.detector.threshold.saturating_add(1));
        self.detector.threshold
    }

    pub fn threshold_down(&mut self) -> i32 {
        self.set_threshold(self.detector.threshold.saturating_sub(1));
        self.detector.threshold
    }

    pub fn set_min_area(&mut self, min_area: u32) {
        self.detector.min_area = min_area;
        info!("🎚️  面积下限: {}", min_area);
    }

    pub fn set_max_area(&mut self, max_area: u32) {
        self.detector.max_area = max_area;
        info!("🎚️  面积上限: {}", max_area);
    }

    /// 返回实际生效值
    pub fn set_smoothing_alpha(&self, alpha: f32) -> f32 {
        let alpha = self.registry.alpha().set(alpha);
        info!("🎚️  平滑系数: {:.2}", alpha);
        alpha
    }

    /// 共享句柄, 其他线程可直接调节
    pub fn smoothing_alpha(&self) -> Arc<SmoothingAlpha> {
        self.registry.alpha()
    }

    pub fn set_adaptive_threshold(&mut self, enabled: bool) {
        self.adaptive_threshold = enabled;
        info!("🎚️  自适应阈值: {}", enabled);
    }

    pub fn adaptive_threshold(&self) -> bool {
        self.adaptive_threshold
    }

    pub fn detector(&self) -> &FrameDetector {
        &self.detector
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::SyntheticArena;
    use image::Luma;
    use imageproc::drawing::draw_filled_rect_mut;
    use imageproc::rect::Rect;

    fn config() -> TrackerConfig {
        TrackerConfig {
            calibration_frames: 10,
            ..TrackerConfig::default()
        }
    }

    fn flat_engine() -> TrackingEngine {
        let mut engine = TrackingEngine::new(&config());
        let mut source = || -> Result<GrayImage> { Ok(GrayImage::from_pixel(200, 100, Luma([10]))) };
        engine.calibrate(&mut source).unwrap();
        engine
    }

    fn frame_with_blob(x: i32) -> GrayImage {
        let mut frame = GrayImage::from_pixel(200, 100, Luma([10]));
        draw_filled_rect_mut(&mut frame, Rect::at(x - 10, 40).of_size(20, 20), Luma([200]));
        frame
    }

    #[test]
    fn test_process_assigns_stable_id() {
        let mut engine = flat_engine();
        let first = engine.process(&frame_with_blob(50)).unwrap();
        let second = engine.process(&frame_with_blob(55)).unwrap();

        assert_eq!(first.frame, 0);
        assert_eq!(second.frame, 1);
        assert_eq!(first.tracks.len(), 1);
        assert_eq!(second.tracks.len(), 1);
        assert_eq!(first.tracks[0].id, second.tracks[0].id);
        assert_eq!(engine.registry().history().len(), 2);
    }

    #[test]
    fn test_adaptive_threshold_moves_within_bounds() {
        let mut engine = flat_engine();
        engine.set_adaptive_threshold(true);

        // 空帧: 前景占比为0, 阈值降到下限为止
        let empty = GrayImage::from_pixel(200, 100, Luma([10]));
        for _ in 0..20 {
            engine.process(&empty).unwrap();
        }
        assert_eq!(engine.threshold(), ADAPTIVE_MIN_THRESHOLD);

        // 大面积前景: 阈值升到上限为止
        let mut bright = GrayImage::from_pixel(200, 100, Luma([10]));
        draw_filled_rect_mut(&mut bright, Rect::at(0, 0).of_size(100, 100), Luma([200]));
        for _ in 0..50 {
            engine.process(&bright).unwrap();
        }
        assert_eq!(engine.threshold(), ADAPTIVE_MAX_THRESHOLD);
    }

    #[test]
    fn test_adaptive_threshold_disabled_by_default() {
        let mut engine = flat_engine();
        let empty = GrayImage::from_pixel(200, 100, Luma([10]));
        engine.process(&empty).unwrap();
        assert_eq!(engine.threshold(), 15);
    }

    #[test]
    fn test_runtime_tuning() {
        let mut engine = flat_engine();
        assert_eq!(engine.threshold_up(), 16);
        assert_eq!(engine.threshold_down(), 15);
        assert_eq!(engine.set_smoothing_alpha(1.7), 1.0);
        assert_eq!(engine.smoothing_alpha().get(), 1.0);

        engine.set_min_area(500);
        // 20x20 = 400 < 500
        let output = engine.process(&frame_with_blob(50)).unwrap();
        assert!(output.tracks.is_empty());
    }

    #[test]
    fn test_synthetic_arena_tracks_two_spinners() {
        let mut arena = SyntheticArena::two_spinners(3, 30);
        let mut engine = TrackingEngine::new(&TrackerConfig {
            calibration_frames: 30,
            ..TrackerConfig::default()
        });
        engine.calibrate(&mut arena).unwrap();

        let mut ids = Vec::new();
        for _ in 0..5 {
            let expected = arena.expected_positions();
            let frame = arena.next_frame().unwrap();
            let output = engine.process(&frame).unwrap();
            assert_eq!(output.tracks.len(), 2);
            for track in &output.tracks {
                let near = expected
                    .iter()
                    .any(|&(x, y)| (track.pos.0 - x).abs() <= 3 && (track.pos.1 - y).abs() <= 3);
                assert!(near, "track {:?} not near {:?}", track.pos, expected);
            }
            let mut frame_ids: Vec<u32> = output.tracks.iter().map(|t| t.id).collect();
            frame_ids.sort();
            ids.push(frame_ids);
        }
        assert!(ids.windows(2).all(|w| w[0] == w[1]));
    }
}
