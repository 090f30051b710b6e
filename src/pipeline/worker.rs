/// 跟踪工作线程 (Tracking Worker)
/// Owns a frame source and a tracking engine on a dedicated thread
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use tracing::{debug, error, info, warn};

use super::TrackingEngine;
use crate::config::TrackerConfig;
use crate::detection::FrameOutput;
use crate::error::TrackerError;
use crate::input::FrameSource;

const CONTROL_CAPACITY: usize = 16;
const EVENT_CAPACITY: usize = 64;

/// 状态事件最长等待时间 (帧事件不等待, 满则丢弃)
const EVENT_TIMEOUT: Duration = Duration::from_secs(1);

/// UI/网络 → 工作线程
#[derive(Clone, Debug, PartialEq)]
pub enum ControlMessage {
    SetThreshold(i32),
    ThresholdUp,
    ThresholdDown,
    SetMinArea(u32),
    SetMaxArea(u32),
    SetSmoothingAlpha(f32),
    SetAdaptiveThreshold(bool),
    Recalibrate,
    Shutdown,
}

/// 工作线程 → UI/网络
#[derive(Clone, Debug)]
pub enum WorkerEvent {
    Calibrated { frames: usize },
    Frame(FrameOutput),
    /// 阈值变化后的当前值
    Threshold(i32),
    Error { module: String, error: String },
    Stopped,
}

pub struct TrackingWorker {
    control: Sender<ControlMessage>,
    events: Receiver<WorkerEvent>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl TrackingWorker {
    /// 启动工作线程: 先标定背景, 然后逐帧处理直到停止或来源出错
    pub fn spawn(source: Box<dyn FrameSource + Send>, config: TrackerConfig) -> Self {
        let (control_tx, control_rx) = bounded::<ControlMessage>(CONTROL_CAPACITY);
        let (event_tx, event_rx) = bounded::<WorkerEvent>(EVENT_CAPACITY);
        let stop = Arc::new(AtomicBool::new(false));

        let thread_stop = stop.clone();
        let handle = thread::spawn(move || {
            let mut worker = WorkerLoop {
                source,
                engine: TrackingEngine::new(&config),
                calibration_frames: config.calibration_frames,
                control: control_rx,
                events: event_tx,
                stop: thread_stop,
            };
            worker.run();
        });

        Self {
            control: control_tx,
            events: event_rx,
            stop,
            handle: Some(handle),
        }
    }

    /// 控制通道 (可克隆给多个发送方)
    pub fn control(&self) -> Sender<ControlMessage> {
        self.control.clone()
    }

    /// 非阻塞发送, 通道满或线程已退出时返回 false
    pub fn send(&self, message: ControlMessage) -> bool {
        self.control.try_send(message).is_ok()
    }

    pub fn events(&self) -> &Receiver<WorkerEvent> {
        &self.events
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// 请求停止并等待线程退出 (标定中也会被打断)
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("❌ 跟踪线程异常退出");
            }
        }
    }
}

impl Drop for TrackingWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

struct WorkerLoop {
    source: Box<dyn FrameSource + Send>,
    engine: TrackingEngine,
    calibration_frames: usize,
    control: Receiver<ControlMessage>,
    events: Sender<WorkerEvent>,
    stop: Arc<AtomicBool>,
}

impl WorkerLoop {
    fn run(&mut self) {
        info!("🎬 跟踪线程启动");

        if self.calibrate() {
            self.track();
        }

        info!("🛑 跟踪线程退出");
        self.emit(WorkerEvent::Stopped);
    }

    fn track(&mut self) {
        while !self.stop.load(Ordering::Relaxed) {
            if !self.handle_control() {
                break;
            }

            let frame = match self.source.next_frame() {
                Ok(frame) => frame,
                Err(TrackerError::EndOfStream) => {
                    info!("📭 帧来源已结束");
                    break;
                }
                Err(e) => {
                    // 不重连: 报告错误后退出
                    self.report("acquisition", &e);
                    break;
                }
            };

            match self.engine.process(&frame) {
                Ok(output) => self.emit_frame(output),
                Err(e) => {
                    self.report("detection", &e);
                    break;
                }
            }
        }
    }

    /// 返回 false 表示应退出
    fn calibrate(&mut self) -> bool {
        match self
            .engine
            .calibrate_cancellable(&mut *self.source, &self.stop)
        {
            Ok(()) => {
                self.emit(WorkerEvent::Calibrated {
                    frames: self.calibration_frames,
                });
                true
            }
            Err(TrackerError::CalibrationCancelled(n)) => {
                info!("标定在第 {} 帧被取消", n);
                false
            }
            Err(e) => {
                self.report("calibration", &e);
                false
            }
        }
    }

    /// 处理所有待处理的控制消息, 返回 false 表示应退出
    fn handle_control(&mut self) -> bool {
        while let Ok(message) = self.control.try_recv() {
            debug!("控制消息: {:?}", message);
            match message {
                ControlMessage::SetThreshold(threshold) => {
                    self.engine.set_threshold(threshold);
                    self.emit(WorkerEvent::Threshold(threshold));
                }
                ControlMessage::ThresholdUp => {
                    let threshold = self.engine.threshold_up();
                    self.emit(WorkerEvent::Threshold(threshold));
                }
                ControlMessage::ThresholdDown => {
                    let threshold = self.engine.threshold_down();
                    self.emit(WorkerEvent::Threshold(threshold));
                }
                ControlMessage::SetMinArea(area) => self.engine.set_min_area(area),
                ControlMessage::SetMaxArea(area) => self.engine.set_max_area(area),
                ControlMessage::SetSmoothingAlpha(alpha) => {
                    self.engine.set_smoothing_alpha(alpha);
                }
                ControlMessage::SetAdaptiveThreshold(enabled) => {
                    self.engine.set_adaptive_threshold(enabled)
                }
                ControlMessage::Recalibrate => {
                    if !self.calibrate() {
                        return false;
                    }
                }
                ControlMessage::Shutdown => {
                    self.stop.store(true, Ordering::Relaxed);
                    return false;
                }
            }
        }
        true
    }

    fn report(&self, module: &str, e: &TrackerError) {
        error!("❌ {} 失败: {}", module, e);
        self.emit(WorkerEvent::Error {
            module: module.to_string(),
            error: e.to_string(),
        });
    }

    /// 帧事件: 消费方跟不上时丢弃
    fn emit_frame(&self, output: FrameOutput) {
        match self.events.try_send(WorkerEvent::Frame(output)) {
            Ok(()) | Err(TrySendError::Disconnected(_)) => {}
            Err(TrySendError::Full(_)) => debug!("事件通道已满, 丢弃一帧"),
        }
    }

    fn emit(&self, event: WorkerEvent) {
        if self.events.send_timeout(event, EVENT_TIMEOUT).is_err() {
            warn!("⚠️  事件发送超时或通道已关闭");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::input::SyntheticArena;
    use image::{GrayImage, Luma};

    fn config(frames: usize) -> TrackerConfig {
        TrackerConfig {
            calibration_frames: frames,
            ..TrackerConfig::default()
        }
    }

    fn next_event(worker: &TrackingWorker) -> WorkerEvent {
        worker
            .events()
            .recv_timeout(Duration::from_secs(10))
            .expect("worker event")
    }

    #[test]
    fn test_worker_calibrates_and_streams_frames() {
        let arena = SyntheticArena::two_spinners(11, 10);
        let mut worker = TrackingWorker::spawn(Box::new(arena), config(10));

        assert!(matches!(
            next_event(&worker),
            WorkerEvent::Calibrated { frames: 10 }
        ));
        match next_event(&worker) {
            WorkerEvent::Frame(output) => {
                assert_eq!(output.frame, 0);
                assert_eq!(output.tracks.len(), 2);
            }
            other => panic!("unexpected event {:?}", other),
        }

        worker.stop();
        assert!(!worker.is_running());
    }

    #[test]
    fn test_threshold_messages_are_acknowledged() {
        let arena = SyntheticArena::two_spinners(5, 5);
        let worker = TrackingWorker::spawn(Box::new(arena), config(5));
        assert!(worker.send(ControlMessage::ThresholdUp));

        let mut acknowledged = None;
        for _ in 0..1000 {
            if let WorkerEvent::Threshold(t) = next_event(&worker) {
                acknowledged = Some(t);
                break;
            }
        }
        assert_eq!(acknowledged, Some(16));
    }

    #[test]
    fn test_acquisition_failure_stops_worker() {
        let mut calls = 0;
        let source = move || -> Result<GrayImage> {
            calls += 1;
            if calls > 4 {
                Err(TrackerError::Acquisition("camera unplugged".into()))
            } else {
                Ok(GrayImage::from_pixel(32, 32, Luma([10])))
            }
        };
        let worker = TrackingWorker::spawn(Box::new(source), config(3));

        assert!(matches!(next_event(&worker), WorkerEvent::Calibrated { .. }));
        assert!(matches!(next_event(&worker), WorkerEvent::Frame(_)));
        match next_event(&worker) {
            WorkerEvent::Error { module, .. } => assert_eq!(module, "acquisition"),
            other => panic!("unexpected event {:?}", other),
        }
        assert!(matches!(next_event(&worker), WorkerEvent::Stopped));
    }

    #[test]
    fn test_end_of_stream_and_shutdown() {
        let mut calls = 0;
        let source = move || -> Result<GrayImage> {
            calls += 1;
            if calls > 2 {
                Err(TrackerError::EndOfStream)
            } else {
                Ok(GrayImage::from_pixel(32, 32, Luma([10])))
            }
        };
        let worker = TrackingWorker::spawn(Box::new(source), config(2));
        assert!(matches!(next_event(&worker), WorkerEvent::Calibrated { .. }));
        assert!(matches!(next_event(&worker), WorkerEvent::Stopped));
    }

    #[test]
    fn test_shutdown_message() {
        let arena = SyntheticArena::two_spinners(9, 3);
        let worker = TrackingWorker::spawn(Box::new(arena), config(3));
        assert!(worker.send(ControlMessage::Shutdown));

        let mut stopped = false;
        for _ in 0..1000 {
            if matches!(next_event(&worker), WorkerEvent::Stopped) {
                stopped = true;
                break;
            }
        }
        assert!(stopped);
    }
}
