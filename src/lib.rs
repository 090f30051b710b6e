pub mod config; // 跟踪器配置与标定档案
pub mod detection; // 检测与跟踪核心
pub mod error; // 错误类型
pub mod input; // 帧输入系统
pub mod pipeline; // 处理流水线与工作线程

pub use crate::config::{CalibrationProfile, TrackerConfig, DEFAULT_MAX_AREA};
pub use crate::detection::{
    BackgroundModel, Detection, FrameDetector, FrameOutput, HistoryBuffer, Registry,
};
pub use crate::error::{Result, TrackerError};
pub use crate::input::{FrameSource, ImageDirSource, Preprocess, SyntheticArena};
pub use crate::pipeline::{ControlMessage, TrackingEngine, TrackingWorker, WorkerEvent};
