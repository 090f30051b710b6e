/// 检测与跟踪系统 (Detection & Tracking System)
///
/// - BackgroundModel: 背景标定 (逐像素均值/标准差)
/// - FrameDetector:   前景提取 + 粘连分割
/// - Registry:        身份关联 + 平滑 + 碰撞去重
/// - HistoryBuffer:   最近 20 帧记录
pub mod background;
pub mod collision;
pub mod detector;
pub mod history;
pub mod registry;
pub mod tracker;
pub mod types;

pub use background::{BackgroundModel, DEFAULT_CALIBRATION_FRAMES};
pub use collision::{pair_candidates, HitCandidate, DEDUP_WINDOW, HIT_DISTANCE};
pub use detector::{extract_objects, FrameDetections, FrameDetector};
pub use history::{FrameRecord, HistoryBuffer, HISTORY_CAPACITY};
pub use registry::{Registry, ASSOCIATION_DISTANCE, RECENT_WINDOW};
pub use tracker::{KalmanFilter, KalmanParams, SmoothingAlpha, Track, DEFAULT_SMOOTHING_ALPHA};
pub use types::{Detection, FrameOutput, Hit, HitSnapshot, TrackSnapshot};
