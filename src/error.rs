//! 错误类型
//! Error types for the tracking core

use thiserror::Error;

pub type Result<T> = std::result::Result<T, TrackerError>;

#[derive(Debug, Error)]
pub enum TrackerError {
    /// 帧采集失败 (相机/回调)
    #[error("frame acquisition failed: {0}")]
    Acquisition(String),

    #[error("frame source exhausted")]
    EndOfStream,

    /// 未标定背景就调用检测
    #[error("background model is not calibrated")]
    NotCalibrated,

    #[error("frame size {actual:?} does not match background model {expected:?}")]
    DimensionMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("calibration requires at least one frame")]
    EmptyCalibration,

    #[error("calibration cancelled after {0} frames")]
    CalibrationCancelled(usize),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
