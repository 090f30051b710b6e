/// 帧输入系统 (Frame Input System)
///
/// 为检测核心提供单通道红外强度帧
/// - FrameSource:    帧来源接口 (相机/回调/文件/模拟)
/// - Preprocess:     裁剪与反相预处理
/// - ImageDirSource: 按文件名顺序读取目录中的图片
/// - SyntheticArena: 模拟硬件 (旋转陀螺 + 噪声背景)
pub mod image_dir;
pub mod preprocess;
pub mod synthetic;

pub use image_dir::ImageDirSource;
pub use preprocess::{CropRect, Preprocess, PreprocessedSource};
pub use synthetic::{Spinner, SyntheticArena};

use image::GrayImage;

use crate::error::Result;

/// 帧来源
///
/// 标定期间同步拉取, 任何错误都直接向上传播
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<GrayImage>;
}

/// 闭包即帧来源
impl<F> FrameSource for F
where
    F: FnMut() -> Result<GrayImage>,
{
    fn next_frame(&mut self) -> Result<GrayImage> {
        self()
    }
}
