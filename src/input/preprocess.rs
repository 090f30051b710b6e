//! 帧预处理: 裁剪 + 红外反相
//!
//! 标定与检测使用同一预处理, 保证背景模型与检测帧尺寸一致

use image::{imageops, GrayImage};
use serde::{Deserialize, Serialize};

use super::FrameSource;
use crate::error::Result;

/// 裁剪矩形 (左上 x1,y1 含, 右下 x2,y2 不含)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropRect {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl CropRect {
    pub fn width(&self) -> u32 {
        self.x2.saturating_sub(self.x1)
    }

    pub fn height(&self) -> u32 {
        self.y2.saturating_sub(self.y1)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Preprocess {
    pub crop: Option<CropRect>,
    pub invert: bool,
}

impl Preprocess {
    pub fn apply(&self, frame: GrayImage) -> GrayImage {
        let mut frame = match self.crop {
            // 超出画面的部分由 crop_imm 截断
            Some(rect) => {
                imageops::crop_imm(&frame, rect.x1, rect.y1, rect.width(), rect.height()).to_image()
            }
            None => frame,
        };
        if self.invert {
            imageops::invert(&mut frame);
        }
        frame
    }
}

/// 带预处理的帧来源
pub struct PreprocessedSource<S> {
    inner: S,
    pub preprocess: Preprocess,
}

impl<S: FrameSource> PreprocessedSource<S> {
    pub fn new(inner: S, preprocess: Preprocess) -> Self {
        Self { inner, preprocess }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: FrameSource> FrameSource for PreprocessedSource<S> {
    fn next_frame(&mut self) -> Result<GrayImage> {
        let frame = self.inner.next_frame()?;
        Ok(self.preprocess.apply(frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn test_crop_and_invert() {
        let mut frame = GrayImage::from_pixel(100, 80, Luma([10]));
        frame.put_pixel(20, 30, Luma([200]));

        let pre = Preprocess {
            crop: Some(CropRect {
                x1: 20,
                y1: 30,
                x2: 60,
                y2: 50,
            }),
            invert: true,
        };
        let out = pre.apply(frame);
        assert_eq!(out.dimensions(), (40, 20));
        assert_eq!(out.get_pixel(0, 0)[0], 55);
        assert_eq!(out.get_pixel(1, 1)[0], 245);
    }

    #[test]
    fn test_preprocessed_source_wraps_closure() {
        let inner = || -> Result<GrayImage> { Ok(GrayImage::new(64, 64)) };
        let mut source = PreprocessedSource::new(
            inner,
            Preprocess {
                crop: Some(CropRect {
                    x1: 0,
                    y1: 0,
                    x2: 32,
                    y2: 16,
                }),
                invert: false,
            },
        );
        assert_eq!(source.next_frame().unwrap().dimensions(), (32, 16));
    }
}
