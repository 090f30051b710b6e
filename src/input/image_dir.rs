//! 图片目录帧来源
//!
//! 按文件名排序逐帧读取, 读完返回 `EndOfStream`

use std::fs;
use std::path::{Path, PathBuf};

use image::GrayImage;
use tracing::info;

use super::FrameSource;
use crate::error::{Result, TrackerError};

const EXTENSIONS: [&str; 5] = ["png", "bmp", "jpg", "jpeg", "tiff"];

pub struct ImageDirSource {
    files: Vec<PathBuf>,
    cursor: usize,

    /// 读完后从头循环
    looping: bool,
}

impl ImageDirSource {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let mut files: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .collect();
        files.sort();

        info!("📂 帧目录 {}: {} 帧", dir.display(), files.len());
        Ok(Self {
            files,
            cursor: 0,
            looping: false,
        })
    }

    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FrameSource for ImageDirSource {
    fn next_frame(&mut self) -> Result<GrayImage> {
        if self.cursor >= self.files.len() {
            if !self.looping || self.files.is_empty() {
                return Err(TrackerError::EndOfStream);
            }
            self.cursor = 0;
        }
        let path = &self.files[self.cursor];
        self.cursor += 1;
        Ok(image::open(path)?.to_luma8())
    }
}
