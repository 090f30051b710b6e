//! 跟踪器配置 - 通过JSON文件调整参数

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::detection::{KalmanParams, DEFAULT_CALIBRATION_FRAMES, DEFAULT_SMOOTHING_ALPHA};
use crate::error::Result;
use crate::input::{CropRect, Preprocess};

/// 外接矩形面积上限默认值 (唯一来源)
pub const DEFAULT_MAX_AREA: u32 = 2000;

/// 跟踪器参数配置
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    // === 检测参数 ===
    pub threshold: i32,   // z-score 阈值
    pub min_area: u32,    // 面积下限
    pub max_area: u32,    // 面积上限 (超过则分割)
    pub adaptive_threshold: bool, // 按前景占比自动调节阈值

    // === 跟踪参数 ===
    pub smoothing_alpha: f32,      // 原始观测权重 [0,1]
    pub calibration_frames: usize, // 背景标定帧数

    // === 卡尔曼滤波参数 ===
    pub kalman_process_noise_pos: f32,
    pub kalman_process_noise_vel: f32,
    pub kalman_measurement_noise: f32,
    pub kalman_initial_pos_variance: f32,
    pub kalman_initial_vel_variance: f32,

    // === 预处理 ===
    pub invert_ir: bool,
    pub crop: Option<CropRect>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        let kalman = KalmanParams::default();
        Self {
            threshold: 15,
            min_area: 100,
            max_area: DEFAULT_MAX_AREA,
            adaptive_threshold: false,

            smoothing_alpha: DEFAULT_SMOOTHING_ALPHA,
            calibration_frames: DEFAULT_CALIBRATION_FRAMES,

            kalman_process_noise_pos: kalman.q_pos,
            kalman_process_noise_vel: kalman.q_vel,
            kalman_measurement_noise: kalman.r,
            kalman_initial_pos_variance: kalman.p0_pos,
            kalman_initial_vel_variance: kalman.p0_vel,

            invert_ir: false,
            crop: None,
        }
    }
}

impl TrackerConfig {
    /// 从JSON文件加载配置, 失败时使用默认值
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(json) => match serde_json::from_str(&json) {
                Ok(config) => {
                    info!("✅ 配置已从 {} 加载", path.display());
                    config
                }
                Err(e) => {
                    warn!("⚠️  配置文件解析失败: {}, 使用默认值", e);
                    Self::default()
                }
            },
            Err(_) => {
                info!("📝 配置文件不存在,创建默认配置...");
                let config = Self::default();
                if let Err(e) = config.save(path) {
                    warn!("❌ 保存配置失败: {}", e);
                }
                config
            }
        }
    }

    /// 严格加载, 错误向上传播
    pub fn try_load(path: impl AsRef<Path>) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    /// 保存配置到JSON文件
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        info!("💾 配置已保存到 {}", path.display());
        Ok(())
    }

    pub fn kalman_params(&self) -> KalmanParams {
        KalmanParams {
            q_pos: self.kalman_process_noise_pos,
            q_vel: self.kalman_process_noise_vel,
            r: self.kalman_measurement_noise,
            p0_pos: self.kalman_initial_pos_variance,
            p0_vel: self.kalman_initial_vel_variance,
        }
    }

    pub fn preprocess(&self) -> Preprocess {
        Preprocess {
            crop: self.crop,
            invert: self.invert_ir,
        }
    }

    /// 用标定档案覆盖对应字段
    pub fn apply_profile(&mut self, profile: &CalibrationProfile) {
        let Some(last) = profile.last() else {
            return;
        };
        if let Some(threshold) = last.threshold {
            self.threshold = threshold;
        }
        if let Some(min_area) = last.min_area {
            self.min_area = min_area;
        }
        if let Some(max_area) = last.max_area {
            self.max_area = max_area;
        }
        if let Some(smooth) = last.smooth {
            // 档案中以百分比保存
            self.smoothing_alpha = (smooth as f32 / 100.0).clamp(0.0, 1.0);
        }
    }

    /// 打印当前配置
    pub fn print_summary(&self) {
        info!("🎛️  当前跟踪器配置:");
        info!("  阈值: {} (自适应: {})", self.threshold, self.adaptive_threshold);
        info!("  面积范围: [{}, {})", self.min_area, self.max_area);
        info!("  平滑系数: {:.2}", self.smoothing_alpha);
        info!("  标定帧数: {}", self.calibration_frames);
        info!(
            "  卡尔曼: q=({:.2}, {:.2}) r={:.2}",
            self.kalman_process_noise_pos,
            self.kalman_process_noise_vel,
            self.kalman_measurement_noise
        );
        if let Some(crop) = self.crop {
            info!(
                "  裁剪: ({}, {}) - ({}, {})",
                crop.x1, crop.y1, crop.x2, crop.y2
            );
        }
    }
}

// ========== 标定档案 ==========

/// 标定向导保存的参数 (字段均可缺省)
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileEntry {
    pub threshold: Option<i32>,
    pub min_area: Option<u32>,
    pub max_area: Option<u32>,

    /// 平滑系数百分比 (0-100)
    pub smooth: Option<u32>,
}

/// `~/.beytracker/calibration_profiles.json`
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CalibrationProfile {
    pub profiles: HashMap<String, ProfileEntry>,
}

impl CalibrationProfile {
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".beytracker").join("calibration_profiles.json"))
    }

    /// 读取失败返回 `None`, 调用方继续使用配置文件中的值
    pub fn load(path: impl AsRef<Path>) -> Option<Self> {
        let json = fs::read_to_string(path).ok()?;
        serde_json::from_str(&json).ok()
    }

    pub fn load_default() -> Option<Self> {
        Self::load(Self::default_path()?)
    }

    pub fn last(&self) -> Option<&ProfileEntry> {
        self.profiles.get("last")
    }
}
