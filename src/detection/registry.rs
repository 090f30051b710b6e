//! 身份关联 (ID分配)
//! Frame-to-frame identity association
//!
//! 贪心最近邻匹配:
//! 1. 收集最近3帧中的所有轨迹
//! 2. 新检测 × 旧轨迹 全组合, 按距离升序
//! 3. 依次匹配, 新检测与旧ID都未占用且距离小于阈值时继承ID
//! 4. 未匹配的检测分配新ID
//!
//! 刻意不使用全局最优匹配 (匈牙利算法)

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use super::collision::{resolve_hits, HitCandidate};
use super::history::{FrameRecord, HistoryBuffer};
use super::tracker::{KalmanParams, SmoothingAlpha, Track};
use super::types::{Detection, FrameOutput, Hit};

/// 关联距离上限 (像素)
pub const ASSOCIATION_DISTANCE: f32 = 1000.0;

/// 关联候选窗口 (帧)
pub const RECENT_WINDOW: usize = 3;

pub struct Registry {
    history: HistoryBuffer,
    frame: u64,
    max_id: u32,
    alpha: Arc<SmoothingAlpha>,
    params: KalmanParams,
}

impl Registry {
    pub fn new(params: KalmanParams, alpha: Arc<SmoothingAlpha>) -> Self {
        Self {
            history: HistoryBuffer::new(),
            frame: 0,
            max_id: 0,
            alpha,
            params,
        }
    }

    /// 注册一帧检测结果
    ///
    /// `candidates` 必须由同一 `detections` 列表生成 (见 `pair_candidates`)
    pub fn register(
        &mut self,
        mut detections: Vec<Detection>,
        candidates: &[HitCandidate],
    ) -> FrameOutput {
        let frame = self.frame;
        for detection in &mut detections {
            detection.frame = Some(frame);
        }

        let tracks = self.assign_ids(&detections, frame);
        let hits = resolve_hits(candidates, &tracks, &self.history);

        let output = FrameOutput {
            frame,
            tracks: tracks.iter().map(Track::snapshot).collect(),
            hits: hits.iter().map(Hit::snapshot).collect(),
        };

        self.history.push(FrameRecord {
            frame,
            tracks,
            hits,
        });
        output
    }

    /// 进入下一帧 (跳过的帧会增大 dt)
    pub fn next_frame(&mut self) {
        self.frame += 1;
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn history(&self) -> &HistoryBuffer {
        &self.history
    }

    /// 各帧的新碰撞 (从旧到新)
    pub fn new_hit_history(&self) -> Vec<Vec<&Hit>> {
        self.history
            .iter()
            .map(|record| record.hits.iter().filter(|hit| hit.is_new).collect())
            .collect()
    }

    pub fn max_id(&self) -> u32 {
        self.max_id
    }

    pub fn alpha(&self) -> Arc<SmoothingAlpha> {
        Arc::clone(&self.alpha)
    }

    pub fn set_kalman_params(&mut self, params: KalmanParams) {
        self.params = params;
    }

    fn assign_ids(&mut self, detections: &[Detection], frame: u64) -> Vec<Track> {
        let recent: Vec<&Track> = self
            .history
            .recent(RECENT_WINDOW)
            .flat_map(|record| record.tracks.iter())
            .collect();

        // (距离, 新检测下标, 旧轨迹下标), 稳定排序保持同距离的原始顺序
        let mut pairs: Vec<(f32, usize, usize)> =
            Vec::with_capacity(detections.len() * recent.len());
        for (new_idx, detection) in detections.iter().enumerate() {
            for (old_idx, track) in recent.iter().enumerate() {
                let dx = (detection.pos.0 - track.pos.0) as f32;
                let dy = (detection.pos.1 - track.pos.1) as f32;
                pairs.push(((dx * dx + dy * dy).sqrt(), new_idx, old_idx));
            }
        }
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut matched: Vec<Option<usize>> = vec![None; detections.len()];
        let mut assigned = 0;
        let mut booked: HashSet<u32> = HashSet::new();
        for (distance, new_idx, old_idx) in pairs {
            if assigned == detections.len() {
                break;
            }
            let old_id = recent[old_idx].id;
            if matched[new_idx].is_none()
                && !booked.contains(&old_id)
                && distance < ASSOCIATION_DISTANCE
            {
                matched[new_idx] = Some(old_idx);
                booked.insert(old_id);
                assigned += 1;
            }
        }

        let alpha = self.alpha.get();
        let mut tracks = Vec::with_capacity(detections.len());
        for (detection, old) in detections.iter().zip(matched) {
            let track = match old {
                Some(old_idx) => recent[old_idx].follow(detection, frame, alpha),
                None => {
                    self.max_id += 1;
                    debug!("🆕 新轨迹 id={} @ {:?}", self.max_id, detection.pos);
                    Track::spawn(self.max_id, detection, frame, &self.params)
                }
            };
            tracks.push(track);
        }
        tracks
    }
}
