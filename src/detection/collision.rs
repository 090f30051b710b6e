//! 碰撞检测与去重
//! Collision ("hit") candidate pairing and tag deduplication
//!
//! 两阶段:
//! 1. 检测阶段: 在尚无ID的检测结果之间配对, 只记录下标
//! 2. 注册阶段: ID分配完成后, 通过同一下标解析标签并判断是否为新碰撞

use std::collections::HashSet;

use tracing::info;

use super::history::HistoryBuffer;
use super::tracker::Track;
use super::types::{Detection, Hit};

/// 碰撞判定距离 (像素)
pub const HIT_DISTANCE: f32 = 40.0;

/// 去重窗口 (帧)
pub const DEDUP_WINDOW: usize = 10;

/// 未解析的碰撞候选
///
/// `first`/`second` 为检测列表下标; 注册后轨迹列表保持同一顺序
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HitCandidate {
    pub first: usize,
    pub second: usize,
    pub shape: (u32, u32),
}

/// 两两配对距离小于 `HIT_DISTANCE` 的检测
pub fn pair_candidates(detections: &[Detection]) -> Vec<HitCandidate> {
    let mut candidates = Vec::new();
    for (i, a) in detections.iter().enumerate() {
        for (j, b) in detections.iter().enumerate().skip(i + 1) {
            if a.distance_to(b) < HIT_DISTANCE {
                candidates.push(HitCandidate {
                    first: i,
                    second: j,
                    shape: (
                        2 * a.pos.0.abs_diff(b.pos.0),
                        2 * a.pos.1.abs_diff(b.pos.1),
                    ),
                });
            }
        }
    }
    candidates
}

/// 无序ID对
pub fn tag_of(a: u32, b: u32) -> (u32, u32) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

/// 解析候选标签, 与最近 `DEDUP_WINDOW` 帧比较得出 `is_new`
///
/// `tracks` 必须是本帧已分配ID的轨迹, 且与检测列表顺序一致
pub fn resolve_hits(
    candidates: &[HitCandidate],
    tracks: &[Track],
    history: &HistoryBuffer,
) -> Vec<Hit> {
    let seen: HashSet<(u32, u32)> = history
        .recent(DEDUP_WINDOW)
        .flat_map(|record| record.hits.iter().map(|hit| hit.tag))
        .collect();

    candidates
        .iter()
        .filter_map(|candidate| {
            let a = tracks.get(candidate.first)?;
            let b = tracks.get(candidate.second)?;
            let tag = tag_of(a.id, b.id);
            let is_new = !seen.contains(&tag);
            let pos = ((a.pos.0 + b.pos.0) / 2, (a.pos.1 + b.pos.1) / 2);
            if is_new {
                info!("💥 新碰撞 {:?} @ {:?}", tag, pos);
            }
            Some(Hit {
                members: (candidate.first, candidate.second),
                tag,
                pos,
                shape: candidate.shape,
                is_new,
            })
        })
        .collect()
}
