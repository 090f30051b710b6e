//! 历史帧缓冲
//! Bounded FIFO of past per-frame track and hit lists

use std::collections::VecDeque;

use super::tracker::Track;
use super::types::Hit;

/// 历史容量 (帧)
pub const HISTORY_CAPACITY: usize = 20;

/// 单帧记录
#[derive(Clone, Debug)]
pub struct FrameRecord {
    pub frame: u64,
    pub tracks: Vec<Track>,
    pub hits: Vec<Hit>,
}

#[derive(Clone, Debug)]
pub struct HistoryBuffer {
    records: VecDeque<FrameRecord>,
    capacity: usize,
}

impl HistoryBuffer {
    pub fn new() -> Self {
        Self::with_capacity(HISTORY_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// 追加一帧, 超出容量时淘汰最旧记录
    pub fn push(&mut self, record: FrameRecord) {
        self.records.push_back(record);
        while self.records.len() > self.capacity {
            self.records.pop_front();
        }
    }

    /// 最近 `n` 帧, 从新到旧
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &FrameRecord> {
        self.records.iter().rev().take(n)
    }

    pub fn latest(&self) -> Option<&FrameRecord> {
        self.records.back()
    }

    /// 从旧到新
    pub fn iter(&self) -> impl Iterator<Item = &FrameRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}

impl Default for HistoryBuffer {
    fn default() -> Self {
        Self::new()
    }
}
