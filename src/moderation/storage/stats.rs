//! 过滤计数器

use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};

use crate::moderation::pipeline::scanner::ItemKind;

/// 过滤统计
#[derive(Debug, Default)]
pub struct StatsCounter {
    text_filtered: AtomicUsize,
    images_filtered: AtomicUsize,
    elements_scanned: AtomicUsize,
}

/// 统计快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub text_filtered: usize,
    pub images_filtered: usize,
    pub elements_scanned: usize,
}

impl StatsCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以持久化的计数为起点
    pub fn with_totals(text_filtered: usize, images_filtered: usize) -> Self {
        Self {
            text_filtered: AtomicUsize::new(text_filtered),
            images_filtered: AtomicUsize::new(images_filtered),
            elements_scanned: AtomicUsize::new(0),
        }
    }

    /// 记录一次过滤，返回该类型的新计数
    pub fn record_filtered(&self, kind: ItemKind) -> usize {
        let counter = match kind {
            ItemKind::Text => &self.text_filtered,
            ItemKind::Image => &self.images_filtered,
        };
        counter.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn record_scanned(&self, count: usize) {
        self.elements_scanned.fetch_add(count, Ordering::Relaxed);
    }

    pub fn text_filtered(&self) -> usize {
        self.text_filtered.load(Ordering::Relaxed)
    }

    pub fn images_filtered(&self) -> usize {
        self.images_filtered.load(Ordering::Relaxed)
    }

    pub fn elements_scanned(&self) -> usize {
        self.elements_scanned.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            text_filtered: self.text_filtered(),
            images_filtered: self.images_filtered(),
            elements_scanned: self.elements_scanned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_per_kind() {
        let stats = StatsCounter::with_totals(3, 0);

        assert_eq!(stats.record_filtered(ItemKind::Text), 4);
        assert_eq!(stats.record_filtered(ItemKind::Image), 1);
        stats.record_scanned(7);

        assert_eq!(
            stats.snapshot(),
            StatsSnapshot {
                text_filtered: 4,
                images_filtered: 1,
                elements_scanned: 7,
            }
        );
    }
}
