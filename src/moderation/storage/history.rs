//! 过滤历史记录
//!
//! 固定容量的环形日志，最新的记录在前，溢出时丢弃最旧的记录。

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::moderation::config::constants;
use crate::moderation::pipeline::scanner::ItemKind;

/// 历史记录类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    Text,
    Image,
}

impl From<ItemKind> for EntryType {
    fn from(kind: ItemKind) -> Self {
        match kind {
            ItemKind::Text => EntryType::Text,
            ItemKind::Image => EntryType::Image,
        }
    }
}

/// 单条过滤记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    pub content_preview: String,
    pub original_content: String,
    #[serde(default)]
    pub reasons: Vec<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub page_url: String,
    #[serde(default)]
    pub domain: String,
}

impl HistoryEntry {
    pub fn new(
        entry_type: EntryType,
        original_content: &str,
        reasons: Vec<String>,
        page_url: &str,
        domain: &str,
    ) -> Self {
        Self {
            entry_type,
            content_preview: preview(original_content),
            original_content: original_content.to_string(),
            reasons,
            timestamp: Utc::now(),
            page_url: page_url.to_string(),
            domain: domain.to_string(),
        }
    }
}

/// 截断到预览长度，超出时追加省略号
pub fn preview(content: &str) -> String {
    if content.chars().count() > constants::PREVIEW_MAX_CHARS {
        let truncated: String = content.chars().take(constants::PREVIEW_MAX_CHARS).collect();
        format!("{}...", truncated)
    } else {
        content.to_string()
    }
}

/// 历史记录账本
#[derive(Debug, Clone)]
pub struct HistoryLedger {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
}

impl HistoryLedger {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// 从已持久化的记录恢复，保持原有顺序
    pub fn from_entries(entries: Vec<HistoryEntry>, capacity: usize) -> Self {
        let mut ledger = Self::new(capacity);
        ledger.entries = entries.into_iter().take(ledger.capacity).collect();
        ledger
    }

    /// 插入到最前，超出容量时丢弃最旧的记录
    pub fn record(&mut self, entry: HistoryEntry) {
        self.entries.push_front(entry);
        while self.entries.len() > self.capacity {
            self.entries.pop_back();
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn latest(&self) -> Option<&HistoryEntry> {
        self.entries.front()
    }

    pub fn to_vec(&self) -> Vec<HistoryEntry> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for HistoryLedger {
    fn default() -> Self {
        Self::new(constants::HISTORY_CAPACITY)
    }
}
