//! 存储模块
//!
//! 过滤历史、计数器和设置存储

pub mod history;
pub mod stats;
pub mod store;

pub use history::{EntryType, HistoryEntry, HistoryLedger};
pub use stats::{StatsCounter, StatsSnapshot};
pub use store::{MemoryStore, RedbStore, SettingsStore};
