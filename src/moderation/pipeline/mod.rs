//! 审核管道模块
//!
//! 提供页面模型、变更观察、候选扫描、工作队列和批次调度

pub mod batch;
pub mod context;
pub mod document;
pub mod filters;
pub mod observer;
pub mod scanner;

// 重新导出主要类型
pub use batch::{
    BatchReport, BatchScheduler, BatchSchedulerConfig, DrainReport, ItemOutcome, SchedulerState,
    SkipReason,
};
pub use context::{BlockedImage, EncryptedMap, PipelineContext, Transient};
pub use document::{Document, ListenerHandle, MutationRecord, Subscription};
pub use filters::{ImageDecision, ImageHeuristic, ProfanityFilter};
pub use observer::DebouncedObserver;
pub use scanner::{ItemKind, ProcessedSet, ScanReport, Scanner, WorkItem};
