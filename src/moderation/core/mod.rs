//! 审核核心模块
//!
//! 判定、分类、DOM 修改与恢复，以及把它们串起来的管道服务。
//!
//! - **判定** (`verdict.rs`): 后端响应到判定的映射
//! - **后端** (`backend.rs`): 分析后端的 HTTP 客户端
//! - **分类器** (`classifier.rs`): 本地启发式与远程后端的分层组合
//! - **修改器** (`mutator.rs`): 把判定应用到页面
//! - **恢复** (`recovery.rs`): 写回原文、撤销全部修改
//! - **服务** (`service.rs`): 管道根对象与主循环

pub mod backend;
pub mod classifier;
pub mod mutator;
pub mod recovery;
pub mod service;
pub mod verdict;

// 重新导出主要类型
pub use backend::BackendClient;
pub use classifier::{
    Classifier, ClassifyRequest, HeuristicClassifier, LayeredClassifier, OfflineClassifier,
    RemoteClassifier,
};
pub use mutator::{placeholder_for, DomMutator, Mutation};
pub use recovery::{Recovery, RecoveryOutcome, RestoreReport};
pub use service::ModerationPipeline;
pub use verdict::{Action, Verdict};
