//! 内容审核模块
//!
//! 扫描已渲染的页面，把候选文本和图片交给分类器，并按判定修改页面：
//! - **config**: 配置管理
//! - **core**: 判定、分类、修改、恢复与管道服务
//! - **error**: 错误处理
//! - **messages**: 外部控制消息
//! - **pipeline**: 页面模型、观察器、扫描器与批次调度
//! - **storage**: 历史记录、计数与设置存储
//!
//! # 基本用法
//!
//! ```rust,no_run
//! use socio_shield::moderation::{load_moderation_config, ModerationPipeline};
//! use socio_shield::moderation::pipeline::Document;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_moderation_config(Some("http://localhost:5000"));
//! let document = Document::parse("<p>some text</p>", Some("https://example.com/"));
//! let pipeline = ModerationPipeline::from_config(config, document)?;
//!
//! pipeline.scan();
//! pipeline.drain().await;
//! # Ok(())
//! # }
//! ```

/// 配置管理模块
pub mod config;

/// 核心审核模块
pub mod core;

/// 错误处理模块
pub mod error;

/// 控制消息模块
pub mod messages;

/// 管道模块
pub mod pipeline;

/// 存储模块
pub mod storage;

// ============================================================================
// 公共 API 导出
// ============================================================================

pub use config::{load_moderation_config, ConfigManager, ModerationConfig};
pub use self::core::{Action, Classifier, ModerationPipeline, Verdict};
pub use error::{ModerationError, ModerationResult};
pub use messages::{ControlMessage, ControlResponse, StatusReport};
