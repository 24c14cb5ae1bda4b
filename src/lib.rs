//! # Socio Shield
//!
//! 已渲染网页的内容审核管道：扫描文本和图片，交给本地启发式或远程分析后端分类，
//! 按判定就地替换、加密、模糊或屏蔽，并支持完整撤销。
//!
//! ## 模块组织
//!
//! - `env` - 环境变量
//! - `moderation` - 审核管道
//! - `parsers` - HTML 解析、DOM 工具与序列化

pub mod env;
pub mod moderation;
pub mod parsers;

// Re-export commonly used items for convenience
pub use moderation::{ModerationConfig, ModerationError, ModerationPipeline, ModerationResult};
pub use parsers::*;
