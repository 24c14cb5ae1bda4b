//! 审核模块统一错误处理
//!
//! 提供结构化错误类型和错误处理机制。审核管道里没有致命错误：
//! 每个错误都被限定在单个工作项内，最坏的结果是“页面未被审核”。

use std::fmt;

use thiserror::Error;

/// 审核错误类型
#[derive(Error, Debug, Clone)]
pub enum ModerationError {
    /// 配置错误
    #[error("配置错误: {0}")]
    ConfigError(String),

    /// 网络错误（连接失败、请求发送失败）
    #[error("网络错误: {0}")]
    NetworkError(String),

    /// 超时错误
    #[error("操作超时: {0}")]
    TimeoutError(String),

    /// 后端返回了错误响应（`{error: ...}` 或非 2xx 状态码）
    #[error("后端错误: {0}")]
    BackendError(String),

    /// 响应体无法解析
    #[error("解析错误: {0}")]
    ParseError(String),

    /// 序列化错误
    #[error("序列化错误: {0}")]
    SerializationError(String),

    /// 持久化存储错误
    #[error("存储错误: {0}")]
    StorageError(String),

    /// DOM 状态不一致
    #[error("DOM错误: {0}")]
    DomError(String),

    /// 输入验证错误
    #[error("输入无效: {0}")]
    InvalidInput(String),

    /// 内部错误
    #[error("内部错误: {0}")]
    InternalError(String),
}

impl ModerationError {
    /// 获取错误的严重程度
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            ModerationError::ConfigError(_) => ErrorSeverity::Critical,
            ModerationError::NetworkError(_) => ErrorSeverity::Warning,
            ModerationError::TimeoutError(_) => ErrorSeverity::Warning,
            ModerationError::BackendError(_) => ErrorSeverity::Warning,
            ModerationError::ParseError(_) => ErrorSeverity::Error,
            ModerationError::SerializationError(_) => ErrorSeverity::Error,
            ModerationError::StorageError(_) => ErrorSeverity::Warning,
            ModerationError::DomError(_) => ErrorSeverity::Info,
            ModerationError::InvalidInput(_) => ErrorSeverity::Info,
            ModerationError::InternalError(_) => ErrorSeverity::Critical,
        }
    }

    /// 获取错误类别
    pub fn category(&self) -> ErrorCategory {
        match self {
            ModerationError::ConfigError(_) => ErrorCategory::Configuration,
            ModerationError::NetworkError(_) => ErrorCategory::Network,
            ModerationError::TimeoutError(_) => ErrorCategory::Timeout,
            ModerationError::BackendError(_) => ErrorCategory::Service,
            ModerationError::ParseError(_) => ErrorCategory::Parsing,
            ModerationError::SerializationError(_) => ErrorCategory::Serialization,
            ModerationError::StorageError(_) => ErrorCategory::Storage,
            ModerationError::DomError(_) => ErrorCategory::Dom,
            ModerationError::InvalidInput(_) => ErrorCategory::Input,
            ModerationError::InternalError(_) => ErrorCategory::Internal,
        }
    }

    /// 创建带上下文的错误
    pub fn with_context<T: fmt::Display>(mut self, context: T) -> Self {
        let new_msg = match &self {
            ModerationError::ConfigError(msg)
            | ModerationError::NetworkError(msg)
            | ModerationError::TimeoutError(msg)
            | ModerationError::BackendError(msg)
            | ModerationError::ParseError(msg)
            | ModerationError::SerializationError(msg)
            | ModerationError::StorageError(msg)
            | ModerationError::DomError(msg)
            | ModerationError::InvalidInput(msg)
            | ModerationError::InternalError(msg) => format!("{} (上下文: {})", msg, context),
        };

        match &mut self {
            ModerationError::ConfigError(ref mut msg)
            | ModerationError::NetworkError(ref mut msg)
            | ModerationError::TimeoutError(ref mut msg)
            | ModerationError::BackendError(ref mut msg)
            | ModerationError::ParseError(ref mut msg)
            | ModerationError::SerializationError(ref mut msg)
            | ModerationError::StorageError(ref mut msg)
            | ModerationError::DomError(ref mut msg)
            | ModerationError::InvalidInput(ref mut msg)
            | ModerationError::InternalError(ref mut msg) => *msg = new_msg,
        }

        self
    }
}

/// 错误严重程度
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Configuration,
    Network,
    Timeout,
    Service,
    Parsing,
    Serialization,
    Storage,
    Dom,
    Input,
    Internal,
}

impl From<reqwest::Error> for ModerationError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            ModerationError::TimeoutError(format!("请求超时: {}", error))
        } else if error.is_decode() {
            ModerationError::ParseError(format!("响应解码失败: {}", error))
        } else if let Some(status) = error.status() {
            ModerationError::BackendError(format!("HTTP {}: {}", status, error))
        } else {
            ModerationError::NetworkError(error.to_string())
        }
    }
}

impl From<std::io::Error> for ModerationError {
    fn from(error: std::io::Error) -> Self {
        ModerationError::InternalError(format!("IO错误: {}", error))
    }
}

impl From<serde_json::Error> for ModerationError {
    fn from(error: serde_json::Error) -> Self {
        ModerationError::SerializationError(format!("JSON序列化错误: {}", error))
    }
}

impl From<toml::de::Error> for ModerationError {
    fn from(error: toml::de::Error) -> Self {
        ModerationError::ConfigError(format!("TOML解析错误: {}", error))
    }
}

impl From<redb::Error> for ModerationError {
    fn from(error: redb::Error) -> Self {
        ModerationError::StorageError(error.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for ModerationError {
    fn from(error: tokio::time::error::Elapsed) -> Self {
        ModerationError::TimeoutError(format!("异步操作超时: {}", error))
    }
}

/// 错误结果类型别名
pub type ModerationResult<T> = Result<T, ModerationError>;

/// 错误处理助手函数
pub mod helpers {
    use super::*;

    /// 按严重程度记录错误，不改变错误本身
    pub fn log_error(error: &ModerationError) {
        match error.severity() {
            ErrorSeverity::Info => tracing::info!("审核信息: {}", error),
            ErrorSeverity::Warning => tracing::warn!("审核警告: {}", error),
            ErrorSeverity::Error => tracing::error!("审核错误: {}", error),
            ErrorSeverity::Critical => tracing::error!("审核严重错误: {}", error),
        }
    }
}
