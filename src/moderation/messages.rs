//! 控制消息
//!
//! 外部界面发给管道的消息及其响应，JSON 形状与扩展消息保持一致。

use serde::{Deserialize, Serialize};

use crate::moderation::error::ModerationResult;

/// 入站控制消息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ControlMessage {
    ToggleProtection { enabled: bool },
    GetStatus,
    ApplyRecoveredContent { text: String },
    GetEncryptedContent,
}

impl ControlMessage {
    pub fn parse(json: &str) -> ModerationResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// 状态报告
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub is_enabled: bool,
    pub elements_scanned: usize,
    pub queue_length: usize,
}

/// 控制消息的响应
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ControlResponse {
    Recovered { success: bool, restored: bool },
    Toggled { success: bool },
    Status(StatusReport),
    EncryptedContent { content: String },
}

impl ControlResponse {
    pub fn to_json(&self) -> ModerationResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}
