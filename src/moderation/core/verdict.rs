//! 判定结果与后端响应模式
//!
//! 后端返回的 JSON 在边界处按带标签的变体解析；无法识别的动作或缺失必需
//! 字段一律视为保留（fail open）。

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::moderation::error::{ModerationError, ModerationResult};

/// 判定动作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Keep,
    Redact,
    Encrypt,
    Blur,
    Block,
}

impl Action {
    /// 是否会修改页面
    pub fn is_redaction(&self) -> bool {
        !matches!(self, Action::Keep)
    }
}

/// 单个元素的分类结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub action: Action,
    pub reasons: Vec<String>,
    pub replacement_text: Option<String>,
}

impl Verdict {
    pub fn keep() -> Self {
        Self {
            action: Action::Keep,
            reasons: Vec::new(),
            replacement_text: None,
        }
    }

    pub fn redact(reasons: Vec<String>) -> Self {
        Self {
            action: Action::Redact,
            reasons,
            replacement_text: None,
        }
    }

    pub fn encrypt(replacement_text: String, reasons: Vec<String>) -> Self {
        Self {
            action: Action::Encrypt,
            reasons,
            replacement_text: Some(replacement_text),
        }
    }

    pub fn blur(reasons: Vec<String>) -> Self {
        Self {
            action: Action::Blur,
            reasons,
            replacement_text: None,
        }
    }

    pub fn block(reasons: Vec<String>) -> Self {
        Self {
            action: Action::Block,
            reasons,
            replacement_text: None,
        }
    }

    pub fn is_keep(&self) -> bool {
        self.action == Action::Keep
    }
}

impl Default for Verdict {
    fn default() -> Self {
        Self::keep()
    }
}

/// `/analyze_text` 的响应
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
enum TextAnalysis {
    Keep,
    Encrypt {
        processed_text: String,
        #[serde(default)]
        reasons: Vec<String>,
    },
    #[serde(alias = "remove")]
    Redact {
        #[serde(default)]
        reasons: Vec<String>,
    },
    #[serde(other)]
    Unknown,
}

/// `/analyze_image` 的响应
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
enum ImageAnalysis {
    #[serde(alias = "keep")]
    Allow,
    Blur {
        #[serde(default)]
        reasons: Vec<String>,
    },
    Block {
        #[serde(default)]
        reasons: Vec<String>,
    },
    #[serde(other)]
    Unknown,
}

fn backend_error(body: &Value) -> Option<ModerationError> {
    body.get("error").map(|error| {
        let message = error
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        ModerationError::BackendError(message)
    })
}

/// 把文本分析响应转换为判定
pub fn from_text_response(body: Value) -> ModerationResult<Verdict> {
    if let Some(error) = backend_error(&body) {
        return Err(error);
    }

    match serde_json::from_value::<TextAnalysis>(body) {
        Ok(TextAnalysis::Keep) => Ok(Verdict::keep()),
        Ok(TextAnalysis::Encrypt {
            processed_text,
            reasons,
        }) => Ok(Verdict::encrypt(processed_text, reasons)),
        Ok(TextAnalysis::Redact { reasons }) => Ok(Verdict::redact(reasons)),
        Ok(TextAnalysis::Unknown) => {
            tracing::warn!("未知的文本动作，按保留处理");
            Ok(Verdict::keep())
        }
        Err(e) => {
            tracing::warn!("文本分析响应格式异常，按保留处理: {}", e);
            Ok(Verdict::keep())
        }
    }
}

/// 把图片分析响应转换为判定
pub fn from_image_response(body: Value) -> ModerationResult<Verdict> {
    if let Some(error) = backend_error(&body) {
        return Err(error);
    }

    match serde_json::from_value::<ImageAnalysis>(body) {
        Ok(ImageAnalysis::Allow) => Ok(Verdict::keep()),
        Ok(ImageAnalysis::Blur { reasons }) => Ok(Verdict::blur(reasons)),
        Ok(ImageAnalysis::Block { reasons }) => Ok(Verdict::block(reasons)),
        Ok(ImageAnalysis::Unknown) => {
            tracing::warn!("未知的图片动作，按保留处理");
            Ok(Verdict::keep())
        }
        Err(e) => {
            tracing::warn!("图片分析响应格式异常，按保留处理: {}", e);
            Ok(Verdict::keep())
        }
    }
}
