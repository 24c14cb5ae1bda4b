//! 元素分类器
//!
//! 分类统一在 `Classifier` 接口之后：本地启发式、远程后端以及两者组合的分层
//! 分类器（管道默认）。替换为真实模型时只需提供新的实现。

use async_trait::async_trait;

use super::backend::BackendClient;
use super::verdict::Verdict;
use crate::moderation::config::{constants, ModerationConfig};
use crate::moderation::error::{ModerationError, ModerationResult};
use crate::moderation::pipeline::filters::{ImageDecision, ImageHeuristic, ProfanityFilter};
use crate::moderation::pipeline::scanner::ItemKind;

/// 分类请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifyRequest {
    pub kind: ItemKind,
    /// 文本内容或图片地址
    pub content: String,
    pub page_url: String,
    /// 已知的图片宽高
    pub dimensions: Option<(u32, u32)>,
}

impl ClassifyRequest {
    pub fn text(content: impl Into<String>, page_url: impl Into<String>) -> Self {
        Self {
            kind: ItemKind::Text,
            content: content.into(),
            page_url: page_url.into(),
            dimensions: None,
        }
    }

    pub fn image(
        src: impl Into<String>,
        page_url: impl Into<String>,
        dimensions: Option<(u32, u32)>,
    ) -> Self {
        Self {
            kind: ItemKind::Image,
            content: src.into(),
            page_url: page_url.into(),
            dimensions,
        }
    }
}

/// 分类器接口
#[async_trait(?Send)]
pub trait Classifier {
    async fn classify(&self, request: &ClassifyRequest) -> ModerationResult<Verdict>;

    fn name(&self) -> &'static str;
}

/// 纯本地启发式分类器
#[derive(Debug, Clone)]
pub struct HeuristicClassifier {
    profanity: ProfanityFilter,
    images: ImageHeuristic,
}

impl HeuristicClassifier {
    pub fn new(profanity: ProfanityFilter, images: ImageHeuristic) -> Self {
        Self { profanity, images }
    }

    pub fn from_config(config: &ModerationConfig) -> ModerationResult<Self> {
        Ok(Self::new(
            ProfanityFilter::with_defaults(config.local_text_max_chars)?,
            ImageHeuristic::from_config(config),
        ))
    }

    /// 文本本地判断：命中返回删除判定
    pub fn check_text(&self, text: &str) -> Option<Verdict> {
        self.profanity.find(text).map(|word| {
            tracing::debug!("本地脏话命中: {}", word);
            Verdict::redact(vec![constants::LOCAL_DETECTION_REASON.to_string()])
        })
    }

    pub fn check_image(&self, src: &str, dimensions: Option<(u32, u32)>) -> Verdict {
        match self.images.evaluate(src, dimensions) {
            ImageDecision::Keep => Verdict::keep(),
            ImageDecision::Blur(reason) => Verdict::blur(vec![
                constants::LOCAL_DETECTION_REASON.to_string(),
                reason,
            ]),
        }
    }
}

#[async_trait(?Send)]
impl Classifier for HeuristicClassifier {
    async fn classify(&self, request: &ClassifyRequest) -> ModerationResult<Verdict> {
        match request.kind {
            ItemKind::Text => Ok(self
                .check_text(request.content.trim())
                .unwrap_or_else(Verdict::keep)),
            ItemKind::Image => Ok(self.check_image(&request.content, request.dimensions)),
        }
    }

    fn name(&self) -> &'static str {
        "heuristic"
    }
}

/// 纯远程分类器
#[derive(Debug, Clone)]
pub struct RemoteClassifier {
    client: BackendClient,
}

impl RemoteClassifier {
    pub fn new(client: BackendClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &BackendClient {
        &self.client
    }
}

#[async_trait(?Send)]
impl Classifier for RemoteClassifier {
    async fn classify(&self, request: &ClassifyRequest) -> ModerationResult<Verdict> {
        match request.kind {
            ItemKind::Text => {
                self.client
                    .analyze_text(&request.content, &request.page_url)
                    .await
            }
            ItemKind::Image => {
                self.client
                    .analyze_image(&request.content, &request.page_url)
                    .await
            }
        }
    }

    fn name(&self) -> &'static str {
        "remote"
    }
}

/// 分层分类器：本地启发式优先，其次远程后端，图片可在后端失败时回退本地
pub struct LayeredClassifier {
    local: HeuristicClassifier,
    remote: Box<dyn Classifier>,
    image_fallback: bool,
}

impl LayeredClassifier {
    pub fn new(local: HeuristicClassifier, remote: Box<dyn Classifier>, image_fallback: bool) -> Self {
        Self {
            local,
            remote,
            image_fallback,
        }
    }

    /// 按配置创建，远程部分使用后端客户端
    pub fn from_config(config: &ModerationConfig) -> ModerationResult<Self> {
        let client = BackendClient::new(&config.backend_url, config.request_timeout())?;
        Ok(Self::new(
            HeuristicClassifier::from_config(config)?,
            Box::new(RemoteClassifier::new(client)),
            config.image_fallback,
        ))
    }

    async fn classify_text(&self, request: &ClassifyRequest) -> ModerationResult<Verdict> {
        let text = request.content.trim();
        if text.is_empty() {
            return Ok(Verdict::keep());
        }

        if let Some(verdict) = self.local.check_text(text) {
            return Ok(verdict);
        }

        let remote_request = ClassifyRequest::text(text, request.page_url.clone());
        self.remote.classify(&remote_request).await
    }

    async fn classify_image(&self, request: &ClassifyRequest) -> ModerationResult<Verdict> {
        if request.content.trim().is_empty() {
            return Ok(Verdict::keep());
        }

        match self.remote.classify(request).await {
            Ok(verdict) => Ok(verdict),
            Err(e) if self.image_fallback => {
                tracing::warn!("图片后端分析失败，使用本地启发式: {}", e);
                Ok(self.local.check_image(&request.content, request.dimensions))
            }
            Err(e) => Err(e.with_context(format!("image {}", request.content))),
        }
    }
}

#[async_trait(?Send)]
impl Classifier for LayeredClassifier {
    async fn classify(&self, request: &ClassifyRequest) -> ModerationResult<Verdict> {
        match request.kind {
            ItemKind::Text => self.classify_text(request).await,
            ItemKind::Image => self.classify_image(request).await,
        }
    }

    fn name(&self) -> &'static str {
        "layered"
    }
}

/// 始终返回错误的分类器，用于后端被显式关闭的场景
#[derive(Debug, Clone, Default)]
pub struct OfflineClassifier;

#[async_trait(?Send)]
impl Classifier for OfflineClassifier {
    async fn classify(&self, _request: &ClassifyRequest) -> ModerationResult<Verdict> {
        Err(ModerationError::NetworkError("后端已禁用".to_string()))
    }

    fn name(&self) -> &'static str {
        "offline"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    struct CountingRemote {
        calls: Rc<Cell<usize>>,
        result: fn() -> ModerationResult<Verdict>,
    }

    #[async_trait(?Send)]
    impl Classifier for CountingRemote {
        async fn classify(&self, _request: &ClassifyRequest) -> ModerationResult<Verdict> {
            self.calls.set(self.calls.get() + 1);
            (self.result)()
        }

        fn name(&self) -> &'static str {
            "counting"
        }
    }

    fn layered(result: fn() -> ModerationResult<Verdict>, fallback: bool) -> (LayeredClassifier, Rc<Cell<usize>>) {
        let calls = Rc::new(Cell::new(0));
        let local = HeuristicClassifier::new(
            ProfanityFilter::with_defaults(200).unwrap(),
            ImageHeuristic::new(100, 0.0),
        );
        let remote = CountingRemote {
            calls: calls.clone(),
            result,
        };
        (LayeredClassifier::new(local, Box::new(remote), fallback), calls)
    }

    #[tokio::test]
    async fn test_local_profanity_skips_remote() {
        let (classifier, calls) = layered(|| Ok(Verdict::keep()), true);
        let verdict = classifier
            .classify(&ClassifyRequest::text("well that is fucking great", ""))
            .await
            .unwrap();

        assert_eq!(verdict.action, super::super::verdict::Action::Redact);
        assert_eq!(verdict.reasons, vec!["local detection"]);
        assert_eq!(calls.get(), 0);
    }

    #[tokio::test]
    async fn test_blank_text_skips_remote() {
        let (classifier, calls) = layered(|| Ok(Verdict::keep()), true);
        let verdict = classifier
            .classify(&ClassifyRequest::text("   \n ", ""))
            .await
            .unwrap();

        assert!(verdict.is_keep());
        assert_eq!(calls.get(), 0);
    }

    #[tokio::test]
    async fn test_text_errors_are_not_masked() {
        let (classifier, calls) =
            layered(|| Err(ModerationError::NetworkError("refused".into())), true);
        let result = classifier
            .classify(&ClassifyRequest::text("a perfectly clean sentence", ""))
            .await;

        assert!(matches!(result, Err(ModerationError::NetworkError(_))));
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test]
    async fn test_image_falls_back_when_backend_fails() {
        let (classifier, _calls) =
            layered(|| Err(ModerationError::TimeoutError("slow".into())), true);
        let verdict = classifier
            .classify(&ClassifyRequest::image("https://cdn.example.com/xxx/1.jpg", "", None))
            .await
            .unwrap();
        assert_eq!(verdict.action, super::super::verdict::Action::Blur);

        let (strict, _calls) =
            layered(|| Err(ModerationError::TimeoutError("slow".into())), false);
        assert!(strict
            .classify(&ClassifyRequest::image("https://cdn.example.com/xxx/1.jpg", "", None))
            .await
            .is_err());
    }
}
