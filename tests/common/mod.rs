// 集成测试公共模块
//
// 提供测试辅助工具和共享功能

#![allow(dead_code)]

use std::cell::Cell;
use std::rc::Rc;

use async_trait::async_trait;
use markup5ever_rcdom::Handle;
use tokio::sync::Notify;

use socio_shield::moderation::core::{
    Classifier, ClassifyRequest, HeuristicClassifier, LayeredClassifier, OfflineClassifier,
};
use socio_shield::moderation::pipeline::{Document, ItemKind};
use socio_shield::moderation::storage::MemoryStore;
use socio_shield::moderation::{ModerationConfig, ModerationPipeline, ModerationResult, Verdict};

pub const PAGE_URL: &str = "https://forum.example.com/thread/42";

/// HTML 测试辅助
pub struct HtmlTestHelper;

impl HtmlTestHelper {
    /// 把正文片段包装成完整页面
    pub fn page(body: &str) -> String {
        format!(
            "<!DOCTYPE html><html><head><title>Test</title></head><body>{}</body></html>",
            body
        )
    }

    pub fn document(body: &str) -> Rc<Document> {
        Document::parse(&Self::page(body), Some(PAGE_URL))
    }

    pub fn first(document: &Document, tag: &str) -> Handle {
        document
            .elements_by_tag(tag)
            .into_iter()
            .next()
            .unwrap_or_else(|| panic!("no <{}> in document", tag))
    }
}

/// 测试配置：无批次延迟、图片抽样关闭
pub fn test_config() -> ModerationConfig {
    ModerationConfig {
        batch_delay_ms: 0,
        image_sample_rate: 0.0,
        ..ModerationConfig::default()
    }
}

/// 按类型返回固定判定的分类器，可用闸门挂起所有调用
pub struct MockClassifier {
    text: Verdict,
    image: Verdict,
    calls: Rc<Cell<usize>>,
    gate: Option<Rc<Notify>>,
}

impl MockClassifier {
    pub fn new(text: Verdict, image: Verdict) -> Self {
        Self {
            text,
            image,
            calls: Rc::new(Cell::new(0)),
            gate: None,
        }
    }

    pub fn keep_all() -> Self {
        Self::new(Verdict::keep(), Verdict::keep())
    }

    pub fn with_gate(mut self, gate: Rc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// 调用计数的共享句柄
    pub fn calls(&self) -> Rc<Cell<usize>> {
        self.calls.clone()
    }
}

#[async_trait(?Send)]
impl Classifier for MockClassifier {
    async fn classify(&self, request: &ClassifyRequest) -> ModerationResult<Verdict> {
        self.calls.set(self.calls.get() + 1);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        Ok(match request.kind {
            ItemKind::Text => self.text.clone(),
            ItemKind::Image => self.image.clone(),
        })
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// 管道测试环境
pub struct TestEnvironment {
    pub document: Rc<Document>,
    pub store: Rc<MemoryStore>,
    pub pipeline: ModerationPipeline,
}

impl TestEnvironment {
    pub fn new<C: Classifier + 'static>(body: &str, config: ModerationConfig, classifier: C) -> Self {
        Self::with_store(body, config, classifier, Rc::new(MemoryStore::new()))
    }

    pub fn with_store<C: Classifier + 'static>(
        body: &str,
        config: ModerationConfig,
        classifier: C,
        store: Rc<MemoryStore>,
    ) -> Self {
        let document = HtmlTestHelper::document(body);
        let pipeline = ModerationPipeline::new(
            config,
            document.clone(),
            Box::new(classifier),
            Box::new(store.clone()),
        );
        Self {
            document,
            store,
            pipeline,
        }
    }

    /// 分层分类器，远程部分由调用方提供
    pub fn layered<C: Classifier + 'static>(body: &str, config: ModerationConfig, remote: C) -> Self {
        let local = HeuristicClassifier::from_config(&config).expect("heuristic config");
        let image_fallback = config.image_fallback;
        let classifier = LayeredClassifier::new(local, Box::new(remote), image_fallback);
        Self::new(body, config, classifier)
    }

    /// 后端不可达时的分层分类器
    pub fn offline(body: &str) -> Self {
        Self::layered(body, test_config(), OfflineClassifier)
    }

    pub async fn scan_and_drain(&self) {
        self.pipeline.scan();
        self.pipeline.drain().await;
    }
}
