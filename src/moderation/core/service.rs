//! 审核管道服务
//!
//! 管道的根：持有文档、上下文和各个组件，驱动
//! 观察器 → 扫描器 → 队列 → 批次调度器 → 分类器 → 修改器 →（历史、计数）
//! 的主流程，并处理外部控制消息。
//!
//! ## 使用示例
//!
//! ```no_run
//! use socio_shield::moderation::{ModerationConfig, ModerationPipeline};
//! use socio_shield::moderation::pipeline::Document;
//!
//! # async fn demo() -> socio_shield::moderation::ModerationResult<()> {
//! let document = Document::parse("<p>hello</p>", Some("https://example.com/"));
//! let pipeline = ModerationPipeline::from_config(ModerationConfig::default(), document)?;
//!
//! pipeline.scan();
//! pipeline.drain().await;
//! println!("{}", pipeline.document().to_html());
//! # Ok(())
//! # }
//! ```

use std::cell::RefCell;
use std::rc::Rc;

use markup5ever_rcdom::Handle;
use tokio::sync::Notify;
use tokio::time::{interval, sleep, timeout, Instant, MissedTickBehavior};

use super::backend::BackendClient;
use super::classifier::{ClassifyRequest, Classifier, LayeredClassifier};
use super::mutator::{DomMutator, Mutation};
use super::recovery::{Recovery, RecoveryOutcome, RestoreReport};
use super::verdict::Verdict;
use crate::moderation::config::{constants, ModerationConfig};
use crate::moderation::error::{helpers::log_error, ModerationResult};
use crate::moderation::messages::{ControlMessage, ControlResponse, StatusReport};
use crate::moderation::pipeline::batch::{
    BatchReport, BatchScheduler, BatchSchedulerConfig, DrainReport, ItemOutcome, SkipReason,
};
use crate::moderation::pipeline::context::PipelineContext;
use crate::moderation::pipeline::document::Document;
use crate::moderation::pipeline::observer::DebouncedObserver;
use crate::moderation::pipeline::scanner::{ItemKind, ScanReport, Scanner, WorkItem};
use crate::moderation::storage::history::{HistoryEntry, HistoryLedger};
use crate::moderation::storage::stats::{StatsCounter, StatsSnapshot};
use crate::moderation::storage::store::{MemoryStore, RedbStore, SettingsStore};
use crate::parsers::html::dom;

/// 审核管道
pub struct ModerationPipeline {
    config: ModerationConfig,
    document: Rc<Document>,
    ctx: PipelineContext,
    scanner: Scanner,
    scheduler: BatchScheduler,
    classifier: Box<dyn Classifier>,
    backend: Option<BackendClient>,
    mutator: DomMutator,
    recovery: Recovery,
    history: RefCell<HistoryLedger>,
    stats: StatsCounter,
    store: Box<dyn SettingsStore>,
    shutdown: Notify,
}

impl ModerationPipeline {
    /// 使用给定的分类器和存储创建管道
    ///
    /// 启用状态、计数和历史从存储中读取；存储不可用时使用配置默认值。
    pub fn new(
        config: ModerationConfig,
        document: Rc<Document>,
        classifier: Box<dyn Classifier>,
        store: Box<dyn SettingsStore>,
    ) -> Self {
        let enabled = store.enabled().unwrap_or_else(|e| {
            log_error(&e);
            None
        });
        let enabled = enabled.unwrap_or(config.enabled);

        let read_counter = |key: &str| {
            store.counter(key).unwrap_or_else(|e| {
                log_error(&e);
                0
            })
        };
        let text_filtered = read_counter(constants::KEY_TEXT_FILTERED);
        let images_filtered = read_counter(constants::KEY_IMAGES_FILTERED);
        let history = store.history().unwrap_or_else(|e| {
            log_error(&e);
            Vec::new()
        });

        tracing::info!(
            "审核管道初始化: 启用={}，分类器={}，历史 {} 条",
            enabled,
            classifier.name(),
            history.len()
        );

        Self {
            scheduler: BatchScheduler::new(BatchSchedulerConfig::from(&config)),
            mutator: DomMutator::new(document.clone(), config.indicator_ttl()),
            recovery: Recovery::new(document.clone(), config.notification_ttl()),
            history: RefCell::new(HistoryLedger::from_entries(history, config.history_capacity)),
            stats: StatsCounter::with_totals(text_filtered, images_filtered),
            ctx: PipelineContext::new(enabled),
            scanner: Scanner::new(),
            backend: None,
            shutdown: Notify::new(),
            classifier,
            store,
            document,
            config,
        }
    }

    /// 按配置创建：分层分类器 + redb 存储（未配置路径时使用内存存储）
    pub fn from_config(config: ModerationConfig, document: Rc<Document>) -> ModerationResult<Self> {
        config.validate()?;

        let classifier = LayeredClassifier::from_config(&config)?;
        let backend = BackendClient::new(&config.backend_url, config.request_timeout())?;
        let store: Box<dyn SettingsStore> = match &config.store_path {
            Some(path) => Box::new(RedbStore::open(shellexpand::tilde(path).into_owned())?),
            None => Box::new(MemoryStore::new()),
        };

        let mut pipeline = Self::new(config, document, Box::new(classifier), store);
        pipeline.backend = Some(backend);
        Ok(pipeline)
    }

    pub fn config(&self) -> &ModerationConfig {
        &self.config
    }

    pub fn document(&self) -> &Rc<Document> {
        &self.document
    }

    pub fn context(&self) -> &PipelineContext {
        &self.ctx
    }

    pub fn is_enabled(&self) -> bool {
        self.ctx.is_enabled()
    }

    pub fn history(&self) -> Vec<HistoryEntry> {
        self.history.borrow().to_vec()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// 扫描文档，新候选入队
    pub fn scan(&self) -> ScanReport {
        let report = self.scanner.scan(&self.document, &self.ctx);
        self.stats.record_scanned(report.enqueued());
        report
    }

    /// 运行单个批次
    pub async fn run_batch(&self) -> Option<BatchReport> {
        self.scheduler
            .run_batch(&self.ctx, &|item: WorkItem| self.process_item(item))
            .await
    }

    /// 排空队列
    pub async fn drain(&self) -> DrainReport {
        self.scheduler
            .drain(&self.ctx, &|item: WorkItem| self.process_item(item))
            .await
    }

    /// 处理单个工作项：存活检查 → 等待图片 → 分类 → 修改 → 记录
    pub async fn process_item(&self, item: WorkItem) -> ItemOutcome {
        if !self.ctx.is_enabled() {
            return ItemOutcome::Skipped(SkipReason::Disabled);
        }
        if !self.document.is_attached(&item.element) {
            tracing::debug!("元素已脱离文档，跳过");
            return ItemOutcome::Skipped(SkipReason::Detached);
        }

        let request = match item.kind {
            ItemKind::Text => {
                ClassifyRequest::text(dom::text_content(&item.element).trim(), self.document.url())
            }
            ItemKind::Image => {
                if !self.wait_for_image(&item.element).await {
                    tracing::debug!("图片加载超时，跳过");
                    return ItemOutcome::Skipped(SkipReason::ImageNotReady);
                }
                ClassifyRequest::image(
                    dom::get_node_attr(&item.element, "src").unwrap_or_default(),
                    self.document.url(),
                    image_dimensions(&item.element),
                )
            }
        };

        let verdict = match self.classifier.classify(&request).await {
            Ok(verdict) => verdict,
            Err(e) => {
                log_error(&e);
                return ItemOutcome::Failed(e);
            }
        };

        // 分类期间页面可能已变化
        if !self.ctx.is_enabled() {
            return ItemOutcome::Skipped(SkipReason::Disabled);
        }
        if !self.document.is_attached(&item.element) {
            return ItemOutcome::Skipped(SkipReason::Detached);
        }

        match self.mutator.apply(&self.ctx, &item, &verdict) {
            Ok(mutation) if mutation.is_new_redaction() => {
                self.record_redaction(item.kind, &verdict, &mutation);
                ItemOutcome::Redacted
            }
            Ok(_) => ItemOutcome::Unchanged,
            Err(e) => {
                log_error(&e);
                ItemOutcome::Failed(e)
            }
        }
    }

    /// 懒加载且无尺寸的图片视为未就绪；超时返回 false
    async fn wait_for_image(&self, image: &Handle) -> bool {
        let poll = std::time::Duration::from_millis(constants::IMAGE_READY_POLL_MS);
        let ready = async {
            while !is_image_ready(image) {
                sleep(poll).await;
            }
        };
        timeout(self.config.image_load_timeout(), ready).await.is_ok()
    }

    fn record_redaction(&self, kind: ItemKind, verdict: &Verdict, mutation: &Mutation) {
        let original = mutation.original_content().unwrap_or_default();
        let entry = HistoryEntry::new(
            kind.into(),
            original,
            verdict.reasons.clone(),
            &self.document.url(),
            &self.document.domain(),
        );

        let snapshot = {
            let mut history = self.history.borrow_mut();
            history.record(entry);
            history.to_vec()
        };
        let count = self.stats.record_filtered(kind);

        let counter_key = match kind {
            ItemKind::Text => constants::KEY_TEXT_FILTERED,
            ItemKind::Image => constants::KEY_IMAGES_FILTERED,
        };
        if let Err(e) = self
            .store
            .set_history(&snapshot)
            .and_then(|_| self.store.set_counter(counter_key, count))
        {
            log_error(&e);
        }
    }

    /// 切换保护；关闭时撤销页面上的全部修改
    pub fn set_enabled(&self, enabled: bool) -> Option<RestoreReport> {
        let was_enabled = self.ctx.is_enabled();
        self.ctx.set_enabled(enabled);
        if let Err(e) = self.store.set_enabled(enabled) {
            log_error(&e);
        }
        tracing::info!("保护已{}", if enabled { "开启" } else { "关闭" });

        if enabled {
            if !was_enabled {
                self.scan();
            }
            None
        } else {
            Some(self.recovery.restore_page(&self.ctx))
        }
    }

    /// 把恢复出的原文写回页面
    pub fn apply_recovered_content(&self, text: &str) -> RecoveryOutcome {
        self.recovery.apply_recovered_content(&self.ctx, text)
    }

    /// 所有加密元素当前显示的文本，按行拼接
    pub fn encrypted_content(&self) -> String {
        self.ctx
            .encrypted
            .borrow()
            .elements()
            .map(dom::text_content)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn status(&self) -> StatusReport {
        StatusReport {
            is_enabled: self.ctx.is_enabled(),
            elements_scanned: self.stats.elements_scanned(),
            queue_length: self.ctx.queue_len(),
        }
    }

    /// 处理控制消息
    pub fn handle_message(&self, message: ControlMessage) -> ControlResponse {
        match message {
            ControlMessage::ToggleProtection { enabled } => {
                self.set_enabled(enabled);
                ControlResponse::Toggled { success: true }
            }
            ControlMessage::GetStatus => ControlResponse::Status(self.status()),
            ControlMessage::ApplyRecoveredContent { text } => {
                let outcome = self.apply_recovered_content(&text);
                ControlResponse::Recovered {
                    success: true,
                    restored: outcome == RecoveryOutcome::Restored,
                }
            }
            ControlMessage::GetEncryptedContent => ControlResponse::EncryptedContent {
                content: self.encrypted_content(),
            },
        }
    }

    /// 探测后端，失败只记录日志
    pub async fn check_backend(&self) -> bool {
        let Some(backend) = &self.backend else {
            return false;
        };
        match backend.ping().await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!("后端不可用，将依赖本地启发式: {}", e);
                false
            }
        }
    }

    /// 删除过期的指示器和通知
    pub fn sweep_transients(&self) -> usize {
        self.recovery.sweep_expired(&self.ctx, Instant::now())
    }

    /// 主循环：观察变更、扫描、排空队列、清理临时元素，直到 `stop()`
    pub async fn run(&self) {
        let mut observer = DebouncedObserver::start(
            &self.document,
            self.config.debounce(),
            self.config.observe_character_data,
        );
        let mut sweep = interval(constants::SWEEP_INTERVAL);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        self.scan();

        loop {
            tokio::select! {
                _ = self.shutdown.notified() => {
                    tracing::info!("审核管道停止");
                    break;
                }
                burst = observer.next_burst() => match burst {
                    Some(count) => {
                        if self.ctx.is_enabled() {
                            tracing::debug!("变更突发结束 ({} 次)，重新扫描", count);
                            self.scan();
                        }
                    }
                    None => break,
                },
                _ = self.ctx.scheduler_woken() => {
                    self.drain().await;
                }
                _ = sweep.tick() => {
                    self.sweep_transients();
                }
            }
        }
    }

    /// 请求主循环退出
    pub fn stop(&self) {
        self.shutdown.notify_one();
    }
}

fn is_image_ready(image: &Handle) -> bool {
    let lazy = dom::get_node_attr(image, "loading")
        .is_some_and(|value| value.eq_ignore_ascii_case("lazy"));
    let sized = dom::get_node_attr(image, "width").is_some()
        || dom::get_node_attr(image, "height").is_some();
    !lazy || sized
}

fn image_dimensions(image: &Handle) -> Option<(u32, u32)> {
    let width = dom::get_node_attr(image, "width")?.trim().parse().ok()?;
    let height = dom::get_node_attr(image, "height")?.trim().parse().ok()?;
    Some((width, height))
}
