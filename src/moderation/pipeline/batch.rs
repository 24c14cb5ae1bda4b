//! 批次调度器模块
//!
//! 以固定大小的批次消费工作队列，批次之间插入固定延迟。
//!
//! ## 保证
//!
//! - 同一时刻至多一个批次在途
//! - 批次内的工作项并发派发，全部结束（成功或失败）后才回到空闲
//! - 单个工作项的失败不会中断同批次的其他工作项
//! - 跨批次按队列顺序派发，完成顺序不作保证

use std::future::Future;
use std::time::Duration;

use futures::future::join_all;
use tokio::time::sleep;

use super::context::PipelineContext;
use super::scanner::WorkItem;
use crate::moderation::config::{constants, ModerationConfig};
use crate::moderation::error::ModerationError;

/// 调度器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Processing,
}

/// 跳过原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// 元素在处理前已从文档移除
    Detached,
    /// 图片在超时前未就绪
    ImageNotReady,
    /// 保护已关闭
    Disabled,
}

/// 单个工作项的处理结果
#[derive(Debug, Clone)]
pub enum ItemOutcome {
    /// 产生了可见的修改
    Redacted,
    /// 判定为保留或已修改过
    Unchanged,
    Skipped(SkipReason),
    Failed(ModerationError),
}

/// 批次调度器配置
#[derive(Debug, Clone)]
pub struct BatchSchedulerConfig {
    pub batch_size: usize,
    pub batch_delay: Duration,
}

impl Default for BatchSchedulerConfig {
    fn default() -> Self {
        Self {
            batch_size: constants::BATCH_SIZE,
            batch_delay: Duration::from_millis(constants::BATCH_DELAY_MS),
        }
    }
}

impl From<&ModerationConfig> for BatchSchedulerConfig {
    fn from(config: &ModerationConfig) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
            batch_delay: config.batch_delay(),
        }
    }
}

/// 单个批次的统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub dispatched: usize,
    pub redacted: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub failed: usize,
    /// 批次结束时队列中剩余的工作项
    pub remaining: usize,
}

impl BatchReport {
    fn record(&mut self, outcome: &ItemOutcome) {
        match outcome {
            ItemOutcome::Redacted => self.redacted += 1,
            ItemOutcome::Unchanged => self.unchanged += 1,
            ItemOutcome::Skipped(_) => self.skipped += 1,
            ItemOutcome::Failed(_) => self.failed += 1,
        }
    }
}

/// 一次排空的汇总
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub batches: usize,
    pub dispatched: usize,
    pub redacted: usize,
    pub failed: usize,
}

/// 在途标志守卫，批次 future 被丢弃时同样会释放
struct InFlightGuard<'a> {
    ctx: &'a PipelineContext,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(ctx: &'a PipelineContext) -> Self {
        ctx.set_in_flight(true);
        Self { ctx }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.ctx.set_in_flight(false);
    }
}

/// 批次调度器
#[derive(Debug, Clone, Default)]
pub struct BatchScheduler {
    config: BatchSchedulerConfig,
}

impl BatchScheduler {
    pub fn new(config: BatchSchedulerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BatchSchedulerConfig {
        &self.config
    }

    pub fn state(&self, ctx: &PipelineContext) -> SchedulerState {
        if ctx.is_in_flight() {
            SchedulerState::Processing
        } else {
            SchedulerState::Idle
        }
    }

    /// 运行一个批次
    ///
    /// 仅当空闲、已启用且队列非空时执行，否则返回 `None` 且不改变任何状态。
    pub async fn run_batch<F, Fut>(&self, ctx: &PipelineContext, process: &F) -> Option<BatchReport>
    where
        F: Fn(WorkItem) -> Fut,
        Fut: Future<Output = ItemOutcome>,
    {
        if ctx.is_in_flight() || !ctx.is_enabled() || ctx.queue_len() == 0 {
            return None;
        }

        let _guard = InFlightGuard::acquire(ctx);
        let items = ctx.dequeue(self.config.batch_size);
        tracing::debug!("派发批次: {} 个工作项", items.len());

        let mut report = BatchReport {
            dispatched: items.len(),
            ..Default::default()
        };

        let outcomes = join_all(items.into_iter().map(process)).await;
        for outcome in &outcomes {
            if let ItemOutcome::Failed(e) = outcome {
                tracing::error!("工作项处理失败: {}", e);
            }
            report.record(outcome);
        }

        report.remaining = ctx.queue_len();
        tracing::info!(
            "批次完成: 派发 {}，修改 {}，失败 {}，剩余 {}",
            report.dispatched,
            report.redacted,
            report.failed,
            report.remaining
        );

        Some(report)
    }

    /// 连续运行批次直到队列为空，批次之间等待固定延迟
    pub async fn drain<F, Fut>(&self, ctx: &PipelineContext, process: &F) -> DrainReport
    where
        F: Fn(WorkItem) -> Fut,
        Fut: Future<Output = ItemOutcome>,
    {
        let mut summary = DrainReport::default();

        while let Some(report) = self.run_batch(ctx, process).await {
            summary.batches += 1;
            summary.dispatched += report.dispatched;
            summary.redacted += report.redacted;
            summary.failed += report.failed;

            if report.remaining == 0 || !ctx.is_enabled() {
                break;
            }
            sleep(self.config.batch_delay).await;
        }

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::html::dom;
    use std::cell::Cell;
    use std::rc::Rc;

    fn context_with_items(count: usize) -> PipelineContext {
        let ctx = PipelineContext::new(true);
        for _ in 0..count {
            ctx.enqueue(WorkItem::text(dom::create_element("p", &[])));
        }
        ctx
    }

    #[tokio::test]
    async fn test_run_batch_takes_at_most_batch_size() {
        let ctx = context_with_items(7);
        let scheduler = BatchScheduler::default();

        let report = scheduler
            .run_batch(&ctx, &|_item| async { ItemOutcome::Unchanged })
            .await
            .unwrap();

        assert_eq!(report.dispatched, 5);
        assert_eq!(report.remaining, 2);
        assert_eq!(scheduler.state(&ctx), SchedulerState::Idle);
    }

    #[tokio::test]
    async fn test_noop_when_disabled_or_empty() {
        let scheduler = BatchScheduler::default();

        let empty = PipelineContext::new(true);
        assert!(scheduler
            .run_batch(&empty, &|_item| async { ItemOutcome::Unchanged })
            .await
            .is_none());

        let disabled = context_with_items(3);
        disabled.set_enabled(false);
        assert!(scheduler
            .run_batch(&disabled, &|_item| async { ItemOutcome::Unchanged })
            .await
            .is_none());
        assert_eq!(disabled.queue_len(), 3);
    }

    #[tokio::test]
    async fn test_failures_do_not_abort_batch() {
        let ctx = context_with_items(4);
        let scheduler = BatchScheduler::default();
        let calls = Rc::new(Cell::new(0));

        let process = |_item: WorkItem| {
            let calls = calls.clone();
            async move {
                calls.set(calls.get() + 1);
                if calls.get() % 2 == 0 {
                    ItemOutcome::Failed(ModerationError::NetworkError("down".into()))
                } else {
                    ItemOutcome::Redacted
                }
            }
        };

        let report = scheduler.run_batch(&ctx, &process).await.unwrap();
        assert_eq!(calls.get(), 4);
        assert_eq!(report.failed, 2);
        assert_eq!(report.redacted, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_waits_between_batches() {
        let ctx = context_with_items(12);
        let scheduler = BatchScheduler::default();
        let started = tokio::time::Instant::now();

        let summary = scheduler
            .drain(&ctx, &|_item| async { ItemOutcome::Unchanged })
            .await;

        assert_eq!(summary.batches, 3);
        assert_eq!(summary.dispatched, 12);
        assert_eq!(ctx.queue_len(), 0);
        assert!(started.elapsed() >= Duration::from_millis(600));
    }

    #[tokio::test]
    async fn test_guard_releases_when_batch_is_dropped() {
        let ctx = context_with_items(2);
        let scheduler = BatchScheduler::default();

        let process = |_item: WorkItem| futures::future::pending::<ItemOutcome>();
        {
            let mut batch = Box::pin(scheduler.run_batch(&ctx, &process));
            assert!(futures::poll!(batch.as_mut()).is_pending());
            assert_eq!(scheduler.state(&ctx), SchedulerState::Processing);
        }

        assert_eq!(scheduler.state(&ctx), SchedulerState::Idle);
    }
}
