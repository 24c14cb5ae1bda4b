//! 防抖观察器
//!
//! 把一串 DOM 变更合并为一次重新扫描的触发。静默期内的新变更会重置计时器
//! （尾沿防抖），计时器始终只有一个。

use std::rc::Rc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{timeout_at, Instant};

use super::document::{Document, MutationRecord, Subscription};

/// 防抖观察器
pub struct DebouncedObserver {
    _subscription: Subscription,
    receiver: UnboundedReceiver<MutationRecord>,
    quiet_period: Duration,
    observe_character_data: bool,
    pending: usize,
    deadline: Option<Instant>,
}

impl DebouncedObserver {
    /// 订阅文档变更
    pub fn start(
        document: &Rc<Document>,
        quiet_period: Duration,
        observe_character_data: bool,
    ) -> Self {
        let (subscription, receiver) = document.subscribe();
        tracing::debug!("观察器已启动，静默期 {:?}", quiet_period);

        Self {
            _subscription: subscription,
            receiver,
            quiet_period,
            observe_character_data,
            pending: 0,
            deadline: None,
        }
    }

    fn accepts(&self, record: &MutationRecord) -> bool {
        self.observe_character_data || !record.is_character_data()
    }

    fn record(&mut self) {
        self.pending += 1;
        self.deadline = Some(Instant::now() + self.quiet_period);
    }

    /// 等待下一次变更突发结束，返回其中的变更数量
    ///
    /// 可以安全地被取消：已经计入的变更会带入下一次等待。订阅通道关闭时
    /// 先交付尚未结束的突发，然后返回 `None`。
    pub async fn next_burst(&mut self) -> Option<usize> {
        loop {
            let Some(deadline) = self.deadline else {
                let record = self.receiver.recv().await?;
                if self.accepts(&record) {
                    self.record();
                }
                continue;
            };

            match timeout_at(deadline, self.receiver.recv()).await {
                Ok(Some(record)) => {
                    if self.accepts(&record) {
                        self.record();
                    }
                }
                Ok(None) => {
                    self.deadline = None;
                    return Some(std::mem::take(&mut self.pending));
                }
                Err(_) => {
                    self.deadline = None;
                    let count = std::mem::take(&mut self.pending);
                    tracing::debug!("变更突发结束，共 {} 次变更", count);
                    return Some(count);
                }
            }
        }
    }

    /// 当前突发中已计入的变更数
    pub fn pending(&self) -> usize {
        self.pending
    }
}
