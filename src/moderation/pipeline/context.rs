//! 管道上下文
//!
//! 一个管道实例的全部可变状态：启用标志、工作队列、在途标志、已处理集合、
//! 加密原文映射以及页面上的临时元素。单线程使用，借用从不跨越 await。

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use markup5ever_rcdom::Handle;
use tokio::sync::Notify;
use tokio::time::Instant;

use super::document::ListenerHandle;
use super::scanner::{ProcessedSet, WorkItem};

/// 加密元素与原文的映射，保持插入顺序
#[derive(Debug, Default)]
pub struct EncryptedMap {
    entries: Vec<(Handle, String)>,
}

impl EncryptedMap {
    /// 记录原文；同一元素重复加密时保留最早的原文
    pub fn insert(&mut self, element: Handle, original: String) {
        if !self.contains(&element) {
            self.entries.push((element, original));
        }
    }

    pub fn contains(&self, element: &Handle) -> bool {
        self.entries.iter().any(|(node, _)| Rc::ptr_eq(node, element))
    }

    pub fn original(&self, element: &Handle) -> Option<&str> {
        self.entries
            .iter()
            .find(|(node, _)| Rc::ptr_eq(node, element))
            .map(|(_, text)| text.as_str())
    }

    pub fn remove(&mut self, element: &Handle) -> Option<String> {
        let index = self
            .entries
            .iter()
            .position(|(node, _)| Rc::ptr_eq(node, element))?;
        Some(self.entries.remove(index).1)
    }

    pub fn drain(&mut self) -> Vec<(Handle, String)> {
        std::mem::take(&mut self.entries)
    }

    pub fn elements(&self) -> impl Iterator<Item = &Handle> {
        self.entries.iter().map(|(node, _)| node)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// 被拦截的图片及替代它的提示元素
#[derive(Debug, Clone)]
pub struct BlockedImage {
    pub notice: Handle,
    pub image: Handle,
}

/// 自动消失的页面元素（指示器、通知）
#[derive(Debug, Clone)]
pub struct Transient {
    pub element: Handle,
    pub expires_at: Instant,
}

/// 管道上下文
pub struct PipelineContext {
    enabled: Cell<bool>,
    queue: RefCell<VecDeque<WorkItem>>,
    in_flight: Cell<bool>,
    pub(crate) processed_text: RefCell<ProcessedSet>,
    pub(crate) processed_images: RefCell<ProcessedSet>,
    pub(crate) encrypted: RefCell<EncryptedMap>,
    pub(crate) blocked: RefCell<Vec<BlockedImage>>,
    pub(crate) transients: RefCell<Vec<Transient>>,
    pub(crate) overlay_listeners: RefCell<Vec<ListenerHandle>>,
    wake: Notify,
}

impl PipelineContext {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: Cell::new(enabled),
            queue: RefCell::new(VecDeque::new()),
            in_flight: Cell::new(false),
            processed_text: RefCell::new(ProcessedSet::new()),
            processed_images: RefCell::new(ProcessedSet::new()),
            encrypted: RefCell::new(EncryptedMap::default()),
            blocked: RefCell::new(Vec::new()),
            transients: RefCell::new(Vec::new()),
            overlay_listeners: RefCell::new(Vec::new()),
            wake: Notify::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.get()
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.set(enabled);
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.get()
    }

    pub(crate) fn set_in_flight(&self, in_flight: bool) {
        self.in_flight.set(in_flight);
    }

    pub fn enqueue(&self, item: WorkItem) {
        self.queue.borrow_mut().push_back(item);
    }

    /// 从队首取出至多 `max` 个工作项
    pub fn dequeue(&self, max: usize) -> Vec<WorkItem> {
        let mut queue = self.queue.borrow_mut();
        let count = max.min(queue.len());
        queue.drain(..count).collect()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.borrow().len()
    }

    /// 队列快照
    pub fn queued_items(&self) -> Vec<WorkItem> {
        self.queue.borrow().iter().cloned().collect()
    }

    pub fn clear_queue(&self) {
        self.queue.borrow_mut().clear();
    }

    /// 已扫描的元素总数
    pub fn processed_count(&self) -> usize {
        self.processed_text.borrow().len() + self.processed_images.borrow().len()
    }

    pub fn encrypted_count(&self) -> usize {
        self.encrypted.borrow().len()
    }

    pub fn track_transient(&self, element: Handle, expires_at: Instant) {
        self.transients
            .borrow_mut()
            .push(Transient { element, expires_at });
    }

    /// 取出所有已过期的临时元素
    pub fn take_expired_transients(&self, now: Instant) -> Vec<Handle> {
        let mut transients = self.transients.borrow_mut();
        let (expired, alive): (Vec<Transient>, Vec<Transient>) =
            transients.drain(..).partition(|t| t.expires_at <= now);
        *transients = alive;
        expired.into_iter().map(|t| t.element).collect()
    }

    pub fn take_all_transients(&self) -> Vec<Handle> {
        self.transients
            .borrow_mut()
            .drain(..)
            .map(|t| t.element)
            .collect()
    }

    pub fn transient_count(&self) -> usize {
        self.transients.borrow().len()
    }

    /// 唤醒批次调度器
    pub fn wake_scheduler(&self) {
        self.wake.notify_one();
    }

    /// 等待调度器被唤醒
    pub async fn scheduler_woken(&self) {
        self.wake.notified().await;
    }
}

impl Default for PipelineContext {
    fn default() -> Self {
        Self::new(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::html::dom;
    use std::time::Duration;

    #[test]
    fn test_dequeue_is_fifo_and_bounded() {
        let ctx = PipelineContext::new(true);
        let elements: Vec<Handle> = (0..7).map(|_| dom::create_element("p", &[])).collect();
        for element in &elements {
            ctx.enqueue(WorkItem::text(element.clone()));
        }

        let batch = ctx.dequeue(5);
        assert_eq!(batch.len(), 5);
        assert!(Rc::ptr_eq(&batch[0].element, &elements[0]));
        assert_eq!(ctx.queue_len(), 2);
        assert_eq!(ctx.dequeue(5).len(), 2);
    }

    #[test]
    fn test_encrypted_map_keeps_first_original() {
        let mut map = EncryptedMap::default();
        let p = dom::create_element("p", &[]);

        map.insert(p.clone(), "first".to_string());
        map.insert(p.clone(), "second".to_string());
        assert_eq!(map.len(), 1);
        assert_eq!(map.original(&p), Some("first"));
        assert_eq!(map.remove(&p).as_deref(), Some("first"));
        assert!(map.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_transients_are_taken() {
        let ctx = PipelineContext::new(true);
        let now = Instant::now();
        ctx.track_transient(dom::create_element("div", &[]), now + Duration::from_secs(3));
        ctx.track_transient(dom::create_element("div", &[]), now + Duration::from_secs(5));

        assert!(ctx.take_expired_transients(now).is_empty());
        assert_eq!(ctx.take_expired_transients(now + Duration::from_secs(4)).len(), 1);
        assert_eq!(ctx.transient_count(), 1);
    }
}
