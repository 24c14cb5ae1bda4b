//! 内容恢复
//!
//! 单条恢复：把外部提供的原文写回最匹配的已过滤元素，找不到时在页面上显示
//! 临时通知。整页恢复：关闭保护时撤销所有可见修改，历史记录保持不变。

use std::rc::Rc;
use std::time::Duration;

use markup5ever_rcdom::{Handle, NodeData};
use tokio::time::Instant;

use crate::moderation::config::constants;
use crate::moderation::pipeline::context::PipelineContext;
use crate::moderation::pipeline::document::Document;
use crate::parsers::html::{dom, is_blank};

const NOTIFICATION_STYLE: &str = "position: fixed; bottom: 20px; right: 20px; \
    z-index: 2147483647; background: #333; color: #fff; padding: 10px 14px; border-radius: 4px";

/// 单条恢复的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// 写回了页面元素
    Restored,
    /// 未找到匹配元素，改为显示通知
    Notified,
}

/// 整页恢复的统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub text_restored: usize,
    pub images_unblurred: usize,
    pub images_unblocked: usize,
    pub artifacts_removed: usize,
}

/// 恢复器
pub struct Recovery {
    document: Rc<Document>,
    notification_ttl: Duration,
}

impl Recovery {
    pub fn new(document: Rc<Document>, notification_ttl: Duration) -> Self {
        Self {
            document,
            notification_ttl,
        }
    }

    /// 把恢复出的原文写回页面
    ///
    /// 匹配顺序：带过滤标记的元素 → 全星号的旧式元素 → 含占位文本的元素。
    pub fn apply_recovered_content(&self, ctx: &PipelineContext, text: &str) -> RecoveryOutcome {
        match self.find_target() {
            Some(element) => {
                self.document.set_text(&element, text);
                dom::remove_class(&element, constants::FILTERED_TEXT_CLASS);
                dom::remove_class(&element, constants::ENCRYPTED_CLASS);
                ctx.encrypted.borrow_mut().remove(&element);
                tracing::info!("已恢复过滤内容 ({} 字符)", text.chars().count());
                RecoveryOutcome::Restored
            }
            None => {
                self.show_notification(ctx, &format!("Recovered content: {}", text));
                tracing::info!("未找到可恢复的元素，已显示通知");
                RecoveryOutcome::Notified
            }
        }
    }

    fn find_target(&self) -> Option<Handle> {
        if let Some(element) = self
            .document
            .elements_with_class(constants::FILTERED_TEXT_CLASS)
            .into_iter()
            .next()
        {
            return Some(element);
        }

        let candidates = self.text_elements();
        if let Some(element) = candidates.iter().find(|el| is_all_asterisks(&dom::direct_text(el))) {
            return Some(element.clone());
        }

        candidates
            .into_iter()
            .find(|el| dom::direct_text(el).contains(constants::FILTERED_PLACEHOLDER_PREFIX))
    }

    /// 文档顺序的元素列表，跳过脚本和管道自己的提示元素
    fn text_elements(&self) -> Vec<Handle> {
        let mut found = Vec::new();
        let root = self.document.body().unwrap_or_else(|| self.document.root());
        collect_text_elements(&root, &mut found);
        found
    }

    fn show_notification(&self, ctx: &PipelineContext, message: &str) {
        let Some(body) = self.document.body() else {
            return;
        };

        let notification = dom::create_element(
            "div",
            &[("class", constants::NOTIFICATION_CLASS), ("style", NOTIFICATION_STYLE)],
        );
        dom::append_child(&notification, &dom::create_text(message));
        self.document.append_child(&body, &notification);
        ctx.track_transient(notification, Instant::now() + self.notification_ttl);
    }

    /// 撤销页面上的全部可见修改
    pub fn restore_page(&self, ctx: &PipelineContext) -> RestoreReport {
        let mut report = RestoreReport::default();

        let encrypted = ctx.encrypted.borrow_mut().drain();
        for (element, original) in encrypted {
            self.document.set_text(&element, &original);
            dom::remove_class(&element, constants::ENCRYPTED_CLASS);
            report.text_restored += 1;
        }

        ctx.overlay_listeners.borrow_mut().clear();
        for overlay in self.document.elements_with_class(constants::BLUR_OVERLAY_CLASS) {
            self.document.remove(&overlay);
            report.artifacts_removed += 1;
        }

        for image in self.document.elements_with_class(constants::BLURRED_IMAGE_CLASS) {
            dom::remove_style_property(&image, "filter");
            dom::remove_class(&image, constants::BLURRED_IMAGE_CLASS);
            report.images_unblurred += 1;
        }

        for wrapper in self.document.elements_with_class(constants::BLUR_WRAPPER_CLASS) {
            self.unwrap(&wrapper);
        }

        let blocked: Vec<_> = ctx.blocked.borrow_mut().drain(..).collect();
        for entry in blocked {
            if self.document.replace_node(&entry.notice, &entry.image) {
                report.images_unblocked += 1;
            }
        }

        for element in ctx.take_all_transients() {
            if self.document.remove(&element) {
                report.artifacts_removed += 1;
            }
        }
        for class in [constants::INDICATOR_CLASS, constants::NOTIFICATION_CLASS] {
            for element in self.document.elements_with_class(class) {
                self.document.remove(&element);
                report.artifacts_removed += 1;
            }
        }

        tracing::info!(
            "整页恢复完成: 文本 {}，去模糊 {}，解除拦截 {}",
            report.text_restored,
            report.images_unblurred,
            report.images_unblocked
        );
        report
    }

    /// 把包装层的子节点移回原位置并删除包装层
    fn unwrap(&self, wrapper: &Handle) {
        let children: Vec<Handle> = wrapper.children.borrow().iter().cloned().collect();
        for child in &children {
            self.document.insert_before(wrapper, child);
        }
        self.document.remove(wrapper);
    }

    /// 删除过期的指示器和通知，返回删除数量
    pub fn sweep_expired(&self, ctx: &PipelineContext, now: Instant) -> usize {
        ctx.take_expired_transients(now)
            .iter()
            .filter(|element| self.document.remove(element))
            .count()
    }
}

fn is_all_asterisks(text: &str) -> bool {
    let trimmed = text.trim();
    !trimmed.is_empty() && trimmed.chars().all(|c| c == '*')
}

fn collect_text_elements(node: &Handle, found: &mut Vec<Handle>) {
    if let NodeData::Element { .. } = node.data {
        let Some(tag) = dom::get_node_name(node) else {
            return;
        };
        if constants::SKIP_ELEMENTS.contains(&tag)
            || dom::has_class(node, constants::NOTIFICATION_CLASS)
            || dom::has_class(node, constants::INDICATOR_CLASS)
            || dom::has_class(node, constants::BLUR_OVERLAY_CLASS)
        {
            return;
        }
        if !is_blank(&dom::direct_text(node)) {
            found.push(node.clone());
        }
    }

    for child in node.children.borrow().iter() {
        collect_text_elements(child, found);
    }
}
