//! 候选元素扫描器
//!
//! 按文档顺序遍历 DOM，找出尚未处理的文本和图片候选，在任何异步操作之前
//! 打上处理标记并入队。

use std::collections::HashMap;
use std::rc::{Rc, Weak};

use markup5ever_rcdom::{Handle, Node, NodeData};

use super::context::PipelineContext;
use super::document::Document;
use crate::moderation::config::constants;
use crate::parsers::html::{dom, is_blank};

/// 工作项类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemKind {
    Text,
    Image,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Text => "text",
            ItemKind::Image => "image",
        }
    }
}

/// 待分类的工作项，持有元素句柄而非副本
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub kind: ItemKind,
    pub element: Handle,
}

impl WorkItem {
    pub fn text(element: Handle) -> Self {
        Self {
            kind: ItemKind::Text,
            element,
        }
    }

    pub fn image(element: Handle) -> Self {
        Self {
            kind: ItemKind::Image,
            element,
        }
    }
}

/// 已扫描元素集合，键为节点身份，值为弱引用
#[derive(Debug, Default)]
pub struct ProcessedSet {
    entries: HashMap<usize, Weak<Node>>,
}

impl ProcessedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入元素，已存在时返回 false
    pub fn insert(&mut self, node: &Handle) -> bool {
        if self.contains(node) {
            return false;
        }
        self.entries.insert(dom::node_key(node), Rc::downgrade(node));
        true
    }

    pub fn contains(&self, node: &Handle) -> bool {
        self.entries
            .get(&dom::node_key(node))
            .and_then(Weak::upgrade)
            .is_some_and(|existing| Rc::ptr_eq(&existing, node))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// 一次扫描的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// 访问过的元素数
    pub visited: usize,
    pub text_enqueued: usize,
    pub images_enqueued: usize,
    /// 带标记但仍被发现的候选
    pub already_processed: usize,
}

impl ScanReport {
    pub fn enqueued(&self) -> usize {
        self.text_enqueued + self.images_enqueued
    }
}

/// 候选元素扫描器
#[derive(Debug, Default)]
pub struct Scanner;

impl Scanner {
    pub fn new() -> Self {
        Self
    }

    /// 扫描文档并把新候选加入队列
    pub fn scan(&self, document: &Document, ctx: &PipelineContext) -> ScanReport {
        let mut report = ScanReport::default();

        if !ctx.is_enabled() {
            tracing::debug!("保护已关闭，跳过扫描");
            return report;
        }

        let root = document.body().unwrap_or_else(|| document.root());
        self.visit(&root, ctx, &mut report);

        if report.enqueued() > 0 {
            tracing::info!(
                "扫描完成: 新增 {} 个文本、{} 个图片候选，队列长度 {}",
                report.text_enqueued,
                report.images_enqueued,
                ctx.queue_len()
            );
        }
        if ctx.queue_len() > 0 {
            ctx.wake_scheduler();
        }

        report
    }

    fn visit(&self, node: &Handle, ctx: &PipelineContext, report: &mut ScanReport) {
        if let NodeData::Element { .. } = node.data {
            report.visited += 1;

            let Some(tag) = dom::get_node_name(node) else {
                return;
            };
            if constants::SKIP_ELEMENTS.contains(&tag) || is_pipeline_artifact(node) {
                return;
            }

            if tag == "img" {
                self.consider_image(node, ctx, report);
            } else if constants::TEXT_TAGS.contains(&tag) {
                self.consider_text(node, ctx, report);
            }
        }

        let children: Vec<Handle> = node.children.borrow().iter().cloned().collect();
        for child in &children {
            self.visit(child, ctx, report);
        }
    }

    fn consider_text(&self, node: &Handle, ctx: &PipelineContext, report: &mut ScanReport) {
        if dom::has_class(node, constants::PROCESSED_CLASS) {
            report.already_processed += 1;
            return;
        }
        if is_blank(&dom::direct_text(node)) {
            return;
        }
        if !ctx.processed_text.borrow_mut().insert(node) {
            report.already_processed += 1;
            return;
        }

        dom::add_class(node, constants::PROCESSED_CLASS);
        ctx.enqueue(WorkItem::text(node.clone()));
        report.text_enqueued += 1;
    }

    fn consider_image(&self, node: &Handle, ctx: &PipelineContext, report: &mut ScanReport) {
        if dom::has_class(node, constants::PROCESSED_CLASS) {
            report.already_processed += 1;
            return;
        }
        if dom::get_node_attr(node, "src").map_or(true, |src| src.trim().is_empty()) {
            return;
        }
        if !ctx.processed_images.borrow_mut().insert(node) {
            report.already_processed += 1;
            return;
        }

        dom::add_class(node, constants::PROCESSED_CLASS);
        ctx.enqueue(WorkItem::image(node.clone()));
        report.images_enqueued += 1;
    }
}

/// 管道自己创建的元素（包装层、遮罩、提示等）
fn is_pipeline_artifact(node: &Handle) -> bool {
    const MARKERS: &[&str] = &[
        constants::PROCESSED_CLASS,
        constants::FILTERED_TEXT_CLASS,
        constants::ENCRYPTED_CLASS,
        constants::BLURRED_IMAGE_CLASS,
    ];

    dom::class_list(node)
        .iter()
        .any(|class| {
            class.starts_with(constants::CLASS_PREFIX) && !MARKERS.contains(&class.as_str())
        })
}
