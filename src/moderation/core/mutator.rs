//! DOM 修改器
//!
//! 把判定结果应用到活动元素上。每种修改都是幂等的：对应标记已存在时
//! 返回 `AlreadyApplied`，不会叠加包装层或遮罩。

use std::rc::Rc;
use std::time::Duration;

use markup5ever_rcdom::Handle;
use tokio::time::Instant;

use super::verdict::{Action, Verdict};
use crate::moderation::config::constants;
use crate::moderation::error::{ModerationError, ModerationResult};
use crate::moderation::pipeline::context::{BlockedImage, PipelineContext};
use crate::moderation::pipeline::document::Document;
use crate::moderation::pipeline::scanner::{ItemKind, WorkItem};
use crate::parsers::html::dom;

const MEDIUM_TEXT_MAX_CHARS: usize = 200;
const SHORT_TEXT_MAX_CHARS: usize = 20;
const PRESERVED_EDGE_CHARS: usize = 10;
const SENTENCE_PREVIEW_MAX_CHARS: usize = 80;

const INDICATOR_STYLE: &str = "position: absolute; z-index: 2147483647; background: #fff3cd; \
    color: #856404; font-size: 12px; padding: 4px 8px; border-radius: 4px";
const WRAPPER_STYLE: &str = "position: relative; display: inline-block";
const OVERLAY_STYLE: &str = "position: absolute; top: 0; left: 0; width: 100%; height: 100%; \
    display: flex; align-items: center; justify-content: center; cursor: pointer; opacity: 1";
const BLOCKED_STYLE: &str = "display: inline-block; background: #f1f1f1; color: #666; \
    padding: 12px; text-align: center";

/// 一次修改的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Unchanged,
    TextRedacted { original: String },
    TextEncrypted { original: String },
    ImageBlurred { src: String },
    ImageBlocked { src: String },
    /// 修改已存在，未做任何改变
    AlreadyApplied,
}

impl Mutation {
    /// 是否为首次产生的可见修改（需要记录历史和计数）
    pub fn is_new_redaction(&self) -> bool {
        !matches!(self, Mutation::Unchanged | Mutation::AlreadyApplied)
    }

    /// 被修改的原始内容（文本原文或图片地址）
    pub fn original_content(&self) -> Option<&str> {
        match self {
            Mutation::TextRedacted { original } | Mutation::TextEncrypted { original } => {
                Some(original)
            }
            Mutation::ImageBlurred { src } | Mutation::ImageBlocked { src } => Some(src),
            Mutation::Unchanged | Mutation::AlreadyApplied => None,
        }
    }
}

/// 按长度分级生成占位文本
///
/// - 不超过 20 字符：通用提示
/// - 不超过 200 字符：保留首尾各 10 字符
/// - 更长：首句预览（至多 80 字符）加“点击查看”提示
pub fn placeholder_for(text: &str) -> String {
    let text = text.trim();
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();

    if len <= SHORT_TEXT_MAX_CHARS {
        constants::FILTERED_PLACEHOLDER.to_string()
    } else if len <= MEDIUM_TEXT_MAX_CHARS {
        let head: String = chars[..PRESERVED_EDGE_CHARS].iter().collect();
        let tail: String = chars[len - PRESERVED_EDGE_CHARS..].iter().collect();
        format!("{} {} {}", head, constants::FILTERED_PLACEHOLDER, tail)
    } else {
        format!("{} {}", first_sentence(text), constants::LONG_FORM_NOTICE)
    }
}

fn first_sentence(text: &str) -> String {
    let mut end = text.len();
    let mut iter = text.char_indices().peekable();
    while let Some((index, ch)) = iter.next() {
        if matches!(ch, '.' | '!' | '?') {
            let at_boundary = iter.peek().map_or(true, |(_, next)| next.is_whitespace());
            if at_boundary {
                end = index + ch.len_utf8();
                break;
            }
        }
    }

    text[..end]
        .trim()
        .chars()
        .take(SENTENCE_PREVIEW_MAX_CHARS)
        .collect()
}

/// DOM 修改器
pub struct DomMutator {
    document: Rc<Document>,
    indicator_ttl: Duration,
}

impl DomMutator {
    pub fn new(document: Rc<Document>, indicator_ttl: Duration) -> Self {
        Self {
            document,
            indicator_ttl,
        }
    }

    /// 应用判定
    pub fn apply(
        &self,
        ctx: &PipelineContext,
        item: &WorkItem,
        verdict: &Verdict,
    ) -> ModerationResult<Mutation> {
        let element = &item.element;

        match (item.kind, verdict.action) {
            (_, Action::Keep) => Ok(Mutation::Unchanged),
            (ItemKind::Text, Action::Redact) => Ok(self.redact_text(ctx, element, verdict)),
            (ItemKind::Text, Action::Encrypt) => self.encrypt_text(ctx, element, verdict),
            (ItemKind::Image, Action::Blur) => self.blur_image(ctx, element),
            (ItemKind::Image, Action::Block) => self.block_image(ctx, element),
            (kind, action) => Err(ModerationError::InvalidInput(format!(
                "动作 {:?} 不适用于 {} 元素",
                action,
                kind.as_str()
            ))),
        }
    }

    fn redact_text(&self, ctx: &PipelineContext, element: &Handle, verdict: &Verdict) -> Mutation {
        if dom::has_class(element, constants::FILTERED_TEXT_CLASS) {
            return Mutation::AlreadyApplied;
        }

        let original = dom::text_content(element).trim().to_string();
        self.document.set_text(element, &placeholder_for(&original));
        dom::add_class(element, constants::FILTERED_TEXT_CLASS);
        self.attach_indicator(ctx, element, &verdict.reasons);

        tracing::debug!("文本已替换为占位符 ({} 字符)", original.chars().count());
        Mutation::TextRedacted { original }
    }

    fn encrypt_text(
        &self,
        ctx: &PipelineContext,
        element: &Handle,
        verdict: &Verdict,
    ) -> ModerationResult<Mutation> {
        if dom::has_class(element, constants::ENCRYPTED_CLASS)
            || ctx.encrypted.borrow().contains(element)
        {
            return Ok(Mutation::AlreadyApplied);
        }

        let replacement = verdict.replacement_text.as_deref().ok_or_else(|| {
            ModerationError::InvalidInput("加密判定缺少替换文本".to_string())
        })?;

        let original = dom::text_content(element).trim().to_string();
        self.document.set_text(element, replacement);
        dom::add_class(element, constants::ENCRYPTED_CLASS);
        ctx.encrypted
            .borrow_mut()
            .insert(element.clone(), original.clone());

        Ok(Mutation::TextEncrypted { original })
    }

    /// 指示器紧跟在被过滤元素之后；元素已脱离时挂到 body
    fn attach_indicator(&self, ctx: &PipelineContext, element: &Handle, reasons: &[String]) {
        let label = if reasons.is_empty() {
            "Content filtered".to_string()
        } else {
            format!("Content filtered: {}", reasons.join(", "))
        };
        let indicator = dom::create_element(
            "div",
            &[("class", constants::INDICATOR_CLASS), ("style", INDICATOR_STYLE)],
        );
        dom::append_child(&indicator, &dom::create_text(&label));

        if !self.document.insert_after(element, &indicator) {
            let Some(body) = self.document.body() else {
                return;
            };
            self.document.append_child(&body, &indicator);
        }
        ctx.track_transient(indicator, Instant::now() + self.indicator_ttl);
    }

    fn blur_image(&self, ctx: &PipelineContext, image: &Handle) -> ModerationResult<Mutation> {
        if dom::has_class(image, constants::BLURRED_IMAGE_CLASS) {
            return Ok(Mutation::AlreadyApplied);
        }

        let wrapper = self.ensure_wrapper(image)?;
        dom::set_style_property(image, "filter", constants::BLUR_FILTER);
        dom::add_class(image, constants::BLURRED_IMAGE_CLASS);
        self.ensure_overlay(ctx, &wrapper, image);

        let src = dom::get_node_attr(image, "src").unwrap_or_default();
        tracing::debug!("图片已模糊: {}", src);
        Ok(Mutation::ImageBlurred { src })
    }

    /// 复用已有包装层，没有时创建
    fn ensure_wrapper(&self, image: &Handle) -> ModerationResult<Handle> {
        if let Some(parent) = dom::get_parent_node(image) {
            if dom::has_class(&parent, constants::BLUR_WRAPPER_CLASS) {
                return Ok(parent);
            }
        }

        let wrapper = dom::create_element(
            "span",
            &[("class", constants::BLUR_WRAPPER_CLASS), ("style", WRAPPER_STYLE)],
        );
        if !self.document.insert_before(image, &wrapper) {
            return Err(ModerationError::DomError("图片已脱离文档".to_string()));
        }
        self.document.append_child(&wrapper, image);
        Ok(wrapper)
    }

    /// 每个包装层只有一个遮罩；点击切换模糊和遮罩可见性
    fn ensure_overlay(&self, ctx: &PipelineContext, wrapper: &Handle, image: &Handle) {
        let existing = wrapper
            .children
            .borrow()
            .iter()
            .find(|child| dom::has_class(child, constants::BLUR_OVERLAY_CLASS))
            .cloned();

        if let Some(overlay) = existing {
            dom::set_style_property(&overlay, "opacity", "1");
            return;
        }

        let overlay = dom::create_element(
            "div",
            &[("class", constants::BLUR_OVERLAY_CLASS), ("style", OVERLAY_STYLE)],
        );
        dom::append_child(&overlay, &dom::create_text(constants::BLUR_OVERLAY_NOTICE));
        self.document.append_child(wrapper, &overlay);

        let target = image.clone();
        let panel = overlay.clone();
        let handle = self.document.add_click_listener(&overlay, move || {
            let blurred = dom::get_style_property(&target, "filter").as_deref()
                == Some(constants::BLUR_FILTER);
            if blurred {
                dom::set_style_property(&target, "filter", "none");
                dom::set_style_property(&panel, "opacity", "0");
            } else {
                dom::set_style_property(&target, "filter", constants::BLUR_FILTER);
                dom::set_style_property(&panel, "opacity", "1");
            }
        });
        ctx.overlay_listeners.borrow_mut().push(handle);
    }

    fn block_image(&self, ctx: &PipelineContext, image: &Handle) -> ModerationResult<Mutation> {
        if ctx
            .blocked
            .borrow()
            .iter()
            .any(|blocked| Rc::ptr_eq(&blocked.image, image))
        {
            return Ok(Mutation::AlreadyApplied);
        }

        let mut style = BLOCKED_STYLE.to_string();
        for dimension in ["width", "height"] {
            if let Some(value) = dom::get_node_attr(image, dimension) {
                if value.chars().all(|c| c.is_ascii_digit()) && !value.is_empty() {
                    style.push_str(&format!("; {}: {}px", dimension, value));
                }
            }
        }

        let notice = dom::create_element(
            "div",
            &[("class", constants::BLOCKED_NOTICE_CLASS), ("style", style.as_str())],
        );
        dom::append_child(&notice, &dom::create_text(constants::BLOCKED_NOTICE));

        if !self.document.replace_node(image, &notice) {
            return Err(ModerationError::DomError("图片已脱离文档".to_string()));
        }
        ctx.blocked.borrow_mut().push(BlockedImage {
            notice,
            image: image.clone(),
        });

        let src = dom::get_node_attr(image, "src").unwrap_or_default();
        tracing::debug!("图片已拦截: {}", src);
        Ok(Mutation::ImageBlocked { src })
    }
}
