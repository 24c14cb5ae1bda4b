use std::cell::RefCell;
use std::rc::Rc;

use cssparser::{Delimiter, ParseError, Parser, ParserInput};
use encoding_rs::Encoding;
use html5ever::interface::{Attribute, QualName};
use html5ever::parse_document;
use html5ever::tendril::{format_tendril, StrTendril, TendrilSink};
use html5ever::{namespace_url, ns, LocalName};
use markup5ever_rcdom::{Handle, Node, NodeData, RcDom};

use super::utils::WHITESPACES;

/// 将 HTML 字节转换为 DOM
pub fn html_to_dom(data: &[u8], document_encoding: &str) -> RcDom {
    let s: String = match Encoding::for_label(document_encoding.as_bytes()) {
        Some(encoding) => encoding.decode(data).0.into_owned(),
        None => String::from_utf8_lossy(data).into_owned(),
    };

    parse_document(RcDom::default(), Default::default())
        .from_utf8()
        .read_from(&mut s.as_bytes())
        .unwrap_or_default()
}

/// 从 `Content-Type` 值中提取字符集
pub fn charset_from_content_type(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|part| {
        let (key, value) = part.trim().split_once('=')?;
        if !key.trim().eq_ignore_ascii_case("charset") {
            return None;
        }
        let charset = value.trim().trim_matches('"').trim_matches('\'');
        (!charset.is_empty()).then(|| charset.to_string())
    })
}

/// 读取 `<meta charset>` 或 `<meta http-equiv="content-type">` 声明的字符集
pub fn get_charset(node: &Handle) -> Option<String> {
    find_elements(node, "meta").iter().find_map(|meta| {
        if let Some(charset) = get_node_attr(meta, "charset") {
            return Some(charset.trim().to_string());
        }
        let http_equiv = get_node_attr(meta, "http-equiv").unwrap_or_default();
        if http_equiv.eq_ignore_ascii_case("content-type") {
            get_node_attr(meta, "content").and_then(|content| charset_from_content_type(&content))
        } else {
            None
        }
    })
}

/// 确定文档编码：响应头声明优先，其次 `<meta>`，都没有时为 UTF-8
pub fn detect_encoding(data: &[u8], declared: Option<&str>) -> String {
    let declared = declared.and_then(|label| Encoding::for_label(label.trim().as_bytes()));
    if let Some(encoding) = declared {
        return encoding.name().to_string();
    }

    let dom = html_to_dom(data, "utf-8");
    get_charset(&dom.document)
        .and_then(|charset| Encoding::for_label(charset.as_bytes()))
        .unwrap_or(encoding_rs::UTF_8)
        .name()
        .to_string()
}

/// 节点身份标识（同一文档生命周期内唯一）
pub fn node_key(node: &Handle) -> usize {
    Rc::as_ptr(node) as usize
}

/// 按文档顺序查找指定标签的所有元素
pub fn find_elements(node: &Handle, tag: &str) -> Vec<Handle> {
    let mut found = Vec::new();
    collect_elements(node, tag, &mut found);
    found
}

fn collect_elements(node: &Handle, tag: &str, found: &mut Vec<Handle>) {
    if get_node_name(node) == Some(tag) {
        found.push(node.clone());
    }

    for child in node.children.borrow().iter() {
        collect_elements(child, tag, found);
    }
}

/// 根据名称获取子节点
pub fn get_child_node_by_name(parent: &Handle, node_name: &str) -> Option<Handle> {
    let children = parent.children.borrow();
    children
        .iter()
        .find(|child| get_node_name(child) == Some(node_name))
        .cloned()
}

/// 获取节点属性值
pub fn get_node_attr(node: &Handle, attr_name: &str) -> Option<String> {
    match &node.data {
        NodeData::Element { attrs, .. } => attrs
            .borrow()
            .iter()
            .find(|attr| &*attr.name.local == attr_name)
            .map(|attr| attr.value.to_string()),
        _ => None,
    }
}

/// 获取节点名称
pub fn get_node_name(node: &Handle) -> Option<&'_ str> {
    match &node.data {
        NodeData::Element { name, .. } => Some(name.local.as_ref()),
        _ => None,
    }
}

/// 获取父节点（不改变节点自身的父指针）
pub fn get_parent_node(child: &Handle) -> Option<Handle> {
    let weak = child.parent.take();
    let parent = weak.as_ref().and_then(|node| node.upgrade());
    child.parent.set(weak);
    parent
}

/// 设置节点属性，`None` 表示删除
pub fn set_node_attr(node: &Handle, attr_name: &str, attr_value: Option<String>) {
    if let NodeData::Element { attrs, .. } = &node.data {
        let mut attrs_mut = attrs.borrow_mut();

        match attr_value {
            Some(value) => {
                if let Some(attr) = attrs_mut
                    .iter_mut()
                    .find(|attr| &*attr.name.local == attr_name)
                {
                    attr.value.clear();
                    attr.value.push_slice(&value);
                } else {
                    attrs_mut.push(Attribute {
                        name: QualName::new(None, ns!(), LocalName::from(attr_name)),
                        value: format_tendril!("{}", value),
                    });
                }
            }
            None => attrs_mut.retain(|attr| &*attr.name.local != attr_name),
        }
    }
}

/// 元素的 class 列表
pub fn class_list(node: &Handle) -> Vec<String> {
    get_node_attr(node, "class")
        .map(|value| {
            value
                .split(WHITESPACES)
                .filter(|class| !class.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

pub fn has_class(node: &Handle, class: &str) -> bool {
    class_list(node).iter().any(|c| c == class)
}

/// 是否存在以指定前缀开头的 class
pub fn has_class_prefix(node: &Handle, prefix: &str) -> bool {
    class_list(node).iter().any(|c| c.starts_with(prefix))
}

pub fn add_class(node: &Handle, class: &str) {
    let mut classes = class_list(node);
    if !classes.iter().any(|c| c == class) {
        classes.push(class.to_string());
        set_node_attr(node, "class", Some(classes.join(" ")));
    }
}

pub fn remove_class(node: &Handle, class: &str) {
    let classes = class_list(node);
    if classes.iter().any(|c| c == class) {
        let remaining: Vec<String> = classes.into_iter().filter(|c| c != class).collect();
        if remaining.is_empty() {
            set_node_attr(node, "class", None);
        } else {
            set_node_attr(node, "class", Some(remaining.join(" ")));
        }
    }
}

/// 内联样式中的一条声明，保留原始文本
struct StyleDeclaration {
    /// 小写属性名；无法解析的片段为 `None`，原样写回
    property: Option<String>,
    source: String,
}

impl StyleDeclaration {
    fn new(property: &str, value: &str) -> Self {
        Self {
            property: Some(property.to_string()),
            source: format!("{}: {}", property, value),
        }
    }

    fn value(&self) -> Option<&str> {
        self.property.as_ref()?;
        self.source.split_once(':').map(|(_, value)| value.trim())
    }
}

/// 按顶层分号切分内联样式
///
/// 字符串、`url()` 和括号内的分号不会切断声明。
fn parse_style(style: &str) -> Vec<StyleDeclaration> {
    let mut input = ParserInput::new(style);
    let mut parser = Parser::new(&mut input);
    let mut declarations = Vec::new();

    while !parser.is_exhausted() {
        let start = parser.position();
        let property: Result<String, ParseError<'_, ()>> =
            parser.parse_until_after(Delimiter::Semicolon, |decl| {
                let name = decl.expect_ident()?.to_ascii_lowercase();
                decl.expect_colon()?;
                while decl.next().is_ok() {}
                Ok(name)
            });

        let raw = parser.slice_from(start).trim();
        let source = raw.strip_suffix(';').unwrap_or(raw).trim_end();
        if source.is_empty() {
            continue;
        }
        declarations.push(StyleDeclaration {
            property: property.ok(),
            source: source.to_string(),
        });
    }

    declarations
}

fn style_declarations(node: &Handle) -> Vec<StyleDeclaration> {
    get_node_attr(node, "style")
        .map(|style| parse_style(&style))
        .unwrap_or_default()
}

fn write_style_declarations(node: &Handle, declarations: &[StyleDeclaration]) {
    if declarations.is_empty() {
        set_node_attr(node, "style", None);
    } else {
        let style = declarations
            .iter()
            .map(|decl| decl.source.as_str())
            .collect::<Vec<_>>()
            .join("; ");
        set_node_attr(node, "style", Some(style));
    }
}

/// 读取内联样式属性
pub fn get_style_property(node: &Handle, property: &str) -> Option<String> {
    style_declarations(node)
        .iter()
        .rev()
        .find(|decl| decl.property.as_deref() == Some(property))
        .and_then(|decl| decl.value().map(str::to_string))
}

/// 设置内联样式属性，其他声明按原文保留
pub fn set_style_property(node: &Handle, property: &str, value: &str) {
    let mut declarations = style_declarations(node);
    let mut replaced = false;
    declarations.retain_mut(|decl| {
        if decl.property.as_deref() != Some(property) {
            return true;
        }
        if replaced {
            return false;
        }
        *decl = StyleDeclaration::new(property, value);
        replaced = true;
        true
    });
    if !replaced {
        declarations.push(StyleDeclaration::new(property, value));
    }
    write_style_declarations(node, &declarations);
}

pub fn remove_style_property(node: &Handle, property: &str) {
    let mut declarations = style_declarations(node);
    let before = declarations.len();
    declarations.retain(|decl| decl.property.as_deref() != Some(property));
    if declarations.len() != before {
        write_style_declarations(node, &declarations);
    }
}

pub fn is_text(node: &Handle) -> bool {
    matches!(node.data, NodeData::Text { .. })
}

/// 直接文本子节点拼接的内容
pub fn direct_text(node: &Handle) -> String {
    let mut text = String::new();
    for child in node.children.borrow().iter() {
        if let NodeData::Text { contents } = &child.data {
            text.push_str(&contents.borrow());
        }
    }
    text
}

/// 子树中全部文本
pub fn text_content(node: &Handle) -> String {
    let mut text = String::new();
    push_text(node, &mut text);
    text
}

fn push_text(node: &Handle, out: &mut String) {
    match &node.data {
        NodeData::Text { contents } => out.push_str(&contents.borrow()),
        _ => {
            for child in node.children.borrow().iter() {
                push_text(child, out);
            }
        }
    }
}

/// 创建元素节点
pub fn create_element(tag: &str, attrs: &[(&str, &str)]) -> Handle {
    let attrs = attrs
        .iter()
        .map(|(name, value)| Attribute {
            name: QualName::new(None, ns!(), LocalName::from(*name)),
            value: format_tendril!("{}", value),
        })
        .collect();

    Node::new(NodeData::Element {
        name: QualName::new(None, ns!(html), LocalName::from(tag)),
        attrs: RefCell::new(attrs),
        template_contents: RefCell::new(None),
        mathml_annotation_xml_integration_point: false,
    })
}

/// 创建文本节点
pub fn create_text(text: &str) -> Handle {
    Node::new(NodeData::Text {
        contents: RefCell::new(StrTendril::from_slice(text)),
    })
}

/// 从父节点上摘除节点，返回原父节点
pub fn detach(node: &Handle) -> Option<Handle> {
    let parent = get_parent_node(node)?;
    parent
        .children
        .borrow_mut()
        .retain(|child| !Rc::ptr_eq(child, node));
    node.parent.set(None);
    Some(parent)
}

/// 追加子节点（先从旧位置摘除）
pub fn append_child(parent: &Handle, child: &Handle) {
    detach(child);
    child.parent.set(Some(Rc::downgrade(parent)));
    parent.children.borrow_mut().push(child.clone());
}

/// 在参照节点之前插入新节点；参照节点未挂载时返回 false
pub fn insert_before(reference: &Handle, new_node: &Handle) -> bool {
    let Some(parent) = get_parent_node(reference) else {
        return false;
    };
    detach(new_node);

    let mut children = parent.children.borrow_mut();
    let index = children
        .iter()
        .position(|child| Rc::ptr_eq(child, reference))
        .unwrap_or(children.len());
    new_node.parent.set(Some(Rc::downgrade(&parent)));
    children.insert(index, new_node.clone());
    true
}

/// 紧随其后的兄弟节点
pub fn next_sibling(node: &Handle) -> Option<Handle> {
    let parent = get_parent_node(node)?;
    let children = parent.children.borrow();
    let index = children.iter().position(|child| Rc::ptr_eq(child, node))?;
    children.get(index + 1).cloned()
}

/// 在参照节点之后插入新节点；参照节点未挂载时返回 false
pub fn insert_after(reference: &Handle, new_node: &Handle) -> bool {
    match next_sibling(reference) {
        Some(next) => insert_before(&next, new_node),
        None => match get_parent_node(reference) {
            Some(parent) => {
                append_child(&parent, new_node);
                true
            }
            None => false,
        },
    }
}

/// 用新节点替换旧节点；旧节点未挂载时返回 false
pub fn replace_node(old: &Handle, new_node: &Handle) -> bool {
    if !insert_before(old, new_node) {
        return false;
    }
    detach(old);
    true
}

/// 用单个文本节点替换全部子节点
pub fn set_text_content(node: &Handle, text: &str) {
    let old_children: Vec<Handle> = node.children.borrow_mut().drain(..).collect();
    for child in &old_children {
        child.parent.set(None);
    }
    append_child(node, &create_text(text));
}

/// 节点是否仍挂在以 `root` 为根的树上
pub fn is_descendant_of(node: &Handle, root: &Handle) -> bool {
    let mut current = Some(node.clone());
    while let Some(candidate) = current {
        if Rc::ptr_eq(&candidate, root) {
            return true;
        }
        current = get_parent_node(&candidate);
    }
    false
}
