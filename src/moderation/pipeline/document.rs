//! 活动文档模块
//!
//! 包装解析后的 DOM 树，持有变更订阅和点击监听器。所有经由 `Document`
//! 的结构修改都会通知订阅者；订阅和监听器都以句柄形式返回，句柄析构即注销。

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::io;
use std::rc::{Rc, Weak};

use markup5ever_rcdom::{Handle, RcDom};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use url::Url;

use crate::parsers::html::{self, dom};

/// DOM 变更记录
#[derive(Debug, Clone)]
pub enum MutationRecord {
    /// 子节点增删
    ChildList { target: Handle },
    /// 文本内容变化
    CharacterData { target: Handle },
}

impl MutationRecord {
    pub fn target(&self) -> &Handle {
        match self {
            MutationRecord::ChildList { target } | MutationRecord::CharacterData { target } => {
                target
            }
        }
    }

    pub fn is_character_data(&self) -> bool {
        matches!(self, MutationRecord::CharacterData { .. })
    }
}

type ClickCallback = Rc<dyn Fn()>;

/// 活动文档
pub struct Document {
    dom: RcDom,
    url: Option<Url>,
    next_id: Cell<u64>,
    subscribers: RefCell<Vec<(u64, UnboundedSender<MutationRecord>)>>,
    listeners: RefCell<HashMap<usize, Vec<(u64, ClickCallback)>>>,
}

impl Document {
    /// 从 HTML 字符串创建文档
    pub fn parse(html: &str, url: Option<&str>) -> Rc<Self> {
        Self::from_bytes(html.as_bytes(), "utf-8", url)
    }

    /// 从字节和字符集创建文档
    pub fn from_bytes(data: &[u8], encoding: &str, url: Option<&str>) -> Rc<Self> {
        let url = url.and_then(|u| match Url::parse(u) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                tracing::warn!("页面地址无效 '{}': {}", u, e);
                None
            }
        });

        Rc::new(Self {
            dom: html::html_to_dom(data, encoding),
            url,
            next_id: Cell::new(0),
            subscribers: RefCell::new(Vec::new()),
            listeners: RefCell::new(HashMap::new()),
        })
    }

    fn allocate_id(&self) -> u64 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        id
    }

    /// 文档根节点
    pub fn root(&self) -> Handle {
        self.dom.document.clone()
    }

    /// `<body>` 元素
    pub fn body(&self) -> Option<Handle> {
        let html = dom::get_child_node_by_name(&self.dom.document, "html")?;
        dom::get_child_node_by_name(&html, "body")
    }

    /// 页面地址，未知时为空串
    pub fn url(&self) -> String {
        self.url.as_ref().map(Url::to_string).unwrap_or_default()
    }

    /// 页面域名，未知时为空串
    pub fn domain(&self) -> String {
        self.url
            .as_ref()
            .and_then(|u| u.host_str())
            .unwrap_or_default()
            .to_string()
    }

    /// 节点是否仍在文档中
    pub fn is_attached(&self, node: &Handle) -> bool {
        dom::is_descendant_of(node, &self.dom.document)
    }

    /// 按文档顺序返回带指定 class 的元素
    pub fn elements_with_class(&self, class: &str) -> Vec<Handle> {
        let mut found = Vec::new();
        collect_with_class(&self.dom.document, class, &mut found);
        found
    }

    /// 按文档顺序返回指定标签的元素
    pub fn elements_by_tag(&self, tag: &str) -> Vec<Handle> {
        dom::find_elements(&self.dom.document, tag)
    }

    /// 订阅 DOM 变更
    pub fn subscribe(self: &Rc<Self>) -> (Subscription, UnboundedReceiver<MutationRecord>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.allocate_id();
        self.subscribers.borrow_mut().push((id, tx));

        (
            Subscription {
                document: Rc::downgrade(self),
                id,
            },
            rx,
        )
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.borrow().len()
    }

    fn notify(&self, record: MutationRecord) {
        if !self.is_attached(record.target()) {
            return;
        }
        self.subscribers
            .borrow_mut()
            .retain(|(_, tx)| tx.send(record.clone()).is_ok());
    }

    /// 追加子节点
    pub fn append_child(&self, parent: &Handle, child: &Handle) {
        if let Some(old_parent) = dom::detach(child) {
            self.notify(MutationRecord::ChildList { target: old_parent });
        }
        dom::append_child(parent, child);
        self.notify(MutationRecord::ChildList {
            target: parent.clone(),
        });
    }

    /// 在参照节点前插入
    pub fn insert_before(&self, reference: &Handle, node: &Handle) -> bool {
        if !dom::insert_before(reference, node) {
            return false;
        }
        if let Some(parent) = dom::get_parent_node(node) {
            self.notify(MutationRecord::ChildList { target: parent });
        }
        true
    }

    /// 在参照节点后插入
    pub fn insert_after(&self, reference: &Handle, node: &Handle) -> bool {
        if !dom::insert_after(reference, node) {
            return false;
        }
        if let Some(parent) = dom::get_parent_node(node) {
            self.notify(MutationRecord::ChildList { target: parent });
        }
        true
    }

    /// 替换节点
    pub fn replace_node(&self, old: &Handle, new_node: &Handle) -> bool {
        if !dom::replace_node(old, new_node) {
            return false;
        }
        if let Some(parent) = dom::get_parent_node(new_node) {
            self.notify(MutationRecord::ChildList { target: parent });
        }
        true
    }

    /// 移除节点
    pub fn remove(&self, node: &Handle) -> bool {
        match dom::detach(node) {
            Some(parent) => {
                self.notify(MutationRecord::ChildList { target: parent });
                true
            }
            None => false,
        }
    }

    /// 替换元素的文本内容
    pub fn set_text(&self, node: &Handle, text: &str) {
        dom::set_text_content(node, text);
        self.notify(MutationRecord::CharacterData {
            target: node.clone(),
        });
    }

    /// 注册点击监听器
    pub fn add_click_listener<F>(self: &Rc<Self>, node: &Handle, callback: F) -> ListenerHandle
    where
        F: Fn() + 'static,
    {
        let id = self.allocate_id();
        let key = dom::node_key(node);
        self.listeners
            .borrow_mut()
            .entry(key)
            .or_default()
            .push((id, Rc::new(callback)));

        ListenerHandle {
            document: Rc::downgrade(self),
            key,
            id,
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().values().map(Vec::len).sum()
    }

    /// 模拟点击：从目标节点向上冒泡，返回触发的监听器数量
    pub fn click(&self, node: &Handle) -> usize {
        let mut callbacks: Vec<ClickCallback> = Vec::new();
        let mut current = Some(node.clone());

        {
            let listeners = self.listeners.borrow();
            while let Some(target) = current {
                if let Some(registered) = listeners.get(&dom::node_key(&target)) {
                    callbacks.extend(registered.iter().map(|(_, cb)| cb.clone()));
                }
                current = dom::get_parent_node(&target);
            }
        }

        for callback in &callbacks {
            callback();
        }
        callbacks.len()
    }

    /// 序列化整个文档
    pub fn serialize(&self, encoding: &str) -> io::Result<Vec<u8>> {
        html::serialize_document(&self.dom.document, encoding)
    }

    /// 序列化为 UTF-8 字符串
    pub fn to_html(&self) -> String {
        self.serialize("utf-8")
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .unwrap_or_default()
    }
}

fn collect_with_class(node: &Handle, class: &str, found: &mut Vec<Handle>) {
    if dom::has_class(node, class) {
        found.push(node.clone());
    }
    for child in node.children.borrow().iter() {
        collect_with_class(child, class, found);
    }
}

/// 变更订阅句柄，析构时注销
pub struct Subscription {
    document: Weak<Document>,
    id: u64,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(document) = self.document.upgrade() {
            document
                .subscribers
                .borrow_mut()
                .retain(|(id, _)| *id != self.id);
        }
    }
}

/// 点击监听器句柄，析构时注销
pub struct ListenerHandle {
    document: Weak<Document>,
    key: usize,
    id: u64,
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        if let Some(document) = self.document.upgrade() {
            let mut listeners = document.listeners.borrow_mut();
            if let Some(registered) = listeners.get_mut(&self.key) {
                registered.retain(|(id, _)| *id != self.id);
                if registered.is_empty() {
                    listeners.remove(&self.key);
                }
            }
        }
    }
}
