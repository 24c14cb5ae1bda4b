//! # 解析器模块
//!
//! HTML 文档解析、DOM 查询与修改、序列化。
//!
//! - `html` - HTML文档解析、DOM操作、序列化

pub mod html;

pub use html::{html_to_dom, serialize_document};
