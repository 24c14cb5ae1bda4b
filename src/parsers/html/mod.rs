//! HTML解析和处理模块
//!
//! - `dom`: 解析、查询和修改 DOM 树
//! - `serializer`: 序列化功能
//! - `utils`: 基础工具函数和常量

pub mod dom;
pub mod serializer;
pub mod utils;

pub use dom::{
    add_class, append_child, class_list, create_element, create_text, detach, direct_text,
    find_elements, get_child_node_by_name, get_node_attr, get_node_name, get_parent_node,
    get_style_property, has_class, has_class_prefix, html_to_dom, insert_after, insert_before,
    is_descendant_of, is_text, next_sibling, node_key, remove_class, remove_style_property,
    replace_node, set_node_attr, set_style_property, set_text_content, text_content,
};
pub use serializer::serialize_document;
pub use utils::{is_blank, WHITESPACES};
