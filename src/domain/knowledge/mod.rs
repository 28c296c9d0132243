//! Knowledge Context - 知识库限界上下文
//!
//! 职责:
//! - 切片配置与策略变体
//! - 知识段落实体与预览结果
//! - 作业状态码判定

mod entities;
pub mod status;
mod value_objects;

pub use entities::{AuditSuggest, Chunk, FileStatus, FileSummary, PreviewEntry};
pub use value_objects::{
    escape_separator, unescape_separator, FileId, LengthRange, SliceConfig, SliceKind, VariantTag,
    ESCAPED_NEWLINE,
};
