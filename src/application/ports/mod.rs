//! Application Ports - 出站端口定义
//!
//! 定义应用层与基础设施层的抽象接口

mod knowledge_service;
mod preview_cache;

pub use knowledge_service::{
    ChunkPage, ChunkStream, EmbedConfig, IndexType, KnowledgeServicePort, SeparatorOption,
    ServiceError, SliceRules,
};
pub use preview_cache::PreviewCachePort;
