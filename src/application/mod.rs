//! 应用层 - 用例编排
//!
//! 包含：
//! - ports: 六边形架构端口定义（KnowledgeService、PreviewCache）
//! - poller: 作业状态轮询原语
//! - policy: 切片配置管理
//! - coordinators: 切片 / 向量化 / 分页协调器
//! - error: 应用层错误定义

pub mod coordinators;
pub mod error;
pub mod policy;
pub mod poller;
pub mod ports;

// Re-exports
pub use coordinators::{
    ChunkPager, EmbedState, EmbeddingJobCoordinator, PagerOptions, PagerSnapshot,
    SliceJobCoordinator, SliceState,
};
pub use error::ApplicationError;
pub use policy::SlicePolicyManager;
pub use poller::{JobStatusPoller, PollEvent, PollHandle, PollerConfig};
pub use ports::{
    ChunkPage, ChunkStream, EmbedConfig, IndexType, KnowledgeServicePort, PreviewCachePort,
    SeparatorOption, ServiceError, SliceRules,
};
