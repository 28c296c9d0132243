//! Knowledge Service Port - 外部知识服务抽象
//!
//! 切片与向量化均由外部服务异步执行；本端口覆盖提交、状态查询、
//! 预览分页、流式检索与技术参数摘要，具体实现在 infrastructure/adapters 层

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use thiserror::Error;

use crate::domain::knowledge::{
    Chunk, FileId, FileStatus, FileSummary, LengthRange, SliceConfig,
};

/// 知识服务错误
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Service error: {0}")]
    ServiceError(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// 状态查询的作业维度: 0 = 切片, 1 = 向量化
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexType {
    Slice,
    Embed,
}

impl IndexType {
    pub fn as_code(&self) -> i32 {
        match self {
            IndexType::Slice => 0,
            IndexType::Embed => 1,
        }
    }
}

/// 一页段落结果
#[derive(Debug, Clone)]
pub struct ChunkPage {
    pub chunks: Vec<Chunk>,
    pub total: usize,
    /// extMap.auditBlockCount: 审核违规段落总数
    pub audit_block_count: usize,
}

/// 向量化提交参数
#[derive(Debug, Clone)]
pub struct EmbedConfig {
    pub repo_id: String,
}

/// 分隔符候选项（服务端下发，label 供展示，value 为编辑态转义形式）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeparatorOption {
    pub label: String,
    pub value: String,
}

/// 服务端下发的切片规则
#[derive(Debug, Clone)]
pub struct SliceRules {
    /// 默认策略配置
    pub default_config: SliceConfig,
    /// 自定义策略允许的长度区间
    pub length_range: LengthRange,
    /// 自定义策略的分隔符候选
    pub separators: Vec<SeparatorOption>,
}

/// 流式检索结果: 每条消息一个段落，流以哨兵消息结束（由实现方消化）
pub type ChunkStream = BoxStream<'static, Result<Chunk, ServiceError>>;

/// Knowledge Service Port
#[async_trait]
pub trait KnowledgeServicePort: Send + Sync {
    /// 提交切片作业，仅返回受理确认；进度通过 [`get_job_status`] 轮询
    ///
    /// [`get_job_status`]: KnowledgeServicePort::get_job_status
    async fn submit_slice_job(
        &self,
        file_id: &FileId,
        config: &SliceConfig,
    ) -> Result<(), ServiceError>;

    /// 查询一批文件的作业状态快照
    async fn get_job_status(
        &self,
        index_type: IndexType,
        file_ids: &[FileId],
    ) -> Result<Vec<FileStatus>, ServiceError>;

    /// 分页拉取段落（经典 offset 分页，pageNo 从 1 开始）
    async fn list_chunks_page(
        &self,
        file_id: &FileId,
        page_no: u32,
        page_size: u32,
        query: Option<&str>,
    ) -> Result<ChunkPage, ServiceError>;

    /// 打开一条检索流，段落逐条到达
    async fn search_chunks(
        &self,
        file_id: &FileId,
        query: &str,
    ) -> Result<ChunkStream, ServiceError>;

    /// 提交向量化作业
    async fn submit_embed_job(
        &self,
        file_id: &FileId,
        config: &EmbedConfig,
    ) -> Result<(), ServiceError>;

    /// 技术参数摘要（只读展示，失败不影响主流程）
    async fn get_file_summary(&self, file_id: &FileId) -> Result<FileSummary, ServiceError>;

    /// 服务端切片规则（每个编辑会话获取一次）
    async fn get_slice_rules(&self) -> Result<SliceRules, ServiceError>;
}
