//! Knowledge Context - Entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::value_objects::{FileId, LengthRange, SliceKind};

/// 内容审核结论
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AuditSuggest {
    /// 无风险
    #[default]
    None,
    /// 建议人工复核
    Review,
    /// 违规，建议屏蔽
    Block,
}

impl AuditSuggest {
    pub fn from_str(s: &str) -> Self {
        match s {
            "review" => AuditSuggest::Review,
            "block" => AuditSuggest::Block,
            _ => AuditSuggest::None,
        }
    }

    pub fn is_violation(&self) -> bool {
        matches!(self, AuditSuggest::Block)
    }
}

/// 知识段落（切片产物）
///
/// 段落由切片作业产出后不再被协调层修改；启用/禁用、编辑
/// 属于针对单个段落的带外操作
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    /// 展示序号，从 1 开始
    pub index: u32,
    pub content: String,
    pub char_count: u32,
    pub enabled: bool,
    pub audit_suggest: AuditSuggest,
    pub tags: Vec<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// 单个文件的状态快照行
///
/// `status` 为知识服务返回的原始状态码，语义见 `status` 模块
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStatus {
    pub file_id: FileId,
    pub status: i32,
    pub reason: Option<String>,
}

impl FileStatus {
    pub fn new(file_id: FileId, status: i32) -> Self {
        Self {
            file_id,
            status,
            reason: None,
        }
    }
}

/// 预览缓存条目: 一次成功切片的首屏结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewEntry {
    pub chunks: Vec<Chunk>,
    pub total: usize,
    /// 审核违规段落总数
    pub violation_total: usize,
    /// 产生该结果的切片配置指纹
    pub fingerprint: String,
}

/// 文件技术参数摘要（只读展示）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSummary {
    pub file_id: FileId,
    pub slice_kind: SliceKind,
    pub length_range: LengthRange,
    /// 编辑态（转义后）的分隔符
    pub separator: String,
    pub char_count: u64,
    pub knowledge_count: u64,
    pub knowledge_avg_length: u64,
    pub hit_count: u64,
}
