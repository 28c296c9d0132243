//! Data Transfer Objects - 知识服务报文
//!
//! 字段名沿用服务端接口的既有拼写（camelCase，含 `seperator`）。
//! 分隔符只在这一层还原转义: 编辑态 `\\n` -> 线上 `\n`。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::application::ports::{
    ChunkPage, SeparatorOption, ServiceError, SliceRules,
};
use crate::domain::knowledge::{
    escape_separator, AuditSuggest, Chunk, FileId, FileStatus, FileSummary, LengthRange,
    SliceConfig, SliceKind,
};

/// 检索流的结束哨兵行
pub const STREAM_DONE_SENTINEL: &str = "[DONE]";

// ============================================================================
// 统一响应结构
// ============================================================================

/// 统一 API 响应格式
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub code: i32,
    #[serde(default)]
    pub message: String,
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    /// code 非 0 即业务失败
    pub fn into_data(self) -> Result<T, ServiceError> {
        self.ack()?;
        self.data
            .ok_or_else(|| ServiceError::InvalidResponse("missing data field".to_string()))
    }

    /// 只校验业务码，忽略 data（提交类接口返回空数据）
    pub fn ack(&self) -> Result<(), ServiceError> {
        if self.code != 0 {
            return Err(ServiceError::ServiceError(format!(
                "code {}: {}",
                self.code, self.message
            )));
        }
        Ok(())
    }
}

// ============================================================================
// 请求报文
// ============================================================================

#[derive(Debug, Serialize)]
pub struct SliceConfigDto {
    #[serde(rename = "type")]
    pub type_code: i32,
    /// 服务端接口的历史拼写
    pub seperator: Vec<String>,
    #[serde(rename = "lengthRange")]
    pub length_range: [u32; 2],
}

impl From<&SliceConfig> for SliceConfigDto {
    fn from(config: &SliceConfig) -> Self {
        Self {
            type_code: config.kind.as_code(),
            seperator: vec![config.wire_separator()],
            length_range: [config.length_range.min, config.length_range.max],
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SliceFilesRequest {
    #[serde(rename = "fileIds")]
    pub file_ids: Vec<String>,
    #[serde(rename = "sliceConfig")]
    pub slice_config: SliceConfigDto,
}

#[derive(Debug, Serialize)]
pub struct StatusRequest {
    #[serde(rename = "indexType")]
    pub index_type: i32,
    #[serde(rename = "fileIds")]
    pub file_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct PageRequest {
    #[serde(rename = "fileIds")]
    pub file_ids: Vec<String>,
    #[serde(rename = "pageNo")]
    pub page_no: u32,
    #[serde(rename = "pageSize")]
    pub page_size: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SearchRequest {
    #[serde(rename = "fileIds")]
    pub file_ids: Vec<String>,
    pub query: String,
}

#[derive(Debug, Serialize)]
pub struct EmbedRequest {
    #[serde(rename = "fileIds")]
    pub file_ids: Vec<String>,
    #[serde(rename = "repoId")]
    pub repo_id: String,
}

#[derive(Debug, Serialize)]
pub struct SummaryRequest {
    #[serde(rename = "fileIds")]
    pub file_ids: Vec<String>,
}

// ============================================================================
// 响应报文
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct FileStatusDto {
    #[serde(rename = "fileId")]
    pub file_id: String,
    pub status: i32,
    #[serde(default)]
    pub reason: Option<String>,
}

impl From<FileStatusDto> for FileStatus {
    fn from(dto: FileStatusDto) -> Self {
        Self {
            file_id: FileId::new(dto.file_id),
            status: dto.status,
            reason: dto.reason,
        }
    }
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct ChunkRecordDto {
    pub id: String,
    #[serde(rename = "chunkIndex", default)]
    pub chunk_index: u32,
    #[serde(default)]
    pub content: String,
    #[serde(rename = "charCount", default)]
    pub char_count: u32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(rename = "auditSuggest", default)]
    pub audit_suggest: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(rename = "createdAt", default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(rename = "updatedAt", default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<ChunkRecordDto> for Chunk {
    fn from(dto: ChunkRecordDto) -> Self {
        Self {
            id: dto.id,
            index: dto.chunk_index,
            content: dto.content,
            char_count: dto.char_count,
            enabled: dto.enabled,
            audit_suggest: dto
                .audit_suggest
                .as_deref()
                .map(AuditSuggest::from_str)
                .unwrap_or_default(),
            tags: dto.tags,
            created_at: dto.created_at,
            updated_at: dto.updated_at,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ExtMapDto {
    #[serde(rename = "auditBlockCount", default)]
    pub audit_block_count: usize,
}

#[derive(Debug, Deserialize)]
pub struct PageDataDto {
    #[serde(rename = "pageData", default)]
    pub page_data: Vec<ChunkRecordDto>,
    #[serde(rename = "totalCount", default)]
    pub total_count: usize,
    #[serde(rename = "extMap", default)]
    pub ext_map: ExtMapDto,
}

impl From<PageDataDto> for ChunkPage {
    fn from(dto: PageDataDto) -> Self {
        Self {
            chunks: dto.page_data.into_iter().map(Chunk::from).collect(),
            total: dto.total_count,
            audit_block_count: dto.ext_map.audit_block_count,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct FileSummaryDto {
    #[serde(rename = "fileId")]
    pub file_id: String,
    #[serde(rename = "sliceType", default)]
    pub slice_type: i32,
    #[serde(rename = "lengthRange", default)]
    pub length_range: Option<[u32; 2]>,
    #[serde(default)]
    pub seperator: Vec<String>,
    #[serde(rename = "charCount", default)]
    pub char_count: u64,
    #[serde(rename = "knowledgeCount", default)]
    pub knowledge_count: u64,
    #[serde(rename = "knowledgeAvgLength", default)]
    pub knowledge_avg_length: u64,
    #[serde(rename = "hitCount", default)]
    pub hit_count: u64,
}

impl From<FileSummaryDto> for FileSummary {
    fn from(dto: FileSummaryDto) -> Self {
        let length_range = dto
            .length_range
            .map(|[min, max]| LengthRange::new(min, max))
            .unwrap_or_default();
        let separator = dto
            .seperator
            .first()
            .map(|s| escape_separator(s))
            .unwrap_or_else(|| crate::domain::knowledge::ESCAPED_NEWLINE.to_string());
        Self {
            file_id: FileId::new(dto.file_id),
            slice_kind: SliceKind::from_code(dto.slice_type).unwrap_or(SliceKind::Automatic),
            length_range,
            separator,
            char_count: dto.char_count,
            knowledge_count: dto.knowledge_count,
            knowledge_avg_length: dto.knowledge_avg_length,
            hit_count: dto.hit_count,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SeparatorOptionDto {
    pub label: String,
    pub value: String,
}

#[derive(Debug, Deserialize)]
pub struct SliceRulesDto {
    #[serde(rename = "lengthRange", default)]
    pub length_range: Option<[u32; 2]>,
    #[serde(default)]
    pub seperators: Vec<SeparatorOptionDto>,
}

impl From<SliceRulesDto> for SliceRules {
    fn from(dto: SliceRulesDto) -> Self {
        let length_range = dto
            .length_range
            .map(|[min, max]| LengthRange::new(min, max))
            .unwrap_or_default();
        Self {
            default_config: SliceConfig::automatic(),
            length_range,
            separators: dto
                .seperators
                .into_iter()
                .map(|s| SeparatorOption {
                    label: s.label,
                    value: s.value,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::knowledge::ESCAPED_NEWLINE;

    #[test]
    fn test_slice_config_wire_format() {
        let config = SliceConfig::custom(ESCAPED_NEWLINE, LengthRange::new(1, 256));
        let dto = SliceConfigDto::from(&config);
        let json = serde_json::to_value(&dto).unwrap();

        // 提交时 type 为数字编码，分隔符已还原转义
        assert_eq!(json["type"], 1);
        assert_eq!(json["seperator"][0], "\n");
        assert_eq!(json["lengthRange"][0], 1);
        assert_eq!(json["lengthRange"][1], 256);
    }

    #[test]
    fn test_automatic_config_wire_format() {
        let dto = SliceConfigDto::from(&SliceConfig::automatic());
        let json = serde_json::to_value(&dto).unwrap();
        assert_eq!(json["type"], 0);
    }

    #[test]
    fn test_page_payload_decodes() {
        let payload = r#"{
            "pageData": [
                {"id": "k1", "chunkIndex": 1, "content": "第一段", "charCount": 3,
                 "auditSuggest": "block", "tags": ["t1"]}
            ],
            "totalCount": 42,
            "extMap": {"auditBlockCount": 2}
        }"#;
        let page: ChunkPage = serde_json::from_str::<PageDataDto>(payload).unwrap().into();

        assert_eq!(page.total, 42);
        assert_eq!(page.audit_block_count, 2);
        assert_eq!(page.chunks.len(), 1);
        assert_eq!(page.chunks[0].audit_suggest, AuditSuggest::Block);
        assert!(page.chunks[0].enabled);
    }

    #[test]
    fn test_envelope_rejects_nonzero_code() {
        let envelope: Envelope<i32> =
            serde_json::from_str(r#"{"code": 1001, "message": "bad request"}"#).unwrap();
        assert!(matches!(
            envelope.into_data(),
            Err(ServiceError::ServiceError(_))
        ));
    }

    #[test]
    fn test_envelope_ack_tolerates_null_data() {
        let envelope: Envelope<serde_json::Value> =
            serde_json::from_str(r#"{"code": 0, "message": "success", "data": null}"#).unwrap();
        assert!(envelope.ack().is_ok());
    }

    #[test]
    fn test_summary_escapes_separator_for_editing() {
        let payload = r#"{
            "fileId": "f1", "sliceType": 1, "lengthRange": [10, 200],
            "seperator": ["\n"], "charCount": 900,
            "knowledgeCount": 12, "knowledgeAvgLength": 75, "hitCount": 3
        }"#;
        let summary: FileSummary =
            serde_json::from_str::<FileSummaryDto>(payload).unwrap().into();

        assert_eq!(summary.slice_kind, SliceKind::Custom);
        assert_eq!(summary.separator, ESCAPED_NEWLINE);
        assert_eq!(summary.length_range, LengthRange::new(10, 200));
    }
}
