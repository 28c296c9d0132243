//! HTTP Knowledge Client - 调用外部知识服务
//!
//! 实现 KnowledgeServicePort trait，通过 HTTP 调用知识服务
//!
//! 外部 API（统一信封 {code, message, data}，code 0 为成功）:
//! - POST /api/v2/knowledge/slice      提交切片作业
//! - POST /api/v2/knowledge/status     作业状态快照
//! - POST /api/v2/knowledge/preview/page  预览分页
//! - POST /api/v2/knowledge/search/stream 检索流（NDJSON，`[DONE]` 结束）
//! - POST /api/v2/knowledge/embedding  提交向量化作业
//! - POST /api/v2/knowledge/summary    技术参数摘要
//! - GET  /api/v2/knowledge/slice-rules 切片规则

use async_trait::async_trait;
use futures_util::{StreamExt, TryStreamExt};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tokio::io::AsyncBufReadExt;
use tokio_util::io::StreamReader;

use crate::application::ports::{
    ChunkPage, ChunkStream, EmbedConfig, IndexType, KnowledgeServicePort, ServiceError,
    SliceRules,
};
use crate::domain::knowledge::{Chunk, FileId, FileStatus, FileSummary, SliceConfig};

use super::dto::{
    ChunkRecordDto, EmbedRequest, Envelope, FileStatusDto, FileSummaryDto, PageDataDto,
    PageRequest, SearchRequest, SliceConfigDto, SliceFilesRequest, SliceRulesDto, StatusRequest,
    SummaryRequest, STREAM_DONE_SENTINEL,
};

/// HTTP 知识服务客户端配置
#[derive(Debug, Clone)]
pub struct HttpKnowledgeClientConfig {
    /// 知识服务基础 URL
    pub base_url: String,
    /// 请求超时时间（秒）
    pub timeout_secs: u64,
}

impl Default for HttpKnowledgeClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            timeout_secs: 30,
        }
    }
}

impl HttpKnowledgeClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

/// HTTP 知识服务客户端
pub struct HttpKnowledgeClient {
    client: Client,
    config: HttpKnowledgeClientConfig,
}

impl HttpKnowledgeClient {
    /// 创建新的 HTTP 知识服务客户端
    pub fn new(config: HttpKnowledgeClientConfig) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ServiceError::NetworkError(e.to_string()))?;

        Ok(Self { client, config })
    }

    /// 使用默认配置创建客户端
    pub fn with_default_config() -> Result<Self, ServiceError> {
        Self::new(HttpKnowledgeClientConfig::default())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    async fn post_envelope<B, T>(&self, path: &str, body: &B) -> Result<T, ServiceError>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(map_send_error)?;

        read_envelope(response).await?.into_data()
    }

    /// 提交类接口只关心业务码，data 为空
    async fn post_ack<B>(&self, path: &str, body: &B) -> Result<(), ServiceError>
    where
        B: Serialize + Sync,
    {
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(map_send_error)?;

        read_envelope::<serde_json::Value>(response).await?.ack()
    }
}

fn map_send_error(e: reqwest::Error) -> ServiceError {
    if e.is_timeout() {
        ServiceError::Timeout
    } else if e.is_connect() {
        ServiceError::NetworkError(format!("Cannot connect to knowledge service: {}", e))
    } else {
        ServiceError::NetworkError(e.to_string())
    }
}

async fn read_envelope<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<Envelope<T>, ServiceError> {
    let status = response.status();
    if !status.is_success() {
        let error_text = response.text().await.unwrap_or_default();
        return Err(ServiceError::ServiceError(format!(
            "HTTP {}: {}",
            status, error_text
        )));
    }
    response
        .json()
        .await
        .map_err(|e| ServiceError::InvalidResponse(e.to_string()))
}

#[async_trait]
impl KnowledgeServicePort for HttpKnowledgeClient {
    async fn submit_slice_job(
        &self,
        file_id: &FileId,
        config: &SliceConfig,
    ) -> Result<(), ServiceError> {
        let request = SliceFilesRequest {
            file_ids: vec![file_id.as_str().to_string()],
            slice_config: SliceConfigDto::from(config),
        };

        tracing::debug!(
            file_id = %file_id,
            kind = config.kind.as_code(),
            "Submitting slice job"
        );

        self.post_ack("/api/v2/knowledge/slice", &request).await
    }

    async fn get_job_status(
        &self,
        index_type: IndexType,
        file_ids: &[FileId],
    ) -> Result<Vec<FileStatus>, ServiceError> {
        let request = StatusRequest {
            index_type: index_type.as_code(),
            file_ids: file_ids.iter().map(|f| f.as_str().to_string()).collect(),
        };

        let rows: Vec<FileStatusDto> = self
            .post_envelope("/api/v2/knowledge/status", &request)
            .await?;
        Ok(rows.into_iter().map(FileStatus::from).collect())
    }

    async fn list_chunks_page(
        &self,
        file_id: &FileId,
        page_no: u32,
        page_size: u32,
        query: Option<&str>,
    ) -> Result<ChunkPage, ServiceError> {
        let request = PageRequest {
            file_ids: vec![file_id.as_str().to_string()],
            page_no,
            page_size,
            query: query.map(|q| q.to_string()),
        };

        let page: PageDataDto = self
            .post_envelope("/api/v2/knowledge/preview/page", &request)
            .await?;
        Ok(page.into())
    }

    async fn search_chunks(
        &self,
        file_id: &FileId,
        query: &str,
    ) -> Result<ChunkStream, ServiceError> {
        let request = SearchRequest {
            file_ids: vec![file_id.as_str().to_string()],
            query: query.to_string(),
        };

        let response = self
            .client
            .post(self.url("/api/v2/knowledge/search/stream"))
            .json(&request)
            .send()
            .await
            .map_err(map_send_error)?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ServiceError::ServiceError(format!(
                "HTTP {}: {}",
                status, error_text
            )));
        }

        // 每行一条 JSON 段落记录，`[DONE]` 哨兵行结束
        let byte_stream = Box::pin(
            response
                .bytes_stream()
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)),
        );
        let lines = StreamReader::new(byte_stream).lines();

        let stream = futures_util::stream::unfold(Some(lines), |state| async move {
            let mut lines = state?;
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        if line == STREAM_DONE_SENTINEL {
                            return None;
                        }
                        return match serde_json::from_str::<ChunkRecordDto>(line) {
                            Ok(record) => Some((Ok(Chunk::from(record)), Some(lines))),
                            Err(e) => Some((
                                Err(ServiceError::InvalidResponse(format!(
                                    "Bad chunk record: {}",
                                    e
                                ))),
                                Some(lines),
                            )),
                        };
                    }
                    Ok(None) => return None,
                    Err(e) => {
                        return Some((Err(ServiceError::NetworkError(e.to_string())), None))
                    }
                }
            }
        });
        Ok(stream.boxed())
    }

    async fn submit_embed_job(
        &self,
        file_id: &FileId,
        config: &EmbedConfig,
    ) -> Result<(), ServiceError> {
        let request = EmbedRequest {
            file_ids: vec![file_id.as_str().to_string()],
            repo_id: config.repo_id.clone(),
        };

        tracing::debug!(file_id = %file_id, repo_id = %config.repo_id, "Submitting embed job");

        self.post_ack("/api/v2/knowledge/embedding", &request).await
    }

    async fn get_file_summary(&self, file_id: &FileId) -> Result<FileSummary, ServiceError> {
        let request = SummaryRequest {
            file_ids: vec![file_id.as_str().to_string()],
        };

        let summary: FileSummaryDto = self
            .post_envelope("/api/v2/knowledge/summary", &request)
            .await?;
        Ok(summary.into())
    }

    async fn get_slice_rules(&self) -> Result<SliceRules, ServiceError> {
        let response = self
            .client
            .get(self.url("/api/v2/knowledge/slice-rules"))
            .send()
            .await
            .map_err(map_send_error)?;

        let rules: SliceRulesDto = read_envelope(response).await?.into_data()?;
        Ok(rules.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = HttpKnowledgeClientConfig::default();
        assert_eq!(config.base_url, "http://localhost:8080");
        assert_eq!(config.timeout_secs, 30);
    }

    #[test]
    fn test_config_builder() {
        let config = HttpKnowledgeClientConfig::new("http://kb.internal:9090").with_timeout(60);
        assert_eq!(config.base_url, "http://kb.internal:9090");
        assert_eq!(config.timeout_secs, 60);
    }
}
