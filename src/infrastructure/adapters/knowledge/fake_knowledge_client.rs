//! Fake Knowledge Client - 用于测试的知识服务客户端
//!
//! 状态查询按预置脚本逐次返回，其余接口返回可配置的固定数据；
//! 不发起任何网络调用。附带调用计数与并发高水位，供断言使用。

use async_trait::async_trait;
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::application::ports::{
    ChunkPage, ChunkStream, EmbedConfig, IndexType, KnowledgeServicePort, SeparatorOption,
    ServiceError, SliceRules,
};
use crate::domain::knowledge::{
    AuditSuggest, Chunk, FileId, FileStatus, FileSummary, LengthRange, SliceConfig, SliceKind,
    ESCAPED_NEWLINE,
};

/// Fake Knowledge Client
pub struct FakeKnowledgeClient {
    slice_status_script: Mutex<VecDeque<Vec<FileStatus>>>,
    embed_status_script: Mutex<VecDeque<Vec<FileStatus>>>,

    slice_submits: AtomicUsize,
    embed_submits: AtomicUsize,
    status_calls: AtomicUsize,
    page_calls: AtomicUsize,

    active_status_fetches: AtomicUsize,
    max_concurrent_status_fetches: AtomicUsize,
    status_fetch_delay: Mutex<Duration>,

    total_chunks: AtomicUsize,
    audit_block_count: AtomicUsize,
    page_fetch_delay: Mutex<Duration>,
    search_hits: Mutex<Vec<Chunk>>,
    search_hit_delay: Mutex<Duration>,
    search_queries: Mutex<Vec<String>>,
    summary: Mutex<Option<FileSummary>>,

    fail_slice_submit: AtomicBool,
    fail_embed_submit: AtomicBool,
    fail_summary: AtomicBool,
    fail_page: AtomicBool,

    last_slice_config: Mutex<Option<SliceConfig>>,
    last_embed_config: Mutex<Option<EmbedConfig>>,
}

impl FakeKnowledgeClient {
    pub fn new() -> Self {
        Self {
            slice_status_script: Mutex::new(VecDeque::new()),
            embed_status_script: Mutex::new(VecDeque::new()),
            slice_submits: AtomicUsize::new(0),
            embed_submits: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
            page_calls: AtomicUsize::new(0),
            active_status_fetches: AtomicUsize::new(0),
            max_concurrent_status_fetches: AtomicUsize::new(0),
            status_fetch_delay: Mutex::new(Duration::ZERO),
            total_chunks: AtomicUsize::new(0),
            audit_block_count: AtomicUsize::new(0),
            page_fetch_delay: Mutex::new(Duration::ZERO),
            search_hits: Mutex::new(Vec::new()),
            search_hit_delay: Mutex::new(Duration::ZERO),
            search_queries: Mutex::new(Vec::new()),
            summary: Mutex::new(None),
            fail_slice_submit: AtomicBool::new(false),
            fail_embed_submit: AtomicBool::new(false),
            fail_summary: AtomicBool::new(false),
            fail_page: AtomicBool::new(false),
            last_slice_config: Mutex::new(None),
            last_embed_config: Mutex::new(None),
        }
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// 构造一个测试段落
    pub fn chunk(index: u32, content: &str) -> Chunk {
        Chunk {
            id: uuid::Uuid::new_v4().to_string(),
            index,
            content: content.to_string(),
            char_count: content.chars().count() as u32,
            enabled: true,
            audit_suggest: AuditSuggest::None,
            tags: Vec::new(),
            created_at: Some(Utc::now()),
            updated_at: None,
        }
    }

    // ---- 脚本与数据配置 ----

    /// 追加一帧切片状态快照（脚本耗尽后返回"处理中"）
    pub fn push_slice_status(&self, snapshot: Vec<FileStatus>) {
        self.slice_status_script.lock().unwrap().push_back(snapshot);
    }

    pub fn push_embed_status(&self, snapshot: Vec<FileStatus>) {
        self.embed_status_script.lock().unwrap().push_back(snapshot);
    }

    pub fn set_total_chunks(&self, total: usize) {
        self.total_chunks.store(total, Ordering::SeqCst);
    }

    pub fn set_audit_block_count(&self, count: usize) {
        self.audit_block_count.store(count, Ordering::SeqCst);
    }

    pub fn set_search_hits(&self, hits: Vec<Chunk>) {
        *self.search_hits.lock().unwrap() = hits;
    }

    /// 检索流中相邻两条命中之间的间隔
    pub fn set_search_hit_delay(&self, delay: Duration) {
        *self.search_hit_delay.lock().unwrap() = delay;
    }

    /// 状态查询的模拟耗时（用于并发高水位断言）
    pub fn set_status_fetch_delay(&self, delay: Duration) {
        *self.status_fetch_delay.lock().unwrap() = delay;
    }

    /// 分页拉取的模拟耗时
    pub fn set_page_fetch_delay(&self, delay: Duration) {
        *self.page_fetch_delay.lock().unwrap() = delay;
    }

    pub fn set_summary(&self, summary: FileSummary) {
        *self.summary.lock().unwrap() = Some(summary);
    }

    // ---- 故障注入 ----

    pub fn fail_next_slice_submit(&self, fail: bool) {
        self.fail_slice_submit.store(fail, Ordering::SeqCst);
    }

    pub fn fail_next_embed_submit(&self, fail: bool) {
        self.fail_embed_submit.store(fail, Ordering::SeqCst);
    }

    pub fn fail_summary_fetch(&self, fail: bool) {
        self.fail_summary.store(fail, Ordering::SeqCst);
    }

    pub fn fail_page_fetch(&self, fail: bool) {
        self.fail_page.store(fail, Ordering::SeqCst);
    }

    // ---- 断言辅助 ----

    pub fn slice_submit_count(&self) -> usize {
        self.slice_submits.load(Ordering::SeqCst)
    }

    pub fn embed_submit_count(&self) -> usize {
        self.embed_submits.load(Ordering::SeqCst)
    }

    pub fn status_call_count(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn page_call_count(&self) -> usize {
        self.page_calls.load(Ordering::SeqCst)
    }

    /// 同时在途状态查询的历史最大值
    pub fn max_concurrent_status_fetches(&self) -> usize {
        self.max_concurrent_status_fetches.load(Ordering::SeqCst)
    }

    pub fn last_slice_config(&self) -> Option<SliceConfig> {
        self.last_slice_config.lock().unwrap().clone()
    }

    pub fn last_embed_config(&self) -> Option<EmbedConfig> {
        self.last_embed_config.lock().unwrap().clone()
    }

    /// 实际打开过检索流的查询串
    pub fn search_queries(&self) -> Vec<String> {
        self.search_queries.lock().unwrap().clone()
    }

    fn page_chunks(&self, page_no: u32, page_size: u32) -> (Vec<Chunk>, usize) {
        let total = self.total_chunks.load(Ordering::SeqCst);
        let start = ((page_no.max(1) - 1) * page_size) as usize;
        let end = (start + page_size as usize).min(total);
        let chunks = (start..end)
            .map(|i| Self::chunk(i as u32 + 1, &format!("段落 {}", i + 1)))
            .collect();
        (chunks, total)
    }
}

impl Default for FakeKnowledgeClient {
    fn default() -> Self {
        Self::new()
    }
}

struct DecrementOnDrop<'a>(&'a AtomicUsize);

impl Drop for DecrementOnDrop<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl KnowledgeServicePort for FakeKnowledgeClient {
    async fn submit_slice_job(
        &self,
        file_id: &FileId,
        config: &SliceConfig,
    ) -> Result<(), ServiceError> {
        if self.fail_slice_submit.load(Ordering::SeqCst) {
            return Err(ServiceError::ServiceError(
                "slice submit rejected".to_string(),
            ));
        }
        self.slice_submits.fetch_add(1, Ordering::SeqCst);
        *self.last_slice_config.lock().unwrap() = Some(config.clone());
        tracing::debug!(file_id = %file_id, "FakeKnowledgeClient: slice job accepted");
        Ok(())
    }

    async fn get_job_status(
        &self,
        index_type: IndexType,
        file_ids: &[FileId],
    ) -> Result<Vec<FileStatus>, ServiceError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let active = self.active_status_fetches.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent_status_fetches
            .fetch_max(active, Ordering::SeqCst);
        // 拉取可能在途中被取消，计数回退挂在 Drop 上
        let _guard = DecrementOnDrop(&self.active_status_fetches);

        let delay = *self.status_fetch_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let script = match index_type {
            IndexType::Slice => &self.slice_status_script,
            IndexType::Embed => &self.embed_status_script,
        };
        let snapshot = script.lock().unwrap().pop_front().unwrap_or_else(|| {
            file_ids
                .iter()
                .map(|f| FileStatus::new(f.clone(), 0))
                .collect()
        });
        Ok(snapshot)
    }

    async fn list_chunks_page(
        &self,
        _file_id: &FileId,
        page_no: u32,
        page_size: u32,
        _query: Option<&str>,
    ) -> Result<ChunkPage, ServiceError> {
        if self.fail_page.load(Ordering::SeqCst) {
            return Err(ServiceError::ServiceError("page fetch failed".to_string()));
        }
        self.page_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.page_fetch_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let (chunks, total) = self.page_chunks(page_no, page_size);
        Ok(ChunkPage {
            chunks,
            total,
            audit_block_count: self.audit_block_count.load(Ordering::SeqCst),
        })
    }

    async fn search_chunks(
        &self,
        _file_id: &FileId,
        query: &str,
    ) -> Result<ChunkStream, ServiceError> {
        self.search_queries.lock().unwrap().push(query.to_string());
        let hits: VecDeque<Chunk> = self.search_hits.lock().unwrap().clone().into();
        let delay = *self.search_hit_delay.lock().unwrap();
        let stream = futures_util::stream::unfold((hits, delay), |(mut hits, delay)| async move {
            let chunk = hits.pop_front()?;
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            Some((Ok(chunk), (hits, delay)))
        });
        Ok(Box::pin(stream))
    }

    async fn submit_embed_job(
        &self,
        file_id: &FileId,
        config: &EmbedConfig,
    ) -> Result<(), ServiceError> {
        if self.fail_embed_submit.load(Ordering::SeqCst) {
            return Err(ServiceError::ServiceError(
                "embed submit rejected".to_string(),
            ));
        }
        self.embed_submits.fetch_add(1, Ordering::SeqCst);
        *self.last_embed_config.lock().unwrap() = Some(config.clone());
        tracing::debug!(file_id = %file_id, "FakeKnowledgeClient: embed job accepted");
        Ok(())
    }

    async fn get_file_summary(&self, file_id: &FileId) -> Result<FileSummary, ServiceError> {
        if self.fail_summary.load(Ordering::SeqCst) {
            return Err(ServiceError::ServiceError(
                "summary fetch failed".to_string(),
            ));
        }
        Ok(self.summary.lock().unwrap().clone().unwrap_or(FileSummary {
            file_id: file_id.clone(),
            slice_kind: SliceKind::Automatic,
            length_range: LengthRange::default(),
            separator: ESCAPED_NEWLINE.to_string(),
            char_count: 0,
            knowledge_count: self.total_chunks.load(Ordering::SeqCst) as u64,
            knowledge_avg_length: 0,
            hit_count: 0,
        }))
    }

    async fn get_slice_rules(&self) -> Result<SliceRules, ServiceError> {
        Ok(SliceRules {
            default_config: SliceConfig::automatic(),
            length_range: LengthRange::default(),
            separators: vec![SeparatorOption {
                label: "换行".to_string(),
                value: ESCAPED_NEWLINE.to_string(),
            }],
        })
    }
}
