//! Chunk Pager - 段落增量拉取
//!
//! 两种检索模式，同一文件视图同一时刻至多一个在途检索:
//! - 分页模式: 经典 offset 分页，滚动到底部触发追加
//! - 检索模式: 查询去抖后打开一条流，命中逐条到达
//!
//! 模式切换以代数 (generation) 标记在途请求，过期结果到达后丢弃。

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::application::error::ApplicationError;
use crate::application::ports::{ChunkPage, KnowledgeServicePort};
use crate::domain::knowledge::{Chunk, FileId, PreviewEntry};
use crate::infrastructure::events::{EventPublisher, IngestEvent};

/// 分页器选项
#[derive(Debug, Clone)]
pub struct PagerOptions {
    pub page_size: u32,
    /// 查询去抖窗口
    pub debounce: Duration,
}

impl Default for PagerOptions {
    fn default() -> Self {
        Self {
            page_size: 10,
            debounce: Duration::from_millis(500),
        }
    }
}

/// 分页器状态快照（UI 渲染用）
#[derive(Debug, Clone)]
pub struct PagerSnapshot {
    pub chunks: Vec<Chunk>,
    pub total: usize,
    pub violation_total: usize,
    pub has_more: bool,
    pub query: String,
    pub searching: bool,
}

#[derive(Debug, Default)]
struct PagerState {
    chunks: Vec<Chunk>,
    total: usize,
    violation_total: usize,
    /// 下一次追加拉取的页号
    next_page: u32,
    has_more: bool,
    query: String,
    searching: bool,
}

/// 段落分页器
#[derive(Clone)]
pub struct ChunkPager {
    inner: Arc<PagerInner>,
}

struct PagerInner {
    file_id: FileId,
    service: Arc<dyn KnowledgeServicePort>,
    events: Arc<EventPublisher>,
    page_size: u32,
    debounce: Duration,
    state: Mutex<PagerState>,
    /// 滚动触发的追加守卫: 在途时触发为空操作
    loading: AtomicBool,
    /// 检索代数，切换模式时自增，过期结果据此丢弃
    generation: AtomicU64,
    debounce_token: Mutex<Option<CancellationToken>>,
    stream_token: Mutex<Option<CancellationToken>>,
}

impl ChunkPager {
    pub fn new(
        file_id: FileId,
        service: Arc<dyn KnowledgeServicePort>,
        events: Arc<EventPublisher>,
        options: PagerOptions,
    ) -> Self {
        Self {
            inner: Arc::new(PagerInner {
                file_id,
                service,
                events,
                page_size: options.page_size,
                debounce: options.debounce,
                state: Mutex::new(PagerState {
                    next_page: 1,
                    ..Default::default()
                }),
                loading: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                debounce_token: Mutex::new(None),
                stream_token: Mutex::new(None),
            }),
        }
    }

    pub fn snapshot(&self) -> PagerSnapshot {
        let state = self.inner.state.lock().unwrap();
        PagerSnapshot {
            chunks: state.chunks.clone(),
            total: state.total,
            violation_total: state.violation_total,
            has_more: state.has_more,
            query: state.query.clone(),
            searching: state.searching,
        }
    }

    /// 清空展示数据并作废在途检索
    pub fn clear(&self) {
        self.inner.supersede();
        let mut state = self.inner.state.lock().unwrap();
        *state = PagerState {
            next_page: 1,
            ..Default::default()
        };
    }

    /// 用缓存条目直接填充（不触发网络调用）
    pub fn apply_cached(&self, entry: &PreviewEntry) {
        self.inner.supersede();
        let loaded = entry.chunks.len();
        {
            let mut state = self.inner.state.lock().unwrap();
            state.chunks = entry.chunks.clone();
            state.total = entry.total;
            state.violation_total = entry.violation_total;
            state.next_page = 2;
            state.has_more = loaded < entry.total;
            state.query.clear();
            state.searching = false;
        }
        self.inner.events.publish(IngestEvent::ChunksChanged {
            file_id: self.inner.file_id.clone(),
            loaded,
            total: entry.total,
        });
    }

    /// 拉取首页并重置游标，返回该页供调用方落缓存
    pub async fn load_first_page(&self) -> Result<ChunkPage, ApplicationError> {
        let inner = &self.inner;
        let generation = inner.supersede();
        inner.loading.store(true, Ordering::SeqCst);

        let result = inner
            .service
            .list_chunks_page(&inner.file_id, 1, inner.page_size, None)
            .await;
        inner.loading.store(false, Ordering::SeqCst);

        let page = result.map_err(ApplicationError::from)?;

        // 等待期间若有新检索启动，过期结果不落地
        if inner.generation.load(Ordering::SeqCst) == generation {
            let loaded = page.chunks.len();
            {
                let mut state = inner.state.lock().unwrap();
                state.chunks = page.chunks.clone();
                state.total = page.total;
                state.violation_total = page.audit_block_count;
                state.next_page = 2;
                state.has_more = loaded < page.total;
                state.query.clear();
                state.searching = false;
            }
            inner.events.publish(IngestEvent::ChunksChanged {
                file_id: inner.file_id.clone(),
                loaded,
                total: page.total,
            });
        }
        Ok(page)
    }

    /// 追加下一页
    ///
    /// 检索模式、无更多数据、或已有拉取在途时为空操作
    pub async fn load_more(&self) {
        let inner = &self.inner;
        let (next_page, proceed) = {
            let state = inner.state.lock().unwrap();
            (state.next_page, !state.searching && state.has_more)
        };
        if !proceed {
            return;
        }
        if inner.loading.swap(true, Ordering::SeqCst) {
            // 在途守卫: 滚动事件重复触发时直接忽略
            return;
        }

        let generation = inner.generation.load(Ordering::SeqCst);
        let result = inner
            .service
            .list_chunks_page(&inner.file_id, next_page, inner.page_size, None)
            .await;
        inner.loading.store(false, Ordering::SeqCst);

        let page = match result {
            Ok(page) => page,
            Err(e) => {
                tracing::warn!(file_id = %inner.file_id, error = %e, "Load more failed");
                return;
            }
        };
        if inner.generation.load(Ordering::SeqCst) != generation {
            return;
        }

        let (loaded, total) = {
            let mut state = inner.state.lock().unwrap();
            state.chunks.extend(page.chunks);
            state.total = page.total;
            state.violation_total = page.audit_block_count;
            state.next_page += 1;
            state.has_more = state.chunks.len() < page.total;
            (state.chunks.len(), state.total)
        };
        inner.events.publish(IngestEvent::ChunksChanged {
            file_id: inner.file_id.clone(),
            loaded,
            total,
        });
    }

    /// 滚动接近底部的触发入口
    pub fn notify_scroll_near_bottom(&self) {
        let pager = self.clone();
        tokio::spawn(async move {
            pager.load_more().await;
        });
    }

    /// 输入查询串，去抖后打开检索流；空查询回落到分页模式
    pub fn set_query(&self, query: &str) {
        let query = query.trim().to_string();
        {
            let mut state = self.inner.state.lock().unwrap();
            state.query = query.clone();
        }

        let token = CancellationToken::new();
        {
            let mut slot = self.inner.debounce_token.lock().unwrap();
            if let Some(previous) = slot.replace(token.clone()) {
                previous.cancel();
            }
        }

        let pager = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(pager.inner.debounce) => {
                    if query.is_empty() {
                        if let Err(e) = pager.load_first_page().await {
                            tracing::warn!(
                                file_id = %pager.inner.file_id,
                                error = %e,
                                "Reload after query cleared failed"
                            );
                        }
                    } else {
                        pager.run_search(query).await;
                    }
                }
            }
        });
    }

    async fn run_search(&self, query: String) {
        let inner = &self.inner;
        let generation = inner.supersede();
        let token = CancellationToken::new();
        *inner.stream_token.lock().unwrap() = Some(token.clone());

        {
            let mut state = inner.state.lock().unwrap();
            state.chunks.clear();
            state.total = 0;
            state.has_more = false;
            state.searching = true;
        }
        inner.events.publish(IngestEvent::ChunksChanged {
            file_id: inner.file_id.clone(),
            loaded: 0,
            total: 0,
        });

        let mut stream = match inner.service.search_chunks(&inner.file_id, &query).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!(file_id = %inner.file_id, error = %e, "Failed to open search stream");
                inner.state.lock().unwrap().searching = false;
                return;
            }
        };

        let mut hits = 0usize;
        loop {
            let item = tokio::select! {
                _ = token.cancelled() => break,
                item = stream.next() => item,
            };
            match item {
                Some(Ok(chunk)) => {
                    if inner.generation.load(Ordering::SeqCst) != generation {
                        break;
                    }
                    hits += 1;
                    let loaded = {
                        let mut state = inner.state.lock().unwrap();
                        state.chunks.push(chunk);
                        state.total = state.chunks.len();
                        state.chunks.len()
                    };
                    inner.events.publish(IngestEvent::ChunksChanged {
                        file_id: inner.file_id.clone(),
                        loaded,
                        total: loaded,
                    });
                }
                Some(Err(e)) => {
                    tracing::warn!(file_id = %inner.file_id, error = %e, "Search stream error");
                    break;
                }
                // 哨兵之后流结束
                None => {
                    if inner.generation.load(Ordering::SeqCst) == generation {
                        inner.events.publish(IngestEvent::SearchCompleted {
                            file_id: inner.file_id.clone(),
                            hits,
                        });
                    }
                    break;
                }
            }
        }
    }
}

impl PagerInner {
    /// 作废当前在途检索（分页或流式），返回新代数
    fn supersede(&self) -> u64 {
        if let Some(token) = self.stream_token.lock().unwrap().take() {
            token.cancel();
        }
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::adapters::FakeKnowledgeClient;

    fn setup(total: usize) -> (ChunkPager, Arc<FakeKnowledgeClient>) {
        let service = FakeKnowledgeClient::new().arc();
        service.set_total_chunks(total);
        let events = EventPublisher::new().arc();
        let pager = ChunkPager::new(
            FileId::new("f1"),
            service.clone(),
            events,
            PagerOptions::default(),
        );
        (pager, service)
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_more_appends_until_exhausted() {
        let (pager, service) = setup(25);

        pager.load_first_page().await.unwrap();
        let snap = pager.snapshot();
        assert_eq!(snap.chunks.len(), 10);
        assert_eq!(snap.total, 25);
        assert!(snap.has_more);

        pager.load_more().await;
        assert_eq!(pager.snapshot().chunks.len(), 20);
        assert!(pager.snapshot().has_more);

        pager.load_more().await;
        let snap = pager.snapshot();
        assert_eq!(snap.chunks.len(), 25);
        assert!(!snap.has_more);

        // 没有更多数据时不再发请求
        let calls = service.page_call_count();
        pager.load_more().await;
        assert_eq!(service.page_call_count(), calls);
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_more_noop_while_in_flight() {
        let (pager, service) = setup(30);
        pager.load_first_page().await.unwrap();
        service.set_page_fetch_delay(Duration::from_millis(200));

        let first = {
            let pager = pager.clone();
            tokio::spawn(async move { pager.load_more().await })
        };
        tokio::time::advance(Duration::from_millis(10)).await;
        // 第二次触发命中在途守卫
        pager.load_more().await;
        first.await.unwrap();

        // 首页 1 次 + 追加 1 次
        assert_eq!(service.page_call_count(), 2);
        assert_eq!(pager.snapshot().chunks.len(), 20);
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_debounced_single_stream() {
        let (pager, service) = setup(0);
        service.set_search_hits(vec![FakeKnowledgeClient::chunk(1, "命中")]);

        pager.set_query("知");
        tokio::time::advance(Duration::from_millis(200)).await;
        pager.set_query("知识");
        tokio::time::advance(Duration::from_millis(600)).await;
        tokio::task::yield_now().await;

        // 只有静默满 500ms 的查询真正打开了流
        assert_eq!(service.search_queries(), vec!["知识".to_string()]);
        assert_eq!(pager.snapshot().chunks.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_query_cancels_previous_stream() {
        let (pager, service) = setup(0);
        service.set_search_hits(vec![
            FakeKnowledgeClient::chunk(1, "旧流命中 1"),
            FakeKnowledgeClient::chunk(2, "旧流命中 2"),
            FakeKnowledgeClient::chunk(3, "旧流命中 3"),
        ]);
        service.set_search_hit_delay(Duration::from_millis(300));

        pager.set_query("旧");
        // 去抖结束、旧流刚吐出第一条
        tokio::time::advance(Duration::from_millis(900)).await;
        tokio::task::yield_now().await;

        service.set_search_hits(vec![FakeKnowledgeClient::chunk(1, "新流命中")]);
        service.set_search_hit_delay(Duration::ZERO);
        pager.set_query("新");
        tokio::time::advance(Duration::from_millis(600)).await;
        tokio::task::yield_now().await;

        let snap = pager.snapshot();
        assert_eq!(snap.chunks.len(), 1);
        assert_eq!(snap.chunks[0].content, "新流命中");
        assert_eq!(service.search_queries().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_supersedes_paginated_fetch() {
        let (pager, service) = setup(30);
        pager.load_first_page().await.unwrap();
        service.set_page_fetch_delay(Duration::from_millis(2000));
        service.set_search_hits(vec![FakeKnowledgeClient::chunk(1, "检索命中")]);

        let slow_page = {
            let pager = pager.clone();
            tokio::spawn(async move { pager.load_more().await })
        };
        tokio::time::advance(Duration::from_millis(10)).await;
        pager.set_query("检索");
        tokio::time::advance(Duration::from_millis(600)).await;
        tokio::task::yield_now().await;
        slow_page.await.unwrap();

        // 迟到的分页结果被代数检查丢弃
        let snap = pager.snapshot();
        assert!(snap.searching);
        assert_eq!(snap.chunks.len(), 1);
        assert_eq!(snap.chunks[0].content, "检索命中");
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_query_returns_to_paginated_mode() {
        let (pager, service) = setup(15);
        service.set_search_hits(vec![FakeKnowledgeClient::chunk(1, "命中")]);

        pager.set_query("q");
        tokio::time::advance(Duration::from_millis(600)).await;
        tokio::task::yield_now().await;
        assert!(pager.snapshot().searching);

        pager.set_query("");
        tokio::time::advance(Duration::from_millis(600)).await;
        tokio::task::yield_now().await;

        let snap = pager.snapshot();
        assert!(!snap.searching);
        assert_eq!(snap.chunks.len(), 10);
        assert_eq!(snap.total, 15);
    }

    #[tokio::test(start_paused = true)]
    async fn test_apply_cached_sets_cursor_past_first_page() {
        let (pager, service) = setup(0);
        service.set_total_chunks(25);
        let entry = PreviewEntry {
            chunks: (1..=10)
                .map(|i| FakeKnowledgeClient::chunk(i, &format!("缓存段落 {}", i)))
                .collect(),
            total: 25,
            violation_total: 2,
            fingerprint: "fp".to_string(),
        };

        pager.apply_cached(&entry);
        let snap = pager.snapshot();
        assert_eq!(snap.chunks.len(), 10);
        assert_eq!(snap.total, 25);
        assert_eq!(snap.violation_total, 2);
        assert!(snap.has_more);
        // 填充来自缓存，没有网络调用
        assert_eq!(service.page_call_count(), 0);

        // 缓存填充后的追加从第 2 页继续
        pager.load_more().await;
        assert_eq!(pager.snapshot().chunks.len(), 20);
    }
}
