//! Slice Job Coordinator - 切片作业协调
//!
//! 驱动单个文件的切片作业: 提交 -> 轮询 -> 拉取预览首屏 -> 落缓存。
//! 状态机 Idle -> Submitting -> Polling -> {Success | Failed | TimedOut}，
//! 按变体切换可重入。命中预览缓存的变体切换是同步的，不提交作业。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::watch;

use crate::application::coordinators::pager::ChunkPager;
use crate::application::error::ApplicationError;
use crate::application::poller::{JobStatusPoller, PollEvent, PollHandle, PollerConfig};
use crate::application::ports::{IndexType, KnowledgeServicePort, PreviewCachePort};
use crate::domain::knowledge::{
    status, FileId, FileStatus, PreviewEntry, SliceConfig, VariantTag,
};
use crate::infrastructure::events::{EventPublisher, IngestEvent};

/// 切片状态机
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SliceState {
    Idle,
    Submitting,
    Polling,
    Success,
    Failed,
    TimedOut,
}

impl SliceState {
    /// 是否有作业在进行（提交中或轮询中）
    pub fn in_progress(&self) -> bool {
        matches!(self, SliceState::Submitting | SliceState::Polling)
    }
}

/// 切片作业协调器
#[derive(Clone)]
pub struct SliceJobCoordinator {
    inner: Arc<SliceInner>,
}

struct SliceInner {
    file_id: FileId,
    service: Arc<dyn KnowledgeServicePort>,
    cache: Arc<dyn PreviewCachePort>,
    events: Arc<EventPublisher>,
    pager: ChunkPager,
    poller_config: PollerConfig,
    default_config: SliceConfig,
    state_tx: watch::Sender<SliceState>,
    variant: Mutex<VariantTag>,
    active_poll: Mutex<Option<PollHandle>>,
    /// 重试时复用的最近一次提交
    last_submitted: Mutex<Option<(VariantTag, SliceConfig)>>,
    failed: Mutex<Vec<FileStatus>>,
    /// 作业代数: 新作业/变体切换自增，过期的轮询消费者据此退出
    epoch: AtomicU64,
}

impl SliceJobCoordinator {
    pub fn new(
        file_id: FileId,
        service: Arc<dyn KnowledgeServicePort>,
        cache: Arc<dyn PreviewCachePort>,
        events: Arc<EventPublisher>,
        pager: ChunkPager,
        default_config: SliceConfig,
        poller_config: PollerConfig,
    ) -> Self {
        let (state_tx, _) = watch::channel(SliceState::Idle);
        Self {
            inner: Arc::new(SliceInner {
                file_id,
                service,
                cache,
                events,
                pager,
                poller_config,
                default_config,
                state_tx,
                variant: Mutex::new(VariantTag::Default),
                active_poll: Mutex::new(None),
                last_submitted: Mutex::new(None),
                failed: Mutex::new(Vec::new()),
                epoch: AtomicU64::new(0),
            }),
        }
    }

    pub fn state(&self) -> SliceState {
        *self.inner.state_tx.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SliceState> {
        self.inner.state_tx.subscribe()
    }

    pub fn variant(&self) -> VariantTag {
        *self.inner.variant.lock().unwrap()
    }

    /// 最近一次快照中的失败文件子集
    pub fn failed_files(&self) -> Vec<FileStatus> {
        self.inner.failed.lock().unwrap().clone()
    }

    /// 下一步（向量化）是否可进入
    pub fn can_advance(&self) -> bool {
        self.state() == SliceState::Success
    }

    /// 选择默认策略
    ///
    /// 命中缓存时同步完成；否则提交默认配置的切片作业
    pub async fn select_default(&self) -> Result<(), ApplicationError> {
        if self.is_active_variant(VariantTag::Default) {
            return Ok(());
        }
        self.inner.supersede();
        *self.inner.variant.lock().unwrap() = VariantTag::Default;

        if let Some(entry) = self.inner.cache.get(&self.inner.file_id, VariantTag::Default) {
            self.apply_cache_hit(VariantTag::Default, entry);
            return Ok(());
        }
        let config = self.inner.default_config.clone();
        self.run_job(VariantTag::Default, config).await
    }

    /// 选择自定义策略
    ///
    /// 取消在途轮询；命中缓存直接展示，否则清空预览等待显式触发
    pub async fn select_custom(&self) -> Result<(), ApplicationError> {
        if self.is_active_variant(VariantTag::Custom) {
            return Ok(());
        }
        self.inner.supersede();
        *self.inner.variant.lock().unwrap() = VariantTag::Custom;

        if let Some(entry) = self.inner.cache.get(&self.inner.file_id, VariantTag::Custom) {
            self.apply_cache_hit(VariantTag::Custom, entry);
        } else {
            self.inner.pager.clear();
            self.inner.set_state(SliceState::Idle);
            self.inner.events.publish(IngestEvent::PreviewCleared {
                file_id: self.inner.file_id.clone(),
            });
        }
        Ok(())
    }

    /// 显式触发自定义预览
    ///
    /// 自定义配置可任意变化，旧缓存视为过期，先清再跑
    pub async fn preview_custom(&self, config: SliceConfig) -> Result<(), ApplicationError> {
        self.inner
            .cache
            .clear(&self.inner.file_id, VariantTag::Custom);
        self.run_job(VariantTag::Custom, config).await
    }

    /// 离开视图时取消在途轮询
    pub fn cancel(&self) {
        self.inner.supersede();
        if self.state().in_progress() {
            self.inner.set_state(SliceState::Idle);
        }
    }

    /// 重试: 复用最近一次提交的配置重新进入 Submitting
    pub async fn retry(&self) -> Result<(), ApplicationError> {
        let (variant, config) = self
            .inner
            .last_submitted
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| ApplicationError::invalid_state("no slice job submitted yet"))?;
        self.run_job(variant, config).await
    }

    /// 选中的就是正在跑的变体时不重复提交
    fn is_active_variant(&self, variant: VariantTag) -> bool {
        *self.inner.variant.lock().unwrap() == variant && self.state().in_progress()
    }

    fn apply_cache_hit(&self, variant: VariantTag, entry: PreviewEntry) {
        tracing::debug!(
            file_id = %self.inner.file_id,
            variant = %variant,
            "Preview cache hit, skipping slice job"
        );
        self.inner.pager.apply_cached(&entry);
        self.inner.set_state(SliceState::Success);
        self.inner.events.publish(IngestEvent::PreviewReady {
            file_id: self.inner.file_id.clone(),
            variant,
            total: entry.total,
            violation_total: entry.violation_total,
            from_cache: true,
        });
    }

    async fn run_job(
        &self,
        variant: VariantTag,
        config: SliceConfig,
    ) -> Result<(), ApplicationError> {
        let inner = &self.inner;
        let epoch = inner.supersede();

        *inner.variant.lock().unwrap() = variant;
        *inner.last_submitted.lock().unwrap() = Some((variant, config.clone()));
        inner.failed.lock().unwrap().clear();

        inner.set_state(SliceState::Submitting);
        inner.pager.clear();
        inner.events.publish(IngestEvent::PreviewCleared {
            file_id: inner.file_id.clone(),
        });

        tracing::info!(
            file_id = %inner.file_id,
            variant = %variant,
            fingerprint = %config.fingerprint(),
            "Submitting slice job"
        );

        if let Err(e) = inner.service.submit_slice_job(&inner.file_id, &config).await {
            tracing::error!(file_id = %inner.file_id, error = %e, "Slice job submit failed");
            // 提交失败没有产生作业，回到 Idle，不进入轮询
            if inner.epoch.load(Ordering::SeqCst) == epoch {
                inner.set_state(SliceState::Idle);
            }
            return Err(e.into());
        }
        if inner.epoch.load(Ordering::SeqCst) != epoch {
            // 等待确认期间被新作业取代
            return Ok(());
        }

        inner.set_state(SliceState::Polling);

        let service = inner.service.clone();
        let file_id = inner.file_id.clone();
        let fetch = move || {
            let service = service.clone();
            let file_id = file_id.clone();
            async move {
                service
                    .get_job_status(IndexType::Slice, std::slice::from_ref(&file_id))
                    .await
            }
        };
        let (handle, rx) = JobStatusPoller::start(
            inner.poller_config.clone(),
            fetch,
            status::slice_poll_finished,
        );
        *inner.active_poll.lock().unwrap() = Some(handle);

        let consumer = inner.clone();
        let fingerprint = config.fingerprint();
        tokio::spawn(async move {
            consume_poll(consumer, epoch, variant, fingerprint, rx).await;
        });
        Ok(())
    }
}

async fn consume_poll(
    inner: Arc<SliceInner>,
    epoch: u64,
    variant: VariantTag,
    fingerprint: String,
    mut rx: tokio::sync::mpsc::Receiver<PollEvent>,
) {
    while let Some(event) = rx.recv().await {
        if inner.epoch.load(Ordering::SeqCst) != epoch {
            // 已被新作业取代，剩余事件作废
            return;
        }
        match event {
            PollEvent::Tick(snapshot) => {
                let failed = status::slice_failed_subset(&snapshot);
                *inner.failed.lock().unwrap() = failed.clone();
                inner.events.publish(IngestEvent::SliceProgress {
                    file_id: inner.file_id.clone(),
                    failed,
                });
            }
            PollEvent::Done(snapshot) => {
                let failed = status::slice_failed_subset(&snapshot);
                *inner.failed.lock().unwrap() = failed.clone();
                if !failed.is_empty() {
                    tracing::warn!(
                        file_id = %inner.file_id,
                        failed = failed.len(),
                        "Slice job failed"
                    );
                    inner.set_state(SliceState::Failed);
                    return;
                }

                match inner.pager.load_first_page().await {
                    Ok(page) => {
                        if inner.epoch.load(Ordering::SeqCst) != epoch {
                            return;
                        }
                        let entry = PreviewEntry {
                            chunks: page.chunks,
                            total: page.total,
                            violation_total: page.audit_block_count,
                            fingerprint: fingerprint.clone(),
                        };
                        inner.cache.put(&inner.file_id, variant, entry.clone());
                        inner.set_state(SliceState::Success);
                        inner.events.publish(IngestEvent::PreviewReady {
                            file_id: inner.file_id.clone(),
                            variant,
                            total: entry.total,
                            violation_total: entry.violation_total,
                            from_cache: false,
                        });
                        tracing::info!(
                            file_id = %inner.file_id,
                            variant = %variant,
                            total = entry.total,
                            "Slice job completed"
                        );
                    }
                    Err(e) => {
                        tracing::error!(
                            file_id = %inner.file_id,
                            error = %e,
                            "Preview fetch after slice failed"
                        );
                        if inner.epoch.load(Ordering::SeqCst) == epoch {
                            inner.set_state(SliceState::Failed);
                        }
                    }
                }
                return;
            }
            PollEvent::TimedOut => {
                tracing::warn!(file_id = %inner.file_id, "Slice job poll timed out");
                inner.set_state(SliceState::TimedOut);
                return;
            }
            PollEvent::Error(e) => {
                tracing::error!(file_id = %inner.file_id, error = %e, "Slice status poll failed");
                inner.set_state(SliceState::Failed);
                return;
            }
        }
    }
}

impl SliceInner {
    /// 取消在途轮询并推进代数；返回新代数
    fn supersede(&self) -> u64 {
        self.active_poll.lock().unwrap().take();
        self.epoch.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn set_state(&self, state: SliceState) {
        self.state_tx.send_replace(state);
        self.events.publish(IngestEvent::SliceStateChanged {
            file_id: self.file_id.clone(),
            state,
        });
    }
}
