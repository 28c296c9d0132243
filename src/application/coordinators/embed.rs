//! Embedding Job Coordinator - 向量化作业协调
//!
//! 切片确认后的入库阶段。没有空闲态: 进入即提交，
//! Loading -> {Success | Failed | TimedOut}。成功后恰好发布一次
//! 列表页路由信号，并附带拉取一次技术参数摘要（摘要失败只记日志，
//! 不影响主状态）。失败后由操作者显式重试，从头重新提交——
//! 向量化没有断点续跑。

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::watch;

use crate::application::poller::{JobStatusPoller, PollEvent, PollHandle, PollerConfig};
use crate::application::ports::{EmbedConfig, IndexType, KnowledgeServicePort};
use crate::domain::knowledge::{status, FileId};
use crate::infrastructure::events::{EventPublisher, IngestEvent};

/// 向量化状态机
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbedState {
    Loading,
    Success,
    Failed,
    TimedOut,
}

/// 向量化作业协调器
#[derive(Clone)]
pub struct EmbeddingJobCoordinator {
    inner: Arc<EmbedInner>,
}

struct EmbedInner {
    file_id: FileId,
    service: Arc<dyn KnowledgeServicePort>,
    events: Arc<EventPublisher>,
    poller_config: PollerConfig,
    embed_config: EmbedConfig,
    state_tx: watch::Sender<EmbedState>,
    active_poll: Mutex<Option<PollHandle>>,
    epoch: AtomicU64,
    /// 路由信号只发一次
    navigated: AtomicBool,
}

impl EmbeddingJobCoordinator {
    /// 创建并立即提交向量化作业
    pub fn start(
        file_id: FileId,
        service: Arc<dyn KnowledgeServicePort>,
        events: Arc<EventPublisher>,
        embed_config: EmbedConfig,
        poller_config: PollerConfig,
    ) -> Self {
        let (state_tx, _) = watch::channel(EmbedState::Loading);
        let coordinator = Self {
            inner: Arc::new(EmbedInner {
                file_id,
                service,
                events,
                poller_config,
                embed_config,
                state_tx,
                active_poll: Mutex::new(None),
                epoch: AtomicU64::new(0),
                navigated: AtomicBool::new(false),
            }),
        };
        coordinator.spawn_run();
        coordinator
    }

    pub fn state(&self) -> EmbedState {
        *self.inner.state_tx.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<EmbedState> {
        self.inner.state_tx.subscribe()
    }

    /// 重试: 从头重新提交并轮询
    pub fn retry(&self) {
        self.spawn_run();
    }

    /// 离开视图时取消在途轮询
    pub fn cancel(&self) {
        self.inner.supersede();
    }

    fn spawn_run(&self) {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            run(inner).await;
        });
    }
}

async fn run(inner: Arc<EmbedInner>) {
    let epoch = inner.supersede();
    inner.set_state(EmbedState::Loading);

    tracing::info!(file_id = %inner.file_id, "Submitting embed job");
    if let Err(e) = inner
        .service
        .submit_embed_job(&inner.file_id, &inner.embed_config)
        .await
    {
        tracing::error!(file_id = %inner.file_id, error = %e, "Embed job submit failed");
        if inner.epoch.load(Ordering::SeqCst) == epoch {
            inner.set_state(EmbedState::Failed);
        }
        return;
    }
    if inner.epoch.load(Ordering::SeqCst) != epoch {
        return;
    }

    let service = inner.service.clone();
    let file_id = inner.file_id.clone();
    let fetch = move || {
        let service = service.clone();
        let file_id = file_id.clone();
        async move {
            service
                .get_job_status(IndexType::Embed, std::slice::from_ref(&file_id))
                .await
        }
    };
    let (handle, mut rx) = JobStatusPoller::start(
        inner.poller_config.clone(),
        fetch,
        status::embed_poll_finished,
    );
    *inner.active_poll.lock().unwrap() = Some(handle);

    while let Some(event) = rx.recv().await {
        if inner.epoch.load(Ordering::SeqCst) != epoch {
            return;
        }
        match event {
            PollEvent::Tick(_) => {}
            PollEvent::Done(snapshot) => {
                let succeeded = snapshot.iter().any(|s| status::embed_code_success(s.status));
                if succeeded {
                    if !inner.navigated.swap(true, Ordering::SeqCst) {
                        inner.events.publish(IngestEvent::NavigateToListing {
                            file_id: inner.file_id.clone(),
                        });
                    }
                    inner.set_state(EmbedState::Success);
                    tracing::info!(file_id = %inner.file_id, "Embed job completed");
                    fetch_summary(&inner).await;
                } else {
                    tracing::warn!(file_id = %inner.file_id, "Embed job failed");
                    inner.set_state(EmbedState::Failed);
                }
                return;
            }
            PollEvent::TimedOut => {
                tracing::warn!(file_id = %inner.file_id, "Embed job poll timed out");
                inner.set_state(EmbedState::TimedOut);
                return;
            }
            PollEvent::Error(e) => {
                tracing::error!(file_id = %inner.file_id, error = %e, "Embed status poll failed");
                inner.set_state(EmbedState::Failed);
                return;
            }
        }
    }
}

/// 技术参数摘要只作展示，拉取失败不改变向量化结果
async fn fetch_summary(inner: &Arc<EmbedInner>) {
    match inner.service.get_file_summary(&inner.file_id).await {
        Ok(summary) => {
            inner.events.publish(IngestEvent::FileSummaryReady {
                file_id: inner.file_id.clone(),
                summary,
            });
        }
        Err(e) => {
            tracing::warn!(
                file_id = %inner.file_id,
                error = %e,
                "File summary fetch failed (ignored)"
            );
        }
    }
}

impl EmbedInner {
    fn supersede(&self) -> u64 {
        self.active_poll.lock().unwrap().take();
        self.epoch.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn set_state(&self, state: EmbedState) {
        self.state_tx.send_replace(state);
        self.events.publish(IngestEvent::EmbedStateChanged {
            file_id: self.file_id.clone(),
            state,
        });
    }
}
