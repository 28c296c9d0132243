//! Event Publisher Implementation
//!
//! 文件视图事件推送: 每个打开的文件一条 broadcast 通道，
//! 协调器发布状态变化，UI 侧订阅渲染

use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::application::coordinators::{EmbedState, SliceState};
use crate::domain::knowledge::{FileId, FileStatus, FileSummary, VariantTag};

/// 文件视图事件
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum IngestEvent {
    /// 切片状态机变化
    SliceStateChanged { file_id: FileId, state: SliceState },
    /// 每个轮询 tick 重新推导的失败文件子集
    SliceProgress {
        file_id: FileId,
        failed: Vec<FileStatus>,
    },
    /// 预览区已清空（新作业提交前 / 无缓存的变体切换）
    PreviewCleared { file_id: FileId },
    /// 预览首屏就绪
    PreviewReady {
        file_id: FileId,
        variant: VariantTag,
        total: usize,
        violation_total: usize,
        from_cache: bool,
    },
    /// 向量化状态机变化
    EmbedStateChanged { file_id: FileId, state: EmbedState },
    /// 向量化成功，路由到段落列表页
    NavigateToListing { file_id: FileId },
    /// 技术参数摘要就绪
    FileSummaryReady {
        file_id: FileId,
        summary: FileSummary,
    },
    /// 分页器内容变化（追加页 / 检索命中到达）
    ChunksChanged {
        file_id: FileId,
        loaded: usize,
        total: usize,
    },
    /// 检索流结束
    SearchCompleted { file_id: FileId, hits: usize },
}

impl IngestEvent {
    pub fn file_id(&self) -> &FileId {
        match self {
            IngestEvent::SliceStateChanged { file_id, .. }
            | IngestEvent::SliceProgress { file_id, .. }
            | IngestEvent::PreviewCleared { file_id }
            | IngestEvent::PreviewReady { file_id, .. }
            | IngestEvent::EmbedStateChanged { file_id, .. }
            | IngestEvent::NavigateToListing { file_id }
            | IngestEvent::FileSummaryReady { file_id, .. }
            | IngestEvent::ChunksChanged { file_id, .. }
            | IngestEvent::SearchCompleted { file_id, .. } => file_id,
        }
    }
}

/// 事件发布器
pub struct EventPublisher {
    /// file_id -> broadcast sender
    view_channels: DashMap<FileId, broadcast::Sender<IngestEvent>>,
}

impl EventPublisher {
    pub fn new() -> Self {
        Self {
            view_channels: DashMap::new(),
        }
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// 注册文件视图的事件通道
    pub fn register_view(&self, file_id: &FileId) -> broadcast::Receiver<IngestEvent> {
        if let Some(sender) = self.view_channels.get(file_id) {
            return sender.subscribe();
        }

        let (tx, rx) = broadcast::channel(100);
        self.view_channels.insert(file_id.clone(), tx);
        rx
    }

    /// 取消注册文件视图（离开视图时调用，通道随之关闭）
    pub fn unregister_view(&self, file_id: &FileId) {
        self.view_channels.remove(file_id);
    }

    /// 获取已注册视图的事件接收器
    pub fn subscribe(&self, file_id: &FileId) -> Option<broadcast::Receiver<IngestEvent>> {
        self.view_channels.get(file_id).map(|s| s.subscribe())
    }

    /// 发布事件到所属文件视图
    pub fn publish(&self, event: IngestEvent) {
        if let Some(sender) = self.view_channels.get(event.file_id()) {
            if let Err(e) = sender.send(event) {
                tracing::debug!(error = %e, "Failed to publish event (no receivers)");
            }
        }
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new()
    }
}
