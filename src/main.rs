//! Krill - 知识库切片与向量化协调器
//!
//! 驱动入口: 把一个文件走完 切片 -> 预览 -> 向量化 的完整链路，
//! 进度通过事件订阅打印。文件 ID 由第一个参数给出，
//! 知识服务地址等见配置（config.toml / KRILL_ 环境变量）。

use std::sync::Arc;
use std::time::Duration;

use krill::application::{
    ChunkPager, EmbedConfig, EmbedState, EmbeddingJobCoordinator, KnowledgeServicePort,
    PagerOptions, PreviewCachePort, SliceJobCoordinator, SlicePolicyManager, SliceState,
};
use krill::config::{load_config, print_config};
use krill::domain::knowledge::FileId;
use krill::infrastructure::adapters::{HttpKnowledgeClient, HttpKnowledgeClientConfig};
use krill::infrastructure::events::EventPublisher;
use krill::infrastructure::memory::InMemoryPreviewCache;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 加载配置（优先级：环境变量 > 配置文件 > 默认值）
    let config = load_config().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

    // 初始化日志
    let log_filter = format!("{},krill={}", config.log.level, config.log.level);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_filter)),
        )
        .init();

    tracing::info!("Krill - 知识库切片与向量化协调器");
    print_config(&config);

    let file_id = FileId::new(
        std::env::args()
            .nth(1)
            .ok_or_else(|| anyhow::anyhow!("usage: krill <file-id> [repo-id]"))?,
    );
    let repo_id = std::env::args().nth(2).unwrap_or_else(|| "default".to_string());

    // 创建 HTTP 知识服务客户端
    let client_config = HttpKnowledgeClientConfig {
        base_url: config.service.base_url.clone(),
        timeout_secs: config.service.timeout_secs,
    };
    let service: Arc<dyn KnowledgeServicePort> =
        Arc::new(HttpKnowledgeClient::new(client_config)?);

    // 创建预览缓存与事件发布器
    let cache: Arc<dyn PreviewCachePort> = InMemoryPreviewCache::new().arc();
    let events = EventPublisher::new().arc();
    let mut event_rx = events.register_view(&file_id);

    // 事件打印任务
    tokio::spawn(async move {
        while let Ok(event) = event_rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => tracing::info!(event = %json, "Ingest event"),
                Err(e) => tracing::warn!(error = %e, "Failed to serialize event"),
            }
        }
    });

    // 拉取服务端切片规则并初始化策略管理器
    let rules = service
        .get_slice_rules()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to fetch slice rules: {}", e))?;
    let policy = SlicePolicyManager::new(rules, Duration::from_millis(config.policy.settle_ms));

    let pager = ChunkPager::new(
        file_id.clone(),
        service.clone(),
        events.clone(),
        PagerOptions {
            page_size: config.preview.page_size,
            debounce: Duration::from_millis(config.search.debounce_ms),
        },
    );
    let slice = SliceJobCoordinator::new(
        file_id.clone(),
        service.clone(),
        cache,
        events.clone(),
        pager.clone(),
        policy.default_config(),
        config.poll.poller_config(),
    );

    // 阶段一: 默认策略切片
    tracing::info!(file_id = %file_id, "Starting slice stage");
    slice.select_default().await?;

    let mut slice_rx = slice.subscribe_state();
    loop {
        let state = *slice_rx.borrow();
        match state {
            SliceState::Success => break,
            SliceState::Failed | SliceState::TimedOut => {
                anyhow::bail!("slice job did not succeed: {:?}", state);
            }
            _ => {}
        }
        slice_rx.changed().await?;
    }

    let snapshot = pager.snapshot();
    tracing::info!(
        total = snapshot.total,
        loaded = snapshot.chunks.len(),
        violations = snapshot.violation_total,
        "Slice preview ready"
    );
    for chunk in snapshot.chunks.iter().take(3) {
        tracing::info!(index = chunk.index, chars = chunk.char_count, "Preview chunk");
    }

    // 阶段二: 向量化入库
    tracing::info!(file_id = %file_id, repo_id = %repo_id, "Starting embed stage");
    let embed = EmbeddingJobCoordinator::start(
        file_id.clone(),
        service.clone(),
        events.clone(),
        EmbedConfig { repo_id },
        config.poll.poller_config(),
    );

    let mut embed_rx = embed.subscribe_state();
    loop {
        let state = *embed_rx.borrow();
        match state {
            EmbedState::Success => break,
            EmbedState::Failed | EmbedState::TimedOut => {
                anyhow::bail!("embed job did not succeed: {:?}", state);
            }
            EmbedState::Loading => {}
        }
        embed_rx.changed().await?;
    }

    tracing::info!(file_id = %file_id, "Embedding completed, file ready in listing");
    events.unregister_view(&file_id);
    Ok(())
}
