//! nobg - 背景移除服务
//!
//! - Domain: image/, batch/
//! - Application: ports, commands, queries, streaming
//! - Infrastructure: http, memory, worker, adapters

use std::sync::Arc;
use std::time::Duration;

use nobg::application::BackgroundRemoverPort;
use nobg::config::{load_config, print_config, AppConfig, RemoverBackend};
use nobg::infrastructure::adapters::{
    FakeRemover, FakeRemoverConfig, HttpRemoverClient, HttpRemoverClientConfig,
    ImagePipelineConfig, RemovalImageProcessor,
};
use nobg::infrastructure::http::{AppState, HttpServer, ServerConfig};
use nobg::infrastructure::memory::{InMemoryImageStore, InMemorySessionManager, InMemoryTaskQueue};
use nobg::infrastructure::worker::{RemovalWorkerConfig, RemovalWorkerPool};

fn init_tracing(config: &AppConfig) {
    let log_filter = format!(
        "{},nobg={},tower_http=debug",
        config.log.level, config.log.level
    );
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_filter));

    if config.log.json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn build_remover(config: &AppConfig) -> anyhow::Result<Arc<dyn BackgroundRemoverPort>> {
    let remover: Arc<dyn BackgroundRemoverPort> = match config.remover.backend {
        RemoverBackend::Http => {
            let client_config = HttpRemoverClientConfig {
                base_url: config.remover.url.clone(),
                timeout_secs: config.remover.timeout_secs,
            };
            Arc::new(HttpRemoverClient::new(client_config)?)
        }
        RemoverBackend::Fake => Arc::new(FakeRemover::new(FakeRemoverConfig {
            latency: Duration::from_millis(config.remover.fake_latency_ms),
            ..FakeRemoverConfig::default()
        })),
    };
    Ok(remover)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 加载配置（优先级：环境变量 > 配置文件 > 默认值）
    let config = load_config().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

    init_tracing(&config);

    tracing::info!("nobg - 背景移除服务");
    print_config(&config);

    // 抠图后端
    let remover = build_remover(&config)?;
    if !remover.health_check().await {
        tracing::warn!(
            backend = remover.backend_name(),
            "Remover backend not reachable yet, tasks will fail until it is"
        );
    }

    let processor = Arc::new(RemovalImageProcessor::new(
        remover.clone(),
        ImagePipelineConfig {
            max_dimension: config.pipeline.max_dimension,
            jpeg_quality: config.pipeline.jpeg_quality,
        },
    ));

    // 内存 Session、共享队列、结果存储
    let session_manager = Arc::new(InMemorySessionManager::new());
    let task_queue = Arc::new(InMemoryTaskQueue::new());
    let image_store = Arc::new(InMemoryImageStore::new(config.storage.max_stored_images));

    // 启动 Worker Pool
    let pool = RemovalWorkerPool::new(
        RemovalWorkerConfig {
            workers: config.pipeline.workers,
        },
        task_queue.clone(),
        processor.clone(),
        image_store.clone(),
    )
    .start();

    // 创建 HTTP 服务器
    let max_body_size = usize::try_from(config.storage.max_upload_size).unwrap_or(usize::MAX);
    let server_config = ServerConfig::new(&config.server.host, config.server.port)
        .with_cors_origins(config.server.cors_origins.clone())
        .with_max_body_size(max_body_size);
    let state = AppState::new(
        session_manager,
        task_queue,
        image_store,
        processor,
        remover,
        &pool,
        config.pipeline.stream_limits(),
    )
    .with_max_frame_size(max_body_size);

    let server = HttpServer::new(server_config, state);

    // 启动服务器（带优雅关闭）
    server
        .run_with_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for ctrl-c");
            }
            tracing::info!("Received shutdown signal");
        })
        .await?;

    // 关闭队列，等待 Worker 完成进行中的任务
    pool.shutdown().await;

    tracing::info!("Server shutdown complete");

    Ok(())
}
