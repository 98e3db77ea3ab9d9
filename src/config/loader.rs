//! Configuration Loader
//!
//! 实现多源配置加载与合并逻辑
//!
//! 优先级（从高到低）：
//! 1. 环境变量
//! 2. 配置文件（config.toml）
//! 3. 默认值

use config::{Config, ConfigError as ConfigCrateError, Environment, File};
use std::path::Path;
use thiserror::Error;

use super::types::{AppConfig, RemoverBackend};

/// 配置加载错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigCrateError> for ConfigError {
    fn from(err: ConfigCrateError) -> Self {
        ConfigError::LoadError(err.to_string())
    }
}

/// 配置文件搜索路径
const CONFIG_FILE_NAMES: &[&str] = &["config", "config.local"];

/// 加载应用配置
///
/// 按优先级从高到低合并配置：
/// 1. 环境变量（前缀 `NOBG_`，层级分隔符 `__`）
/// 2. 配置文件（config.toml 或 config.local.toml）
/// 3. 默认值
///
/// # 环境变量示例
/// - `NOBG_SERVER__PORT=8080`
/// - `NOBG_SERVER__CORS_ORIGINS=http://a.example,http://b.example`
/// - `NOBG_REMOVER__BACKEND=fake`
/// - `NOBG_PIPELINE__WORKERS=4`
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from_path(None)
}

/// 从指定路径加载配置
///
/// # 参数
/// - `config_path` - 可选的配置文件路径，如果为 None 则使用默认搜索路径
pub fn load_config_from_path(config_path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut builder = Config::builder();

    // 1. 首先设置默认值（最低优先级）
    builder = builder
        .set_default("server.host", "0.0.0.0")?
        .set_default("server.port", 8000)?
        .set_default("server.cors_origins", Vec::<String>::new())?
        .set_default("remover.backend", "http")?
        .set_default("remover.url", "http://localhost:8001")?
        .set_default("remover.timeout_secs", 120)?
        .set_default("remover.fake_latency_ms", 200)?
        .set_default("pipeline.workers", 2)?
        .set_default("pipeline.max_dimension", 1024)?
        .set_default("pipeline.jpeg_quality", 85)?
        .set_default("pipeline.max_queue_depth", 2000)?
        .set_default("pipeline.default_batch_size", 20)?
        .set_default("pipeline.max_batch_size", 600)?
        .set_default("pipeline.batch_grace_base_secs", 10)?
        .set_default("pipeline.batch_grace_per_image_ms", 500)?
        .set_default("pipeline.binary_timeout_secs", 30)?
        .set_default("storage.max_upload_size", 50 * 1024 * 1024)?
        .set_default("storage.max_stored_images", 5000)?
        .set_default("log.level", "info")?
        .set_default("log.json", false)?;

    // 2. 添加配置文件（如果存在）
    if let Some(path) = config_path {
        builder = builder.add_source(File::from(path).required(true));
    } else {
        for name in CONFIG_FILE_NAMES {
            builder = builder.add_source(File::with_name(name).required(false));
        }
    }

    // 3. 添加环境变量（最高优先级）
    // 例如: NOBG_REMOVER__URL=http://gpu-box:8001
    // 列表值用逗号分隔
    builder = builder.add_source(
        Environment::with_prefix("NOBG")
            .prefix_separator("_")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("server.cors_origins")
            .try_parsing(true),
    );

    let config = builder.build()?;

    let app_config: AppConfig = config.try_deserialize().map_err(|e| {
        ConfigError::ParseError(format!("Failed to deserialize config: {}", e))
    })?;

    validate_config(&app_config)?;

    Ok(app_config)
}

/// 验证配置有效性
fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    let invalid = |message: &str| Err(ConfigError::ValidationError(message.to_string()));

    if config.server.port == 0 {
        return invalid("Server port cannot be 0");
    }

    if config.remover.backend == RemoverBackend::Http && config.remover.url.is_empty() {
        return invalid("Remover URL cannot be empty for the http backend");
    }

    let pipeline = &config.pipeline;
    if pipeline.workers == 0 {
        return invalid("Pipeline needs at least one worker");
    }
    if pipeline.max_dimension < 16 {
        return invalid("Max dimension must be at least 16 pixels");
    }
    if !(1..=100).contains(&pipeline.jpeg_quality) {
        return invalid("JPEG quality must be between 1 and 100");
    }
    if pipeline.default_batch_size == 0 || pipeline.default_batch_size > pipeline.max_batch_size {
        return invalid("Default batch size must be between 1 and max batch size");
    }

    if pipeline.binary_timeout_secs == 0 {
        return invalid("Binary frame timeout cannot be 0");
    }

    if config.storage.max_stored_images == 0 {
        return invalid("Image store capacity cannot be 0");
    }

    Ok(())
}

/// 打印配置信息（用于启动时日志）
pub fn print_config(config: &AppConfig) {
    tracing::info!("=== Application Configuration ===");
    tracing::info!("Server: {}:{}", config.server.host, config.server.port);
    if config.server.cors_origins.is_empty() {
        tracing::info!("CORS Origins: any");
    } else {
        tracing::info!("CORS Origins: {}", config.server.cors_origins.join(", "));
    }
    tracing::info!("Remover Backend: {}", config.remover.backend.as_str());
    match config.remover.backend {
        RemoverBackend::Http => {
            tracing::info!("Remover URL: {}", config.remover.url);
            tracing::info!("Remover Timeout: {}s", config.remover.timeout_secs);
        }
        RemoverBackend::Fake => {
            tracing::info!("Fake Latency: {}ms", config.remover.fake_latency_ms);
        }
    }
    tracing::info!("Workers: {}", config.pipeline.workers);
    tracing::info!("Max Dimension: {}px", config.pipeline.max_dimension);
    tracing::info!("Max Queue Depth: {}", config.pipeline.max_queue_depth);
    tracing::info!(
        "Batch Size: default {}, max {}",
        config.pipeline.default_batch_size,
        config.pipeline.max_batch_size
    );
    tracing::info!("Max Upload Size: {} bytes", config.storage.max_upload_size);
    tracing::info!("Stored Images: {}", config.storage.max_stored_images);
    tracing::info!("Log Level: {}", config.log.level);
    tracing::info!("=================================");
}
