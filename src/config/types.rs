//! Configuration Types
//!
//! 定义所有配置结构体

use serde::Deserialize;
use std::time::Duration;

use crate::application::streaming::StreamLimits;

/// 应用主配置
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// 服务器配置
    #[serde(default)]
    pub server: ServerConfig,

    /// 抠图后端配置
    #[serde(default)]
    pub remover: RemoverConfig,

    /// 处理流水线配置
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// 存储配置
    #[serde(default)]
    pub storage: StorageConfig,

    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

/// 服务器配置
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// 监听地址
    #[serde(default = "default_host")]
    pub host: String,

    /// 监听端口
    #[serde(default = "default_port")]
    pub port: u16,

    /// 允许的跨域来源，为空时允许任意来源
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// 获取服务器地址
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// 抠图后端类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoverBackend {
    /// 远程模型服务
    #[default]
    Http,
    /// 本地颜色抠图替身
    Fake,
}

impl RemoverBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemoverBackend::Http => "http",
            RemoverBackend::Fake => "fake",
        }
    }
}

/// 抠图后端配置
#[derive(Debug, Clone, Deserialize)]
pub struct RemoverConfig {
    #[serde(default)]
    pub backend: RemoverBackend,

    /// 远程抠图服务基础 URL
    #[serde(default = "default_remover_url")]
    pub url: String,

    /// 请求超时时间（秒）
    #[serde(default = "default_remover_timeout")]
    pub timeout_secs: u64,

    /// Fake 后端的模拟延迟（毫秒）
    #[serde(default = "default_fake_latency")]
    pub fake_latency_ms: u64,
}

fn default_remover_url() -> String {
    "http://localhost:8001".to_string()
}

fn default_remover_timeout() -> u64 {
    120
}

fn default_fake_latency() -> u64 {
    200
}

impl Default for RemoverConfig {
    fn default() -> Self {
        Self {
            backend: RemoverBackend::default(),
            url: default_remover_url(),
            timeout_secs: default_remover_timeout(),
            fake_latency_ms: default_fake_latency(),
        }
    }
}

/// 处理流水线配置
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Worker 数量
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// 最长边超过此值时缩小（像素）
    #[serde(default = "default_max_dimension")]
    pub max_dimension: u32,

    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,

    /// 队列深度达到此值时拒绝新批次
    #[serde(default = "default_max_queue_depth")]
    pub max_queue_depth: usize,

    #[serde(default = "default_batch_size")]
    pub default_batch_size: usize,

    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// batch_end 宽限期固定部分（秒）
    #[serde(default = "default_grace_base")]
    pub batch_grace_base_secs: u64,

    /// batch_end 宽限期按声明图片数增加的部分（毫秒）
    #[serde(default = "default_grace_per_image")]
    pub batch_grace_per_image_ms: u64,

    /// image_metadata 之后等待二进制帧的最长时间（秒）
    #[serde(default = "default_binary_timeout")]
    pub binary_timeout_secs: u64,
}

fn default_workers() -> usize {
    2
}

fn default_max_dimension() -> u32 {
    1024
}

fn default_jpeg_quality() -> u8 {
    85
}

fn default_max_queue_depth() -> usize {
    2000
}

fn default_batch_size() -> usize {
    20
}

fn default_max_batch_size() -> usize {
    600
}

fn default_grace_base() -> u64 {
    10
}

fn default_grace_per_image() -> u64 {
    500
}

fn default_binary_timeout() -> u64 {
    30
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            max_dimension: default_max_dimension(),
            jpeg_quality: default_jpeg_quality(),
            max_queue_depth: default_max_queue_depth(),
            default_batch_size: default_batch_size(),
            max_batch_size: default_max_batch_size(),
            batch_grace_base_secs: default_grace_base(),
            batch_grace_per_image_ms: default_grace_per_image(),
            binary_timeout_secs: default_binary_timeout(),
        }
    }
}

impl PipelineConfig {
    /// 转换为流式会话限制
    pub fn stream_limits(&self) -> StreamLimits {
        StreamLimits {
            default_batch_size: self.default_batch_size,
            max_batch_size: self.max_batch_size,
            max_queue_depth: self.max_queue_depth,
            grace_base: Duration::from_secs(self.batch_grace_base_secs),
            grace_per_image: Duration::from_millis(self.batch_grace_per_image_ms),
            binary_timeout: Duration::from_secs(self.binary_timeout_secs),
        }
    }
}

/// 存储配置
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// 上传文件（HTTP 请求体 / WebSocket 帧）最大大小（字节），默认 50MB
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size: u64,

    /// 内存中保留的处理结果数量，超出时淘汰最旧的
    #[serde(default = "default_max_stored_images")]
    pub max_stored_images: usize,
}

fn default_max_upload_size() -> u64 {
    50 * 1024 * 1024 // 50 MB
}

fn default_max_stored_images() -> usize {
    5000
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            max_upload_size: default_max_upload_size(),
            max_stored_images: default_max_stored_images(),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: String,

    /// 是否启用 JSON 格式
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8000);
        assert!(config.server.cors_origins.is_empty());
        assert_eq!(config.remover.backend, RemoverBackend::Http);
        assert_eq!(config.remover.url, "http://localhost:8001");
        assert_eq!(config.pipeline.workers, 2);
        assert_eq!(config.storage.max_upload_size, 52_428_800);
    }

    #[test]
    fn test_server_addr() {
        let config = ServerConfig::default();
        assert_eq!(config.addr(), "0.0.0.0:8000");
    }

    #[test]
    fn test_stream_limits() {
        let limits = PipelineConfig::default().stream_limits();
        assert_eq!(limits.default_batch_size, 20);
        assert_eq!(limits.max_batch_size, 600);
        assert_eq!(limits.max_queue_depth, 2000);
        assert_eq!(limits.grace_for(4), Duration::from_secs(12));
        assert_eq!(limits.binary_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_backend_deserialize() {
        let backend: RemoverBackend = serde_json::from_str(r#""fake""#).unwrap();
        assert_eq!(backend, RemoverBackend::Fake);
        assert!(serde_json::from_str::<RemoverBackend>(r#""onnx""#).is_err());
    }
}
