//! Background Remover Port - 抠图模型抽象
//!
//! 模型本身是黑盒：输入一张图片，输出带 alpha 通道的图片。具体实现在 infrastructure/adapters 层

use async_trait::async_trait;
use image::{DynamicImage, RgbaImage};
use thiserror::Error;

/// 抠图错误
#[derive(Debug, Error)]
pub enum RemoverError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Service error: {0}")]
    ServiceError(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Background Remover Port
///
/// 所有会话共享同一个模型实例，只能通过 Worker Pool 调用
#[async_trait]
pub trait BackgroundRemoverPort: Send + Sync {
    /// 移除背景，返回与输入尺寸相同的 RGBA 图片
    async fn remove(&self, image: DynamicImage) -> Result<RgbaImage, RemoverError>;

    /// 后端名称（用于日志和健康检查）
    fn backend_name(&self) -> &'static str;

    /// 检查后端是否可用
    async fn health_check(&self) -> bool {
        true // 默认实现
    }
}
