//! Data Transfer Objects

use serde::Serialize;

/// 统一 API 响应格式
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub errno: i32,
    pub error: String,
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    /// 成功响应
    pub fn success(data: T) -> Self {
        Self {
            errno: 0,
            error: String::new(),
            data: Some(data),
        }
    }
}

/// 单图上传结果
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    /// 下载地址
    pub image_url: String,
    pub image_id: String,
    pub filename: String,
    pub message: String,
}

/// 多图上传中单张图片的结果
///
/// 成功时带 imageId/downloadUrl，失败时只有 filename 和 error
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchUploadItem {
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// 多图上传结果
#[derive(Debug, Serialize)]
pub struct BatchUploadResponse {
    pub results: Vec<BatchUploadItem>,
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
}

/// 健康检查响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub workers: usize,
    pub in_flight: usize,
    pub queue_depth: usize,
    pub active_sessions: usize,
    pub stored_images: usize,
    pub remover: RemoverHealth,
}

/// 抠图后端状态
#[derive(Debug, Serialize)]
pub struct RemoverHealth {
    pub backend: &'static str,
    pub reachable: bool,
}
