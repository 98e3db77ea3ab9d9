//! HTTP Remover Client - 调用外部 GPU 抠图服务
//!
//! 实现 BackgroundRemoverPort trait，模型运行在独立的 GPU 服务上
//!
//! 外部 API:
//! POST {base_url}/process
//! Request: multipart/form-data
//!   - image: 图片文件（PNG）
//!   - backgroundColor: transparent
//!   - fileType: PNG
//! Response: {"success": true, "image": "<base64>", "mime_type": "image/png", "format": "PNG"}
//!
//! 背景填充和输出编码都在本地完成，远端只负责生成带 alpha 通道的 PNG

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine};
use image::{DynamicImage, ImageFormat, RgbaImage};
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use std::io::Cursor;
use std::time::Duration;

use crate::application::ports::{BackgroundRemoverPort, RemoverError};

/// HTTP 抠图客户端配置
#[derive(Debug, Clone)]
pub struct HttpRemoverClientConfig {
    /// 抠图服务基础 URL
    pub base_url: String,
    /// 请求超时时间（秒）
    pub timeout_secs: u64,
}

impl Default for HttpRemoverClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8001".to_string(),
            timeout_secs: 120,
        }
    }
}

impl HttpRemoverClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

/// /process 响应体
#[derive(Debug, Deserialize)]
struct ProcessResponse {
    success: bool,
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    mime_type: Option<String>,
    #[serde(default)]
    detail: Option<String>,
}

/// HTTP 抠图客户端
pub struct HttpRemoverClient {
    client: Client,
    config: HttpRemoverClientConfig,
}

impl HttpRemoverClient {
    /// 创建新的 HTTP 抠图客户端
    pub fn new(config: HttpRemoverClientConfig) -> Result<Self, RemoverError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RemoverError::NetworkError(e.to_string()))?;

        Ok(Self { client, config })
    }

    fn process_url(&self) -> String {
        format!("{}/process", self.config.base_url.trim_end_matches('/'))
    }

    fn health_url(&self) -> String {
        format!("{}/health", self.config.base_url.trim_end_matches('/'))
    }

    fn build_form(body: Vec<u8>) -> Result<Form, RemoverError> {
        let part = Part::bytes(body)
            .file_name("image.png")
            .mime_str("image/png")
            .map_err(|e| RemoverError::ServiceError(format!("Invalid multipart part: {}", e)))?;

        Ok(Form::new()
            .part("image", part)
            .text("backgroundColor", "transparent")
            .text("fileType", "PNG"))
    }
}

#[async_trait]
impl BackgroundRemoverPort for HttpRemoverClient {
    async fn remove(&self, image: DynamicImage) -> Result<RgbaImage, RemoverError> {
        let (width, height) = (image.width(), image.height());

        let body = tokio::task::spawn_blocking(move || {
            let mut buffer = Vec::new();
            image.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)?;
            Ok::<_, image::ImageError>(buffer)
        })
        .await
        .map_err(|e| RemoverError::ServiceError(format!("Encode task failed: {}", e)))?
        .map_err(|e| RemoverError::ServiceError(format!("Failed to encode request: {}", e)))?;

        tracing::debug!(
            url = %self.process_url(),
            width = width,
            height = height,
            body_size = body.len(),
            "Sending process request"
        );

        let response = self
            .client
            .post(self.process_url())
            .multipart(Self::build_form(body)?)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RemoverError::Timeout
                } else if e.is_connect() {
                    RemoverError::NetworkError(format!("Cannot connect to remover service: {}", e))
                } else {
                    RemoverError::NetworkError(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(RemoverError::ServiceError(format!(
                "HTTP {}: {}",
                status, error_text
            )));
        }

        let payload: ProcessResponse = response
            .json()
            .await
            .map_err(|e| RemoverError::InvalidResponse(format!("Failed to parse response: {}", e)))?;

        if !payload.success {
            return Err(RemoverError::ServiceError(
                payload
                    .detail
                    .unwrap_or_else(|| "Remover service reported failure".to_string()),
            ));
        }
        let encoded = payload
            .image
            .ok_or_else(|| RemoverError::InvalidResponse("Missing image field".to_string()))?;

        tracing::debug!(
            mime_type = payload.mime_type.as_deref().unwrap_or("unknown"),
            encoded_size = encoded.len(),
            "Received processed image"
        );

        let result = tokio::task::spawn_blocking(move || {
            let bytes = general_purpose::STANDARD
                .decode(encoded.as_bytes())
                .map_err(|e| RemoverError::InvalidResponse(format!("Invalid base64 image: {}", e)))?;
            image::load_from_memory(&bytes)
                .map(|decoded| decoded.to_rgba8())
                .map_err(|e| RemoverError::InvalidResponse(format!("Undecodable image: {}", e)))
        })
        .await
        .map_err(|e| RemoverError::InvalidResponse(format!("Decode task failed: {}", e)))??;

        if result.dimensions() != (width, height) {
            return Err(RemoverError::InvalidResponse(format!(
                "Expected {}x{}, got {}x{}",
                width,
                height,
                result.width(),
                result.height()
            )));
        }

        Ok(result)
    }

    fn backend_name(&self) -> &'static str {
        "http"
    }

    async fn health_check(&self) -> bool {
        match self
            .client
            .get(self.health_url())
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::Multipart,
        http::StatusCode,
        response::IntoResponse,
        routing::{get, post},
        Json, Router,
    };
    use image::Rgba;
    use tokio::net::TcpListener;

    fn encode_png(image: &RgbaImage) -> Vec<u8> {
        let mut buffer = Vec::new();
        DynamicImage::ImageRgba8(image.clone())
            .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .unwrap();
        buffer
    }

    /// 模拟 GPU 服务：左上角像素变为透明
    async fn stub_process(mut multipart: Multipart) -> impl IntoResponse {
        let mut image = None;
        let mut background = None;
        let mut file_type = None;
        while let Some(field) = multipart.next_field().await.unwrap() {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "image" => {
                    assert_eq!(field.content_type(), Some("image/png"));
                    image = Some(field.bytes().await.unwrap());
                }
                "backgroundColor" => background = Some(field.text().await.unwrap()),
                "fileType" => file_type = Some(field.text().await.unwrap()),
                _ => {}
            }
        }

        if background.as_deref() != Some("transparent") || file_type.as_deref() != Some("PNG") {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "detail": "unexpected options" })),
            );
        }

        let mut rgba = image::load_from_memory(&image.unwrap()).unwrap().to_rgba8();
        let corner = *rgba.get_pixel(0, 0);
        rgba.put_pixel(0, 0, Rgba([corner[0], corner[1], corner[2], 0]));
        (
            StatusCode::OK,
            Json(serde_json::json!({
                "success": true,
                "image": general_purpose::STANDARD.encode(encode_png(&rgba)),
                "mime_type": "image/png",
                "format": "PNG",
            })),
        )
    }

    async fn stub_failure() -> impl IntoResponse {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "detail": "Error processing image: out of memory" })),
        )
    }

    async fn stub_health() -> Json<serde_json::Value> {
        Json(serde_json::json!({ "status": "healthy", "service": "gpu-processor" }))
    }

    async fn spawn_stub(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn sample_image() -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 3, Rgba([10, 20, 30, 255])))
    }

    #[test]
    fn test_config_default() {
        let config = HttpRemoverClientConfig::default();
        assert_eq!(config.base_url, "http://localhost:8001");
        assert_eq!(config.timeout_secs, 120);
    }

    #[test]
    fn test_config_builder_and_urls() {
        let config = HttpRemoverClientConfig::new("http://gpu.internal:8001/").with_timeout(30);
        assert_eq!(config.timeout_secs, 30);

        let client = HttpRemoverClient::new(config).unwrap();
        assert_eq!(client.process_url(), "http://gpu.internal:8001/process");
        assert_eq!(client.health_url(), "http://gpu.internal:8001/health");
        assert_eq!(client.backend_name(), "http");
    }

    #[tokio::test]
    async fn test_remove_posts_multipart_and_decodes_base64() {
        let router = Router::new()
            .route("/process", post(stub_process))
            .route("/health", get(stub_health));
        let base_url = spawn_stub(router).await;
        let client = HttpRemoverClient::new(HttpRemoverClientConfig::new(base_url)).unwrap();

        assert!(client.health_check().await);

        let result = client.remove(sample_image()).await.unwrap();
        assert_eq!(result.dimensions(), (4, 3));
        assert_eq!(result.get_pixel(0, 0)[3], 0);
        assert_eq!(*result.get_pixel(1, 1), Rgba([10, 20, 30, 255]));
    }

    #[tokio::test]
    async fn test_service_error_carries_detail() {
        let router = Router::new().route("/process", post(stub_failure));
        let base_url = spawn_stub(router).await;
        let client = HttpRemoverClient::new(HttpRemoverClientConfig::new(base_url)).unwrap();

        match client.remove(sample_image()).await {
            Err(RemoverError::ServiceError(message)) => {
                assert!(message.contains("500"));
                assert!(message.contains("out of memory"));
            }
            other => panic!("unexpected: {:?}", other),
        }
        // 没有 /health 路由
        assert!(!client.health_check().await);
    }

    #[tokio::test]
    async fn test_unsuccessful_or_malformed_payload_is_rejected() {
        let router = Router::new()
            .route(
                "/process",
                post(|| async { Json(serde_json::json!({ "success": false })) }),
            )
            .route(
                "/bad/process",
                post(|| async { Json(serde_json::json!({ "success": true, "image": "@@not-base64@@" })) }),
            );
        let base_url = spawn_stub(router).await;

        let client = HttpRemoverClient::new(HttpRemoverClientConfig::new(base_url.clone())).unwrap();
        assert!(matches!(
            client.remove(sample_image()).await,
            Err(RemoverError::ServiceError(_))
        ));

        let client =
            HttpRemoverClient::new(HttpRemoverClientConfig::new(format!("{}/bad", base_url))).unwrap();
        assert!(matches!(
            client.remove(sample_image()).await,
            Err(RemoverError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_service_is_network_error() {
        let config = HttpRemoverClientConfig::new("http://127.0.0.1:9").with_timeout(2);
        let client = HttpRemoverClient::new(config).unwrap();

        let err = client.remove(sample_image()).await.unwrap_err();
        assert!(matches!(
            err,
            RemoverError::NetworkError(_) | RemoverError::Timeout
        ));
        assert!(!client.health_check().await);
    }
}
