//! HTTP Middleware
//!
//! HTTP 状态码错误日志中间件

use axum::{
    extract::Request,
    http::header::CONTENT_LENGTH,
    middleware::Next,
    response::Response,
};
use std::time::Instant;

/// HTTP 状态码错误日志中间件
///
/// 4xx 记录为 warn，5xx 记录为 error。
/// 业务错误（errno != 0，HTTP 200）在 ApiError::into_response() 中记录
pub async fn error_logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    // 上传请求的体积，便于定位超限或截断的 multipart
    let request_bytes = request
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(0);
    let started = Instant::now();

    let response = next.run(request).await;
    let status = response.status();
    let elapsed_ms = started.elapsed().as_millis() as u64;

    if status.is_server_error() {
        tracing::error!(
            method = %method,
            uri = %uri,
            status = %status.as_u16(),
            request_bytes = request_bytes,
            elapsed_ms = elapsed_ms,
            "HTTP server error"
        );
    } else if status.is_client_error() {
        tracing::warn!(
            method = %method,
            uri = %uri,
            status = %status.as_u16(),
            request_bytes = request_bytes,
            elapsed_ms = elapsed_ms,
            "HTTP client error"
        );
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::http::routes::tests::{png, test_app_with};
    use axum::{
        body::Body,
        http::{header, Request as HttpRequest, StatusCode},
    };
    use tower::util::ServiceExt;

    async fn status_of(request: HttpRequest<Body>) -> StatusCode {
        let app = test_app_with(|router| {
            router.layer(axum::middleware::from_fn(error_logging_middleware))
        });
        app.router.oneshot(request).await.unwrap().status()
    }

    fn get(uri: &str) -> HttpRequest<Body> {
        HttpRequest::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_business_errors_keep_http_200() {
        // 未找到的图片由 errno 表示
        assert_eq!(status_of(get("/api/download?imageId=img_missing")).await, StatusCode::OK);
        assert_eq!(status_of(get("/api/download?fileType=GIF")).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_rejected_requests_pass_through() {
        assert_eq!(status_of(get("/api/missing")).await, StatusCode::NOT_FOUND);
        assert_eq!(status_of(get("/api/upload")).await, StatusCode::METHOD_NOT_ALLOWED);

        // 缺少 multipart boundary
        let request = HttpRequest::builder()
            .method("POST")
            .uri("/api/upload-batch")
            .header(header::CONTENT_TYPE, "image/png")
            .header(header::CONTENT_LENGTH, png().len())
            .body(Body::from(png()))
            .unwrap();
        assert_eq!(status_of(request).await, StatusCode::BAD_REQUEST);

        // 不是 WebSocket 升级请求
        assert!(status_of(get("/ws/process-images")).await.is_client_error());
    }

    #[tokio::test]
    async fn test_health_passes_through() {
        assert_eq!(status_of(get("/api/health")).await, StatusCode::OK);
    }
}
