//! Image Handlers - 单图/多图上传与结果下载

use axum::{
    body::Body,
    extract::{
        multipart::{Field, MultipartError},
        Multipart, Query, State,
    },
    http::{header, StatusCode},
    response::Response,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::application::{
    BatchImage, GetProcessedImageQuery, ProcessBatchCommand, ProcessImageCommand,
};
use crate::domain::image::{BackgroundColor, OutputFormat, ProcessingOptions, Watermark};
use crate::infrastructure::http::dto::{
    ApiResponse, BatchUploadItem, BatchUploadResponse, UploadResponse,
};
use crate::infrastructure::http::error::ApiError;
use crate::infrastructure::http::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadParams {
    pub image_id: Option<String>,
    pub file_type: Option<String>,
}

fn parse_option<T>(value: Option<String>) -> Result<T, ApiError>
where
    T: std::str::FromStr + Default,
    T::Err: std::fmt::Display,
{
    match value.filter(|v| !v.trim().is_empty()) {
        Some(v) => v.parse().map_err(|e: T::Err| ApiError::BadRequest(e.to_string())),
        None => Ok(T::default()),
    }
}

/// 表单中的处理选项字段
#[derive(Debug, Default)]
struct OptionFields {
    background: Option<String>,
    file_type: Option<String>,
    watermark: Option<String>,
}

impl OptionFields {
    /// 读取选项字段，其他字段忽略
    async fn read(&mut self, name: &str, field: Field<'_>) -> Result<(), ApiError> {
        let slot = match name {
            "backgroundColor" => &mut self.background,
            "fileType" => &mut self.file_type,
            "watermark" => &mut self.watermark,
            _ => return Ok(()),
        };
        *slot = Some(field.text().await.map_err(read_error(name))?);
        Ok(())
    }

    fn into_options(self) -> Result<ProcessingOptions, ApiError> {
        Ok(ProcessingOptions::new(
            parse_option::<BackgroundColor>(self.background)?,
            parse_option::<OutputFormat>(self.file_type)?,
            parse_option::<Watermark>(self.watermark)?,
        ))
    }
}

fn read_error(name: &str) -> impl Fn(MultipartError) -> ApiError + '_ {
    move |e| ApiError::BadRequest(format!("Failed to read {}: {}", name, e))
}

/// 读取图片字段（必须是 image/* 类型）
async fn read_image(field: Field<'_>, default_name: String) -> Result<BatchImage, ApiError> {
    let is_image = field
        .content_type()
        .map(|ct| ct.starts_with("image/"))
        .unwrap_or(false);
    if !is_image {
        return Err(ApiError::BadRequest("File must be an image".to_string()));
    }
    let filename = field
        .file_name()
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .unwrap_or(default_name);
    let payload = field.bytes().await.map_err(read_error("image"))?.to_vec();
    Ok(BatchImage { filename, payload })
}

/// 上传单张图片并等待处理完成
///
/// 与 WebSocket 会话共享同一个处理队列
pub async fn upload_image(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse<UploadResponse>>, ApiError> {
    let mut image: Option<BatchImage> = None;
    let mut fields = OptionFields::default();

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        ApiError::BadRequest(format!("Failed to read multipart field: {}", e))
    })? {
        let field_name = field.name().unwrap_or_default().to_string();
        if field_name == "image" {
            image = Some(read_image(field, "image.png".to_string()).await?);
        } else {
            fields.read(&field_name, field).await?;
        }
    }

    let BatchImage { filename, payload } =
        image.ok_or_else(|| ApiError::BadRequest("Image file is required".to_string()))?;
    let options = fields.into_options()?;

    let size = payload.len();
    let result = state
        .process_image_handler
        .handle(ProcessImageCommand {
            filename: filename.clone(),
            payload,
            options,
        })
        .await?;

    tracing::info!(
        filename = %filename,
        size = size,
        image_id = %result.image_id,
        "Image uploaded and processed"
    );

    Ok(Json(ApiResponse::success(UploadResponse {
        image_url: result.image_url,
        image_id: result.image_id,
        filename: result.filename,
        message: "Image processed successfully".to_string(),
    })))
}

/// 上传多张图片（表单字段 images，可重复）并等待全部处理完成
///
/// 结果顺序与上传顺序一致；单张失败只体现在该项的 error 中
pub async fn upload_batch(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse<BatchUploadResponse>>, ApiError> {
    let mut images = Vec::new();
    let mut fields = OptionFields::default();

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        ApiError::BadRequest(format!("Failed to read multipart field: {}", e))
    })? {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "images" | "images[]" => {
                let default_name = format!("image_{}", images.len());
                images.push(read_image(field, default_name).await?);
            }
            _ => fields.read(&field_name, field).await?,
        }
    }

    if images.is_empty() {
        return Err(ApiError::BadRequest(
            "At least one image file is required".to_string(),
        ));
    }
    let options = fields.into_options()?;

    let response = state
        .process_batch_handler
        .handle(ProcessBatchCommand { images, options })
        .await?;

    let successful = response.successful();
    let failed = response.failed();
    let results: Vec<BatchUploadItem> = response
        .results
        .into_iter()
        .map(|item| match item.result {
            Ok(processed) => BatchUploadItem {
                filename: processed.filename,
                image_id: Some(processed.image_id),
                download_url: Some(processed.image_url),
                format: Some(processed.format.as_str()),
                mime_type: Some(processed.format.mime_type()),
                error: None,
            },
            Err(e) => BatchUploadItem {
                filename: item.filename,
                image_id: None,
                download_url: None,
                format: None,
                mime_type: None,
                error: Some(e.to_string()),
            },
        })
        .collect();

    Ok(Json(ApiResponse::success(BatchUploadResponse {
        total: results.len(),
        successful,
        failed,
        results,
    })))
}

/// 下载处理结果
///
/// 未指定 imageId 时返回最近一张；fileType 与存储格式不同则重新编码
pub async fn download_image(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DownloadParams>,
) -> Result<Response, ApiError> {
    let file_type = params
        .file_type
        .filter(|v| !v.trim().is_empty())
        .map(|v| v.parse::<OutputFormat>())
        .transpose()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let query = GetProcessedImageQuery {
        image_id: params.image_id.filter(|id| !id.is_empty()),
        file_type,
    };
    let result = state.get_processed_image_handler.handle(query).await?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, result.content_type())
        .header(header::CONTENT_LENGTH, result.data.len())
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", result.filename),
        )
        .body(Body::from(result.data))
        .map_err(|e| ApiError::Internal(format!("Failed to build response: {}", e)))
}
