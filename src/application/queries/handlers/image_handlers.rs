//! Image Query Handlers

use std::sync::Arc;

use crate::application::error::ApplicationError;
use crate::application::ports::{replace_extension, ImageProcessorPort, ImageStorePort};
use crate::application::queries::image_queries::{GetProcessedImageQuery, GetProcessedImageResponse};

/// GetProcessedImage Handler - 下载处理结果
pub struct GetProcessedImageHandler {
    image_store: Arc<dyn ImageStorePort>,
    image_processor: Arc<dyn ImageProcessorPort>,
}

impl GetProcessedImageHandler {
    pub fn new(
        image_store: Arc<dyn ImageStorePort>,
        image_processor: Arc<dyn ImageProcessorPort>,
    ) -> Self {
        Self {
            image_store,
            image_processor,
        }
    }

    pub async fn handle(
        &self,
        query: GetProcessedImageQuery,
    ) -> Result<GetProcessedImageResponse, ApplicationError> {
        let requested = query
            .image_id
            .as_deref()
            .and_then(|id| self.image_store.get(id).ok());

        let image = match requested {
            Some(image) => image,
            None => {
                if let Some(id) = &query.image_id {
                    tracing::debug!(image_id = %id, "Image not found, falling back to latest");
                }
                self.image_store.latest().ok_or_else(|| {
                    ApplicationError::not_found(
                        "Image",
                        query.image_id.clone().unwrap_or_else(|| "latest".to_string()),
                    )
                })?
            }
        };

        match query.file_type {
            Some(target) if target != image.format => {
                let data = self.image_processor.convert(image.data, target).await?;
                tracing::debug!(
                    image_id = %image.image_id,
                    from = image.format.as_str(),
                    to = target.as_str(),
                    "Converted image for download"
                );
                Ok(GetProcessedImageResponse {
                    image_id: image.image_id,
                    data,
                    filename: replace_extension(&image.filename, target),
                    format: target,
                })
            }
            _ => Ok(GetProcessedImageResponse {
                image_id: image.image_id,
                data: image.data,
                filename: image.filename,
                format: image.format,
            }),
        }
    }
}
