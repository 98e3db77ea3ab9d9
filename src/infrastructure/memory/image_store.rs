//! In-Memory Image Store Implementation

use chrono::Utc;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use uuid::Uuid;

use crate::application::ports::{ImageStorePort, StoreError, StoredImage};
use crate::domain::image::OutputFormat;

/// 内存图片存储
///
/// 超出容量时淘汰最早保存的图片
pub struct InMemoryImageStore {
    images: DashMap<String, StoredImage>,
    /// 保存顺序（最早的在前）
    order: Mutex<VecDeque<String>>,
    capacity: usize,
}

impl InMemoryImageStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            images: DashMap::new(),
            order: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }
}

impl ImageStorePort for InMemoryImageStore {
    fn put(&self, data: Vec<u8>, filename: String, format: OutputFormat) -> String {
        let image_id = format!("img_{}", Uuid::new_v4().simple());
        let size = data.len();

        self.images.insert(
            image_id.clone(),
            StoredImage {
                image_id: image_id.clone(),
                data,
                filename,
                format,
                stored_at: Utc::now(),
            },
        );

        let mut order = self.order.lock().unwrap_or_else(PoisonError::into_inner);
        order.push_back(image_id.clone());
        while order.len() > self.capacity {
            if let Some(evicted) = order.pop_front() {
                self.images.remove(&evicted);
                tracing::debug!(image_id = %evicted, "Evicted stored image");
            }
        }

        tracing::debug!(image_id = %image_id, size = size, "Stored processed image");
        image_id
    }

    fn get(&self, image_id: &str) -> Result<StoredImage, StoreError> {
        self.images
            .get(image_id)
            .map(|i| i.clone())
            .ok_or_else(|| StoreError::NotFound(image_id.to_string()))
    }

    fn latest(&self) -> Option<StoredImage> {
        let order = self.order.lock().unwrap_or_else(PoisonError::into_inner);
        order
            .iter()
            .rev()
            .find_map(|id| self.images.get(id).map(|i| i.clone()))
    }

    fn remove(&self, image_id: &str) -> bool {
        let removed = self.images.remove(image_id).is_some();
        if removed {
            let mut order = self.order.lock().unwrap_or_else(PoisonError::into_inner);
            order.retain(|id| id != image_id);
        }
        removed
    }

    fn len(&self) -> usize {
        self.images.len()
    }
}
