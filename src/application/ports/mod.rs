//! Application Ports - 出站端口定义
//!
//! 定义应用层与基础设施层的抽象接口

mod background_remover;
mod image_processor;
mod image_store;
mod session_manager;
mod task_queue;

pub use background_remover::{BackgroundRemoverPort, RemoverError};
pub use image_processor::{output_filename, replace_extension, ImageProcessorPort, ProcessedImage};
pub use image_store::{download_url, ImageStorePort, StoreError, StoredImage};
pub use session_manager::{Session, SessionError, SessionManagerPort};
pub use task_queue::{
    ProcessedImageInfo, QueueError, QueuedTask, TaskOutcome, TaskQueuePort, TaskState, TaskUnit,
};
