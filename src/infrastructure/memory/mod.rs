//! Memory Layer - 进程内状态
//!
//! 会话注册表、共享处理队列、处理结果存储的内存实现

mod image_store;
mod session_manager;
mod task_queue;

pub use image_store::InMemoryImageStore;
pub use session_manager::InMemorySessionManager;
pub use task_queue::InMemoryTaskQueue;
