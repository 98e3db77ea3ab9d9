//! Infrastructure Adapters
//!
//! 六边形架构的适配器实现

pub mod imaging;
pub mod remover;

pub use imaging::{ImagePipelineConfig, RemovalImageProcessor};
pub use remover::{FakeRemover, FakeRemoverConfig, HttpRemoverClient, HttpRemoverClientConfig};
