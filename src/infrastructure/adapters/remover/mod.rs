//! Remover Adapter - 抠图模型客户端实现

mod fake_remover;
mod http_remover_client;

pub use fake_remover::{color_key, FakeRemover, FakeRemoverConfig};
pub use http_remover_client::{HttpRemoverClient, HttpRemoverClientConfig};
