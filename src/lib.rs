//! nobg - 背景移除服务
//!
//! 架构设计: DDD + CQRS + Hexagonal Architecture
//!
//! 领域层 (domain/):
//! - Image Context: 处理选项与处理错误
//! - Batch Context: 批次进度跟踪
//!
//! 应用层 (application/):
//! - Ports: 端口定义（BackgroundRemover, ImageProcessor, ImageStore, TaskQueue, SessionManager）
//! - Commands / Queries: CQRS 处理器
//! - Streaming: WebSocket 多图流式协议与会话状态机
//!
//! 基础设施层 (infrastructure/):
//! - HTTP: RESTful API + WebSocket
//! - Memory: SessionManager, TaskQueue, ImageStore 内存实现
//! - Worker: RemovalWorkerPool 后台任务处理
//! - Adapters: 抠图客户端、图片处理流程

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::{load_config, AppConfig};
