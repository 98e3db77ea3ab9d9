//! Worker Layer - Background Task Processing
//!
//! 实现 RemovalWorkerPool，消费共享队列中的抠图任务

mod removal_worker;

#[cfg(test)]
mod scenarios;

pub use removal_worker::{
    PoolStats, RemovalWorkerConfig, RemovalWorkerPool, WorkerPoolHandle,
};
