//! In-Memory Task Queue Implementation
//!
//! 共享处理队列：Mutex 保护的 VecDeque + Notify 唤醒空闲 Worker

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

use crate::application::ports::{QueueError, QueuedTask, TaskQueuePort, TaskState};

struct QueueInner {
    tasks: VecDeque<QueuedTask>,
    closed: bool,
}

/// 内存任务队列
pub struct InMemoryTaskQueue {
    inner: Mutex<QueueInner>,
    notify: Notify,
}

impl InMemoryTaskQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                tasks: VecDeque::new(),
                closed: false,
            }),
            notify: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for InMemoryTaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskQueuePort for InMemoryTaskQueue {
    fn enqueue(&self, mut task: QueuedTask) -> Result<(), QueueError> {
        {
            let mut inner = self.lock();
            if inner.closed {
                return Err(QueueError::Closed);
            }
            task.unit.state = TaskState::Queued;
            tracing::debug!(
                session_id = %task.unit.session_id,
                task_id = task.unit.task_id,
                depth = inner.tasks.len() + 1,
                "Task enqueued"
            );
            inner.tasks.push_back(task);
        }
        self.notify.notify_one();
        Ok(())
    }

    async fn dequeue(&self) -> Option<QueuedTask> {
        loop {
            // 先注册等待，再检查队列，避免丢失唤醒
            let notified = self.notify.notified();
            {
                let mut inner = self.lock();
                if let Some(task) = inner.tasks.pop_front() {
                    // 还有剩余任务时继续唤醒其他 Worker
                    if !inner.tasks.is_empty() {
                        self.notify.notify_one();
                    }
                    return Some(task);
                }
                if inner.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    fn cancel_session(&self, session_id: &str) -> usize {
        let removed = {
            let mut inner = self.lock();
            let before = inner.tasks.len();
            inner.tasks.retain(|task| task.session_id() != session_id);
            before - inner.tasks.len()
        };

        if removed > 0 {
            tracing::debug!(
                session_id = %session_id,
                removed = removed,
                "Queued tasks removed"
            );
        }
        removed
    }

    fn depth(&self) -> usize {
        self.lock().tasks.len()
    }

    fn close(&self) {
        let dropped = {
            let mut inner = self.lock();
            inner.closed = true;
            let dropped = inner.tasks.len();
            inner.tasks.clear();
            dropped
        };
        self.notify.notify_waiters();
        tracing::info!(dropped = dropped, "Task queue closed");
    }

    fn is_closed(&self) -> bool {
        self.lock().closed
    }
}
