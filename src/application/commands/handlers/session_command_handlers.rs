//! Session Command Handlers

use std::sync::Arc;

use crate::application::commands::session_commands::*;
use crate::application::ports::{SessionManagerPort, TaskQueuePort};

/// CloseSession Handler - 关闭会话
///
/// 先取消会话令牌（Worker 丢弃进行中任务的结果），再从共享队列移除尚未出队的任务。
/// 可重复调用
#[derive(Clone)]
pub struct CloseSessionHandler {
    session_manager: Arc<dyn SessionManagerPort>,
    task_queue: Arc<dyn TaskQueuePort>,
}

impl CloseSessionHandler {
    pub fn new(
        session_manager: Arc<dyn SessionManagerPort>,
        task_queue: Arc<dyn TaskQueuePort>,
    ) -> Self {
        Self {
            session_manager,
            task_queue,
        }
    }

    pub fn handle(&self, cmd: CloseSessionCommand) -> CloseSessionResponse {
        let closed = self.session_manager.close(&cmd.session_id);
        let cancelled_count = self.task_queue.cancel_session(&cmd.session_id);

        if closed {
            tracing::info!(
                session_id = %cmd.session_id,
                cancelled_tasks = cancelled_count,
                "Session torn down"
            );
        }

        CloseSessionResponse {
            session_id: cmd.session_id,
            cancelled_count,
            closed,
        }
    }
}
