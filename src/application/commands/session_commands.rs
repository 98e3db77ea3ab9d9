//! Session Commands - 会话相关命令

/// 关闭会话命令
#[derive(Debug, Clone)]
pub struct CloseSessionCommand {
    pub session_id: String,
}

/// 关闭会话响应
#[derive(Debug, Clone)]
pub struct CloseSessionResponse {
    pub session_id: String,
    /// 从共享队列中移除的任务数量
    pub cancelled_count: usize,
    /// 本次调用是否真正关闭了会话（重复关闭为 false）
    pub closed: bool,
}
