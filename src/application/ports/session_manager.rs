//! Session Manager Port - 连接会话注册表
//!
//! 定义会话管理的抽象接口，具体实现在 infrastructure/memory 层

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Session Manager 错误
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Session already exists: {0}")]
    AlreadyExists(String),
}

/// 会话状态（in-memory）
///
/// `cancel` 与会话的所有任务共享，关闭会话即取消其全部任务
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub cancel: CancellationToken,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl Session {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            cancel: CancellationToken::new(),
            created_at: now,
            last_activity: now,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Session Manager Port
pub trait SessionManagerPort: Send + Sync {
    /// 注册新会话
    fn create(&self, session: Session) -> Result<String, SessionError>;

    /// 获取会话
    fn get(&self, id: &str) -> Result<Session, SessionError>;

    /// 检查会话是否有效
    fn is_valid(&self, id: &str) -> bool;

    /// 关闭会话：取消令牌并移除，重复调用无副作用
    fn close(&self, id: &str) -> bool;

    /// 更新最后活动时间
    fn touch(&self, id: &str);

    /// 活跃会话数量
    fn count(&self) -> usize;

    /// 获取所有会话 ID
    fn list_all(&self) -> Vec<String>;
}
