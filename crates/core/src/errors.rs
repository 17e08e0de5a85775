use thiserror::Error;

/// 对局调度系统错误类型定义
#[derive(Debug, Error)]
pub enum ArenaError {
    #[error("队列后端错误: {0}")]
    QueueBackend(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("任务未注册: {id}")]
    TaskNotRegistered { id: String },

    #[error("任务执行错误: {0}")]
    TaskExecution(String),

    #[error("无效的任务参数: {0}")]
    InvalidTaskParams(String),

    #[error("对局已经开始: {id}")]
    MatchAlreadyStarted { id: String },

    #[error("对局玩家不足: {id}")]
    NotEnoughPlayers { id: String },

    #[error("订阅错误: {0}")]
    Subscription(String),

    #[error("持久化错误: {0}")]
    Persistence(String),

    #[error("消息总线错误: {0}")]
    MessageBus(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for ArenaError {
    fn from(err: serde_json::Error) -> Self {
        ArenaError::Serialization(err.to_string())
    }
}

/// 统一的Result类型
pub type ArenaResult<T> = std::result::Result<T, ArenaError>;
