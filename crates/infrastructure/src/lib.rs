//! 队列、对局记录和消息总线的后端实现
//!
//! - `redis_store`: 基于Redis的共享存储，多进程部署使用
//! - `memory`: 单进程内存实现，本地运行和测试使用
//! - `detection_stream`: 基于任意消息总线的位置与围栏事件流

pub mod detection_stream;
pub mod memory;
pub mod redis_store;

pub use detection_stream::BusDetectionStream;
pub use memory::{InMemoryGameRepository, InMemoryMessageBus, InMemoryTaskQueue};
pub use redis_store::{
    RedisGameRepository, RedisMessageBus, RedisStore, RedisTaskQueue,
};

/// 队列相关键的命名
#[derive(Debug, Clone)]
pub struct QueueKeys {
    pub pending: String,
    pub processing: String,
    pub jobs: String,
    /// 锁名称前缀
    pub lock_prefix: String,
}

impl QueueKeys {
    pub fn new(prefix: &str) -> Self {
        let pending = format!("{}:worker:queue", prefix);
        Self {
            processing: format!("{}:processing", pending),
            jobs: format!("{}:jobs", pending),
            lock_prefix: pending.clone(),
            pending,
        }
    }
}
