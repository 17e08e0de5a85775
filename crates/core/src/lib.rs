pub mod config;
pub mod errors;
pub mod models;
pub mod traits;

pub use config::*;
pub use errors::*;
pub use models::{Job, TaskParams};
pub use traits::{MessageBus, Task, TaskQueue, TaskScheduler};

/// 进程范围内的默认关闭令牌类型
pub use tokio_util::sync::CancellationToken;
