use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::{models::TaskParams, ArenaResult};

/// 可被调度执行的任务
///
/// 任务本身无状态，每个进程注册一次；`run`需要响应取消令牌，
/// 令牌取消后应尽快收尾并返回。
#[async_trait]
pub trait Task: Send + Sync {
    fn id(&self) -> &str;

    async fn run(&self, cancel: CancellationToken, params: TaskParams) -> ArenaResult<()>;
}

/// 提交任务到队列的入口
#[async_trait]
pub trait TaskScheduler: Send + Sync {
    /// 提交普通任务，返回任务实例ID
    async fn run(&self, task_id: &str, params: TaskParams) -> ArenaResult<String>;

    /// 提交唯一任务，相同任务和参数已在执行时会被丢弃
    async fn run_unique(&self, task_id: &str, params: TaskParams) -> ArenaResult<String>;
}
