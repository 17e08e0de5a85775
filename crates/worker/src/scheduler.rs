use std::sync::Arc;

use arena_core::{ArenaResult, Job, TaskParams, TaskQueue, TaskScheduler};
use async_trait::async_trait;
use tracing::info;

/// 把任务请求放入待处理队列，任何进程的任务管理器都可能领取执行
#[derive(Clone)]
pub struct QueueScheduler {
    queue: Arc<dyn TaskQueue>,
}

impl QueueScheduler {
    pub fn new(queue: Arc<dyn TaskQueue>) -> Self {
        Self { queue }
    }

    async fn submit(&self, job: Job) -> ArenaResult<String> {
        self.queue.enqueue_pending(&job).await?;
        info!(
            "Submitted job {} for task {} (unique: {})",
            job.id, job.task_id, job.unique
        );
        Ok(job.id)
    }
}

#[async_trait]
impl TaskScheduler for QueueScheduler {
    async fn run(&self, task_id: &str, params: TaskParams) -> ArenaResult<String> {
        self.submit(Job::new(task_id, params)).await
    }

    async fn run_unique(&self, task_id: &str, params: TaskParams) -> ArenaResult<String> {
        self.submit(Job::new_unique(task_id, params)).await
    }
}
