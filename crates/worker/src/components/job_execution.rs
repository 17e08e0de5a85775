use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use arena_core::{ArenaError, ArenaResult, Job, TaskQueue};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::JobHeartbeat;
use crate::registry::TaskRegistry;

/// 负责在独立的tokio任务中执行已领取的任务，并记录正在运行的任务
#[derive(Clone)]
pub struct JobExecutionManager {
    queue: Arc<dyn TaskQueue>,
    registry: TaskRegistry,
    heartbeat_interval: Duration,
    /// 任务实例ID -> 任务ID
    running_jobs: Arc<RwLock<HashMap<String, String>>>,
}

impl JobExecutionManager {
    pub fn new(queue: Arc<dyn TaskQueue>, registry: TaskRegistry, heartbeat_interval: Duration) -> Self {
        Self {
            queue,
            registry,
            heartbeat_interval,
            running_jobs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn running_count(&self) -> usize {
        self.running_jobs.read().await.len()
    }

    pub async fn running_job_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.running_jobs.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// 记录任务并在后台执行，结束后移除记录
    pub async fn spawn(&self, job: Job, cancel: CancellationToken) {
        self.running_jobs
            .write()
            .await
            .insert(job.id.clone(), job.task_id.clone());

        let manager = self.clone();
        tokio::spawn(async move {
            let job_id = job.id.clone();
            let task_id = job.task_id.clone();

            match manager.process_job(job, cancel).await {
                Ok(()) => info!("Job {} of task {} finished", job_id, task_id),
                Err(e) => error!("任务{}执行失败 ({}): {}", job_id, task_id, e),
            }

            manager.running_jobs.write().await.remove(&job_id);
        });
    }

    async fn process_job(&self, job: Job, cancel: CancellationToken) -> ArenaResult<()> {
        let Some(task) = self.registry.get(&job.task_id).await else {
            warn!("任务{}未注册，放回待处理队列: {}", job.task_id, job.id);
            // 先移出再放回，避免删除其他进程刚放入的同ID任务
            self.queue.remove_from_processing(&job).await?;
            self.queue.enqueue_pending(&job).await?;
            return Err(ArenaError::TaskNotRegistered {
                id: job.task_id.clone(),
            });
        };

        info!("Running job {} of task {} on {}", job.id, job.task_id, job.host);
        let heartbeat = JobHeartbeat::start(
            Arc::clone(&self.queue),
            job.clone(),
            self.heartbeat_interval,
            cancel.child_token(),
        );

        let token = cancel.child_token();
        let params = job.params.clone();
        let result = match tokio::spawn(async move { task.run(token, params).await }).await {
            Ok(result) => result,
            Err(e) => Err(ArenaError::TaskExecution(format!("任务异常退出: {}", e))),
        };

        heartbeat.stop().await;
        if let Err(e) = self.queue.remove_from_processing(&job).await {
            error!("移出处理中集合失败 {}: {}", job.id, e);
        }

        result
    }
}
