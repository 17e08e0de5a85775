use std::sync::Arc;
use std::time::Duration;

use arena_core::{Job, TaskQueue};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// 单个任务执行期间的心跳循环
pub struct JobHeartbeat {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl JobHeartbeat {
    /// 启动心跳，首次心跳在一个间隔之后发送
    pub fn start(
        queue: Arc<dyn TaskQueue>,
        job: Job,
        heartbeat_interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = interval(heartbeat_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("停止任务心跳: {}", job.id);
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = queue.heartbeat_job(&job).await {
                            error!("Failed to send job heartbeat for {}: {}", job.id, e);
                        }
                    }
                }
            }
        });

        Self { cancel, handle }
    }

    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            error!("心跳任务异常退出: {}", e);
        }
    }
}
