use std::sync::Arc;

use arena_core::{ArenaError, ArenaResult, MessageBus, Task, TaskParams, TaskScheduler};
use arena_domain::{GameRepository, GeofenceCrossing, GeofenceStream};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::game_worker::{GameWorker, GAME_WORKER_ID};

pub const GEOFENCE_WORKER_ID: &str = "GeofenceWorker";

/// 玩家进入围栏附近时转发原始事件的主题
pub const GEOFENCE_NEAR_TOPIC: &str = "geofences:player:near:events";

/// 监听围栏事件，为尚未运行的对局提交唯一的GameWorker任务
///
/// 启动时以`run_unique`提交，集群内只有一个实例在运行。
pub struct GeofenceWorker {
    geofences: Arc<dyn GeofenceStream>,
    repository: Arc<dyn GameRepository>,
    scheduler: Arc<dyn TaskScheduler>,
    bus: Arc<dyn MessageBus>,
}

impl GeofenceWorker {
    pub fn new(
        geofences: Arc<dyn GeofenceStream>,
        repository: Arc<dyn GameRepository>,
        scheduler: Arc<dyn TaskScheduler>,
        bus: Arc<dyn MessageBus>,
    ) -> Self {
        Self {
            geofences,
            repository,
            scheduler,
            bus,
        }
    }

    async fn handle_crossing(&self, crossing: &GeofenceCrossing) {
        match serde_json::to_vec(crossing) {
            Ok(bytes) => {
                if let Err(e) = self.bus.publish(GEOFENCE_NEAR_TOPIC, bytes).await {
                    warn!("转发围栏事件失败: {}", e);
                }
            }
            Err(e) => warn!("序列化围栏事件失败: {}", e),
        }

        match self.repository.is_running(&crossing.geofence_id).await {
            Ok(true) => {
                debug!("对局{}已在运行", crossing.geofence_id);
                return;
            }
            Ok(false) => {}
            Err(e) => {
                error!("查询对局{}状态失败: {}", crossing.geofence_id, e);
                return;
            }
        }

        let params = GameWorker::params(&crossing.geofence_id, &crossing.coordinates);
        match self.scheduler.run_unique(GAME_WORKER_ID, params).await {
            Ok(job_id) => debug!(
                "Submitted game worker {} for geofence {}",
                job_id, crossing.geofence_id
            ),
            Err(e) => error!("提交对局任务失败 {}: {}", crossing.geofence_id, e),
        }
    }
}

#[async_trait]
impl Task for GeofenceWorker {
    fn id(&self) -> &str {
        GEOFENCE_WORKER_ID
    }

    async fn run(&self, cancel: CancellationToken, _params: TaskParams) -> ArenaResult<()> {
        info!("Geofence worker started");
        let token = cancel.child_token();
        let (tx, mut rx) = mpsc::channel::<GeofenceCrossing>(1);

        let subscription = {
            let geofences = Arc::clone(&self.geofences);
            let token = token.clone();
            tokio::spawn(async move {
                let result = geofences.subscribe(token.clone(), tx).await;
                if let Err(e) = &result {
                    error!("订阅围栏事件失败: {}", e);
                    token.cancel();
                }
                result
            })
        };

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                crossing = rx.recv() => match crossing {
                    Some(crossing) => self.handle_crossing(&crossing).await,
                    None => break,
                },
            }
        }

        token.cancel();
        drop(rx);
        let result = match subscription.await {
            Ok(result) => result,
            Err(e) => Err(ArenaError::Subscription(format!("订阅任务异常退出: {}", e))),
        };
        info!("Geofence worker stopped");
        result
    }
}
