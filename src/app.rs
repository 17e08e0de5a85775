use std::sync::Arc;

use anyhow::{Context, Result};
use arena_core::{AppConfig, BackendKind, MessageBus, TaskParams, TaskQueue, TaskScheduler};
use arena_dispatcher::{GameWorker, GameWorkerOptions, GeofenceWorker, GEOFENCE_WORKER_ID};
use arena_domain::GameRepository;
use arena_infrastructure::{
    BusDetectionStream, InMemoryGameRepository, InMemoryMessageBus, InMemoryTaskQueue,
    RedisGameRepository, RedisMessageBus, RedisStore, RedisTaskQueue,
};
use arena_worker::{TaskManager, TaskManagerOptions};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// 一组共享存储后端
#[derive(Clone)]
pub struct Backends {
    pub queue: Arc<dyn TaskQueue>,
    pub bus: Arc<dyn MessageBus>,
    pub repository: Arc<dyn GameRepository>,
    pub detections: Arc<BusDetectionStream>,
}

impl Backends {
    /// 根据配置创建后端
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let lease_ttl = TaskManagerOptions::from(&config.task_manager).lease_ttl();
        let prefix = config.redis.key_prefix.as_str();

        let (queue, bus, repository): (Arc<dyn TaskQueue>, Arc<dyn MessageBus>, Arc<dyn GameRepository>) =
            match config.backend {
                BackendKind::Redis => {
                    let store = RedisStore::connect(&config.redis)
                        .await
                        .with_context(|| format!("连接Redis失败: {}", config.redis.url))?;
                    (
                        Arc::new(RedisTaskQueue::new(&store, lease_ttl)),
                        Arc::new(RedisMessageBus::new(&store)),
                        Arc::new(RedisGameRepository::new(
                            &store,
                            config.game.running_window(),
                        )),
                    )
                }
                BackendKind::Memory => (
                    Arc::new(InMemoryTaskQueue::new(prefix, lease_ttl)),
                    Arc::new(InMemoryMessageBus::new()),
                    Arc::new(InMemoryGameRepository::new(config.game.running_window())),
                ),
            };

        let detections = Arc::new(BusDetectionStream::new(Arc::clone(&bus), prefix));
        Ok(Self {
            queue,
            bus,
            repository,
            detections,
        })
    }
}

/// 主应用程序
pub struct Application {
    config: AppConfig,
    backends: Backends,
    manager: TaskManager,
    cancel: CancellationToken,
}

impl Application {
    pub async fn new(config: AppConfig) -> Result<Self> {
        config.validate().context("配置校验失败")?;
        info!("初始化应用程序，后端: {:?}", config.backend);

        let backends = Backends::from_config(&config).await?;
        Ok(Self::with_backends(config, backends))
    }

    /// 使用已创建的后端组装应用
    pub fn with_backends(config: AppConfig, backends: Backends) -> Self {
        let options = TaskManagerOptions::from(&config.task_manager);
        let manager = TaskManager::new(Arc::clone(&backends.queue), options);

        Self {
            config,
            backends,
            manager,
            cancel: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn backends(&self) -> &Backends {
        &self.backends
    }

    pub fn manager(&self) -> &TaskManager {
        &self.manager
    }

    /// 注册任务并启动任务管理器，然后提交唯一的围栏监听任务
    pub async fn start(&self) -> Result<()> {
        let server_id = self.config.task_manager.host.clone();

        let game_worker = GameWorker::new(
            Arc::clone(&self.backends.repository),
            self.backends.detections.clone(),
            Arc::clone(&self.backends.bus),
            GameWorkerOptions::new(server_id.as_str(), &self.config.game),
        );
        let geofence_worker = GeofenceWorker::new(
            self.backends.detections.clone(),
            Arc::clone(&self.backends.repository),
            Arc::new(self.manager.scheduler()),
            Arc::clone(&self.backends.bus),
        );
        self.manager.register(Arc::new(game_worker)).await;
        self.manager.register(Arc::new(geofence_worker)).await;

        self.manager
            .start(self.cancel.child_token())
            .await
            .context("启动任务管理器失败")?;

        let job_id = self
            .manager
            .run_unique(GEOFENCE_WORKER_ID, TaskParams::new())
            .await
            .context("提交围栏监听任务失败")?;
        info!("应用已启动，服务器: {}，围栏任务: {}", server_id, job_id);
        Ok(())
    }

    /// 停止任务管理器，等待运行中的对局收尾
    pub async fn stop(&self) -> Result<()> {
        info!("停止应用程序");
        self.manager.stop().await.context("停止任务管理器失败")?;
        self.cancel.cancel();
        Ok(())
    }

    /// 启动后一直运行到收到关闭信号
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        self.start().await?;
        let _ = shutdown_rx.recv().await;
        self.stop().await
    }
}
