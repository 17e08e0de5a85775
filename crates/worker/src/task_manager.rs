//! 任务管理器
//!
//! 轮询队列并把任务分发给已注册的实现：
//! - 待处理轮询：取出任务，唯一任务先加锁，再放入处理中集合
//! - 处理中轮询：找到心跳过期的任务，获取执行租约后在新的tokio任务中执行
//!
//! 跨进程互斥全部依赖队列后端；本地状态只记录本进程正在运行的任务。

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use arena_core::{
    ArenaError, ArenaResult, Job, Task, TaskManagerConfig, TaskParams, TaskQueue, TaskScheduler,
};
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::components::JobExecutionManager;
use crate::registry::TaskRegistry;
use crate::scheduler::QueueScheduler;

/// 任务管理器运行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl fmt::Display for ManagerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ManagerState::Stopped => "stopped",
            ManagerState::Starting => "starting",
            ManagerState::Running => "running",
            ManagerState::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

/// 任务管理器参数
#[derive(Debug, Clone)]
pub struct TaskManagerOptions {
    /// 本机标识，作为执行租约的持有者
    pub host: String,
    pub poll_interval: Duration,
    pub heartbeat_interval: Duration,
    pub stop_timeout: Duration,
}

impl TaskManagerOptions {
    /// 心跳超过两个间隔即视为失联；锁和租约的TTL与之相同
    pub fn lease_ttl(&self) -> Duration {
        self.heartbeat_interval * 2
    }
}

impl From<&TaskManagerConfig> for TaskManagerOptions {
    fn from(config: &TaskManagerConfig) -> Self {
        Self {
            host: config.host.clone(),
            poll_interval: config.poll_interval(),
            heartbeat_interval: config.heartbeat_interval(),
            stop_timeout: config.stop_timeout(),
        }
    }
}

struct Inner {
    queue: Arc<dyn TaskQueue>,
    registry: TaskRegistry,
    executor: JobExecutionManager,
    options: TaskManagerOptions,
    state: RwLock<ManagerState>,
    shutdown: Mutex<Option<CancellationToken>>,
    poll_handle: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Clone)]
pub struct TaskManager {
    inner: Arc<Inner>,
}

impl TaskManager {
    pub fn new(queue: Arc<dyn TaskQueue>, options: TaskManagerOptions) -> Self {
        Self::with_registry(queue, TaskRegistry::new(), options)
    }

    pub fn with_registry(
        queue: Arc<dyn TaskQueue>,
        registry: TaskRegistry,
        options: TaskManagerOptions,
    ) -> Self {
        let executor = JobExecutionManager::new(
            Arc::clone(&queue),
            registry.clone(),
            options.heartbeat_interval,
        );
        Self {
            inner: Arc::new(Inner {
                queue,
                registry,
                executor,
                options,
                state: RwLock::new(ManagerState::Stopped),
                shutdown: Mutex::new(None),
                poll_handle: Mutex::new(None),
            }),
        }
    }

    pub async fn register(&self, task: Arc<dyn Task>) {
        self.inner.registry.register(task).await;
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.inner.registry
    }

    /// 只负责提交任务的句柄，不持有管理器本身
    pub fn scheduler(&self) -> QueueScheduler {
        QueueScheduler::new(Arc::clone(&self.inner.queue))
    }

    pub fn host(&self) -> &str {
        &self.inner.options.host
    }

    pub async fn state(&self) -> ManagerState {
        *self.inner.state.read().await
    }

    pub async fn started(&self) -> bool {
        self.state().await == ManagerState::Running
    }

    pub async fn task_ids(&self) -> Vec<String> {
        self.inner.registry.ids().await
    }

    pub async fn get_task_by_id(&self, id: &str) -> Option<Arc<dyn Task>> {
        self.inner.registry.get(id).await
    }

    /// 本进程正在执行的任务数
    pub async fn running_jobs(&self) -> usize {
        self.inner.executor.running_count().await
    }

    pub async fn running_job_ids(&self) -> Vec<String> {
        self.inner.executor.running_job_ids().await
    }

    /// 所有进程处于处理中状态的任务
    pub async fn processing_jobs(&self) -> ArenaResult<Vec<Job>> {
        self.inner.queue.jobs_in_process().await
    }

    pub async fn flush(&self) -> ArenaResult<()> {
        self.inner.queue.flush().await
    }

    /// 启动轮询循环；`cancel`被取消时按`stop`的流程关闭
    pub async fn start(&self, cancel: CancellationToken) -> ArenaResult<()> {
        // 启动期间持有状态写锁，轮询循环要等到状态变为Running才会工作
        let mut state = self.inner.state.write().await;
        if *state != ManagerState::Stopped {
            return Err(ArenaError::Internal(format!(
                "Task manager already {}",
                *state
            )));
        }
        *state = ManagerState::Starting;

        info!("Starting task manager on host: {}", self.inner.options.host);
        let shutdown = CancellationToken::new();
        *self.inner.shutdown.lock().await = Some(shutdown.clone());

        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move { Inner::poll_loop(inner, cancel, shutdown).await });
        *self.inner.poll_handle.lock().await = Some(handle);

        *state = ManagerState::Running;
        info!("Task manager started");
        Ok(())
    }

    /// 停止领取新任务，等待运行中的任务结束（有超时），然后取消剩余任务
    pub async fn stop(&self) -> ArenaResult<()> {
        self.inner.stop().await;
        Ok(())
    }
}

impl Inner {
    async fn poll_loop(inner: Arc<Inner>, cancel: CancellationToken, shutdown: CancellationToken) {
        let mut pending_tick = interval(inner.options.poll_interval);
        let mut process_tick = interval(inner.options.poll_interval);
        pending_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        process_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut cancel_seen = false;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = cancel.cancelled(), if !cancel_seen => {
                    cancel_seen = true;
                    info!("收到取消信号，停止任务管理器");
                    let inner = Arc::clone(&inner);
                    tokio::spawn(async move { inner.stop().await });
                }
                _ = pending_tick.tick() => {
                    if inner.is_running().await {
                        inner.process_pending().await;
                    }
                }
                _ = process_tick.tick() => {
                    if inner.is_running().await {
                        inner.process_in_flight(&shutdown).await;
                    }
                }
            }
        }

        debug!("任务管理器轮询循环已退出");
    }

    async fn is_running(&self) -> bool {
        *self.state.read().await == ManagerState::Running
    }

    async fn process_pending(&self) {
        let job = match self.queue.poll_pending().await {
            Ok(Some(job)) => job,
            Ok(None) => return,
            Err(e) => {
                error!("拉取待处理任务失败: {}", e);
                return;
            }
        };

        if job.unique {
            match self.queue.set_job_lock(&job, self.options.lease_ttl()).await {
                Ok(true) => {}
                Ok(false) => {
                    debug!("唯一任务已在执行，丢弃: {}", job.id);
                    return;
                }
                Err(e) => {
                    error!("获取唯一任务锁失败 {}: {}", job.id, e);
                    self.requeue(&job).await;
                    return;
                }
            }
        }

        match self.queue.is_job_in_process(&job).await {
            Ok(true) => {
                debug!("任务已在处理中，跳过: {}", job.id);
                return;
            }
            Ok(false) => {}
            Err(e) => {
                error!("查询处理中任务失败 {}: {}", job.id, e);
                self.requeue(&job).await;
                return;
            }
        }

        if let Err(e) = self.queue.enqueue_to_process(&job).await {
            error!("放入处理中集合失败 {}: {}", job.id, e);
            self.requeue(&job).await;
        }
    }

    async fn process_in_flight(&self, shutdown: &CancellationToken) {
        let window = chrono::Duration::milliseconds(
            i64::try_from(self.options.lease_ttl().as_millis()).unwrap_or(i64::MAX),
        );
        let updated_before = Utc::now() - window;

        let mut job = match self.queue.poll_process(updated_before).await {
            Ok(Some(job)) => job,
            Ok(None) => return,
            Err(e) => {
                error!("拉取处理中任务失败: {}", e);
                return;
            }
        };

        match self
            .queue
            .claim_job(&mut job, &self.options.host, self.options.lease_ttl())
            .await
        {
            Ok(true) => self.executor.spawn(job, shutdown.child_token()).await,
            Ok(false) => debug!("任务{}仍由其他进程持有", job.id),
            Err(e) => error!("获取任务租约失败 {}: {}", job.id, e),
        }
    }

    async fn requeue(&self, job: &Job) {
        if let Err(e) = self.queue.enqueue_pending(job).await {
            error!("任务{}放回待处理队列失败: {}", job.id, e);
        }
    }

    async fn stop(&self) {
        {
            let mut state = self.state.write().await;
            match *state {
                ManagerState::Running => *state = ManagerState::Stopping,
                ManagerState::Stopping => {
                    drop(state);
                    self.wait_until_stopped().await;
                    return;
                }
                _ => {
                    debug!("任务管理器当前状态为{}，忽略停止请求", *state);
                    return;
                }
            }
        }

        info!("停止任务管理器: {}", self.options.host);
        self.wait_for_running_jobs().await;

        if let Some(shutdown) = self.shutdown.lock().await.take() {
            shutdown.cancel();
        }
        if let Some(handle) = self.poll_handle.lock().await.take() {
            if let Err(e) = handle.await {
                error!("轮询循环异常退出: {}", e);
            }
        }

        *self.state.write().await = ManagerState::Stopped;
        info!("Task manager stopped");
    }

    /// 另一个调用方正在停止时，等待其完成
    async fn wait_until_stopped(&self) {
        let deadline = Instant::now() + self.options.stop_timeout * 2;
        while *self.state.read().await != ManagerState::Stopped {
            if Instant::now() >= deadline {
                warn!("等待任务管理器停止超时");
                return;
            }
            sleep(self.options.poll_interval).await;
        }
    }

    async fn wait_for_running_jobs(&self) {
        let deadline = Instant::now() + self.options.stop_timeout;
        let check_interval = self.options.poll_interval * 2;

        loop {
            let running = self.executor.running_count().await;
            if running == 0 {
                return;
            }
            if Instant::now() >= deadline {
                warn!(
                    "等待运行中任务超时（{:?}），仍有{}个任务在运行，将被取消",
                    self.options.stop_timeout, running
                );
                return;
            }
            debug!("等待{}个运行中的任务结束", running);
            sleep(check_interval).await;
        }
    }
}

#[async_trait]
impl TaskScheduler for TaskManager {
    async fn run(&self, task_id: &str, params: TaskParams) -> ArenaResult<String> {
        self.scheduler().run(task_id, params).await
    }

    async fn run_unique(&self, task_id: &str, params: TaskParams) -> ArenaResult<String> {
        self.scheduler().run_unique(task_id, params).await
    }
}
