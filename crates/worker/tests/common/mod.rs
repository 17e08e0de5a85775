#![allow(dead_code)]

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arena_core::{ArenaError, ArenaResult, Job, Task, TaskParams, TaskQueue};
use arena_infrastructure::InMemoryTaskQueue;
use arena_worker::TaskManagerOptions;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

pub fn options(host: &str) -> TaskManagerOptions {
    TaskManagerOptions {
        host: host.to_string(),
        poll_interval: Duration::from_millis(10),
        heartbeat_interval: Duration::from_millis(100),
        stop_timeout: Duration::from_secs(2),
    }
}

/// 轮询直到条件满足或超时
pub async fn wait_until<F, Fut>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition().await
}

/// 记录调用的内存队列，可按开关注入失败
pub struct RecordingQueue {
    pub inner: InMemoryTaskQueue,
    pub enqueue_pending_calls: AtomicUsize,
    pub remove_calls: AtomicUsize,
    pub fail_lock: AtomicBool,
    pub fail_enqueue_to_process: AtomicBool,
    /// (操作, 任务实例ID)，按调用顺序
    pub calls: Mutex<Vec<(&'static str, String)>>,
}

impl RecordingQueue {
    pub fn new() -> Self {
        Self {
            inner: InMemoryTaskQueue::new("arena-test", Duration::from_millis(200)),
            enqueue_pending_calls: AtomicUsize::new(0),
            remove_calls: AtomicUsize::new(0),
            fail_lock: AtomicBool::new(false),
            fail_enqueue_to_process: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// 某个任务实例的调用顺序
    pub async fn calls_for(&self, job_id: &str) -> Vec<&'static str> {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|(_, id)| id == job_id)
            .map(|(op, _)| *op)
            .collect()
    }

    async fn record(&self, op: &'static str, job: &Job) {
        self.calls.lock().await.push((op, job.id.clone()));
    }

    pub fn pending_calls(&self) -> usize {
        self.enqueue_pending_calls.load(Ordering::SeqCst)
    }

    pub fn removals(&self) -> usize {
        self.remove_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskQueue for RecordingQueue {
    async fn enqueue_pending(&self, job: &Job) -> ArenaResult<()> {
        self.enqueue_pending_calls.fetch_add(1, Ordering::SeqCst);
        self.record("enqueue_pending", job).await;
        self.inner.enqueue_pending(job).await
    }

    async fn poll_pending(&self) -> ArenaResult<Option<Job>> {
        self.inner.poll_pending().await
    }

    async fn enqueue_to_process(&self, job: &Job) -> ArenaResult<()> {
        self.record("enqueue_to_process", job).await;
        if self.fail_enqueue_to_process.load(Ordering::SeqCst) {
            return Err(ArenaError::QueueBackend("injected enqueue failure".to_string()));
        }
        self.inner.enqueue_to_process(job).await
    }

    async fn poll_process(&self, updated_before: DateTime<Utc>) -> ArenaResult<Option<Job>> {
        self.inner.poll_process(updated_before).await
    }

    async fn remove_from_processing(&self, job: &Job) -> ArenaResult<()> {
        self.remove_calls.fetch_add(1, Ordering::SeqCst);
        self.record("remove_from_processing", job).await;
        self.inner.remove_from_processing(job).await
    }

    async fn set_job_lock(&self, job: &Job, ttl: Duration) -> ArenaResult<bool> {
        self.record("set_job_lock", job).await;
        if self.fail_lock.load(Ordering::SeqCst) {
            return Err(ArenaError::QueueBackend("injected lock failure".to_string()));
        }
        self.inner.set_job_lock(job, ttl).await
    }

    async fn claim_job(&self, job: &mut Job, host: &str, ttl: Duration) -> ArenaResult<bool> {
        self.inner.claim_job(job, host, ttl).await
    }

    async fn heartbeat_job(&self, job: &Job) -> ArenaResult<()> {
        self.inner.heartbeat_job(job).await
    }

    async fn is_job_in_process(&self, job: &Job) -> ArenaResult<bool> {
        self.inner.is_job_in_process(job).await
    }

    async fn jobs_in_process(&self) -> ArenaResult<Vec<Job>> {
        self.inner.jobs_in_process().await
    }

    async fn flush(&self) -> ArenaResult<()> {
        self.inner.flush().await
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Behavior {
    Succeed,
    Fail,
    Sleep(Duration),
    /// 一直运行直到被取消
    UntilCancelled,
}

/// 按预设行为运行并记录调用的任务
pub struct ScriptedTask {
    id: String,
    behavior: Behavior,
    pub runs: AtomicUsize,
    pub cancelled: AtomicUsize,
    pub params: Mutex<Vec<TaskParams>>,
}

impl ScriptedTask {
    pub fn new(id: &str, behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            behavior,
            runs: AtomicUsize::new(0),
            cancelled: AtomicUsize::new(0),
            params: Mutex::new(Vec::new()),
        })
    }

    pub fn run_count(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    pub fn cancel_count(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Task for ScriptedTask {
    fn id(&self) -> &str {
        &self.id
    }

    async fn run(&self, cancel: CancellationToken, params: TaskParams) -> ArenaResult<()> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        self.params.lock().await.push(params);

        match self.behavior {
            Behavior::Succeed => Ok(()),
            Behavior::Fail => Err(ArenaError::TaskExecution("scripted failure".to_string())),
            Behavior::Sleep(duration) => {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        self.cancelled.fetch_add(1, Ordering::SeqCst);
                    }
                    _ = tokio::time::sleep(duration) => {}
                }
                Ok(())
            }
            Behavior::UntilCancelled => {
                cancel.cancelled().await;
                self.cancelled.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }
    }
}
