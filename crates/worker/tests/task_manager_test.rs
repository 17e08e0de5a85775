mod common;

use std::sync::Arc;
use std::time::Duration;

use arena_core::{ArenaError, Job, TaskParams, TaskQueue, TaskScheduler};
use arena_worker::{ManagerState, TaskManager};
use chrono::Utc;
use common::{options, wait_until, Behavior, RecordingQueue, ScriptedTask};
use serde_json::json;
use tokio_util::sync::CancellationToken;

const WAIT: Duration = Duration::from_secs(3);

fn params(game_id: &str) -> TaskParams {
    let mut params = TaskParams::new();
    params.insert("gameID".to_string(), json!(game_id));
    params
}

async fn started_manager(queue: Arc<RecordingQueue>) -> TaskManager {
    let manager = TaskManager::new(queue, options("server-a"));
    manager.start(CancellationToken::new()).await.unwrap();
    manager
}

#[tokio::test]
async fn test_run_dispatches_job_to_task() {
    let queue = Arc::new(RecordingQueue::new());
    let manager = started_manager(Arc::clone(&queue)).await;
    let task = ScriptedTask::new("echo", Behavior::Succeed);
    manager.register(task.clone()).await;

    let job_id = manager.run("echo", params("g1")).await.unwrap();
    assert!(job_id.starts_with("echo:"));

    assert!(wait_until(WAIT, || async { task.run_count() == 1 }).await);
    assert!(wait_until(WAIT, || async { queue.removals() == 1 }).await);
    assert_eq!(task.params.lock().await[0], params("g1"));
    assert!(manager.processing_jobs().await.unwrap().is_empty());
    assert!(wait_until(WAIT, || async { manager.running_jobs().await == 0 }).await);

    manager.stop().await.unwrap();
}

#[tokio::test]
async fn test_run_unique_runs_once_while_active() {
    let queue = Arc::new(RecordingQueue::new());
    let manager = started_manager(Arc::clone(&queue)).await;
    let task = ScriptedTask::new("game", Behavior::UntilCancelled);
    manager.register(task.clone()).await;

    for _ in 0..3 {
        manager.run_unique("game", params("g1")).await.unwrap();
    }

    assert!(wait_until(WAIT, || async { task.run_count() == 1 }).await);
    assert!(wait_until(WAIT, || async { queue.inner.pending_len().await == 0 }).await);
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(task.run_count(), 1);
    assert_eq!(manager.processing_jobs().await.unwrap().len(), 1);
    assert_eq!(manager.running_jobs().await, 1);

    manager.stop().await.unwrap();
    assert!(wait_until(WAIT, || async { task.cancel_count() == 1 }).await);
}

#[tokio::test]
async fn test_unique_jobs_with_different_params_both_run() {
    let queue = Arc::new(RecordingQueue::new());
    let manager = started_manager(queue).await;
    let task = ScriptedTask::new("game", Behavior::UntilCancelled);
    manager.register(task.clone()).await;

    manager.run_unique("game", params("g1")).await.unwrap();
    manager.run_unique("game", params("g2")).await.unwrap();

    assert!(wait_until(WAIT, || async { task.run_count() == 2 }).await);
    assert_eq!(manager.running_job_ids().await.len(), 2);
    manager.stop().await.unwrap();
}

#[tokio::test]
async fn test_unregistered_task_is_requeued_until_registered() {
    let queue = Arc::new(RecordingQueue::new());
    let manager = started_manager(Arc::clone(&queue)).await;

    manager.run("late", params("g1")).await.unwrap();
    assert!(wait_until(WAIT, || async { queue.pending_calls() >= 2 }).await);

    let task = ScriptedTask::new("late", Behavior::Succeed);
    manager.register(task.clone()).await;

    assert!(wait_until(WAIT, || async { task.run_count() == 1 }).await);
    manager.stop().await.unwrap();
}

#[tokio::test]
async fn test_failed_job_is_removed_without_retry() {
    let queue = Arc::new(RecordingQueue::new());
    let manager = started_manager(Arc::clone(&queue)).await;
    let task = ScriptedTask::new("broken", Behavior::Fail);
    manager.register(task.clone()).await;

    manager.run("broken", TaskParams::new()).await.unwrap();

    assert!(wait_until(WAIT, || async { queue.removals() == 1 }).await);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(task.run_count(), 1);
    assert_eq!(queue.pending_calls(), 1);
    assert!(manager.processing_jobs().await.unwrap().is_empty());

    manager.stop().await.unwrap();
}

#[tokio::test]
async fn test_stale_job_from_dead_host_is_reclaimed() {
    let queue = Arc::new(RecordingQueue::new());
    let mut job = Job::new("game", params("g1"));
    queue.inner.enqueue_to_process(&job).await.unwrap();
    assert!(queue
        .inner
        .claim_job(&mut job, "dead-server", Duration::from_millis(500))
        .await
        .unwrap());
    queue
        .inner
        .set_score(&job.id, Utc::now() - chrono::Duration::seconds(60))
        .await;

    let manager = started_manager(Arc::clone(&queue)).await;
    let task = ScriptedTask::new("game", Behavior::Succeed);
    manager.register(task.clone()).await;

    // 租约过期前不能被领取
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(task.run_count(), 0);

    assert!(wait_until(WAIT, || async { task.run_count() == 1 }).await);
    manager.stop().await.unwrap();
}

#[tokio::test]
async fn test_heartbeat_keeps_running_job_fresh() {
    let queue = Arc::new(RecordingQueue::new());
    let manager = started_manager(Arc::clone(&queue)).await;
    let task = ScriptedTask::new("game", Behavior::UntilCancelled);
    manager.register(task.clone()).await;

    manager.run("game", params("g1")).await.unwrap();
    assert!(wait_until(WAIT, || async { task.run_count() == 1 }).await);

    // 超过两个心跳间隔后任务仍然新鲜，没有被重复领取
    tokio::time::sleep(Duration::from_millis(500)).await;
    let jobs = manager.processing_jobs().await.unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].host, "server-a");
    assert!(jobs[0].is_updated_within(chrono::Duration::milliseconds(200)));
    assert_eq!(task.run_count(), 1);

    manager.stop().await.unwrap();
}

#[tokio::test]
async fn test_stop_waits_for_running_jobs() {
    let queue = Arc::new(RecordingQueue::new());
    let manager = started_manager(Arc::clone(&queue)).await;
    let task = ScriptedTask::new("short", Behavior::Sleep(Duration::from_millis(300)));
    manager.register(task.clone()).await;

    manager.run("short", TaskParams::new()).await.unwrap();
    assert!(wait_until(WAIT, || async { manager.running_jobs().await == 1 }).await);

    manager.stop().await.unwrap();

    assert_eq!(manager.state().await, ManagerState::Stopped);
    assert_eq!(task.cancel_count(), 0);
    assert_eq!(manager.running_jobs().await, 0);
}

#[tokio::test]
async fn test_stop_timeout_cancels_remaining_jobs() {
    let queue = Arc::new(RecordingQueue::new());
    let mut opts = options("server-a");
    opts.stop_timeout = Duration::from_millis(100);
    let manager = TaskManager::new(queue, opts);
    manager.start(CancellationToken::new()).await.unwrap();
    let task = ScriptedTask::new("forever", Behavior::UntilCancelled);
    manager.register(task.clone()).await;

    manager.run("forever", TaskParams::new()).await.unwrap();
    assert!(wait_until(WAIT, || async { task.run_count() == 1 }).await);

    let started = tokio::time::Instant::now();
    manager.stop().await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(manager.state().await, ManagerState::Stopped);

    assert!(wait_until(WAIT, || async { task.cancel_count() == 1 }).await);
}

#[tokio::test]
async fn test_start_twice_fails() {
    let queue = Arc::new(RecordingQueue::new());
    let manager = started_manager(queue).await;
    assert!(manager.started().await);

    let err = manager.start(CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, ArenaError::Internal(_)));

    manager.stop().await.unwrap();
    assert!(!manager.started().await);
    // 停止后可以再次启动
    manager.start(CancellationToken::new()).await.unwrap();
    manager.stop().await.unwrap();
}

#[tokio::test]
async fn test_external_cancel_stops_manager() {
    let queue = Arc::new(RecordingQueue::new());
    let manager = TaskManager::new(queue, options("server-a"));
    let cancel = CancellationToken::new();
    manager.start(cancel.clone()).await.unwrap();

    cancel.cancel();

    assert!(wait_until(WAIT, || async { manager.state().await == ManagerState::Stopped }).await);
    // 再次停止是空操作
    manager.stop().await.unwrap();
}

#[tokio::test]
async fn test_stopped_manager_does_not_pick_up_work() {
    let queue = Arc::new(RecordingQueue::new());
    let manager = TaskManager::new(Arc::clone(&queue) as Arc<dyn TaskQueue>, options("server-a"));
    let task = ScriptedTask::new("echo", Behavior::Succeed);
    manager.register(task.clone()).await;
    assert_eq!(manager.task_ids().await, vec!["echo"]);
    assert!(manager.get_task_by_id("echo").await.is_some());

    manager.run("echo", TaskParams::new()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(task.run_count(), 0);
    assert_eq!(queue.inner.pending_len().await, 1);

    manager.flush().await.unwrap();
    assert_eq!(queue.inner.pending_len().await, 0);
}

#[tokio::test]
async fn test_unregistered_job_is_removed_before_requeue() {
    let queue = Arc::new(RecordingQueue::new());
    let manager = started_manager(Arc::clone(&queue)).await;

    let job_id = manager.run("late", params("g1")).await.unwrap();
    assert!(wait_until(WAIT, || async { queue.pending_calls() >= 2 }).await);
    manager.stop().await.unwrap();

    let calls = queue.calls_for(&job_id).await;
    assert_eq!(
        &calls[..4],
        &["enqueue_pending", "enqueue_to_process", "remove_from_processing", "enqueue_pending"]
    );
}

#[tokio::test]
async fn test_lock_error_returns_job_to_pending() {
    let queue = Arc::new(RecordingQueue::new());
    queue.fail_lock.store(true, std::sync::atomic::Ordering::SeqCst);
    let manager = started_manager(Arc::clone(&queue)).await;
    let task = ScriptedTask::new("game", Behavior::Succeed);
    manager.register(task.clone()).await;

    let job_id = manager.run_unique("game", params("g1")).await.unwrap();
    assert!(wait_until(WAIT, || async { queue.pending_calls() >= 3 }).await);
    assert_eq!(task.run_count(), 0);
    assert!(!queue.calls_for(&job_id).await.contains(&"enqueue_to_process"));

    queue.fail_lock.store(false, std::sync::atomic::Ordering::SeqCst);
    assert!(wait_until(WAIT, || async { task.run_count() == 1 }).await);
    manager.stop().await.unwrap();
}

#[tokio::test]
async fn test_enqueue_to_process_error_returns_job_to_pending() {
    let queue = Arc::new(RecordingQueue::new());
    queue
        .fail_enqueue_to_process
        .store(true, std::sync::atomic::Ordering::SeqCst);
    let manager = started_manager(Arc::clone(&queue)).await;
    let task = ScriptedTask::new("echo", Behavior::Succeed);
    manager.register(task.clone()).await;

    manager.run("echo", params("g1")).await.unwrap();
    assert!(wait_until(WAIT, || async { queue.pending_calls() >= 3 }).await);
    assert_eq!(task.run_count(), 0);
    assert!(manager.processing_jobs().await.unwrap().is_empty());

    queue
        .fail_enqueue_to_process
        .store(false, std::sync::atomic::Ordering::SeqCst);
    assert!(wait_until(WAIT, || async { task.run_count() == 1 }).await);
    manager.stop().await.unwrap();
}

#[tokio::test]
async fn test_pending_copy_of_running_job_is_skipped() {
    let queue = Arc::new(RecordingQueue::new());
    let manager = started_manager(Arc::clone(&queue)).await;
    let task = ScriptedTask::new("game", Behavior::UntilCancelled);
    manager.register(task.clone()).await;

    let job_id = manager.run_unique("game", params("g1")).await.unwrap();
    assert!(wait_until(WAIT, || async { task.run_count() == 1 }).await);

    // 同ID的任务再次出现在待处理队列
    let running = manager.processing_jobs().await.unwrap().remove(0);
    queue.inner.enqueue_pending(&running).await.unwrap();
    assert!(wait_until(WAIT, || async { queue.inner.pending_len().await == 0 }).await);
    tokio::time::sleep(Duration::from_millis(300)).await;

    let calls = queue.calls_for(&job_id).await;
    assert_eq!(calls.iter().filter(|op| **op == "enqueue_to_process").count(), 1);
    let jobs = manager.processing_jobs().await.unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].host, "server-a");
    assert_eq!(task.run_count(), 1);

    manager.stop().await.unwrap();
}
