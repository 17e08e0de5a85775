use std::sync::Arc;
use std::time::Duration;

use arena_core::{Job, TaskParams, TaskQueue};
use arena_infrastructure::InMemoryTaskQueue;
use chrono::Utc;
use serde_json::json;

fn queue() -> InMemoryTaskQueue {
    InMemoryTaskQueue::new("arena-test", Duration::from_secs(10))
}

fn game_params(game_id: &str) -> TaskParams {
    let mut params = TaskParams::new();
    params.insert("gameID".to_string(), json!(game_id));
    params.insert("coordinates".to_string(), json!("[]"));
    params
}

#[tokio::test]
async fn test_pending_is_fifo() {
    let queue = queue();
    let first = Job::new("GameWorker", game_params("g1"));
    let second = Job::new("GameWorker", game_params("g2"));

    queue.enqueue_pending(&first).await.unwrap();
    queue.enqueue_pending(&second).await.unwrap();

    assert_eq!(queue.poll_pending().await.unwrap().unwrap().id, first.id);
    assert_eq!(queue.poll_pending().await.unwrap().unwrap().id, second.id);
    assert!(queue.poll_pending().await.unwrap().is_none());
}

#[tokio::test]
async fn test_duplicate_unique_job_keeps_one_in_process() {
    let queue = queue();
    let mut job = Job::new_unique("GameWorker", game_params("g1"));
    job.id = "j1".to_string();

    for _ in 0..2 {
        if queue.set_job_lock(&job, Duration::from_secs(10)).await.unwrap() {
            queue.enqueue_to_process(&job).await.unwrap();
        }
    }

    assert_eq!(queue.jobs_in_process().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_unique_lock_rejects_same_params() {
    let queue = queue();
    let first = Job::new_unique("GameWorker", game_params("g1"));
    let duplicate = Job::new_unique("GameWorker", game_params("g1"));
    let other = Job::new_unique("GameWorker", game_params("g2"));

    assert!(queue.set_job_lock(&first, Duration::from_secs(10)).await.unwrap());
    assert!(!queue.set_job_lock(&duplicate, Duration::from_secs(10)).await.unwrap());
    assert!(queue.set_job_lock(&other, Duration::from_secs(10)).await.unwrap());
}

#[tokio::test]
async fn test_concurrent_lock_attempts_have_one_winner() {
    let queue = Arc::new(queue());
    let mut handles = Vec::new();
    for _ in 0..16 {
        let queue = Arc::clone(&queue);
        handles.push(tokio::spawn(async move {
            let job = Job::new_unique("GameWorker", game_params("contended"));
            queue.set_job_lock(&job, Duration::from_secs(10)).await.unwrap()
        }));
    }

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
}

#[tokio::test(start_paused = true)]
async fn test_unique_lock_expires() {
    let queue = queue();
    let first = Job::new_unique("GameWorker", game_params("g1"));
    let second = Job::new_unique("GameWorker", game_params("g1"));

    assert!(queue.set_job_lock(&first, Duration::from_secs(1)).await.unwrap());
    tokio::time::advance(Duration::from_secs(2)).await;
    assert!(queue.set_job_lock(&second, Duration::from_secs(1)).await.unwrap());
}

#[tokio::test]
async fn test_remove_releases_unique_lock() {
    let queue = queue();
    let first = Job::new_unique("GameWorker", game_params("g1"));
    assert!(queue.set_job_lock(&first, Duration::from_secs(10)).await.unwrap());
    queue.enqueue_to_process(&first).await.unwrap();

    queue.remove_from_processing(&first).await.unwrap();
    assert!(!queue.is_job_in_process(&first).await.unwrap());

    let again = Job::new_unique("GameWorker", game_params("g1"));
    assert!(queue.set_job_lock(&again, Duration::from_secs(10)).await.unwrap());
}

#[tokio::test]
async fn test_poll_process_returns_only_stale_jobs() {
    let queue = queue();
    let mut job = Job::new("GameWorker", game_params("g1"));
    queue.enqueue_to_process(&job).await.unwrap();

    // 新入队的任务分数为0，立即可被领取
    let found = queue.poll_process(Utc::now()).await.unwrap().unwrap();
    assert_eq!(found.id, job.id);
    assert_eq!(found.last_update.unwrap().timestamp_millis(), 0);

    assert!(queue.claim_job(&mut job, "server-a", Duration::from_secs(10)).await.unwrap());
    assert_eq!(job.host, "server-a");

    let window = Utc::now() - chrono::Duration::seconds(10);
    assert!(queue.poll_process(window).await.unwrap().is_none());

    queue
        .set_score(&job.id, Utc::now() - chrono::Duration::seconds(30))
        .await;
    let stale = queue.poll_process(window).await.unwrap().unwrap();
    assert_eq!(stale.id, job.id);
    assert_eq!(stale.host, "server-a");
    assert!(!stale.is_updated_within(chrono::Duration::seconds(10)));
}

#[tokio::test]
async fn test_live_lease_blocks_reclaim() {
    let queue = queue();
    let mut job = Job::new("GameWorker", game_params("g1"));
    queue.enqueue_to_process(&job).await.unwrap();

    assert!(queue.claim_job(&mut job, "server-a", Duration::from_secs(10)).await.unwrap());

    let mut copy = job.clone();
    assert!(!queue.claim_job(&mut copy, "server-b", Duration::from_secs(10)).await.unwrap());
    assert!(!queue.claim_job(&mut copy, "server-a", Duration::from_secs(10)).await.unwrap());

    queue.expire_lease(&job).await;
    assert!(queue.claim_job(&mut copy, "server-b", Duration::from_secs(10)).await.unwrap());
    assert_eq!(copy.host, "server-b");
}

#[tokio::test]
async fn test_heartbeat_only_touches_members() {
    let queue = queue();
    let job = Job::new("GameWorker", game_params("g1"));

    queue.heartbeat_job(&job).await.unwrap();
    assert!(!queue.is_job_in_process(&job).await.unwrap());

    queue.enqueue_to_process(&job).await.unwrap();
    queue.heartbeat_job(&job).await.unwrap();
    let jobs = queue.jobs_in_process().await.unwrap();
    assert!(jobs[0].is_updated_within(chrono::Duration::seconds(5)));
}

#[tokio::test]
async fn test_flush() {
    let queue = queue();
    let job = Job::new_unique("GameWorker", game_params("g1"));
    queue.enqueue_pending(&job).await.unwrap();
    queue.set_job_lock(&job, Duration::from_secs(10)).await.unwrap();
    queue.enqueue_to_process(&job).await.unwrap();

    queue.flush().await.unwrap();

    assert_eq!(queue.pending_len().await, 0);
    assert!(queue.jobs_in_process().await.unwrap().is_empty());
    let other = Job::new_unique("GameWorker", game_params("g1"));
    assert!(queue.set_job_lock(&other, Duration::from_secs(10)).await.unwrap());
}

#[tokio::test]
async fn test_completed_job_cannot_be_claimed_again() {
    let queue = queue();
    let job = Job::new("GameWorker", game_params("g1"));
    queue.enqueue_to_process(&job).await.unwrap();

    // 两台主机在同一轮轮询中拿到同一个任务
    let mut on_a = queue.poll_process(Utc::now()).await.unwrap().unwrap();
    let mut on_b = queue.poll_process(Utc::now()).await.unwrap().unwrap();

    assert!(queue.claim_job(&mut on_a, "server-a", Duration::from_secs(10)).await.unwrap());
    queue.remove_from_processing(&on_a).await.unwrap();

    assert!(!queue.claim_job(&mut on_b, "server-b", Duration::from_secs(10)).await.unwrap());
    assert_eq!(on_b.host, "");
    assert!(!queue.is_job_in_process(&job).await.unwrap());
    assert!(queue.jobs_in_process().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_enqueue_to_process_keeps_running_job() {
    let queue = queue();
    let mut job = Job::new_unique("GameWorker", game_params("g1"));
    job.id = "j1".to_string();
    assert!(queue.set_job_lock(&job, Duration::from_secs(10)).await.unwrap());
    queue.enqueue_to_process(&job).await.unwrap();

    let mut running = job.clone();
    assert!(queue.claim_job(&mut running, "server-a", Duration::from_secs(10)).await.unwrap());

    // 同ID的重复任务通过可重入锁后再次入队
    assert!(queue.set_job_lock(&job, Duration::from_secs(10)).await.unwrap());
    queue.enqueue_to_process(&job).await.unwrap();

    let jobs = queue.jobs_in_process().await.unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].host, "server-a");
    assert!(jobs[0].is_updated_within(chrono::Duration::seconds(5)));
}
