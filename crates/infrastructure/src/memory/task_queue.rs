use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use arena_core::{ArenaResult, Job, TaskQueue};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::QueueKeys;

#[derive(Debug, Default)]
struct QueueState {
    /// 队首为最早入队的任务
    pending: VecDeque<String>,
    jobs: HashMap<String, Job>,
    /// 处理中任务的最近心跳时间（毫秒）
    scores: HashMap<String, i64>,
    /// 锁名称 -> (持有者, 过期时间)
    locks: HashMap<String, (String, Instant)>,
}

impl QueueState {
    /// `reentrant`为true时，同一持有者可以重复获取
    fn try_lock(&mut self, name: &str, owner: &str, ttl: Duration, reentrant: bool) -> bool {
        let now = Instant::now();
        match self.locks.get(name) {
            Some((holder, expires_at)) if *expires_at > now && !(reentrant && holder == owner) => {
                false
            }
            _ => {
                self.locks.insert(name.to_string(), (owner.to_string(), now + ttl));
                true
            }
        }
    }

    fn refresh_lock(&mut self, name: &str, ttl: Duration) {
        let now = Instant::now();
        if let Some((_, expires_at)) = self.locks.get_mut(name) {
            if *expires_at > now {
                *expires_at = now + ttl;
            }
        }
    }

    fn heartbeat(&mut self, id: &str) {
        if let Some(score) = self.scores.get_mut(id) {
            *score = Utc::now().timestamp_millis();
        }
    }
}

/// 单进程内存队列
///
/// 待处理任务以JSON保存，行为与Redis实现一致，便于在测试中替换。
pub struct InMemoryTaskQueue {
    keys: QueueKeys,
    lease_ttl: Duration,
    state: Mutex<QueueState>,
}

impl InMemoryTaskQueue {
    pub fn new(prefix: &str, lease_ttl: Duration) -> Self {
        info!("Creating in-memory task queue with prefix: {}", prefix);
        Self {
            keys: QueueKeys::new(prefix),
            lease_ttl,
            state: Mutex::new(QueueState::default()),
        }
    }

    pub async fn pending_len(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    /// 测试辅助：直接设置处理中任务的心跳时间
    pub async fn set_score(&self, job_id: &str, at: DateTime<Utc>) {
        let mut state = self.state.lock().await;
        if let Some(score) = state.scores.get_mut(job_id) {
            *score = at.timestamp_millis();
        }
    }

    /// 测试辅助：释放执行租约，模拟持有者失联后锁过期
    pub async fn expire_lease(&self, job: &Job) {
        let mut state = self.state.lock().await;
        state.locks.remove(&job.lease_name(&self.keys.lock_prefix));
    }
}

#[async_trait]
impl TaskQueue for InMemoryTaskQueue {
    async fn enqueue_pending(&self, job: &Job) -> ArenaResult<()> {
        let raw = job.to_json()?;
        self.state.lock().await.pending.push_back(raw);
        debug!("任务已放入待处理队列: {}", job.id);
        Ok(())
    }

    async fn poll_pending(&self) -> ArenaResult<Option<Job>> {
        let raw = self.state.lock().await.pending.pop_front();
        match raw {
            Some(raw) => Ok(Some(Job::from_json(&raw)?)),
            None => Ok(None),
        }
    }

    async fn enqueue_to_process(&self, job: &Job) -> ArenaResult<()> {
        let mut state = self.state.lock().await;
        if state.scores.contains_key(&job.id) {
            debug!("任务{}已在处理中，保留原有记录", job.id);
            return Ok(());
        }
        state.jobs.insert(job.id.clone(), job.clone());
        state.scores.insert(job.id.clone(), 0);
        Ok(())
    }

    async fn poll_process(&self, updated_before: DateTime<Utc>) -> ArenaResult<Option<Job>> {
        let before = updated_before.timestamp_millis();
        let state = self.state.lock().await;

        let stale = state
            .scores
            .iter()
            .filter(|(_, score)| **score <= before)
            .min_by(|a, b| a.1.cmp(b.1).then_with(|| a.0.cmp(b.0)))
            .map(|(id, score)| (id.clone(), *score));

        let Some((id, score)) = stale else {
            return Ok(None);
        };

        Ok(state.jobs.get(&id).map(|job| {
            let mut job = job.clone();
            job.last_update = DateTime::from_timestamp_millis(score);
            job
        }))
    }

    async fn remove_from_processing(&self, job: &Job) -> ArenaResult<()> {
        let lock_name = job.lock_name(&self.keys.lock_prefix)?;
        let mut state = self.state.lock().await;
        state.jobs.remove(&job.id);
        state.scores.remove(&job.id);
        state.locks.remove(&job.lease_name(&self.keys.lock_prefix));
        if job.unique {
            state.locks.remove(&lock_name);
        }
        Ok(())
    }

    async fn set_job_lock(&self, job: &Job, ttl: Duration) -> ArenaResult<bool> {
        let lock_name = job.lock_name(&self.keys.lock_prefix)?;
        let mut state = self.state.lock().await;
        if !state.try_lock(&lock_name, &job.id, ttl, true) {
            return Ok(false);
        }
        state.heartbeat(&job.id);
        Ok(true)
    }

    async fn claim_job(&self, job: &mut Job, host: &str, ttl: Duration) -> ArenaResult<bool> {
        let lease = job.lease_name(&self.keys.lock_prefix);
        let mut state = self.state.lock().await;
        // 已完成或已移除的任务不能再被认领
        if !state.scores.contains_key(&job.id) {
            return Ok(false);
        }
        if !state.try_lock(&lease, host, ttl, false) {
            return Ok(false);
        }
        job.host = host.to_string();
        state.jobs.insert(job.id.clone(), job.clone());
        state.heartbeat(&job.id);
        Ok(true)
    }

    async fn heartbeat_job(&self, job: &Job) -> ArenaResult<()> {
        let lock_name = job.lock_name(&self.keys.lock_prefix)?;
        let mut state = self.state.lock().await;
        state.heartbeat(&job.id);
        state.refresh_lock(&job.lease_name(&self.keys.lock_prefix), self.lease_ttl);
        if job.unique {
            state.refresh_lock(&lock_name, self.lease_ttl);
        }
        Ok(())
    }

    async fn is_job_in_process(&self, job: &Job) -> ArenaResult<bool> {
        Ok(self.state.lock().await.scores.contains_key(&job.id))
    }

    async fn jobs_in_process(&self) -> ArenaResult<Vec<Job>> {
        let state = self.state.lock().await;
        let mut jobs: Vec<Job> = state
            .scores
            .iter()
            .filter_map(|(id, score)| {
                state.jobs.get(id).map(|job| {
                    let mut job = job.clone();
                    job.last_update = DateTime::from_timestamp_millis(*score);
                    job
                })
            })
            .collect();
        jobs.sort_by(|a, b| a.last_update.cmp(&b.last_update).then_with(|| a.id.cmp(&b.id)));
        Ok(jobs)
    }

    async fn flush(&self) -> ArenaResult<()> {
        *self.state.lock().await = QueueState::default();
        Ok(())
    }
}
