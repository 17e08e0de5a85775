use std::time::Duration;

use arena_core::{ArenaResult, Job, TaskQueue};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use tracing::{debug, instrument, warn};

use super::{queue_err, RedisStore};
use crate::QueueKeys;

/// 基于Redis的任务队列
///
/// - 待处理列表: `LPUSH`入队，`RPOP`出队
/// - 处理中集合: 有序集合，分数为最近心跳时间（毫秒）
/// - 任务存储: 哈希表，任务ID -> JSON
/// - 锁: `SET NX PX`
/// - 入处理中集合与认领通过Lua脚本原子执行
pub struct RedisTaskQueue {
    conn: ConnectionManager,
    keys: QueueKeys,
    lease_ttl: Duration,
}

impl RedisTaskQueue {
    pub fn new(store: &RedisStore, lease_ttl: Duration) -> Self {
        Self {
            conn: store.connection(),
            keys: QueueKeys::new(store.prefix()),
            lease_ttl,
        }
    }

    pub fn keys(&self) -> &QueueKeys {
        &self.keys
    }

    /// 带TTL获取锁；`owner`相同时视为已持有
    async fn acquire(&self, name: &str, owner: &str, ttl: Duration, reentrant: bool) -> ArenaResult<bool> {
        let mut conn = self.conn.clone();
        let acquired: Option<String> = redis::cmd("SET")
            .arg(name)
            .arg(owner)
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(queue_err)?;

        if acquired.is_some() {
            return Ok(true);
        }
        if !reentrant {
            return Ok(false);
        }

        let holder: Option<String> = redis::cmd("GET")
            .arg(name)
            .query_async(&mut conn)
            .await
            .map_err(queue_err)?;
        Ok(holder.as_deref() == Some(owner))
    }

    async fn touch(&self, job: &Job) -> ArenaResult<()> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("ZADD")
            .arg(&self.keys.processing)
            .arg("XX")
            .arg(Utc::now().timestamp_millis())
            .arg(&job.id)
            .query_async(&mut conn)
            .await
            .map_err(queue_err)?;
        Ok(())
    }
}

/// 仅当任务不在处理中集合时写入任务内容与分数0
const ENQUEUE_TO_PROCESS_SCRIPT: &str = r#"
if redis.call('ZSCORE', KEYS[1], ARGV[1]) then
    return 0
end
redis.call('HSET', KEYS[2], ARGV[1], ARGV[2])
redis.call('ZADD', KEYS[1], 0, ARGV[1])
return 1
"#;

/// 任务仍在处理中集合时才获取执行租约，并写回任务内容与心跳
const CLAIM_SCRIPT: &str = r#"
if not redis.call('ZSCORE', KEYS[1], ARGV[1]) then
    return 0
end
if not redis.call('SET', KEYS[3], ARGV[2], 'NX', 'PX', ARGV[3]) then
    return 0
end
redis.call('HSET', KEYS[2], ARGV[1], ARGV[4])
redis.call('ZADD', KEYS[1], 'XX', ARGV[5], ARGV[1])
return 1
"#;

const FLUSH_SCAN_COUNT: usize = 100;

fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

fn with_score(mut job: Job, score: f64) -> Job {
    job.last_update = DateTime::from_timestamp_millis(score as i64);
    job
}

#[async_trait]
impl TaskQueue for RedisTaskQueue {
    #[instrument(skip(self, job), fields(job_id = %job.id))]
    async fn enqueue_pending(&self, job: &Job) -> ArenaResult<()> {
        let raw = job.to_json()?;
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("LPUSH")
            .arg(&self.keys.pending)
            .arg(raw)
            .query_async(&mut conn)
            .await
            .map_err(queue_err)?;
        Ok(())
    }

    async fn poll_pending(&self) -> ArenaResult<Option<Job>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = redis::cmd("RPOP")
            .arg(&self.keys.pending)
            .query_async(&mut conn)
            .await
            .map_err(queue_err)?;

        match raw {
            Some(raw) => Ok(Some(Job::from_json(&raw)?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self, job), fields(job_id = %job.id))]
    async fn enqueue_to_process(&self, job: &Job) -> ArenaResult<()> {
        let raw = job.to_json()?;
        let mut conn = self.conn.clone();
        let added: i64 = redis::cmd("EVAL")
            .arg(ENQUEUE_TO_PROCESS_SCRIPT)
            .arg(2)
            .arg(&self.keys.processing)
            .arg(&self.keys.jobs)
            .arg(&job.id)
            .arg(raw)
            .query_async(&mut conn)
            .await
            .map_err(queue_err)?;
        if added == 0 {
            debug!("任务已在处理中，保留原有记录");
        }
        Ok(())
    }

    async fn poll_process(&self, updated_before: DateTime<Utc>) -> ArenaResult<Option<Job>> {
        let mut conn = self.conn.clone();
        let found: Vec<(String, f64)> = redis::cmd("ZRANGEBYSCORE")
            .arg(&self.keys.processing)
            .arg(0)
            .arg(updated_before.timestamp_millis())
            .arg("WITHSCORES")
            .arg("LIMIT")
            .arg(0)
            .arg(1)
            .query_async(&mut conn)
            .await
            .map_err(queue_err)?;

        let Some((id, score)) = found.into_iter().next() else {
            return Ok(None);
        };

        let raw: Option<String> = redis::cmd("HGET")
            .arg(&self.keys.jobs)
            .arg(&id)
            .query_async(&mut conn)
            .await
            .map_err(queue_err)?;

        match raw {
            Some(raw) => Ok(Some(with_score(Job::from_json(&raw)?, score))),
            None => {
                warn!("处理中集合存在没有任务内容的成员，已清理: {}", id);
                let _: i64 = redis::cmd("ZREM")
                    .arg(&self.keys.processing)
                    .arg(&id)
                    .query_async(&mut conn)
                    .await
                    .map_err(queue_err)?;
                Ok(None)
            }
        }
    }

    #[instrument(skip(self, job), fields(job_id = %job.id))]
    async fn remove_from_processing(&self, job: &Job) -> ArenaResult<()> {
        let mut pipe = redis::pipe();
        pipe.atomic()
            .hdel(&self.keys.jobs, &job.id)
            .ignore()
            .zrem(&self.keys.processing, &job.id)
            .ignore()
            .del(job.lease_name(&self.keys.lock_prefix))
            .ignore();
        if job.unique {
            pipe.del(job.lock_name(&self.keys.lock_prefix)?).ignore();
        }

        let mut conn = self.conn.clone();
        let _: () = pipe.query_async(&mut conn).await.map_err(queue_err)?;
        debug!("任务已移出处理中集合");
        Ok(())
    }

    #[instrument(skip(self, job), fields(job_id = %job.id))]
    async fn set_job_lock(&self, job: &Job, ttl: Duration) -> ArenaResult<bool> {
        let name = job.lock_name(&self.keys.lock_prefix)?;
        if !self.acquire(&name, &job.id, ttl, true).await? {
            return Ok(false);
        }
        self.touch(job).await?;
        Ok(true)
    }

    #[instrument(skip(self, job), fields(job_id = %job.id))]
    async fn claim_job(&self, job: &mut Job, host: &str, ttl: Duration) -> ArenaResult<bool> {
        let mut claimed = job.clone();
        claimed.host = host.to_string();
        let raw = claimed.to_json()?;

        let mut conn = self.conn.clone();
        let acquired: i64 = redis::cmd("EVAL")
            .arg(CLAIM_SCRIPT)
            .arg(3)
            .arg(&self.keys.processing)
            .arg(&self.keys.jobs)
            .arg(job.lease_name(&self.keys.lock_prefix))
            .arg(&job.id)
            .arg(host)
            .arg(ttl_millis(ttl))
            .arg(raw)
            .arg(Utc::now().timestamp_millis())
            .query_async(&mut conn)
            .await
            .map_err(queue_err)?;

        if acquired == 0 {
            return Ok(false);
        }
        *job = claimed;
        Ok(true)
    }

    async fn heartbeat_job(&self, job: &Job) -> ArenaResult<()> {
        self.touch(job).await?;

        let ttl = ttl_millis(self.lease_ttl);
        let mut pipe = redis::pipe();
        pipe.cmd("PEXPIRE")
            .arg(job.lease_name(&self.keys.lock_prefix))
            .arg(ttl)
            .ignore();
        if job.unique {
            pipe.cmd("PEXPIRE")
                .arg(job.lock_name(&self.keys.lock_prefix)?)
                .arg(ttl)
                .ignore();
        }

        let mut conn = self.conn.clone();
        let _: () = pipe.query_async(&mut conn).await.map_err(queue_err)?;
        Ok(())
    }

    async fn is_job_in_process(&self, job: &Job) -> ArenaResult<bool> {
        let mut conn = self.conn.clone();
        let score: Option<f64> = redis::cmd("ZSCORE")
            .arg(&self.keys.processing)
            .arg(&job.id)
            .query_async(&mut conn)
            .await
            .map_err(queue_err)?;
        Ok(score.is_some())
    }

    async fn jobs_in_process(&self) -> ArenaResult<Vec<Job>> {
        let mut conn = self.conn.clone();
        let members: Vec<(String, f64)> = redis::cmd("ZRANGE")
            .arg(&self.keys.processing)
            .arg(0)
            .arg(-1)
            .arg("WITHSCORES")
            .query_async(&mut conn)
            .await
            .map_err(queue_err)?;

        if members.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<&str> = members.iter().map(|(id, _)| id.as_str()).collect();
        let bodies: Vec<Option<String>> = redis::cmd("HMGET")
            .arg(&self.keys.jobs)
            .arg(&ids)
            .query_async(&mut conn)
            .await
            .map_err(queue_err)?;

        let mut jobs = Vec::with_capacity(members.len());
        for ((_, score), raw) in members.iter().zip(bodies) {
            if let Some(raw) = raw {
                jobs.push(with_score(Job::from_json(&raw)?, *score));
            }
        }
        Ok(jobs)
    }

    async fn flush(&self) -> ArenaResult<()> {
        let mut conn = self.conn.clone();
        let pattern = format!("{}:*", self.keys.lock_prefix);
        let mut keys = vec![self.keys.pending.clone()];
        let mut cursor: u64 = 0;
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(FLUSH_SCAN_COUNT)
                .query_async(&mut conn)
                .await
                .map_err(queue_err)?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        keys.sort();
        keys.dedup();
        for chunk in keys.chunks(FLUSH_SCAN_COUNT) {
            let _: i64 = redis::cmd("DEL")
                .arg(chunk)
                .query_async(&mut conn)
                .await
                .map_err(queue_err)?;
        }
        debug!("已清理{}个队列键", keys.len());
        Ok(())
    }
}
