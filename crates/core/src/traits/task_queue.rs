//! 任务队列接口定义
//!
//! 队列由三部分组成：
//! - 待处理列表，保存尚未被领取的任务
//! - 处理中集合，按最近心跳时间排序，用于发现失联的任务
//! - 任务存储，按任务ID保存任务内容
//!
//! 跨进程的互斥全部依赖后端的原子操作（带TTL的锁、事务）。

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{models::Job, ArenaResult};

#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// 放入待处理列表
    async fn enqueue_pending(&self, job: &Job) -> ArenaResult<()>;

    /// 取出一个待处理任务，列表为空时返回None
    async fn poll_pending(&self) -> ArenaResult<Option<Job>>;

    /// 原子地写入任务内容并以分数0加入处理中集合；已在处理中的任务保持不变
    async fn enqueue_to_process(&self, job: &Job) -> ArenaResult<()>;

    /// 返回一个最近心跳不晚于`updated_before`的处理中任务
    async fn poll_process(&self, updated_before: DateTime<Utc>) -> ArenaResult<Option<Job>>;

    /// 原子地删除任务内容、处理中成员和相关的锁
    async fn remove_from_processing(&self, job: &Job) -> ArenaResult<()>;

    /// 获取唯一性锁，成功时立即心跳；并发调用最多只有一个返回true
    async fn set_job_lock(&self, job: &Job, ttl: Duration) -> ArenaResult<bool>;

    /// 获取执行租约，成功时写入主机并心跳；任务已不在处理中集合时返回false
    async fn claim_job(&self, job: &mut Job, host: &str, ttl: Duration) -> ArenaResult<bool>;

    /// 刷新处理中任务的心跳时间
    async fn heartbeat_job(&self, job: &Job) -> ArenaResult<()>;

    async fn is_job_in_process(&self, job: &Job) -> ArenaResult<bool>;

    async fn jobs_in_process(&self) -> ArenaResult<Vec<Job>>;

    /// 清空所有队列数据
    async fn flush(&self) -> ArenaResult<()>;
}
