use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ArenaResult;

/// 任务参数，键有序以保证JSON编码稳定
pub type TaskParams = BTreeMap<String, serde_json::Value>;

/// 队列中的一次调度请求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub task_id: String,
    #[serde(default)]
    pub params: TaskParams,
    #[serde(default)]
    pub unique: bool,
    /// 当前持有租约的主机
    #[serde(default)]
    pub host: String,
    /// 最近一次心跳时间，由队列在取出时回填
    #[serde(default)]
    pub last_update: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
struct LockParams<'a> {
    params: &'a TaskParams,
}

impl Job {
    /// 创建新的任务，ID由任务ID和随机UUID组成
    pub fn new(task_id: impl Into<String>, params: TaskParams) -> Self {
        let task_id = task_id.into();
        Self {
            id: format!("{}:{}", task_id, Uuid::new_v4()),
            task_id,
            params,
            unique: false,
            host: String::new(),
            last_update: None,
        }
    }

    /// 创建唯一任务，相同任务和参数同时只允许一个在执行
    pub fn new_unique(task_id: impl Into<String>, params: TaskParams) -> Self {
        Self {
            unique: true,
            ..Self::new(task_id, params)
        }
    }

    /// 唯一性锁名称: `{prefix}:{task_id}:{"params":{...}}:lock`
    pub fn lock_name(&self, prefix: &str) -> ArenaResult<String> {
        let params = serde_json::to_string(&LockParams {
            params: &self.params,
        })?;
        Ok(format!("{}:{}:{}:lock", prefix, self.task_id, params))
    }

    /// 执行租约锁名称，按任务实例ID区分
    pub fn lease_name(&self, prefix: &str) -> String {
        format!("{}:processing:task:{}", prefix, self.id)
    }

    /// 最近一次心跳是否在给定时间窗口内
    pub fn is_updated_within(&self, interval: Duration) -> bool {
        match self.last_update {
            Some(updated) => Utc::now() - updated <= interval,
            None => false,
        }
    }

    pub fn to_json(&self) -> ArenaResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> ArenaResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}
