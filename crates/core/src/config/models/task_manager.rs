use std::time::Duration;

use serde::{Deserialize, Serialize};

/// 任务管理器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskManagerConfig {
    /// 本机标识，写入任务租约和对局记录
    pub host: String,
    /// 队列轮询间隔（毫秒）
    pub poll_interval_ms: u64,
    /// 任务心跳间隔（秒），超过两个间隔未心跳的任务会被回收
    pub heartbeat_interval_seconds: u64,
    /// 停止时等待运行中任务的最长时间（秒）
    pub stop_timeout_seconds: u64,
}

impl Default for TaskManagerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            poll_interval_ms: 500,          // 默认500毫秒
            heartbeat_interval_seconds: 5,  // 默认5秒
            stop_timeout_seconds: 20,       // 默认20秒
        }
    }
}

impl TaskManagerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.host.is_empty() {
            return Err(anyhow::anyhow!("主机标识不能为空"));
        }

        if self.poll_interval_ms == 0 {
            return Err(anyhow::anyhow!("轮询间隔必须大于0"));
        }

        if self.heartbeat_interval_seconds == 0 {
            return Err(anyhow::anyhow!("心跳间隔必须大于0"));
        }

        if self.poll_interval_ms >= self.heartbeat_interval_seconds * 1000 {
            return Err(anyhow::anyhow!("轮询间隔必须小于心跳间隔"));
        }

        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_seconds)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_seconds)
    }
}

fn default_host() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_else(|| "localhost".to_string())
}
