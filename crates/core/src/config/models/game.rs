use std::time::Duration;

use serde::{Deserialize, Serialize};

/// 对局配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// 开局所需最少玩家数
    pub min_players: usize,
    /// 对局存活心跳间隔（秒）
    pub health_interval_seconds: u64,
    /// 开局前等待玩家的最长时间（秒）
    pub max_lifetime_seconds: u64,
    /// 开局后一轮的最长时间（秒）
    pub round_timeout_seconds: u64,
    /// 抓住目标的距离（米）
    pub catch_distance_meters: f64,
    /// 接近目标的距离（米）
    pub near_distance_meters: f64,
    /// 对局记录在此时间窗口内更新过即视为运行中（秒）
    pub running_window_seconds: u64,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            min_players: 3,
            health_interval_seconds: 30,
            max_lifetime_seconds: 3600,
            round_timeout_seconds: 300,
            catch_distance_meters: 20.0,
            near_distance_meters: 100.0,
            running_window_seconds: 20,
        }
    }
}

impl GameConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.min_players < 2 {
            return Err(anyhow::anyhow!("开局最少玩家数不能小于2"));
        }

        if self.health_interval_seconds == 0 {
            return Err(anyhow::anyhow!("对局心跳间隔必须大于0"));
        }

        if self.max_lifetime_seconds <= self.health_interval_seconds {
            return Err(anyhow::anyhow!("对局最长时间必须大于心跳间隔"));
        }

        if self.round_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("对局回合超时必须大于0"));
        }

        if self.catch_distance_meters <= 0.0 || self.near_distance_meters <= self.catch_distance_meters {
            return Err(anyhow::anyhow!(
                "距离阈值无效: catch={} near={}",
                self.catch_distance_meters,
                self.near_distance_meters
            ));
        }

        if self.running_window_seconds == 0 {
            return Err(anyhow::anyhow!("运行判定窗口必须大于0"));
        }

        Ok(())
    }

    pub fn health_interval(&self) -> Duration {
        Duration::from_secs(self.health_interval_seconds)
    }

    pub fn max_lifetime(&self) -> Duration {
        Duration::from_secs(self.max_lifetime_seconds)
    }

    pub fn round_timeout(&self) -> Duration {
        Duration::from_secs(self.round_timeout_seconds)
    }

    pub fn running_window(&self) -> Duration {
        Duration::from_secs(self.running_window_seconds)
    }
}
