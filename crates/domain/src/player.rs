use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};

use crate::geo;

/// 玩家在对局中的角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Undefined,
    Hunter,
    Target,
}

/// 对局中的玩家
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub id: String,
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub role: Role,
    /// 到目标的距离（米），仅对猎人有意义
    #[serde(default)]
    pub dist_to_target: f64,
    #[serde(default)]
    pub lose: bool,
}

impl Player {
    pub fn new(id: impl Into<String>, lat: f64, lon: f64) -> Self {
        Self {
            id: id.into(),
            lat,
            lon,
            role: Role::Undefined,
            dist_to_target: 0.0,
            lose: false,
        }
    }

    pub fn distance_to(&self, other: &Player) -> f64 {
        geo::distance_meters(self.lat, self.lon, other.lat, other.lon)
    }
}

/// 对局玩家表的共享句柄
///
/// 只有对局本身会写入；其他持有者只能读取快照副本。
#[derive(Debug, Clone, Default)]
pub struct GamePlayers {
    inner: Arc<RwLock<BTreeMap<String, Player>>>,
}

impl GamePlayers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<Player> {
        self.read().get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.read().contains_key(id)
    }

    /// 按玩家ID排序的快照
    pub fn snapshot(&self) -> Vec<Player> {
        self.read().values().cloned().collect()
    }

    pub fn ids(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, Player>> {
        // 写入方不会在持锁时panic，中毒的锁按原值继续使用
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, Player>> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}
