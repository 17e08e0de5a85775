use std::fmt;

use arena_core::{ArenaError, ArenaResult, GameConfig};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::events::{GameEvent, GameEventName};
use crate::player::{GamePlayers, Player, Role};
use crate::rank::Rank;

/// 距离判定阈值（米）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GameRules {
    pub catch_distance: f64,
    pub near_distance: f64,
}

impl Default for GameRules {
    fn default() -> Self {
        Self {
            catch_distance: 20.0,
            near_distance: 100.0,
        }
    }
}

impl From<&GameConfig> for GameRules {
    fn from(config: &GameConfig) -> Self {
        Self {
            catch_distance: config.catch_distance_meters,
            near_distance: config.near_distance_meters,
        }
    }
}

/// 对局状态的可序列化快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameSnapshot {
    pub id: String,
    pub started: bool,
    pub target_id: Option<String>,
    pub players: Vec<Player>,
}

/// 对局状态机
///
/// 只由持有它的编排任务修改；玩家表可以通过`players_handle`共享给只读方。
pub struct Game {
    id: String,
    started: bool,
    target_id: Option<String>,
    players: GamePlayers,
    rules: GameRules,
    rng: StdRng,
}

impl Game {
    /// 创建对局，随机数生成器从系统熵源播种一次
    pub fn new(id: impl Into<String>, rules: GameRules) -> Self {
        Self::with_rng(id, rules, StdRng::from_os_rng())
    }

    pub fn with_rng(id: impl Into<String>, rules: GameRules, rng: StdRng) -> Self {
        Self {
            id: id.into(),
            started: false,
            target_id: None,
            players: GamePlayers::new(),
            rules,
            rng,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn started(&self) -> bool {
        self.started
    }

    pub fn target_id(&self) -> Option<&str> {
        self.target_id.as_deref()
    }

    pub fn target_player(&self) -> Option<Player> {
        self.target_id.as_deref().and_then(|id| self.players.get(id))
    }

    pub fn player(&self, id: &str) -> Option<Player> {
        self.players.get(id)
    }

    /// 按玩家ID排序的玩家副本
    pub fn players(&self) -> Vec<Player> {
        self.players.snapshot()
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn players_handle(&self) -> GamePlayers {
        self.players.clone()
    }

    pub fn snapshot(&self) -> GameSnapshot {
        GameSnapshot {
            id: self.id.clone(),
            started: self.started,
            target_id: self.target_id.clone(),
            players: self.players(),
        }
    }

    /// 更新玩家位置
    pub fn set_player(&mut self, id: &str, lat: f64, lon: f64) -> GameEvent {
        let mut players = self.players.write();

        if !players.contains_key(id) {
            if self.started {
                return GameEvent::nothing(Player::new(id, lat, lon));
            }
            let player = Player::new(id, lat, lon);
            players.insert(id.to_string(), player.clone());
            return GameEvent::new(GameEventName::PlayerAdded, player);
        }

        let target = self
            .target_id
            .as_deref()
            .and_then(|target_id| players.get(target_id))
            .cloned();

        let Some(player) = players.get_mut(id) else {
            return GameEvent::nothing(Player::new(id, lat, lon));
        };
        player.lat = lat;
        player.lon = lon;

        if !self.started || player.lose || player.role != Role::Hunter {
            return GameEvent::nothing(player.clone());
        }
        let Some(target) = target else {
            return GameEvent::nothing(player.clone());
        };

        player.dist_to_target = player.distance_to(&target);
        let hunter = player.clone();

        if hunter.dist_to_target <= self.rules.catch_distance {
            if let Some(target) = players.get_mut(&target.id) {
                target.lose = true;
            }
            return GameEvent::new(GameEventName::TargetCaught, hunter);
        }

        if hunter.dist_to_target <= self.rules.near_distance {
            return GameEvent::new(GameEventName::PlayerNearTarget, hunter);
        }

        GameEvent::nothing(hunter)
    }

    /// 玩家离开对局区域
    pub fn remove_player(&mut self, id: &str) -> GameEvent {
        let mut players = self.players.write();

        let Some(player) = players.get(id).cloned() else {
            return GameEvent::nothing(Player::new(id, 0.0, 0.0));
        };

        if !self.started {
            players.remove(id);
            return GameEvent::new(GameEventName::PlayerRemoved, player);
        }

        if player.lose {
            return GameEvent::nothing(player);
        }

        let departed = match players.get_mut(id) {
            Some(p) => {
                p.lose = true;
                p.clone()
            }
            None => return GameEvent::nothing(player),
        };

        let remaining = players.values().filter(|p| !p.lose).count();
        let name = match remaining {
            0 => GameEventName::NoPlayersRemaining,
            1 => GameEventName::LastPlayerRemaining,
            _ if departed.role == Role::Target => GameEventName::TargetEscaped,
            _ => GameEventName::PlayerRanAway,
        };

        GameEvent::new(name, departed)
    }

    /// 开始对局：随机选出一个目标，其余玩家成为猎人
    pub fn start(&mut self) -> ArenaResult<Vec<GameEvent>> {
        if self.started {
            return Err(ArenaError::MatchAlreadyStarted {
                id: self.id.clone(),
            });
        }

        let mut players = self.players.write();
        if players.is_empty() {
            return Err(ArenaError::NotEnoughPlayers {
                id: self.id.clone(),
            });
        }

        let index = self.rng.random_range(0..players.len());
        let target = match players.values().nth(index) {
            Some(target) => target.clone(),
            None => {
                return Err(ArenaError::Internal(format!(
                    "对局{}选取目标失败",
                    self.id
                )))
            }
        };

        for player in players.values_mut() {
            player.lose = false;
            if player.id == target.id {
                player.role = Role::Target;
                player.dist_to_target = 0.0;
            } else {
                player.role = Role::Hunter;
                player.dist_to_target = player.distance_to(&target);
            }
        }

        self.target_id = Some(target.id);
        self.started = true;

        Ok(players
            .values()
            .map(|p| GameEvent::new(GameEventName::MatchStarted, p.clone()))
            .collect())
    }

    /// 停止对局并清空玩家
    pub fn stop(&mut self) {
        self.started = false;
        self.target_id = None;
        self.players.write().clear();
    }

    pub fn rank(&self) -> Rank {
        Rank::compute(&self.id, &self.players.snapshot())
    }
}

impl fmt::Display for Game {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Game{{id: {}, started: {}, target: {}, players: {}}}",
            self.id,
            self.started,
            self.target_id.as_deref().unwrap_or("-"),
            self.players.len()
        )
    }
}
