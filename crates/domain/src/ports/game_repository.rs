use std::time::Duration;

use async_trait::async_trait;
use arena_core::ArenaResult;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::events::GameEvent;
use crate::game::Game;
use crate::player::Player;

/// 对局记录的附加数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameRecordExtra {
    #[serde(default)]
    pub event: Option<String>,
    /// unix时间戳（秒）
    pub updated_at: i64,
    pub server_id: String,
    #[serde(default)]
    pub players: Vec<Player>,
    #[serde(default)]
    pub started: bool,
}

/// 持久化的对局记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameRecord {
    pub id: String,
    pub coordinates: String,
    pub extra: GameRecordExtra,
}

impl GameRecord {
    pub fn new(game_id: &str, server_id: &str, coordinates: &str) -> Self {
        Self {
            id: game_id.to_string(),
            coordinates: coordinates.to_string(),
            extra: GameRecordExtra {
                event: None,
                updated_at: Utc::now().timestamp(),
                server_id: server_id.to_string(),
                players: Vec::new(),
                started: false,
            },
        }
    }

    /// 用对局当前状态刷新记录
    pub fn apply(&mut self, game: &Game, server_id: &str, event: &GameEvent) {
        self.extra = GameRecordExtra {
            event: Some(event.name.as_str().to_string()),
            updated_at: Utc::now().timestamp(),
            server_id: server_id.to_string(),
            players: game.players(),
            started: game.started(),
        };
    }

    /// 在窗口期内更新过的记录视为仍在运行
    pub fn is_fresh(&self, window: Duration) -> bool {
        let window = i64::try_from(window.as_secs()).unwrap_or(i64::MAX);
        self.extra.updated_at.saturating_add(window) > Utc::now().timestamp()
    }
}

/// 对局记录存储
#[async_trait]
pub trait GameRepository: Send + Sync {
    async fn create(&self, game_id: &str, server_id: &str, coordinates: &str) -> ArenaResult<()>;

    async fn update(&self, game: &Game, server_id: &str, event: &GameEvent) -> ArenaResult<()>;

    async fn remove(&self, game_id: &str) -> ArenaResult<()>;

    /// 对局记录在配置的时间窗口内更新过
    async fn is_running(&self, game_id: &str) -> ArenaResult<bool>;

    async fn find(&self, game_id: &str) -> ArenaResult<Option<GameRecord>>;
}
