use std::time::Duration;

use arena_core::{ArenaError, ArenaResult};
use arena_domain::{Game, GameEvent, GameRecord, GameRepository};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tracing::instrument;

use super::RedisStore;

/// 对局记录保存在哈希表`{prefix}:games`中，字段为对局ID
pub struct RedisGameRepository {
    conn: ConnectionManager,
    key: String,
    running_window: Duration,
}

impl RedisGameRepository {
    pub fn new(store: &RedisStore, running_window: Duration) -> Self {
        Self {
            conn: store.connection(),
            key: store.build_key("games"),
            running_window,
        }
    }

    async fn save(&self, record: &GameRecord) -> ArenaResult<()> {
        let raw = serde_json::to_string(record)?;
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("HSET")
            .arg(&self.key)
            .arg(&record.id)
            .arg(raw)
            .query_async(&mut conn)
            .await
            .map_err(persistence_err)?;
        Ok(())
    }
}

fn persistence_err(err: redis::RedisError) -> ArenaError {
    ArenaError::Persistence(err.to_string())
}

#[async_trait]
impl GameRepository for RedisGameRepository {
    #[instrument(skip(self, coordinates))]
    async fn create(&self, game_id: &str, server_id: &str, coordinates: &str) -> ArenaResult<()> {
        self.save(&GameRecord::new(game_id, server_id, coordinates))
            .await
    }

    #[instrument(skip(self, game, event), fields(game_id = %game.id(), event = %event.name))]
    async fn update(&self, game: &Game, server_id: &str, event: &GameEvent) -> ArenaResult<()> {
        let mut record = self
            .find(game.id())
            .await?
            .unwrap_or_else(|| GameRecord::new(game.id(), server_id, ""));
        record.apply(game, server_id, event);
        self.save(&record).await
    }

    async fn remove(&self, game_id: &str) -> ArenaResult<()> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("HDEL")
            .arg(&self.key)
            .arg(game_id)
            .query_async(&mut conn)
            .await
            .map_err(persistence_err)?;
        Ok(())
    }

    async fn is_running(&self, game_id: &str) -> ArenaResult<bool> {
        Ok(self
            .find(game_id)
            .await?
            .map(|record| record.is_fresh(self.running_window))
            .unwrap_or(false))
    }

    async fn find(&self, game_id: &str) -> ArenaResult<Option<GameRecord>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = redis::cmd("HGET")
            .arg(&self.key)
            .arg(game_id)
            .query_async(&mut conn)
            .await
            .map_err(persistence_err)?;

        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }
}
