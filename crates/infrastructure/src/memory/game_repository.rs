use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use arena_core::ArenaResult;
use arena_domain::{Game, GameEvent, GameRecord, GameRepository};
use async_trait::async_trait;
use tokio::sync::RwLock;

#[derive(Clone)]
pub struct InMemoryGameRepository {
    records: Arc<RwLock<HashMap<String, GameRecord>>>,
    running_window: Duration,
}

impl InMemoryGameRepository {
    pub fn new(running_window: Duration) -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
            running_window,
        }
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl GameRepository for InMemoryGameRepository {
    async fn create(&self, game_id: &str, server_id: &str, coordinates: &str) -> ArenaResult<()> {
        let record = GameRecord::new(game_id, server_id, coordinates);
        self.records
            .write()
            .await
            .insert(game_id.to_string(), record);
        Ok(())
    }

    async fn update(&self, game: &Game, server_id: &str, event: &GameEvent) -> ArenaResult<()> {
        let mut records = self.records.write().await;
        let record = records
            .entry(game.id().to_string())
            .or_insert_with(|| GameRecord::new(game.id(), server_id, ""));
        record.apply(game, server_id, event);
        Ok(())
    }

    async fn remove(&self, game_id: &str) -> ArenaResult<()> {
        self.records.write().await.remove(game_id);
        Ok(())
    }

    async fn is_running(&self, game_id: &str) -> ArenaResult<bool> {
        Ok(self
            .records
            .read()
            .await
            .get(game_id)
            .map(|record| record.is_fresh(self.running_window))
            .unwrap_or(false))
    }

    async fn find(&self, game_id: &str) -> ArenaResult<Option<GameRecord>> {
        Ok(self.records.read().await.get(game_id).cloned())
    }
}
