#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use arena_core::GameConfig;
use arena_dispatcher::{watch_game_updates, GameEventPayload, GameWorker, GameWorkerOptions};
use arena_domain::{Detection, DetectionKind};
use arena_infrastructure::{BusDetectionStream, InMemoryGameRepository, InMemoryMessageBus};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub const WAIT: Duration = Duration::from_secs(3);
pub const PREFIX: &str = "arena-test";

/// 轮询直到条件满足或超时
pub async fn wait_until<F, Fut>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition().await
}

pub fn game_config() -> GameConfig {
    GameConfig {
        min_players: 3,
        health_interval_seconds: 30,
        max_lifetime_seconds: 60,
        ..GameConfig::default()
    }
}

/// 内存版的对局运行环境
pub struct Harness {
    pub bus: Arc<InMemoryMessageBus>,
    pub stream: Arc<BusDetectionStream>,
    pub repository: Arc<InMemoryGameRepository>,
}

impl Harness {
    pub fn new() -> Self {
        let bus = Arc::new(InMemoryMessageBus::new());
        let stream = Arc::new(BusDetectionStream::new(bus.clone(), PREFIX));
        let repository = Arc::new(InMemoryGameRepository::new(Duration::from_secs(20)));
        Self {
            bus,
            stream,
            repository,
        }
    }

    pub fn game_worker(&self, options: GameWorkerOptions) -> Arc<GameWorker> {
        Arc::new(GameWorker::new(
            self.repository.clone(),
            self.stream.clone(),
            self.bus.clone(),
            options,
        ))
    }

    /// 订阅对局更新，返回解码后的消息
    pub async fn watch(&self, cancel: CancellationToken) -> mpsc::Receiver<GameEventPayload> {
        let (tx, rx) = mpsc::channel(64);
        let bus = self.bus.clone();
        tokio::spawn(async move {
            let _ = watch_game_updates(bus.as_ref(), cancel, tx).await;
        });
        let bus = self.bus.clone();
        assert!(
            wait_until(WAIT, || async {
                bus.subscriber_count(arena_dispatcher::GAME_UPDATE_TOPIC).await > 0
            })
            .await
        );
        rx
    }

    /// 等待对局开始订阅位置事件
    pub async fn wait_for_game(&self, game_id: &str) -> bool {
        let topic = self.stream.positions_topic(game_id);
        wait_until(WAIT, || async { self.bus.subscriber_count(&topic).await > 0 }).await
    }

    pub async fn detect(&self, game_id: &str, player_id: &str, lat: f64, lon: f64, kind: DetectionKind) {
        let detection = Detection {
            player_id: player_id.to_string(),
            lat,
            lon,
            kind,
        };
        self.stream
            .publish_detection(game_id, &detection)
            .await
            .unwrap();
    }
}

pub async fn next_payload(rx: &mut mpsc::Receiver<GameEventPayload>) -> GameEventPayload {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for game update")
        .expect("game update stream closed")
}
