use std::sync::Arc;
use std::time::Duration;

use arena_core::{ArenaError, ArenaResult, GameConfig, MessageBus, Task, TaskParams};
use arena_domain::{
    Detection, DetectionKind, Game, GameEvent, GameEventName, GameRepository, GameRules, Player,
    PositionStream, Rank, Role,
};
use async_trait::async_trait;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::payload::{watch_game_updates, GameEventPayload, GameWatcherEvent, GAME_UPDATE_TOPIC};

pub const GAME_WORKER_ID: &str = "GameWorker";

const PARAM_GAME_ID: &str = "gameID";
const PARAM_COORDINATES: &str = "coordinates";

#[derive(Debug, Clone)]
pub struct GameWorkerOptions {
    /// 写入对局记录的本机标识
    pub server_id: String,
    pub min_players: usize,
    pub health_interval: Duration,
    /// 开局前的最长等待时间
    pub max_lifetime: Duration,
    /// 开局后改用的超时
    pub round_timeout: Duration,
    pub rules: GameRules,
}

impl GameWorkerOptions {
    pub fn new(server_id: impl Into<String>, config: &GameConfig) -> Self {
        Self {
            server_id: server_id.into(),
            min_players: config.min_players,
            health_interval: config.health_interval(),
            max_lifetime: config.max_lifetime(),
            round_timeout: config.round_timeout(),
            rules: GameRules::from(config),
        }
    }
}

/// 主循环对一次事件处理的结论
enum Flow {
    Continue,
    Finish,
}

/// 运行一局对局的任务
///
/// 位置事件经过容量为1的通道交给主循环，对局状态只在主循环中修改，
/// 因此同一局内的状态变化严格按到达顺序发生。
pub struct GameWorker {
    repository: Arc<dyn GameRepository>,
    positions: Arc<dyn PositionStream>,
    bus: Arc<dyn MessageBus>,
    options: GameWorkerOptions,
}

impl GameWorker {
    pub fn new(
        repository: Arc<dyn GameRepository>,
        positions: Arc<dyn PositionStream>,
        bus: Arc<dyn MessageBus>,
        options: GameWorkerOptions,
    ) -> Self {
        Self {
            repository,
            positions,
            bus,
            options,
        }
    }

    /// 构造任务参数
    pub fn params(game_id: &str, coordinates: &str) -> TaskParams {
        let mut params = TaskParams::new();
        params.insert(PARAM_GAME_ID.to_string(), json!(game_id));
        params.insert(PARAM_COORDINATES.to_string(), json!(coordinates));
        params
    }

    /// 订阅本任务发布的对局更新
    pub async fn on_game_event(
        &self,
        cancel: CancellationToken,
        tx: mpsc::Sender<GameEventPayload>,
    ) -> ArenaResult<()> {
        watch_game_updates(self.bus.as_ref(), cancel, tx).await
    }

    fn apply(game: &mut Game, detection: &Detection) -> GameEvent {
        match detection.kind {
            DetectionKind::Enter | DetectionKind::Inside => {
                game.set_player(&detection.player_id, detection.lat, detection.lon)
            }
            DetectionKind::Exit => game.remove_player(&detection.player_id),
        }
    }

    async fn handle_event(&self, game: &mut Game, event: GameEvent) -> Flow {
        match event.name {
            GameEventName::Nothing | GameEventName::MatchStarted => Flow::Continue,
            GameEventName::PlayerAdded | GameEventName::PlayerRemoved => {
                debug!("对局{}玩家变化: {} {}", game.id(), event.name, event.player.id);
                if !game.started() && game.player_count() >= self.options.min_players {
                    self.start_game(game).await;
                }
                Flow::Continue
            }
            GameEventName::PlayerNearTarget => {
                self.persist(game, &event).await;
                self.publish(game, GameWatcherEvent::PlayerNear, &event.player, None)
                    .await;
                Flow::Continue
            }
            GameEventName::PlayerRanAway => {
                self.persist(game, &event).await;
                self.publish(game, GameWatcherEvent::PlayerLose, &event.player, None)
                    .await;
                Flow::Continue
            }
            GameEventName::TargetCaught
            | GameEventName::TargetEscaped
            | GameEventName::LastPlayerRemaining
            | GameEventName::NoPlayersRemaining => {
                info!("对局{}结束: {}", game.id(), event.name);
                self.persist(game, &event).await;
                self.publish_outcome(game, &event).await;
                Flow::Finish
            }
        }
    }

    async fn start_game(&self, game: &mut Game) {
        let events = match game.start() {
            Ok(events) => events,
            Err(e) => {
                warn!("开始对局失败: {}", e);
                return;
            }
        };

        info!(
            "Game {} started with {} players, target: {}",
            game.id(),
            events.len(),
            game.target_id().unwrap_or("-")
        );
        if let Some(first) = events.first() {
            self.persist(game, first).await;
        }
        for event in &events {
            self.publish(game, GameWatcherEvent::Started, &event.player, None)
                .await;
        }
    }

    /// 终局时发布胜负
    async fn publish_outcome(&self, game: &Game, event: &GameEvent) {
        let rank = game.rank();
        for player in game.players() {
            let won = match event.name {
                GameEventName::TargetCaught => player.id == event.player.id,
                GameEventName::TargetEscaped => player.role == Role::Target,
                GameEventName::LastPlayerRemaining => !player.lose,
                _ => false,
            };
            let outcome = if won {
                GameWatcherEvent::PlayerWin
            } else {
                GameWatcherEvent::PlayerLose
            };
            self.publish(game, outcome, &player, Some(rank.clone())).await;
        }
    }

    async fn finish(&self, game: &mut Game, last: &GameEvent) {
        let rank = game.rank();
        for player in game.players() {
            self.publish(game, GameWatcherEvent::Finished, &player, Some(rank.clone()))
                .await;
        }

        self.persist(game, last).await;
        game.stop();

        if let Err(e) = self.repository.remove(game.id()).await {
            error!("删除对局记录失败 {}: {}", game.id(), e);
        }
    }

    async fn persist(&self, game: &Game, event: &GameEvent) {
        if let Err(e) = self
            .repository
            .update(game, &self.options.server_id, event)
            .await
        {
            error!("保存对局{}失败: {}", game.id(), e);
        }
    }

    async fn publish(
        &self,
        game: &Game,
        event: GameWatcherEvent,
        player: &Player,
        rank: Option<Rank>,
    ) {
        let payload = GameEventPayload {
            event,
            player_id: player.id.clone(),
            game: game.snapshot(),
            dist_to_target: player.dist_to_target,
            rank,
        };

        let result = match serde_json::to_vec(&payload) {
            Ok(bytes) => self.bus.publish(GAME_UPDATE_TOPIC, bytes).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            error!("发布对局事件失败 {} {:?}: {}", game.id(), event, e);
        }
    }
}

fn param_str(params: &TaskParams, key: &str) -> ArenaResult<String> {
    match params.get(key).and_then(|v| v.as_str()) {
        Some(value) if !value.is_empty() => Ok(value.to_string()),
        _ => Err(ArenaError::InvalidTaskParams(format!("缺少参数: {}", key))),
    }
}

#[async_trait]
impl Task for GameWorker {
    fn id(&self) -> &str {
        GAME_WORKER_ID
    }

    async fn run(&self, cancel: CancellationToken, params: TaskParams) -> ArenaResult<()> {
        let game_id = param_str(&params, PARAM_GAME_ID)?;
        let coordinates = param_str(&params, PARAM_COORDINATES)?;

        self.repository
            .create(&game_id, &self.options.server_id, &coordinates)
            .await?;
        info!("Game worker started for game: {}", game_id);

        let mut game = Game::new(&game_id, self.options.rules);
        let token = cancel.child_token();
        let (tx, mut rx) = mpsc::channel::<Detection>(1);

        let subscription = {
            let positions = Arc::clone(&self.positions);
            let token = token.clone();
            let game_id = game_id.clone();
            tokio::spawn(async move {
                let result = positions.subscribe(token.clone(), &game_id, tx).await;
                if let Err(e) = &result {
                    error!("订阅对局{}位置事件失败: {}", game_id, e);
                    token.cancel();
                }
                result
            })
        };

        let mut health = interval_at(
            Instant::now() + self.options.health_interval,
            self.options.health_interval,
        );
        health.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let lifetime = sleep(self.options.max_lifetime);
        tokio::pin!(lifetime);
        let mut last = GameEvent::nothing(Player::new("", 0.0, 0.0));

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = &mut lifetime => {
                    warn!("对局{}超时", game_id);
                    break;
                }
                _ = health.tick() => {
                    self.persist(&game, &last).await;
                }
                detection = rx.recv() => match detection {
                    Some(detection) => {
                        let was_started = game.started();
                        let event = Self::apply(&mut game, &detection);
                        if event.name != GameEventName::Nothing {
                            last = event.clone();
                        }
                        if let Flow::Finish = self.handle_event(&mut game, event).await {
                            break;
                        }
                        if !was_started && game.started() {
                            lifetime.as_mut().reset(Instant::now() + self.options.round_timeout);
                        }
                    }
                    None => {
                        debug!("对局{}位置事件流已结束", game_id);
                        break;
                    }
                },
            }
        }

        token.cancel();
        drop(rx);
        self.finish(&mut game, &last).await;

        let result = match subscription.await {
            Ok(result) => result,
            Err(e) => Err(ArenaError::Subscription(format!("订阅任务异常退出: {}", e))),
        };
        info!("Game worker finished for game: {}", game_id);
        result
    }
}
