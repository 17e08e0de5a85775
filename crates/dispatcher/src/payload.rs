use arena_core::{ArenaResult, MessageBus};
use arena_domain::{GameSnapshot, Rank};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// 对局更新发布的主题
pub const GAME_UPDATE_TOPIC: &str = "game:update";

/// 对外发布的对局事件
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameWatcherEvent {
    #[serde(rename = "game:started")]
    Started,
    #[serde(rename = "game:player:near")]
    PlayerNear,
    #[serde(rename = "game:player:lose")]
    PlayerLose,
    #[serde(rename = "game:player:win")]
    PlayerWin,
    #[serde(rename = "game:finished")]
    Finished,
}

/// 发布到`game:update`的消息体，连接层据此通知对应玩家
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameEventPayload {
    pub event: GameWatcherEvent,
    pub player_id: String,
    pub game: GameSnapshot,
    #[serde(default)]
    pub dist_to_target: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank: Option<Rank>,
}

/// 订阅对局更新并解码，供连接层等下游使用
pub async fn watch_game_updates(
    bus: &dyn MessageBus,
    cancel: CancellationToken,
    tx: mpsc::Sender<GameEventPayload>,
) -> ArenaResult<()> {
    let (raw_tx, mut raw_rx) = mpsc::channel::<Vec<u8>>(64);
    let subscription = cancel.child_token();

    let decode = {
        let subscription = subscription.clone();
        async move {
            while let Some(raw) = raw_rx.recv().await {
                match serde_json::from_slice::<GameEventPayload>(&raw) {
                    Ok(payload) => {
                        if tx.send(payload).await.is_err() {
                            subscription.cancel();
                            break;
                        }
                    }
                    Err(e) => warn!("无法解码对局更新: {}", e),
                }
            }
        }
    };

    let (result, _) = tokio::join!(bus.subscribe(subscription, GAME_UPDATE_TOPIC, raw_tx), decode);
    result
}
