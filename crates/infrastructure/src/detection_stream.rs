use std::sync::Arc;

use arena_core::{ArenaResult, MessageBus};
use arena_domain::{Detection, GeofenceCrossing, GeofenceStream, PositionStream};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// 通过消息总线传递的位置与围栏事件
///
/// 位置检测发布在`{prefix}:positions:{game_id}`，围栏事件发布在
/// `{prefix}:geofences:crossings`，内容均为JSON。
#[derive(Clone)]
pub struct BusDetectionStream {
    bus: Arc<dyn MessageBus>,
    prefix: String,
}

impl BusDetectionStream {
    pub fn new(bus: Arc<dyn MessageBus>, prefix: &str) -> Self {
        Self {
            bus,
            prefix: prefix.to_string(),
        }
    }

    pub fn positions_topic(&self, game_id: &str) -> String {
        format!("{}:positions:{}", self.prefix, game_id)
    }

    pub fn crossings_topic(&self) -> String {
        format!("{}:geofences:crossings", self.prefix)
    }

    pub async fn publish_detection(&self, game_id: &str, detection: &Detection) -> ArenaResult<()> {
        self.publish(&self.positions_topic(game_id), detection).await
    }

    pub async fn publish_crossing(&self, crossing: &GeofenceCrossing) -> ArenaResult<()> {
        self.publish(&self.crossings_topic(), crossing).await
    }

    async fn publish<T: Serialize>(&self, topic: &str, value: &T) -> ArenaResult<()> {
        let payload = serde_json::to_vec(value)?;
        self.bus.publish(topic, payload).await
    }

    /// 订阅主题并把消息解码后转发给`tx`；无法解码的消息记录后跳过
    async fn relay<T>(&self, cancel: CancellationToken, topic: String, tx: mpsc::Sender<T>) -> ArenaResult<()>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let (raw_tx, mut raw_rx) = mpsc::channel::<Vec<u8>>(64);
        let subscription = cancel.child_token();

        let decode = {
            let subscription = subscription.clone();
            let topic = topic.clone();
            async move {
                while let Some(raw) = raw_rx.recv().await {
                    match serde_json::from_slice::<T>(&raw) {
                        Ok(value) => {
                            if tx.send(value).await.is_err() {
                                subscription.cancel();
                                break;
                            }
                        }
                        Err(e) => warn!("无法解码主题{}上的消息: {}", topic, e),
                    }
                }
            }
        };

        let (result, _) = tokio::join!(
            self.bus.subscribe(subscription.clone(), &topic, raw_tx),
            decode
        );
        result
    }
}

#[async_trait]
impl PositionStream for BusDetectionStream {
    async fn subscribe(
        &self,
        cancel: CancellationToken,
        game_id: &str,
        tx: mpsc::Sender<Detection>,
    ) -> ArenaResult<()> {
        self.relay(cancel, self.positions_topic(game_id), tx).await
    }
}

#[async_trait]
impl GeofenceStream for BusDetectionStream {
    async fn subscribe(
        &self,
        cancel: CancellationToken,
        tx: mpsc::Sender<GeofenceCrossing>,
    ) -> ArenaResult<()> {
        self.relay(cancel, self.crossings_topic(), tx).await
    }
}
