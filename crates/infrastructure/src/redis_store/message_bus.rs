use arena_core::{ArenaError, ArenaResult, MessageBus};
use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::ConnectionManager;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::RedisStore;

/// 基于Redis PUBLISH/SUBSCRIBE的消息总线
#[derive(Clone)]
pub struct RedisMessageBus {
    client: redis::Client,
    conn: ConnectionManager,
}

impl RedisMessageBus {
    pub fn new(store: &RedisStore) -> Self {
        Self {
            client: store.client().clone(),
            conn: store.connection(),
        }
    }
}

fn bus_err(err: redis::RedisError) -> ArenaError {
    ArenaError::MessageBus(err.to_string())
}

#[async_trait]
impl MessageBus for RedisMessageBus {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> ArenaResult<()> {
        let mut conn = self.conn.clone();
        let receivers: i64 = redis::cmd("PUBLISH")
            .arg(topic)
            .arg(payload)
            .query_async(&mut conn)
            .await
            .map_err(bus_err)?;
        debug!("消息已发布到{}，接收者: {}", topic, receivers);
        Ok(())
    }

    async fn subscribe(
        &self,
        cancel: CancellationToken,
        topic: &str,
        tx: mpsc::Sender<Vec<u8>>,
    ) -> ArenaResult<()> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| ArenaError::Subscription(e.to_string()))?;
        pubsub
            .subscribe(topic)
            .await
            .map_err(|e| ArenaError::Subscription(e.to_string()))?;
        info!("Subscribed to topic: {}", topic);

        let mut messages = pubsub.on_message();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                msg = messages.next() => match msg {
                    Some(msg) => {
                        if tx.send(msg.get_payload_bytes().to_vec()).await.is_err() {
                            break;
                        }
                    }
                    None => {
                        return Err(ArenaError::Subscription(format!(
                            "订阅连接已断开: {}",
                            topic
                        )));
                    }
                },
            }
        }

        debug!("取消订阅主题: {}", topic);
        Ok(())
    }
}
