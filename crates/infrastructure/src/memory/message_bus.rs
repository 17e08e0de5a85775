use std::collections::HashMap;
use std::sync::Arc;

use arena_core::{ArenaResult, MessageBus};
use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// 进程内发布订阅总线，语义与Redis PUBLISH一致：没有订阅者的消息直接丢弃
#[derive(Clone)]
pub struct InMemoryMessageBus {
    topics: Arc<RwLock<HashMap<String, broadcast::Sender<Vec<u8>>>>>,
    capacity: usize,
}

impl InMemoryMessageBus {
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            topics: Arc::new(RwLock::new(HashMap::new())),
            capacity,
        }
    }

    pub async fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .read()
            .await
            .get(topic)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }

    /// 当前保留发送端的主题数
    pub async fn topic_count(&self) -> usize {
        self.topics.read().await.len()
    }

    /// 在写锁内订阅，避免与`prune`交错
    async fn receiver(&self, topic: &str) -> broadcast::Receiver<Vec<u8>> {
        let mut topics = self.topics.write().await;
        topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// 没有订阅者时移除主题的发送端
    async fn prune(&self, topic: &str) {
        let mut topics = self.topics.write().await;
        if topics.get(topic).is_some_and(|tx| tx.receiver_count() == 0) {
            topics.remove(topic);
            debug!("主题{}已无订阅者，移除发送端", topic);
        }
    }
}

impl Default for InMemoryMessageBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageBus for InMemoryMessageBus {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> ArenaResult<()> {
        let sent = match self.topics.read().await.get(topic) {
            Some(tx) => tx.send(payload).is_ok(),
            None => false,
        };
        if !sent {
            debug!("主题{}没有订阅者，消息已丢弃", topic);
            self.prune(topic).await;
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        cancel: CancellationToken,
        topic: &str,
        tx: mpsc::Sender<Vec<u8>>,
    ) -> ArenaResult<()> {
        let mut rx = self.receiver(topic).await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                msg = rx.recv() => match msg {
                    Ok(payload) => {
                        if tx.send(payload).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("订阅主题{}落后，丢弃了{}条消息", topic, skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }

        drop(rx);
        self.prune(topic).await;
        Ok(())
    }
}
