use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::ArenaResult;

/// 消息总线，用于把对局事件扇出给连接层
#[async_trait]
pub trait MessageBus: Send + Sync {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> ArenaResult<()>;

    /// 订阅主题，阻塞直到令牌被取消或接收端关闭
    async fn subscribe(
        &self,
        cancel: CancellationToken,
        topic: &str,
        tx: mpsc::Sender<Vec<u8>>,
    ) -> ArenaResult<()>;
}
