use std::time::Duration;

use arena_core::{ArenaError, ArenaResult, RedisConfig};
use redis::aio::ConnectionManager;
use tracing::{debug, info, warn};

use super::queue_err;

/// 共享的Redis连接
///
/// `ConnectionManager`自带断线重连，克隆开销很小，可以在各个仓储之间共享。
#[derive(Clone)]
pub struct RedisStore {
    client: redis::Client,
    conn: ConnectionManager,
    prefix: String,
}

impl RedisStore {
    /// 建立连接，失败时按配置重试
    pub async fn connect(config: &RedisConfig) -> ArenaResult<Self> {
        info!("Connecting to Redis: {}", config.url);

        let client = redis::Client::open(config.url.as_str())
            .map_err(|e| ArenaError::Configuration(format!("无效的Redis地址: {}", e)))?;

        let timeout = Duration::from_secs(config.connection_timeout_seconds);
        let attempts = config.max_retry_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match tokio::time::timeout(timeout, client.get_connection_manager()).await {
                Ok(Ok(conn)) => {
                    let store = Self {
                        client,
                        conn,
                        prefix: config.key_prefix.clone(),
                    };
                    store.ping().await?;
                    info!("Redis连接成功 (第{}次尝试)", attempt);
                    return Ok(store);
                }
                Ok(Err(e)) => last_error = e.to_string(),
                Err(_) => last_error = format!("连接超时 ({}秒)", config.connection_timeout_seconds),
            }

            warn!(
                "Redis连接失败 (第{}/{}次): {}",
                attempt, attempts, last_error
            );
            if attempt < attempts {
                tokio::time::sleep(Duration::from_secs(config.retry_delay_seconds)).await;
            }
        }

        Err(ArenaError::QueueBackend(format!(
            "无法连接Redis {}: {}",
            config.url, last_error
        )))
    }

    pub async fn ping(&self) -> ArenaResult<()> {
        let mut conn = self.conn.clone();
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(queue_err)?;
        debug!("Redis PING: {}", pong);
        Ok(())
    }

    pub fn client(&self) -> &redis::Client {
        &self.client
    }

    pub fn connection(&self) -> ConnectionManager {
        self.conn.clone()
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn build_key(&self, key: &str) -> String {
        format!("{}:{}", self.prefix, key)
    }
}
