use async_trait::async_trait;
use arena_core::ArenaResult;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionKind {
    Enter,
    Inside,
    Exit,
}

/// 玩家相对对局区域的一次位置检测
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub player_id: String,
    pub lat: f64,
    pub lon: f64,
    pub kind: DetectionKind,
}

/// 玩家靠近某个地理围栏
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeofenceCrossing {
    /// 围栏ID，同时作为对局ID
    pub geofence_id: String,
    /// 围栏坐标，原样传递给对局记录
    pub coordinates: String,
    pub player_id: String,
    pub lat: f64,
    pub lon: f64,
}

/// 对局区域内的位置事件流
#[async_trait]
pub trait PositionStream: Send + Sync {
    /// 阻塞直到令牌取消；发送端关闭视为正常结束
    async fn subscribe(
        &self,
        cancel: CancellationToken,
        game_id: &str,
        tx: mpsc::Sender<Detection>,
    ) -> ArenaResult<()>;
}

/// 地理围栏进入事件流
#[async_trait]
pub trait GeofenceStream: Send + Sync {
    async fn subscribe(
        &self,
        cancel: CancellationToken,
        tx: mpsc::Sender<GeofenceCrossing>,
    ) -> ArenaResult<()>;
}
