//! 对局领域模型
//!
//! 对局引擎是纯状态机：不做IO，不持有异步资源。外部协作者（位置事件流、
//! 对局记录存储）通过`ports`中的接口接入。

pub mod events;
pub mod game;
pub mod geo;
pub mod player;
pub mod ports;
pub mod rank;

pub use events::{GameEvent, GameEventName};
pub use game::{Game, GameRules, GameSnapshot};
pub use player::{GamePlayers, Player, Role};
pub use ports::{
    Detection, DetectionKind, GameRecord, GameRepository, GeofenceCrossing, GeofenceStream,
    PositionStream,
};
pub use rank::{PlayerRank, Rank};
