//! 对局依赖的外部协作者接口

pub mod game_repository;
pub mod position_stream;

pub use game_repository::{GameRecord, GameRecordExtra, GameRepository};
pub use position_stream::{Detection, DetectionKind, GeofenceCrossing, GeofenceStream, PositionStream};
