//! 对局编排任务
//!
//! - `GeofenceWorker`: 监听玩家靠近围栏的事件，为每个围栏提交唯一的对局任务
//! - `GameWorker`: 运行一局对局，把位置事件交给对局引擎并发布结果

pub mod game_worker;
pub mod geofence_worker;
pub mod payload;

pub use game_worker::{GameWorker, GameWorkerOptions, GAME_WORKER_ID};
pub use geofence_worker::{GeofenceWorker, GEOFENCE_NEAR_TOPIC, GEOFENCE_WORKER_ID};
pub use payload::{watch_game_updates, GameEventPayload, GameWatcherEvent, GAME_UPDATE_TOPIC};
