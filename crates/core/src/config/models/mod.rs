pub mod app_config;
pub mod game;
pub mod observability;
pub mod redis;
pub mod task_manager;

// Re-export main types for easier imports
pub use app_config::{AppConfig, BackendKind};
pub use game::GameConfig;
pub use observability::ObservabilityConfig;
pub use redis::RedisConfig;
pub use task_manager::TaskManagerConfig;
