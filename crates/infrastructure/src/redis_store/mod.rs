mod connection;
mod game_repository;
mod message_bus;
mod task_queue;

pub use connection::RedisStore;
pub use game_repository::RedisGameRepository;
pub use message_bus::RedisMessageBus;
pub use task_queue::RedisTaskQueue;

use arena_core::ArenaError;

pub(crate) fn queue_err(err: redis::RedisError) -> ArenaError {
    ArenaError::QueueBackend(err.to_string())
}
