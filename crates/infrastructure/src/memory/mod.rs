mod game_repository;
mod message_bus;
mod task_queue;

pub use game_repository::InMemoryGameRepository;
pub use message_bus::InMemoryMessageBus;
pub use task_queue::InMemoryTaskQueue;
