pub mod message_bus;
pub mod task;
pub mod task_queue;

pub use message_bus::MessageBus;
pub use task::{Task, TaskScheduler};
pub use task_queue::TaskQueue;
