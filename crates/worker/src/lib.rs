pub mod components;
pub mod registry;
pub mod scheduler;
pub mod task_manager;

pub use registry::TaskRegistry;
pub use scheduler::QueueScheduler;
pub use task_manager::{ManagerState, TaskManager, TaskManagerOptions};
