pub mod heartbeat_manager;
pub mod job_execution;

pub use heartbeat_manager::JobHeartbeat;
pub use job_execution::JobExecutionManager;
