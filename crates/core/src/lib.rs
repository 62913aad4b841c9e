pub mod config;
pub mod models;
pub mod traits;

pub use models::{
    ErrorRecord, HealthMetrics, HealthState, HealthStatus, RetryConfig, RetryStrategy,
    TaskDefinition, TaskDependency, TaskExecution, TaskPriority, TaskStatus,
};
pub use scheduler_errors::{SchedulerError, SchedulerResult};
pub use traits::{job_fn, CronEvaluator, JobContext, JobFunction, LockStore};
