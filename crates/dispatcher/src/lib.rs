//! 调度核心
//!
//! 由优先级队列、依赖图、分布式任务锁、重试管理器和健康监控组成，
//! [`AdvancedTaskScheduler`] 负责把它们编排成单协调循环加有界工作池。

pub mod cron_utils;
pub mod dependency_graph;
pub mod distributed_lock;
pub mod health_monitor;
pub mod job_registry;
pub mod priority_queue;
pub mod retry_manager;
pub mod scheduler;

pub use cron_utils::{CronScheduler, DefaultCronEvaluator};
pub use dependency_graph::TaskDependencyGraph;
pub use distributed_lock::DistributedTaskLock;
pub use health_monitor::{SchedulerHealthMonitor, HEALTHY_SUCCESS_RATE_THRESHOLD};
pub use job_registry::JobRegistry;
pub use priority_queue::PriorityTaskQueue;
pub use retry_manager::TaskRetryManager;
pub use scheduler::AdvancedTaskScheduler;
