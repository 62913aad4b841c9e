//! 调度器外部协作方接口
//!
//! - [`JobFunction`]：任务函数，调度器只关心调用是否返回错误
//! - [`CronEvaluator`]：CRON表达式求值，给出有限个未来执行时间
//! - [`LockStore`]：分布式锁所依赖的键值存储原子操作

pub mod cron;
pub mod job;
pub mod lock_store;

pub use cron::CronEvaluator;
pub use job::{job_fn, FnJob, JobContext, JobFunction};
pub use lock_store::LockStore;

#[cfg(feature = "mock")]
pub use lock_store::MockLockStore;
