pub mod app_config;
pub mod lock_store;
pub mod observability;
pub mod scheduler;
pub mod task;

pub use app_config::AppConfig;
pub use lock_store::{LockStoreBackend, LockStoreConfig, RedisLockStoreConfig};
pub use observability::ObservabilityConfig;
pub use scheduler::SchedulerConfig;
pub use task::TaskEntryConfig;
