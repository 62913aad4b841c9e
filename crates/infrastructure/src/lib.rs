pub mod in_memory_lock_store;
pub mod lock_store_factory;
pub mod metrics_exporter;
pub mod redis_lock_store;

pub use in_memory_lock_store::InMemoryLockStore;
pub use lock_store_factory::LockStoreFactory;
pub use metrics_exporter::install_prometheus_exporter;
pub use redis_lock_store::RedisLockStore;
