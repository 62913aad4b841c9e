use std::sync::Arc;

use tracing::{debug, info};

use scheduler_core::config::{LockStoreBackend, LockStoreConfig};
use scheduler_core::traits::LockStore;
use scheduler_errors::SchedulerResult;

use crate::{InMemoryLockStore, RedisLockStore};

pub struct LockStoreFactory;

impl LockStoreFactory {
    pub async fn create(config: &LockStoreConfig) -> SchedulerResult<Arc<dyn LockStore>> {
        debug!("创建锁存储，后端类型: {:?}", config.backend);

        match config.backend {
            LockStoreBackend::Memory => {
                info!("使用内存锁存储，仅在单实例内提供互斥");
                Ok(Arc::new(InMemoryLockStore::new()))
            }
            LockStoreBackend::Redis => {
                info!(
                    "使用Redis锁存储: {}:{}/{}",
                    config.redis.host, config.redis.port, config.redis.database
                );
                let store = RedisLockStore::new(&config.redis).await?;
                Ok(Arc::new(store))
            }
        }
    }
}
