use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use scheduler_core::{traits::LockStore, SchedulerError, SchedulerResult};

/// 锁被占用时的初始轮询间隔
const BACKOFF_BASE: Duration = Duration::from_millis(50);

/// 最大轮询间隔
const BACKOFF_MAX: Duration = Duration::from_secs(1);

pub const DEFAULT_KEY_PREFIX: &str = "lock:";

/// 基于锁存储的任务级分布式互斥锁
///
/// 每次成功获取都生成新的令牌 `<主机名>:<uuid>`，释放时只有令牌匹配才会删除，
/// 过期后被他人重新获取的锁不会被旧令牌误删。
pub struct DistributedTaskLock {
    store: Arc<dyn LockStore>,
    key_prefix: String,
    holder: String,
}

impl DistributedTaskLock {
    pub fn new(store: Arc<dyn LockStore>, key_prefix: impl Into<String>) -> Self {
        let holder = hostname::get()
            .ok()
            .and_then(|name| name.into_string().ok())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "unknown-host".to_string());

        Self {
            store,
            key_prefix: key_prefix.into(),
            holder,
        }
    }

    pub fn with_holder(mut self, holder: impl Into<String>) -> Self {
        self.holder = holder.into();
        self
    }

    pub fn lock_key(&self, task_id: &str) -> String {
        format!("{}{}", self.key_prefix, task_id)
    }

    /// 获取任务锁
    ///
    /// 锁被占用时按指数退避轮询，直到 `max_wait` 耗尽。存储异常视为锁不可用。
    pub async fn acquire(
        &self,
        task_id: &str,
        timeout: Duration,
        max_wait: Duration,
    ) -> Option<String> {
        let key = self.lock_key(task_id);
        let lock_id = format!("{}:{}", self.holder, Uuid::new_v4());
        let deadline = Instant::now() + max_wait;
        let mut backoff = BACKOFF_BASE;

        loop {
            match self.store.set_if_absent(&key, &lock_id, timeout).await {
                Ok(true) => {
                    debug!("获取任务锁成功: {} (令牌: {})", key, lock_id);
                    return Some(lock_id);
                }
                Ok(false) => {}
                Err(e) => {
                    warn!("获取任务锁 {} 时锁存储异常: {}", key, e);
                    return None;
                }
            }

            let now = Instant::now();
            if now >= deadline {
                debug!("任务锁 {} 在 {:?} 内未能获取", key, max_wait);
                return None;
            }

            let delay = backoff.min(BACKOFF_MAX).min(deadline - now);
            tokio::time::sleep(delay).await;
            backoff = backoff.saturating_mul(2);
        }
    }

    /// 释放任务锁，仅当令牌匹配时生效
    pub async fn release(&self, task_id: &str, lock_id: &str) -> bool {
        let key = self.lock_key(task_id);
        match self.store.compare_and_delete(&key, lock_id).await {
            Ok(true) => {
                debug!("释放任务锁: {}", key);
                true
            }
            Ok(false) => {
                warn!("任务锁 {} 已过期或被其他持有者获取，跳过释放", key);
                false
            }
            Err(e) => {
                warn!("释放任务锁 {} 时锁存储异常: {}", key, e);
                false
            }
        }
    }

    pub async fn is_locked(&self, task_id: &str) -> SchedulerResult<bool> {
        let key = self.lock_key(task_id);
        self.store.exists(&key).await.map_err(|e| {
            warn!("查询任务锁 {} 失败: {}", key, e);
            SchedulerError::lock_unavailable(task_id)
        })
    }

    pub async fn get_lock_ttl(&self, task_id: &str) -> SchedulerResult<Option<Duration>> {
        let key = self.lock_key(task_id);
        self.store.ttl(&key).await.map_err(|e| {
            warn!("查询任务锁 {} 的TTL失败: {}", key, e);
            SchedulerError::lock_unavailable(task_id)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scheduler_core::traits::MockLockStore;

    fn failing_store() -> MockLockStore {
        let mut store = MockLockStore::new();
        store
            .expect_set_if_absent()
            .returning(|_, _, _| Err(SchedulerError::lock_store("connection refused")));
        store
            .expect_compare_and_delete()
            .returning(|_, _| Err(SchedulerError::lock_store("connection refused")));
        store
            .expect_exists()
            .returning(|_| Err(SchedulerError::lock_store("connection refused")));
        store
            .expect_ttl()
            .returning(|_| Err(SchedulerError::lock_store("connection refused")));
        store
    }

    #[tokio::test]
    async fn test_store_errors_fail_closed() {
        let lock = DistributedTaskLock::new(Arc::new(failing_store()), DEFAULT_KEY_PREFIX);

        assert!(lock
            .acquire("job", Duration::from_secs(10), Duration::from_secs(1))
            .await
            .is_none());
        assert!(!lock.release("job", "token").await);
        assert!(matches!(
            lock.is_locked("job").await,
            Err(SchedulerError::LockUnavailable { .. })
        ));
        assert!(matches!(
            lock.get_lock_ttl("job").await,
            Err(SchedulerError::LockUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_acquire_uses_prefixed_key_and_token() {
        let mut store = MockLockStore::new();
        store
            .expect_set_if_absent()
            .withf(|key, value, ttl| {
                key == "lock:report" && value.starts_with("node-1:") && *ttl == Duration::from_secs(30)
            })
            .times(1)
            .returning(|_, _, _| Ok(true));

        let lock = DistributedTaskLock::new(Arc::new(store), "lock:").with_holder("node-1");
        let token = lock
            .acquire("report", Duration::from_secs(30), Duration::ZERO)
            .await
            .unwrap();
        assert!(token.starts_with("node-1:"));
    }

    #[tokio::test]
    async fn test_acquire_polls_until_free() {
        let mut store = MockLockStore::new();
        let mut seq = mockall::Sequence::new();
        store
            .expect_set_if_absent()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(false));
        store
            .expect_set_if_absent()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(true));

        let lock = DistributedTaskLock::new(Arc::new(store), "lock:");
        let token = lock
            .acquire("job", Duration::from_secs(5), Duration::from_secs(5))
            .await;
        assert!(token.is_some());
    }

    #[tokio::test]
    async fn test_acquire_gives_up_after_max_wait() {
        let mut store = MockLockStore::new();
        store.expect_set_if_absent().returning(|_, _, _| Ok(false));

        let lock = DistributedTaskLock::new(Arc::new(store), "lock:");
        let started = std::time::Instant::now();
        let token = lock
            .acquire("job", Duration::from_secs(5), Duration::from_millis(200))
            .await;
        assert!(token.is_none());
        assert!(started.elapsed() >= Duration::from_millis(150));
    }

    #[tokio::test]
    async fn test_release_mismatch_returns_false() {
        let mut store = MockLockStore::new();
        store
            .expect_compare_and_delete()
            .withf(|key, expected| key == "lock:job" && expected == "stale")
            .returning(|_, _| Ok(false));

        let lock = DistributedTaskLock::new(Arc::new(store), "lock:");
        assert!(!lock.release("job", "stale").await);
    }

    #[tokio::test]
    async fn test_ttl_passthrough() {
        let mut store = MockLockStore::new();
        store
            .expect_ttl()
            .returning(|_| Ok(Some(Duration::from_secs(42))));
        store.expect_exists().returning(|_| Ok(true));

        let lock = DistributedTaskLock::new(Arc::new(store), "lock:");
        assert_eq!(
            lock.get_lock_ttl("job").await.unwrap(),
            Some(Duration::from_secs(42))
        );
        assert!(lock.is_locked("job").await.unwrap());
    }
}
