use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use scheduler_core::traits::LockStore;
use scheduler_errors::SchedulerResult;

#[derive(Debug, Clone)]
struct LockEntry {
    value: String,
    expires_at: Instant,
}

/// 内存锁存储
///
/// 只在单个进程内提供互斥，适用于单实例部署和测试。
/// 过期的键在下一次访问时被视为不存在。
#[derive(Debug, Default)]
pub struct InMemoryLockStore {
    entries: Mutex<HashMap<String, LockEntry>>,
}

impl InMemoryLockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前未过期的键数量
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .await
            .values()
            .filter(|entry| entry.expires_at > now)
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn live<'a>(
    entries: &'a HashMap<String, LockEntry>,
    key: &str,
    now: Instant,
) -> Option<&'a LockEntry> {
    entries.get(key).filter(|entry| entry.expires_at > now)
}

#[async_trait]
impl LockStore for InMemoryLockStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> SchedulerResult<bool> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        if live(&entries, key, now).is_some() {
            return Ok(false);
        }

        entries.insert(
            key.to_string(),
            LockEntry {
                value: value.to_string(),
                expires_at: now + ttl,
            },
        );
        debug!("内存锁写入: {} (TTL: {:?})", key, ttl);
        Ok(true)
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> SchedulerResult<bool> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let matched = live(&entries, key, now).map(|entry| entry.value == expected);
        match matched {
            Some(true) => {
                entries.remove(key);
                Ok(true)
            }
            Some(false) => Ok(false),
            None => {
                entries.remove(key);
                Ok(false)
            }
        }
    }

    async fn exists(&self, key: &str) -> SchedulerResult<bool> {
        let entries = self.entries.lock().await;
        Ok(live(&entries, key, Instant::now()).is_some())
    }

    async fn ttl(&self, key: &str) -> SchedulerResult<Option<Duration>> {
        let now = Instant::now();
        let entries = self.entries.lock().await;
        Ok(live(&entries, key, now).map(|entry| entry.expires_at - now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_if_absent_is_exclusive() {
        let store = InMemoryLockStore::new();
        assert!(store
            .set_if_absent("lock:a", "one", Duration::from_secs(10))
            .await
            .unwrap());
        assert!(!store
            .set_if_absent("lock:a", "two", Duration::from_secs(10))
            .await
            .unwrap());
        assert!(store.exists("lock:a").await.unwrap());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_compare_and_delete_requires_matching_value() {
        let store = InMemoryLockStore::new();
        store
            .set_if_absent("lock:a", "one", Duration::from_secs(10))
            .await
            .unwrap();

        assert!(!store.compare_and_delete("lock:a", "two").await.unwrap());
        assert!(store.exists("lock:a").await.unwrap());
        assert!(store.compare_and_delete("lock:a", "one").await.unwrap());
        assert!(!store.exists("lock:a").await.unwrap());
        assert!(!store.compare_and_delete("lock:a", "one").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire() {
        let store = InMemoryLockStore::new();
        store
            .set_if_absent("lock:a", "one", Duration::from_secs(5))
            .await
            .unwrap();

        let ttl = store.ttl("lock:a").await.unwrap().unwrap();
        assert!(ttl <= Duration::from_secs(5));

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(!store.exists("lock:a").await.unwrap());
        assert_eq!(store.ttl("lock:a").await.unwrap(), None);
        assert!(store.is_empty().await);
        assert!(store
            .set_if_absent("lock:a", "two", Duration::from_secs(5))
            .await
            .unwrap());
    }
}
