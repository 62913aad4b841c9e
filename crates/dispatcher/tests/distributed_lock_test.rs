#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use scheduler_dispatcher::DistributedTaskLock;
    use scheduler_infrastructure::InMemoryLockStore;

    fn managers() -> (DistributedTaskLock, DistributedTaskLock) {
        let store = Arc::new(InMemoryLockStore::new());
        (
            DistributedTaskLock::new(store.clone(), "lock:").with_holder("node-a"),
            DistributedTaskLock::new(store, "lock:").with_holder("node-b"),
        )
    }

    #[tokio::test]
    async fn test_two_managers_cannot_both_hold_lock() {
        let (a, b) = managers();

        let token = a
            .acquire("sync", Duration::from_secs(10), Duration::ZERO)
            .await
            .unwrap();
        assert!(token.starts_with("node-a:"));
        assert!(b
            .acquire("sync", Duration::from_secs(10), Duration::from_millis(100))
            .await
            .is_none());
        assert!(b.is_locked("sync").await.unwrap());

        assert!(!b.release("sync", "node-b:forged").await);
        assert!(a.release("sync", &token).await);
        assert!(!a.is_locked("sync").await.unwrap());

        assert!(b
            .acquire("sync", Duration::from_secs(10), Duration::ZERO)
            .await
            .is_some());
    }

    #[tokio::test]
    async fn test_waiter_acquires_after_release() {
        let (a, b) = managers();
        let a = Arc::new(a);

        let token = a
            .acquire("report", Duration::from_secs(10), Duration::ZERO)
            .await
            .unwrap();

        let holder = a.clone();
        let releaser = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            holder.release("report", &token).await
        });

        let acquired = b
            .acquire("report", Duration::from_secs(10), Duration::from_secs(3))
            .await;
        assert!(releaser.await.unwrap());
        assert!(acquired.is_some());
    }

    #[tokio::test]
    async fn test_stale_token_never_deletes_new_lock() {
        let (a, b) = managers();

        let stale = a
            .acquire("cleanup", Duration::from_millis(100), Duration::ZERO)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        let fresh = b
            .acquire("cleanup", Duration::from_secs(10), Duration::ZERO)
            .await
            .unwrap();

        assert!(!a.release("cleanup", &stale).await);
        assert!(a.is_locked("cleanup").await.unwrap());
        let ttl = a.get_lock_ttl("cleanup").await.unwrap().unwrap();
        assert!(ttl > Duration::from_secs(5));

        assert!(b.release("cleanup", &fresh).await);
        assert_eq!(b.get_lock_ttl("cleanup").await.unwrap(), None);
    }
}
