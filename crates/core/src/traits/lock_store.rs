use std::time::Duration;

use async_trait::async_trait;

use crate::SchedulerResult;

/// 分布式锁存储
///
/// 所有写操作只能通过两个原子原语完成：`set_if_absent` 与
/// `compare_and_delete`，不允许先读后写。
#[cfg_attr(feature = "mock", mockall::automock)]
#[async_trait]
pub trait LockStore: Send + Sync {
    /// `SET key value NX` 并设置TTL，写入成功返回 `true`
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> SchedulerResult<bool>;

    /// 仅当当前值等于 `expected` 时删除，删除成功返回 `true`
    async fn compare_and_delete(&self, key: &str, expected: &str) -> SchedulerResult<bool>;

    async fn exists(&self, key: &str) -> SchedulerResult<bool>;

    /// 剩余TTL，键不存在时返回 `None`
    async fn ttl(&self, key: &str) -> SchedulerResult<Option<Duration>>;
}
