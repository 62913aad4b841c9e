use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use redis::aio::ConnectionManager;
use redis::{Client, Script};
use tracing::{debug, error};

use scheduler_core::{config::RedisLockStoreConfig, traits::LockStore};
use scheduler_errors::{SchedulerError, SchedulerResult};

/// 值匹配时才删除键
const COMPARE_AND_DELETE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// Redis锁存储
///
/// 加锁使用 `SET key value NX PX ttl`，释放使用Lua脚本原子地比较并删除。
#[derive(Clone)]
pub struct RedisLockStore {
    manager: ConnectionManager,
    release_script: Script,
}

impl RedisLockStore {
    pub async fn new(config: &RedisLockStoreConfig) -> SchedulerResult<Self> {
        let client = Client::open(config.build_connection_url())
            .map_err(|e| SchedulerError::lock_store(format!("创建Redis客户端失败: {e}")))?;

        let timeout = Duration::from_secs(config.connection_timeout_seconds);
        let manager = tokio::time::timeout(timeout, client.get_connection_manager())
            .await
            .map_err(|_| {
                SchedulerError::lock_store(format!(
                    "连接Redis超时: {}:{} ({}秒)",
                    config.host, config.port, config.connection_timeout_seconds
                ))
            })?
            .map_err(|e| {
                error!("连接Redis失败 {}:{}: {}", config.host, config.port, e);
                SchedulerError::lock_store(format!("连接Redis失败: {e}"))
            })?;

        debug!("Redis锁存储已连接: {}:{}", config.host, config.port);
        Ok(Self::from_manager(manager))
    }

    pub fn from_manager(manager: ConnectionManager) -> Self {
        Self {
            manager,
            release_script: Script::new(COMPARE_AND_DELETE_SCRIPT),
        }
    }

    pub async fn ping(&self) -> SchedulerResult<()> {
        let mut conn = self.manager.clone();
        let response: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(command_error)?;
        if response == "PONG" {
            Ok(())
        } else {
            Err(SchedulerError::lock_store(format!(
                "意外的PING响应: {response}"
            )))
        }
    }
}

fn command_error(e: redis::RedisError) -> SchedulerError {
    counter!("lock_store_errors_total", "backend" => "redis").increment(1);
    SchedulerError::lock_store(format!("Redis命令执行失败: {e}"))
}

/// PTTL 返回 -2 表示键不存在，-1 表示未设置过期时间
fn ttl_from_millis(millis: i64) -> Option<Duration> {
    u64::try_from(millis).ok().map(Duration::from_millis)
}

#[async_trait]
impl LockStore for RedisLockStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> SchedulerResult<bool> {
        let mut conn = self.manager.clone();
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await
            .map_err(command_error)?;
        Ok(reply.is_some())
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> SchedulerResult<bool> {
        let mut conn = self.manager.clone();
        let deleted: i64 = self
            .release_script
            .key(key)
            .arg(expected)
            .invoke_async(&mut conn)
            .await
            .map_err(command_error)?;
        Ok(deleted == 1)
    }

    async fn exists(&self, key: &str) -> SchedulerResult<bool> {
        let mut conn = self.manager.clone();
        let count: i64 = redis::cmd("EXISTS")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(command_error)?;
        Ok(count > 0)
    }

    async fn ttl(&self, key: &str) -> SchedulerResult<Option<Duration>> {
        let mut conn = self.manager.clone();
        let millis: i64 = redis::cmd("PTTL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(command_error)?;
        Ok(ttl_from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_from_millis() {
        assert_eq!(ttl_from_millis(-2), None);
        assert_eq!(ttl_from_millis(-1), None);
        assert_eq!(ttl_from_millis(1500), Some(Duration::from_millis(1500)));
    }
}
