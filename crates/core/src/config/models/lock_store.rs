use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockStoreBackend {
    /// 单进程内存存储，仅适用于单实例部署和测试
    Memory,
    Redis,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LockStoreConfig {
    pub backend: LockStoreBackend,
    /// 锁键前缀，完整键为 `<prefix><task_id>`
    pub key_prefix: String,
    pub redis: RedisLockStoreConfig,
}

impl Default for LockStoreConfig {
    fn default() -> Self {
        Self {
            backend: LockStoreBackend::Memory,
            key_prefix: "lock:".to_string(),
            redis: RedisLockStoreConfig::default(),
        }
    }
}

impl LockStoreConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.key_prefix.is_empty() {
            return Err(anyhow::anyhow!("锁键前缀不能为空"));
        }
        if self.backend == LockStoreBackend::Redis {
            self.redis.validate()?;
        }
        Ok(())
    }
}

/// Redis锁存储配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisLockStoreConfig {
    pub host: String,
    pub port: u16,
    pub database: i64,
    pub password: Option<String>,
    pub connection_timeout_seconds: u64,
}

impl Default for RedisLockStoreConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            database: 0,
            password: None,
            connection_timeout_seconds: 5,
        }
    }
}

impl RedisLockStoreConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.host.is_empty() {
            return Err(anyhow::anyhow!("Redis主机不能为空"));
        }
        if self.port == 0 {
            return Err(anyhow::anyhow!("Redis端口无效"));
        }
        if self.connection_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("Redis连接超时时间必须大于0"));
        }
        Ok(())
    }

    /// 构建Redis连接URL
    pub fn build_connection_url(&self) -> String {
        if let Some(password) = &self.password {
            format!(
                "redis://:{}@{}:{}/{}",
                password, self.host, self.port, self.database
            )
        } else {
            format!("redis://{}:{}/{}", self.host, self.port, self.database)
        }
    }
}
