use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// 最大并发执行数
    pub max_concurrent_tasks: usize,
    /// 队列空闲时协调循环的轮询间隔（毫秒）
    pub poll_interval_ms: u64,
    /// 任务锁TTL（秒）
    pub lock_timeout_seconds: u64,
    /// 获取任务锁的最长等待时间（秒）
    pub lock_max_wait_seconds: u64,
    /// CRON调度一次展开的执行次数
    pub cron_lookahead: usize,
    /// 错误日志保留条数
    pub error_log_capacity: usize,
    /// 停止时等待运行中任务的超时（秒）
    pub shutdown_timeout_seconds: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: 10,
            poll_interval_ms: 500,
            lock_timeout_seconds: 300,
            lock_max_wait_seconds: 5,
            cron_lookahead: 10,
            error_log_capacity: 100,
            shutdown_timeout_seconds: 30,
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_concurrent_tasks == 0 {
            return Err(anyhow::anyhow!("最大并发任务数必须大于0"));
        }
        if self.poll_interval_ms == 0 {
            return Err(anyhow::anyhow!("轮询间隔必须大于0"));
        }
        if self.lock_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("任务锁超时时间必须大于0"));
        }
        if self.cron_lookahead == 0 {
            return Err(anyhow::anyhow!("CRON展开次数必须大于0"));
        }
        if self.error_log_capacity == 0 {
            return Err(anyhow::anyhow!("错误日志容量必须大于0"));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_seconds)
    }

    pub fn lock_max_wait(&self) -> Duration {
        Duration::from_secs(self.lock_max_wait_seconds)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_seconds)
    }
}
