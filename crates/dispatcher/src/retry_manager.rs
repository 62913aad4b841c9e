use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tracing::debug;

use scheduler_core::models::{RetryConfig, RetryStrategy, TaskExecution};

/// 重试间隔的随机抖动范围（±10%）
pub const JITTER_FACTOR: f64 = 0.1;

/// 任务重试管理器
///
/// 负责判断失败的执行是否需要重试、计算重试间隔，并维护每个任务的重试台账。
#[derive(Debug, Default)]
pub struct TaskRetryManager {
    history: Mutex<HashMap<String, u32>>,
}

impl TaskRetryManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 检查执行实例是否可以重试
    pub fn should_retry(&self, execution: &TaskExecution, config: &RetryConfig) -> bool {
        if config.strategy == RetryStrategy::None {
            return false;
        }
        if execution.retry_count >= config.max_attempts {
            debug!(
                "任务 {} 已达到最大重试次数 {}，不再重试",
                execution.task_id, config.max_attempts
            );
            return false;
        }
        true
    }

    /// 计算下一次重试前的等待时间
    ///
    /// 所有策略的结果都不超过 `max_delay`。
    pub fn calculate_delay(&self, execution: &TaskExecution, config: &RetryConfig) -> Duration {
        let retry_count = execution.retry_count;
        let max_delay = config.max_delay.max(0.0);

        let base = match config.strategy {
            RetryStrategy::None => 0.0,
            RetryStrategy::Fixed => config.initial_delay,
            RetryStrategy::Linear => config.initial_delay * (retry_count as f64 + 1.0),
            RetryStrategy::Exponential => {
                let exponent = i32::try_from(retry_count).unwrap_or(i32::MAX);
                config.initial_delay * config.backoff_multiplier.powi(exponent)
            }
        };

        let mut delay = if base.is_finite() {
            base.clamp(0.0, max_delay)
        } else {
            max_delay
        };

        if config.jitter && delay > 0.0 {
            let jitter_range = delay * JITTER_FACTOR;
            let jitter = (rand::random::<f64>() * 2.0 - 1.0) * jitter_range;
            delay = (delay + jitter).clamp(0.0, max_delay);
        }

        debug!(
            "任务 {} 第 {} 次重试间隔: {:.3}秒 (策略: {:?})",
            execution.task_id,
            retry_count + 1,
            delay,
            config.strategy
        );
        Duration::try_from_secs_f64(delay).unwrap_or(Duration::MAX)
    }

    /// 记录一次重试，返回该任务累计的重试次数
    pub fn record_retry(&self, task_id: &str) -> u32 {
        let mut history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        let count = history.entry(task_id.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    pub fn get_retry_count(&self, task_id: &str) -> u32 {
        let history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        history.get(task_id).copied().unwrap_or(0)
    }

    pub fn clear_history(&self, task_id: &str) {
        let mut history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        history.remove(task_id);
    }
}
