use serde::{Deserialize, Serialize};

/// 重试间隔上限（秒），即30天
pub const MAX_RETRY_DELAY_SECONDS: f64 = 30.0 * 24.0 * 3600.0;

/// 重试退避策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RetryStrategy {
    /// 不重试
    None,
    /// 固定间隔
    Fixed,
    /// 线性增长
    Linear,
    /// 指数退避
    Exponential,
}

/// 重试策略配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub strategy: RetryStrategy,
    /// 最大重试次数
    pub max_attempts: u32,
    /// 基础重试间隔（秒）
    pub initial_delay: f64,
    /// 指数退避倍数，仅用于 `Exponential`
    pub backoff_multiplier: f64,
    /// 最大重试间隔（秒）
    pub max_delay: f64,
    /// 是否添加随机抖动
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            strategy: RetryStrategy::Exponential,
            max_attempts: 3,
            initial_delay: 60.0,
            backoff_multiplier: 2.0,
            max_delay: 3600.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn none() -> Self {
        Self {
            strategy: RetryStrategy::None,
            max_attempts: 0,
            ..Self::default()
        }
    }

    pub fn fixed(max_attempts: u32, initial_delay: f64) -> Self {
        Self {
            strategy: RetryStrategy::Fixed,
            max_attempts,
            initial_delay,
            jitter: false,
            ..Self::default()
        }
    }

    pub fn linear(max_attempts: u32, initial_delay: f64) -> Self {
        Self {
            strategy: RetryStrategy::Linear,
            max_attempts,
            initial_delay,
            jitter: false,
            ..Self::default()
        }
    }

    pub fn exponential(max_attempts: u32, initial_delay: f64, backoff_multiplier: f64) -> Self {
        Self {
            strategy: RetryStrategy::Exponential,
            max_attempts,
            initial_delay,
            backoff_multiplier,
            jitter: false,
            ..Self::default()
        }
    }

    pub fn with_max_delay(mut self, max_delay: f64) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.initial_delay.is_finite() || self.initial_delay < 0.0 {
            return Err(anyhow::anyhow!("初始重试间隔不能为负数"));
        }
        if !self.max_delay.is_finite() || self.max_delay < 0.0 {
            return Err(anyhow::anyhow!("最大重试间隔不能为负数"));
        }
        if self.initial_delay > MAX_RETRY_DELAY_SECONDS
            || self.max_delay > MAX_RETRY_DELAY_SECONDS
        {
            return Err(anyhow::anyhow!(
                "重试间隔不能超过 {} 秒，当前初始间隔: {}, 最大间隔: {}",
                MAX_RETRY_DELAY_SECONDS,
                self.initial_delay,
                self.max_delay
            ));
        }
        if self.strategy == RetryStrategy::Exponential && self.backoff_multiplier < 1.0 {
            return Err(anyhow::anyhow!(
                "指数退避倍数必须不小于1，当前值: {}",
                self.backoff_multiplier
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_config_default() {
        let config = RetryConfig::default();
        assert_eq!(config.strategy, RetryStrategy::Exponential);
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.initial_delay, 60.0);
        assert_eq!(config.backoff_multiplier, 2.0);
        assert_eq!(config.max_delay, 3600.0);
        assert!(config.jitter);
    }

    #[test]
    fn test_constructors_disable_jitter() {
        assert!(!RetryConfig::fixed(3, 1.0).jitter);
        assert!(!RetryConfig::linear(3, 30.0).jitter);
        assert!(!RetryConfig::exponential(3, 10.0, 2.0).jitter);
        assert_eq!(RetryConfig::none().strategy, RetryStrategy::None);
    }

    #[test]
    fn test_validate() {
        assert!(RetryConfig::default().validate().is_ok());
        assert!(RetryConfig::fixed(3, -1.0).validate().is_err());
        assert!(RetryConfig::exponential(3, 10.0, 0.5).validate().is_err());
    }

    #[test]
    fn test_validate_rejects_delays_beyond_ceiling() {
        let huge_cap = RetryConfig::exponential(100, 10.0, 2.0).with_max_delay(1e20);
        assert!(huge_cap.validate().is_err());
        assert!(RetryConfig::fixed(3, MAX_RETRY_DELAY_SECONDS + 1.0)
            .validate()
            .is_err());
        assert!(RetryConfig::fixed(3, 1.0)
            .with_max_delay(MAX_RETRY_DELAY_SECONDS)
            .validate()
            .is_ok());
    }

    #[test]
    fn test_partial_toml() {
        let config: RetryConfig = toml::from_str(
            r#"
            strategy = "LINEAR"
            initial_delay = 30.0
            "#,
        )
        .unwrap();
        assert_eq!(config.strategy, RetryStrategy::Linear);
        assert_eq!(config.initial_delay, 30.0);
        assert_eq!(config.max_attempts, 3);
    }
}
