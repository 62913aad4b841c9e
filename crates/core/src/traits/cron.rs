use chrono::{DateTime, Utc};

use crate::SchedulerResult;

/// CRON表达式求值器
pub trait CronEvaluator: Send + Sync {
    /// 校验表达式，无效时返回 `InvalidCron`
    fn validate(&self, expression: &str) -> SchedulerResult<()>;

    /// 返回 `from` 之后最多 `count` 个执行时间
    fn upcoming(
        &self,
        expression: &str,
        from: DateTime<Utc>,
        count: usize,
    ) -> SchedulerResult<Vec<DateTime<Utc>>>;
}
