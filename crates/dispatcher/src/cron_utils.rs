use chrono::{DateTime, Duration, Utc};
use cron::Schedule;
use std::str::FromStr;
use tracing::debug;

use scheduler_core::{traits::CronEvaluator, SchedulerError, SchedulerResult};

/// CRON表达式解析和调度工具
///
/// 支持5段（分 时 日 月 周）、6段和7段表达式，5段表达式补齐秒字段 `0`。
pub struct CronScheduler {
    expression: String,
    schedule: Schedule,
}

impl CronScheduler {
    /// 创建新的CRON调度器
    pub fn new(cron_expr: &str) -> SchedulerResult<Self> {
        let normalized = Self::normalize(cron_expr);
        let schedule = Schedule::from_str(&normalized).map_err(|e| SchedulerError::InvalidCron {
            expr: cron_expr.to_string(),
            message: e.to_string(),
        })?;

        Ok(Self {
            expression: normalized,
            schedule,
        })
    }

    /// 将5段表达式补齐为带秒字段的6段表达式
    pub fn normalize(cron_expr: &str) -> String {
        let fields: Vec<&str> = cron_expr.split_whitespace().collect();
        if fields.len() == 5 {
            format!("0 {}", fields.join(" "))
        } else {
            fields.join(" ")
        }
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// 获取下一次执行时间
    pub fn next_execution_time(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&from).next()
    }

    /// 获取从指定时间开始的多个执行时间
    pub fn upcoming_times(&self, from: DateTime<Utc>, count: usize) -> Vec<DateTime<Utc>> {
        self.schedule.after(&from).take(count).collect()
    }

    /// 计算下次执行时间距离现在的时长
    pub fn time_until_next_execution(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.next_execution_time(now).map(|next| next - now)
    }

    /// 验证CRON表达式是否有效
    pub fn validate_cron_expression(cron_expr: &str) -> SchedulerResult<()> {
        Self::new(cron_expr).map(|_| ())
    }
}

/// 基于 `cron` crate 的默认求值器
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultCronEvaluator;

impl CronEvaluator for DefaultCronEvaluator {
    fn validate(&self, expression: &str) -> SchedulerResult<()> {
        CronScheduler::validate_cron_expression(expression)
    }

    fn upcoming(
        &self,
        expression: &str,
        from: DateTime<Utc>,
        count: usize,
    ) -> SchedulerResult<Vec<DateTime<Utc>>> {
        let scheduler = CronScheduler::new(expression)?;
        let times = scheduler.upcoming_times(from, count);
        debug!(
            "CRON表达式 {} 展开 {} 个执行时间",
            scheduler.expression(),
            times.len()
        );
        Ok(times)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    #[test]
    fn test_five_field_expression_is_normalized() {
        assert_eq!(CronScheduler::normalize("*/5 * * * *"), "0 */5 * * * *");
        assert_eq!(CronScheduler::normalize("0 0 12 * * *"), "0 0 12 * * *");

        let scheduler = CronScheduler::new("*/5 * * * *").unwrap();
        let from = Utc.with_ymd_and_hms(2024, 1, 1, 10, 2, 30).unwrap();
        let next = scheduler.next_execution_time(from).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 1, 1, 10, 5, 0).unwrap());
    }

    #[test]
    fn test_upcoming_times() {
        let scheduler = CronScheduler::new("0 0 * * * *").unwrap();
        let from = Utc.with_ymd_and_hms(2024, 1, 1, 10, 30, 0).unwrap();
        let times = scheduler.upcoming_times(from, 3);

        assert_eq!(times.len(), 3);
        assert_eq!(times[0].hour(), 11);
        assert_eq!(times[1].hour(), 12);
        assert_eq!(times[2].hour(), 13);
        assert!(times.iter().all(|t| t.minute() == 0 && t.second() == 0));
    }

    #[test]
    fn test_invalid_expression() {
        let err = CronScheduler::validate_cron_expression("not a cron").unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidCron { .. }));
        assert!(CronScheduler::validate_cron_expression("0 0 12 * * *").is_ok());
    }

    #[test]
    fn test_default_evaluator() {
        let evaluator = DefaultCronEvaluator;
        let from = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        let times = evaluator.upcoming("30 2 * * *", from, 2).unwrap();
        assert_eq!(times.len(), 2);
        assert_eq!(times[0], Utc.with_ymd_and_hms(2024, 1, 1, 2, 30, 0).unwrap());
        assert_eq!(times[1], Utc.with_ymd_and_hms(2024, 1, 2, 2, 30, 0).unwrap());

        assert!(evaluator.validate("bogus").is_err());
        assert!(evaluator.upcoming("bogus", from, 1).is_err());
    }

    #[test]
    fn test_time_until_next_execution() {
        let scheduler = CronScheduler::new("0 * * * * *").unwrap();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 15).unwrap();
        assert_eq!(
            scheduler.time_until_next_execution(now),
            Some(Duration::seconds(45))
        );
    }
}
