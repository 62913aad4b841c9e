use std::collections::VecDeque;
use std::time::{Duration, Instant};

use chrono::Utc;
use metrics::{counter, histogram};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use scheduler_core::models::{
    ErrorRecord, HealthMetrics, HealthState, HealthStatus, TaskExecution, TaskStatus,
};

/// 成功率不低于该值（百分比）时视为健康
pub const HEALTHY_SUCCESS_RATE_THRESHOLD: f64 = 90.0;

const DEFAULT_ERROR_LOG_CAPACITY: usize = 100;

#[derive(Debug)]
struct MonitorState {
    metrics: HealthMetrics,
    errors: VecDeque<ErrorRecord>,
}

/// 调度器健康监控
///
/// 汇总执行结果与锁竞争情况，并同步写入 `metrics` 指标。
#[derive(Debug)]
pub struct SchedulerHealthMonitor {
    state: RwLock<MonitorState>,
    error_log_capacity: usize,
    started_at: Instant,
}

impl Default for SchedulerHealthMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl SchedulerHealthMonitor {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_ERROR_LOG_CAPACITY)
    }

    pub fn with_capacity(error_log_capacity: usize) -> Self {
        Self {
            state: RwLock::new(MonitorState {
                metrics: HealthMetrics::default(),
                errors: VecDeque::with_capacity(error_log_capacity),
            }),
            error_log_capacity: error_log_capacity.max(1),
            started_at: Instant::now(),
        }
    }

    /// 记录一次执行结果
    ///
    /// 只统计 COMPLETED 与 FAILED 两种终态，FAILED 写入错误日志，其余状态忽略。
    pub async fn record_execution(&self, execution: &TaskExecution, execution_time: Duration) {
        let failed = match execution.status {
            TaskStatus::Completed => false,
            TaskStatus::Failed => true,
            status => {
                warn!(
                    "忽略非终态执行结果: 任务={}, 执行ID={}, 状态={:?}",
                    execution.task_id, execution.execution_id, status
                );
                return;
            }
        };

        counter!("scheduler_task_executions_total", "priority" => execution.priority.as_str())
            .increment(1);
        histogram!("scheduler_task_execution_duration_seconds")
            .record(execution_time.as_secs_f64());

        let mut state = self.state.write().await;
        state.metrics.tasks_executed += 1;
        state.metrics.total_execution_time += execution_time;

        if failed {
            counter!("scheduler_task_failures_total").increment(1);
            state.metrics.tasks_failed += 1;

            if state.errors.len() >= self.error_log_capacity {
                state.errors.pop_front();
            }
            state.errors.push_back(ErrorRecord {
                execution: execution.clone(),
                error: execution.error.clone().unwrap_or_default(),
                recorded_at: Utc::now(),
            });
        } else {
            state.metrics.tasks_succeeded += 1;
        }

        debug!(
            "记录执行结果: 任务={}, 执行ID={}, 状态={:?}, 耗时={}ms",
            execution.task_id,
            execution.execution_id,
            execution.status,
            execution_time.as_millis()
        );
    }

    pub async fn record_lock_acquisition(&self, success: bool) {
        let mut state = self.state.write().await;
        if success {
            counter!("scheduler_lock_acquisitions_total").increment(1);
            state.metrics.lock_acquisitions += 1;
        } else {
            counter!("scheduler_lock_failures_total").increment(1);
            state.metrics.lock_failures += 1;
        }
    }

    pub async fn get_health_status(&self) -> HealthStatus {
        let state = self.state.read().await;
        let metrics = state.metrics.clone();

        let success_rate = if metrics.tasks_executed == 0 {
            100.0
        } else {
            metrics.tasks_succeeded as f64 / metrics.tasks_executed as f64 * 100.0
        };

        let average_execution_time_ms = if metrics.tasks_executed == 0 {
            0.0
        } else {
            metrics.total_execution_time.as_secs_f64() * 1000.0 / metrics.tasks_executed as f64
        };

        let status = if success_rate >= HEALTHY_SUCCESS_RATE_THRESHOLD {
            HealthState::Healthy
        } else {
            HealthState::Degraded
        };

        HealthStatus {
            status,
            success_rate,
            metrics,
            average_execution_time_ms,
            recent_errors: state.errors.iter().cloned().collect(),
            uptime: self.started_at.elapsed(),
            checked_at: Utc::now(),
        }
    }

    pub async fn reset_metrics(&self) {
        let mut state = self.state.write().await;
        state.metrics = HealthMetrics::default();
        state.errors.clear();
        info!("健康指标已重置");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scheduler_core::models::TaskDefinition;

    fn finished(task_id: &str, success: bool) -> TaskExecution {
        let definition = TaskDefinition::new(task_id, task_id, "noop");
        let mut execution = TaskExecution::new(&definition, Utc::now());
        execution.mark_running();
        if success {
            execution.mark_completed();
        } else {
            execution.mark_failed(format!("{task_id} failed"));
        }
        execution
    }

    #[tokio::test]
    async fn test_empty_monitor_is_healthy() {
        let monitor = SchedulerHealthMonitor::new();
        let status = monitor.get_health_status().await;

        assert!(status.is_healthy());
        assert_eq!(status.success_rate, 100.0);
        assert_eq!(status.metrics.tasks_executed, 0);
        assert_eq!(status.average_execution_time_ms, 0.0);
    }

    #[tokio::test]
    async fn test_threshold_is_inclusive() {
        let monitor = SchedulerHealthMonitor::new();
        for _ in 0..9 {
            monitor
                .record_execution(&finished("ok", true), Duration::from_millis(10))
                .await;
        }
        monitor
            .record_execution(&finished("bad", false), Duration::from_millis(30))
            .await;

        let status = monitor.get_health_status().await;
        assert_eq!(status.metrics.tasks_executed, 10);
        assert_eq!(status.metrics.tasks_succeeded, 9);
        assert_eq!(status.metrics.tasks_failed, 1);
        assert!((status.success_rate - 90.0).abs() < 1e-9);
        assert_eq!(status.status, HealthState::Healthy);
        assert!((status.average_execution_time_ms - 12.0).abs() < 1e-6);
        assert_eq!(status.recent_errors.len(), 1);
        assert_eq!(status.recent_errors[0].error, "bad failed");
    }

    #[tokio::test]
    async fn test_non_terminal_results_are_ignored() {
        let monitor = SchedulerHealthMonitor::new();
        let definition = TaskDefinition::new("skip", "skip", "noop");

        let pending = TaskExecution::new(&definition, Utc::now());
        let mut cancelled = TaskExecution::new(&definition, Utc::now());
        cancelled.mark_cancelled();
        let mut running = TaskExecution::new(&definition, Utc::now());
        running.mark_running();

        for execution in [&pending, &cancelled, &running] {
            monitor
                .record_execution(execution, Duration::from_millis(5))
                .await;
        }
        monitor
            .record_execution(&finished("bad", false), Duration::ZERO)
            .await;

        let status = monitor.get_health_status().await;
        assert_eq!(status.metrics.tasks_executed, 1);
        assert_eq!(status.metrics.tasks_succeeded, 0);
        assert_eq!(status.metrics.tasks_failed, 1);
        assert_eq!(status.success_rate, 0.0);
        assert_eq!(status.metrics.total_execution_time, Duration::ZERO);
    }

    #[tokio::test]
    async fn test_degraded_below_threshold() {
        let monitor = SchedulerHealthMonitor::new();
        monitor
            .record_execution(&finished("ok", true), Duration::ZERO)
            .await;
        monitor
            .record_execution(&finished("bad", false), Duration::ZERO)
            .await;

        let status = monitor.get_health_status().await;
        assert_eq!(status.status, HealthState::Degraded);
        assert_eq!(status.success_rate, 50.0);
    }

    #[tokio::test]
    async fn test_error_log_is_bounded() {
        let monitor = SchedulerHealthMonitor::with_capacity(3);
        for i in 0..5 {
            monitor
                .record_execution(&finished(&format!("t{i}"), false), Duration::ZERO)
                .await;
        }

        let status = monitor.get_health_status().await;
        let ids: Vec<&str> = status
            .recent_errors
            .iter()
            .map(|r| r.execution.task_id.as_str())
            .collect();
        assert_eq!(ids, vec!["t2", "t3", "t4"]);
    }

    #[tokio::test]
    async fn test_lock_counters_and_reset() {
        let monitor = SchedulerHealthMonitor::new();
        monitor.record_lock_acquisition(true).await;
        monitor.record_lock_acquisition(true).await;
        monitor.record_lock_acquisition(false).await;
        monitor
            .record_execution(&finished("bad", false), Duration::ZERO)
            .await;

        let status = monitor.get_health_status().await;
        assert_eq!(status.metrics.lock_acquisitions, 2);
        assert_eq!(status.metrics.lock_failures, 1);

        monitor.reset_metrics().await;
        let status = monitor.get_health_status().await;
        assert_eq!(status.metrics, HealthMetrics::default());
        assert!(status.recent_errors.is_empty());
    }
}
