use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::task::{TaskDefinition, TaskPriority};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

/// 任务的一次调度执行
///
/// `priority` 在入队时从任务定义复制，之后不再改变；
/// 重试会生成新的执行实例，`retry_count` 递增。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskExecution {
    pub execution_id: Uuid,
    pub task_id: String,
    pub task_name: String,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub scheduled_time: DateTime<Utc>,
    pub retry_count: u32,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// 重试来源的执行实例
    pub previous_execution_id: Option<Uuid>,
}

impl TaskExecution {
    pub fn new(definition: &TaskDefinition, scheduled_time: DateTime<Utc>) -> Self {
        Self {
            execution_id: Uuid::new_v4(),
            task_id: definition.task_id.clone(),
            task_name: definition.task_name.clone(),
            status: TaskStatus::Pending,
            priority: definition.priority,
            scheduled_time,
            retry_count: 0,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            previous_execution_id: None,
        }
    }

    /// 基于失败的执行实例创建重试实例
    pub fn retry_of(&self, scheduled_time: DateTime<Utc>) -> Self {
        Self {
            execution_id: Uuid::new_v4(),
            task_id: self.task_id.clone(),
            task_name: self.task_name.clone(),
            status: TaskStatus::Pending,
            priority: self.priority,
            scheduled_time,
            retry_count: self.retry_count + 1,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            previous_execution_id: Some(self.execution_id),
        }
    }

    pub fn mark_running(&mut self) {
        self.status = TaskStatus::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn mark_completed(&mut self) {
        self.status = TaskStatus::Completed;
        self.completed_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = TaskStatus::Failed;
        self.error = Some(error.into());
        self.completed_at = Some(Utc::now());
    }

    pub fn mark_cancelled(&mut self) {
        self.status = TaskStatus::Cancelled;
        self.completed_at = Some(Utc::now());
    }

    pub fn is_pending(&self) -> bool {
        self.status == TaskStatus::Pending
    }

    pub fn is_completed(&self) -> bool {
        self.status == TaskStatus::Completed
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.scheduled_time <= now
    }
}
