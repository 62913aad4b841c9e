use serde::{Deserialize, Serialize};

use super::retry::RetryConfig;

/// 任务优先级
///
/// 数值越大优先级越高，`Critical` 总是先于其余级别出队。
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskPriority {
    Low = 1,
    #[default]
    Normal = 2,
    High = 3,
    Critical = 4,
}

impl TaskPriority {
    pub const ALL: [TaskPriority; 4] = [
        TaskPriority::Low,
        TaskPriority::Normal,
        TaskPriority::High,
        TaskPriority::Critical,
    ];

    pub fn rank(self) -> u8 {
        self as u8
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskPriority::Low => "LOW",
            TaskPriority::Normal => "NORMAL",
            TaskPriority::High => "HIGH",
            TaskPriority::Critical => "CRITICAL",
        }
    }
}

impl std::fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 任务依赖描述
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskDependency {
    /// 前置任务ID
    pub task_id: String,
    /// 依赖类型，例如 "completion"
    #[serde(default = "default_dependency_type")]
    pub dependency_type: String,
}

fn default_dependency_type() -> String {
    TaskDependency::COMPLETION.to_string()
}

impl TaskDependency {
    pub const COMPLETION: &'static str = "completion";

    pub fn new(task_id: impl Into<String>, dependency_type: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            dependency_type: dependency_type.into(),
        }
    }

    pub fn completion(task_id: impl Into<String>) -> Self {
        Self::new(task_id, Self::COMPLETION)
    }
}

/// 任务定义
///
/// 注册后不可变。`func_reference` 在注册时由任务函数注册表解析，
/// 解析失败时注册直接返回错误。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDefinition {
    pub task_id: String,
    pub task_name: String,
    pub func_reference: String,
    #[serde(default)]
    pub priority: TaskPriority,
    #[serde(default)]
    pub retry_config: RetryConfig,
    #[serde(default)]
    pub dependencies: Vec<TaskDependency>,
    /// 传递给任务函数的参数
    #[serde(default = "default_parameters")]
    pub parameters: serde_json::Value,
}

fn default_parameters() -> serde_json::Value {
    serde_json::json!({})
}

impl TaskDefinition {
    pub fn new(
        task_id: impl Into<String>,
        task_name: impl Into<String>,
        func_reference: impl Into<String>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            task_name: task_name.into(),
            func_reference: func_reference.into(),
            priority: TaskPriority::default(),
            retry_config: RetryConfig::default(),
            dependencies: Vec::new(),
            parameters: default_parameters(),
        }
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_retry_config(mut self, retry_config: RetryConfig) -> Self {
        self.retry_config = retry_config;
        self
    }

    pub fn with_dependency(mut self, dependency: TaskDependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    pub fn with_dependencies<I, S>(mut self, task_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies
            .extend(task_ids.into_iter().map(TaskDependency::completion));
        self
    }

    pub fn with_parameters(mut self, parameters: serde_json::Value) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn dependency_ids(&self) -> impl Iterator<Item = &str> {
        self.dependencies.iter().map(|dep| dep.task_id.as_str())
    }
}
