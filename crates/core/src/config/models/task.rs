use serde::{Deserialize, Serialize};

use crate::models::{RetryConfig, TaskDefinition, TaskDependency, TaskPriority};

/// 配置文件中声明的任务，启动时注册并调度
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEntryConfig {
    pub task_id: String,
    #[serde(default)]
    pub task_name: Option<String>,
    pub func_reference: String,
    #[serde(default)]
    pub priority: TaskPriority,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// 设置后按CRON调度，否则启动时执行一次
    #[serde(default)]
    pub cron: Option<String>,
    #[serde(default)]
    pub parameters: Option<serde_json::Value>,
}

impl TaskEntryConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.task_id.is_empty() {
            return Err(anyhow::anyhow!("任务ID不能为空"));
        }
        if self.func_reference.is_empty() {
            return Err(anyhow::anyhow!("任务 {} 的函数引用不能为空", self.task_id));
        }
        if self.dependencies.iter().any(|dep| dep == &self.task_id) {
            return Err(anyhow::anyhow!("任务 {} 不能依赖自身", self.task_id));
        }
        self.retry.validate()?;
        Ok(())
    }

    pub fn to_definition(&self) -> TaskDefinition {
        TaskDefinition {
            task_id: self.task_id.clone(),
            task_name: self
                .task_name
                .clone()
                .unwrap_or_else(|| self.task_id.clone()),
            func_reference: self.func_reference.clone(),
            priority: self.priority,
            retry_config: self.retry.clone(),
            dependencies: self
                .dependencies
                .iter()
                .map(TaskDependency::completion)
                .collect(),
            parameters: self
                .parameters
                .clone()
                .unwrap_or_else(|| serde_json::json!({})),
        }
    }
}
