use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("任务已注册: {task_id}")]
    TaskAlreadyRegistered { task_id: String },
    #[error("任务未找到: {task_id}")]
    TaskNotFound { task_id: String },
    #[error("任务执行实例未找到: {execution_id}")]
    ExecutionNotFound { execution_id: String },
    #[error("未找到任务函数: {func_reference}")]
    JobNotFound { func_reference: String },
    #[error("无效的CRON表达式: {expr} - {message}")]
    InvalidCron { expr: String, message: String },
    #[error("检测到循环依赖: 任务 {task_id}")]
    CircularDependency { task_id: String },
    #[error("分布式锁不可用: {task_id}")]
    LockUnavailable { task_id: String },
    #[error("锁存储错误: {0}")]
    LockStore(String),
    #[error("任务执行错误: {0}")]
    TaskExecution(String),
    #[error("无效的任务参数: {0}")]
    InvalidTaskParams(String),
    #[error("配置错误: {0}")]
    Configuration(String),
    #[error("序列化错误: {0}")]
    Serialization(String),
    #[error("调度器已在运行")]
    AlreadyRunning,
    #[error("调度器未运行")]
    NotRunning,
    #[error("操作超时: {0}")]
    Timeout(String),
    #[error("内部错误: {0}")]
    Internal(String),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;

impl SchedulerError {
    pub fn task_not_found<S: Into<String>>(task_id: S) -> Self {
        Self::TaskNotFound {
            task_id: task_id.into(),
        }
    }
    pub fn already_registered<S: Into<String>>(task_id: S) -> Self {
        Self::TaskAlreadyRegistered {
            task_id: task_id.into(),
        }
    }
    pub fn job_not_found<S: Into<String>>(func_reference: S) -> Self {
        Self::JobNotFound {
            func_reference: func_reference.into(),
        }
    }
    pub fn circular_dependency<S: Into<String>>(task_id: S) -> Self {
        Self::CircularDependency {
            task_id: task_id.into(),
        }
    }
    pub fn lock_unavailable<S: Into<String>>(task_id: S) -> Self {
        Self::LockUnavailable {
            task_id: task_id.into(),
        }
    }
    pub fn lock_store<S: Into<String>>(msg: S) -> Self {
        Self::LockStore(msg.into())
    }
    pub fn task_execution<S: Into<String>>(msg: S) -> Self {
        Self::TaskExecution(msg.into())
    }
    pub fn invalid_params<S: Into<String>>(msg: S) -> Self {
        Self::InvalidTaskParams(msg.into())
    }
    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }
    /// 配置类错误在调用处同步返回，且不会留下部分修改的状态
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            SchedulerError::TaskAlreadyRegistered { .. }
                | SchedulerError::JobNotFound { .. }
                | SchedulerError::InvalidCron { .. }
                | SchedulerError::CircularDependency { .. }
                | SchedulerError::Configuration(_)
        )
    }
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SchedulerError::LockUnavailable { .. }
                | SchedulerError::LockStore(_)
                | SchedulerError::TaskExecution(_)
                | SchedulerError::Timeout(_)
        )
    }
    pub fn user_message(&self) -> &str {
        match self {
            SchedulerError::TaskNotFound { .. } => "请求的任务不存在",
            SchedulerError::TaskAlreadyRegistered { .. } => "任务已存在，请勿重复注册",
            SchedulerError::ExecutionNotFound { .. } => "请求的任务执行记录不存在",
            SchedulerError::InvalidCron { .. } => "CRON表达式格式有误",
            SchedulerError::CircularDependency { .. } => "任务依赖关系存在循环",
            SchedulerError::InvalidTaskParams(_) => "任务参数配置有误",
            SchedulerError::LockUnavailable { .. } => "任务正在其他节点执行，请稍后重试",
            SchedulerError::Timeout(_) => "操作超时，请稍后重试",
            _ => "系统繁忙，请稍后重试",
        }
    }
}

impl From<serde_json::Error> for SchedulerError {
    fn from(err: serde_json::Error) -> Self {
        SchedulerError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for SchedulerError {
    fn from(err: anyhow::Error) -> Self {
        SchedulerError::Internal(err.to_string())
    }
}
