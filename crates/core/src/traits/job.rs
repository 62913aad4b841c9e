use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::SchedulerResult;

/// 任务函数执行上下文
#[derive(Debug, Clone)]
pub struct JobContext {
    pub execution_id: Uuid,
    pub task_id: String,
    pub task_name: String,
    pub retry_count: u32,
    pub parameters: serde_json::Value,
}

/// 任务函数
///
/// 返回 `Err` 即视为本次执行失败，由重试管理器决定是否重试。
#[async_trait]
pub trait JobFunction: Send + Sync {
    async fn execute(&self, context: JobContext) -> SchedulerResult<()>;

    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// 闭包形式的任务函数
pub struct FnJob<F> {
    func: F,
}

#[async_trait]
impl<F, Fut> JobFunction for FnJob<F>
where
    F: Fn(JobContext) -> Fut + Send + Sync,
    Fut: Future<Output = SchedulerResult<()>> + Send,
{
    async fn execute(&self, context: JobContext) -> SchedulerResult<()> {
        (self.func)(context).await
    }

    fn name(&self) -> &str {
        "fn_job"
    }
}

/// 将异步闭包包装为任务函数
pub fn job_fn<F, Fut>(func: F) -> Arc<dyn JobFunction>
where
    F: Fn(JobContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = SchedulerResult<()>> + Send + 'static,
{
    Arc::new(FnJob { func })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SchedulerError;

    fn context() -> JobContext {
        JobContext {
            execution_id: Uuid::new_v4(),
            task_id: "t".to_string(),
            task_name: "test".to_string(),
            retry_count: 0,
            parameters: serde_json::json!({ "fail": true }),
        }
    }

    #[tokio::test]
    async fn test_job_fn_propagates_result() {
        let job = job_fn(|ctx: JobContext| async move {
            if ctx.parameters["fail"].as_bool().unwrap_or(false) {
                Err(SchedulerError::task_execution("requested failure"))
            } else {
                Ok(())
            }
        });

        assert!(job.execute(context()).await.is_err());

        let mut ok_context = context();
        ok_context.parameters = serde_json::json!({});
        assert!(job.execute(ok_context).await.is_ok());
    }
}
