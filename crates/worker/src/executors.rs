use std::collections::HashMap;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info, warn};

use scheduler_core::traits::{JobContext, JobFunction};
use scheduler_errors::{SchedulerError, SchedulerResult};

const DEFAULT_HTTP_TIMEOUT_SECONDS: u64 = 30;

/// Shell任务参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellJobParams {
    /// 要执行的命令
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// 工作目录
    pub working_dir: Option<String>,
    #[serde(default)]
    pub env_vars: HashMap<String, String>,
    /// 超时时间（秒），不设置则不限制
    pub timeout_seconds: Option<u64>,
}

/// HTTP任务参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpJobParams {
    /// 请求URL
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// 请求体，字符串原样发送，其余JSON值按JSON发送
    pub body: Option<serde_json::Value>,
    #[serde(default = "default_http_timeout")]
    pub timeout_seconds: u64,
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_http_timeout() -> u64 {
    DEFAULT_HTTP_TIMEOUT_SECONDS
}

fn parse_params<T: DeserializeOwned>(context: &JobContext, kind: &str) -> SchedulerResult<T> {
    serde_json::from_value(context.parameters.clone()).map_err(|e| {
        SchedulerError::invalid_params(format!(
            "解析{kind}任务参数失败 (任务: {}): {e}",
            context.task_id
        ))
    })
}

/// Shell任务，退出码非0视为失败
#[derive(Debug, Default)]
pub struct ShellJob;

impl ShellJob {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl JobFunction for ShellJob {
    async fn execute(&self, context: JobContext) -> SchedulerResult<()> {
        let params: ShellJobParams = parse_params(&context, "Shell")?;
        let start_time = Instant::now();

        info!(
            "执行Shell任务: task_id={}, execution_id={}, command={}, args={:?}",
            context.task_id, context.execution_id, params.command, params.args
        );

        let mut cmd = Command::new(&params.command);
        cmd.args(&params.args)
            .envs(&params.env_vars)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &params.working_dir {
            cmd.current_dir(dir);
        }

        let output = match params.timeout_seconds {
            Some(seconds) => tokio::time::timeout(Duration::from_secs(seconds), cmd.output())
                .await
                .map_err(|_| SchedulerError::Timeout(format!("Shell命令执行超过 {seconds} 秒")))?,
            None => cmd.output().await,
        }
        .map_err(|e| SchedulerError::task_execution(format!("启动Shell命令失败: {e}")))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            debug!("Shell任务输出 [{}]: {}", context.task_id, stdout.trim_end());
        }

        let duration = start_time.elapsed();
        if output.status.success() {
            info!(
                "Shell任务执行完成: task_id={}, duration={}ms",
                context.task_id,
                duration.as_millis()
            );
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(
                "Shell任务执行失败: task_id={}, exit_code={:?}",
                context.task_id,
                output.status.code()
            );
            Err(SchedulerError::task_execution(format!(
                "命令执行失败，退出码: {:?} {}",
                output.status.code(),
                stderr.trim()
            )))
        }
    }

    fn name(&self) -> &str {
        "shell"
    }
}

/// HTTP任务，非2xx状态码视为失败
#[derive(Debug, Default)]
pub struct HttpJob {
    client: reqwest::Client,
}

impl HttpJob {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl JobFunction for HttpJob {
    async fn execute(&self, context: JobContext) -> SchedulerResult<()> {
        let params: HttpJobParams = parse_params(&context, "HTTP")?;
        let start_time = Instant::now();
        let method = params.method.to_uppercase();

        let mut request_builder = match method.as_str() {
            "GET" => self.client.get(&params.url),
            "POST" => self.client.post(&params.url),
            "PUT" => self.client.put(&params.url),
            "DELETE" => self.client.delete(&params.url),
            "PATCH" => self.client.patch(&params.url),
            "HEAD" => self.client.head(&params.url),
            _ => {
                return Err(SchedulerError::invalid_params(format!(
                    "不支持的HTTP方法: {method}"
                )));
            }
        };

        info!(
            "执行HTTP任务: task_id={}, execution_id={}, method={}, url={}",
            context.task_id, context.execution_id, method, params.url
        );

        request_builder = request_builder.timeout(Duration::from_secs(params.timeout_seconds));
        for (key, value) in &params.headers {
            request_builder = request_builder.header(key, value);
        }
        request_builder = match params.body {
            Some(serde_json::Value::String(body)) => request_builder.body(body),
            Some(body) => request_builder.json(&body),
            None => request_builder,
        };

        let response = request_builder
            .send()
            .await
            .map_err(|e| SchedulerError::task_execution(format!("HTTP请求失败: {e}")))?;

        let status = response.status();
        let duration = start_time.elapsed();
        if status.is_success() {
            info!(
                "HTTP任务执行完成: task_id={}, status={}, duration={}ms",
                context.task_id,
                status.as_u16(),
                duration.as_millis()
            );
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            warn!(
                "HTTP任务执行失败: task_id={}, status={}",
                context.task_id,
                status.as_u16()
            );
            Err(SchedulerError::task_execution(format!(
                "HTTP请求失败，状态码: {} {}",
                status.as_u16(),
                body.trim()
            )))
        }
    }

    fn name(&self) -> &str {
        "http"
    }
}

/// 空任务，只记录日志
#[derive(Debug, Default)]
pub struct NoopJob;

#[async_trait]
impl JobFunction for NoopJob {
    async fn execute(&self, context: JobContext) -> SchedulerResult<()> {
        info!(
            "执行空任务: task_id={}, execution_id={}, retry_count={}",
            context.task_id, context.execution_id, context.retry_count
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "noop"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(parameters: serde_json::Value) -> JobContext {
        JobContext {
            execution_id: Default::default(),
            task_id: "job".to_string(),
            task_name: "job".to_string(),
            retry_count: 0,
            parameters,
        }
    }

    #[tokio::test]
    async fn test_shell_requires_command() {
        let err = ShellJob::new()
            .execute(context(serde_json::json!({ "args": ["x"] })))
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidTaskParams(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_shell_exit_status() {
        let job = ShellJob::new();
        job.execute(context(serde_json::json!({ "command": "true" })))
            .await
            .unwrap();

        let err = job
            .execute(context(serde_json::json!({
                "command": "sh",
                "args": ["-c", "echo broken >&2; exit 3"]
            })))
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::TaskExecution(_)));
        assert!(err.to_string().contains("broken"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_shell_timeout() {
        let err = ShellJob::new()
            .execute(context(serde_json::json!({
                "command": "sleep",
                "args": ["5"],
                "timeout_seconds": 1
            })))
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_shell_missing_binary() {
        let err = ShellJob::new()
            .execute(context(serde_json::json!({
                "command": "definitely-not-a-real-binary-7f3a"
            })))
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::TaskExecution(_)));
    }

    #[tokio::test]
    async fn test_http_rejects_unknown_method() {
        let err = HttpJob::new()
            .execute(context(serde_json::json!({
                "url": "http://127.0.0.1:1/",
                "method": "BREW"
            })))
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidTaskParams(_)));
    }

    #[tokio::test]
    async fn test_http_connection_failure() {
        let err = HttpJob::new()
            .execute(context(serde_json::json!({
                "url": "http://127.0.0.1:1/health",
                "timeout_seconds": 2
            })))
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::TaskExecution(_)));
    }

    #[test]
    fn test_http_params_defaults() {
        let params: HttpJobParams =
            serde_json::from_value(serde_json::json!({ "url": "http://localhost" })).unwrap();
        assert_eq!(params.method, "GET");
        assert!(params.headers.is_empty());
        assert_eq!(params.timeout_seconds, DEFAULT_HTTP_TIMEOUT_SECONDS);
    }

    #[tokio::test]
    async fn test_noop() {
        NoopJob.execute(context(serde_json::json!({}))).await.unwrap();
        assert_eq!(NoopJob.name(), "noop");
    }
}
