//! 内置任务函数
//!
//! 提供 `shell`、`http`、`noop` 三种任务函数，通过 [`register_builtin_jobs`] 注册到调度器的任务注册表。

pub mod executors;

use std::sync::Arc;

use scheduler_dispatcher::JobRegistry;
use tracing::debug;

pub use executors::{HttpJob, HttpJobParams, NoopJob, ShellJob, ShellJobParams};

/// 注册全部内置任务函数
pub async fn register_builtin_jobs(registry: &JobRegistry) {
    registry.register("shell", Arc::new(ShellJob::new())).await;
    registry.register("http", Arc::new(HttpJob::new())).await;
    registry.register("noop", Arc::new(NoopJob)).await;
    debug!("已注册内置任务函数: shell, http, noop");
}
