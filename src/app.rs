use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use scheduler_core::config::AppConfig;
use scheduler_dispatcher::{
    AdvancedTaskScheduler, DefaultCronEvaluator, DistributedTaskLock, JobRegistry,
};
use scheduler_infrastructure::LockStoreFactory;
use scheduler_worker::register_builtin_jobs;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// 维护周期：补充CRON执行、清理已结束的执行记录
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(30);

/// 主应用程序
pub struct Application {
    config: AppConfig,
    scheduler: AdvancedTaskScheduler,
}

impl Application {
    /// 创建锁存储与调度器，并注册配置中的任务
    pub async fn new(config: AppConfig) -> Result<Self> {
        info!(
            "初始化应用程序，锁存储后端: {:?}, 最大并发: {}",
            config.lock_store.backend, config.scheduler.max_concurrent_tasks
        );

        let lock_store = LockStoreFactory::create(&config.lock_store)
            .await
            .context("创建锁存储失败")?;

        let registry = Arc::new(JobRegistry::new());
        register_builtin_jobs(&registry).await;

        let scheduler = AdvancedTaskScheduler::with_components(
            config.scheduler.clone(),
            registry,
            DistributedTaskLock::new(lock_store, config.lock_store.key_prefix.clone()),
            Arc::new(DefaultCronEvaluator),
        );

        for entry in &config.tasks {
            scheduler
                .register_task(entry.to_definition())
                .await
                .with_context(|| format!("注册任务失败: {}", entry.task_id))?;
        }
        info!("已注册 {} 个任务", config.tasks.len());

        Ok(Self { config, scheduler })
    }

    /// 启动调度器并调度配置中的任务，收到关闭信号后停止
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        self.scheduler.start().await.context("启动调度器失败")?;

        if let Err(e) = self.schedule_configured_tasks().await {
            self.stop_scheduler().await;
            return Err(e);
        }

        let mut interval = tokio::time::interval(MAINTENANCE_INTERVAL);
        interval.tick().await;

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("应用收到关闭信号");
                    break;
                }
                _ = interval.tick() => {
                    self.maintain().await;
                }
            }
        }

        self.stop_scheduler().await;
        Ok(())
    }

    async fn schedule_configured_tasks(&self) -> Result<()> {
        for entry in &self.config.tasks {
            match &entry.cron {
                Some(expression) => {
                    self.scheduler
                        .schedule_cron_task(&entry.task_id, expression)
                        .await
                        .with_context(|| format!("按CRON调度任务失败: {}", entry.task_id))?;
                }
                None => {
                    self.scheduler
                        .schedule_task(&entry.task_id)
                        .await
                        .with_context(|| format!("调度任务失败: {}", entry.task_id))?;
                }
            }
        }
        Ok(())
    }

    /// CRON任务的预排执行耗尽后重新展开
    async fn maintain(&self) {
        for entry in &self.config.tasks {
            let Some(expression) = &entry.cron else {
                continue;
            };

            let has_pending = self
                .scheduler
                .get_task_executions(&entry.task_id)
                .await
                .iter()
                .any(|execution| execution.is_pending());
            if has_pending {
                continue;
            }

            if let Err(e) = self
                .scheduler
                .schedule_cron_task(&entry.task_id, expression)
                .await
            {
                warn!("补充CRON任务 {} 的执行失败: {}", entry.task_id, e);
            }
        }

        let pruned = self.scheduler.prune_finished_executions().await;
        let health = self.scheduler.get_health_status().await;
        debug!(
            "维护完成: 清理记录={}, 队列长度={}, 健康状态={}, 成功率={:.1}%",
            pruned,
            self.scheduler.queue_size().await,
            health.status.as_str(),
            health.success_rate
        );
    }

    async fn stop_scheduler(&self) {
        match self.scheduler.stop().await {
            Ok(()) => info!("调度器已停止"),
            Err(e) => error!("停止调度器失败: {e}"),
        }
    }
}
