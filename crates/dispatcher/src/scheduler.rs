use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use metrics::counter;
use tokio::sync::{broadcast, Mutex, Notify, RwLock, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use scheduler_core::{
    config::SchedulerConfig,
    models::{HealthStatus, TaskDefinition, TaskExecution, TaskStatus},
    traits::{CronEvaluator, JobContext, JobFunction, LockStore},
    SchedulerError, SchedulerResult,
};

use crate::cron_utils::DefaultCronEvaluator;
use crate::dependency_graph::TaskDependencyGraph;
use crate::distributed_lock::{DistributedTaskLock, DEFAULT_KEY_PREFIX};
use crate::health_monitor::SchedulerHealthMonitor;
use crate::job_registry::JobRegistry;
use crate::priority_queue::PriorityTaskQueue;
use crate::retry_manager::TaskRetryManager;

#[derive(Clone)]
struct RegisteredTask {
    definition: TaskDefinition,
    job: Arc<dyn JobFunction>,
}

/// 执行记录表
#[derive(Debug, Default)]
struct ExecutionTable {
    executions: HashMap<Uuid, TaskExecution>,
    /// 每个任务的执行实例，按创建顺序
    history: HashMap<String, Vec<Uuid>>,
    /// 每个任务最近一次开始运行的执行实例，依赖判断以它为准
    last_run: HashMap<String, Uuid>,
}

impl ExecutionTable {
    fn insert(&mut self, execution: TaskExecution) {
        self.history
            .entry(execution.task_id.clone())
            .or_default()
            .push(execution.execution_id);
        self.executions.insert(execution.execution_id, execution);
    }

    fn update(&mut self, execution: &TaskExecution) {
        if execution.status == TaskStatus::Running {
            self.last_run
                .insert(execution.task_id.clone(), execution.execution_id);
        }
        self.executions
            .insert(execution.execution_id, execution.clone());
    }

    fn mark_cancelled(&mut self, execution_id: &Uuid) {
        if let Some(execution) = self.executions.get_mut(execution_id) {
            execution.mark_cancelled();
        }
    }

    /// 返回第一个尚未完成的前置任务
    fn blocking_dependency(&self, graph: &TaskDependencyGraph, task_id: &str) -> Option<String> {
        graph.get_dependencies(task_id).into_iter().find(|dependency| {
            !self
                .last_run
                .get(dependency)
                .and_then(|id| self.executions.get(id))
                .is_some_and(|execution| execution.is_completed())
        })
    }

    fn latest(&self, task_id: &str) -> Option<&TaskExecution> {
        self.history
            .get(task_id)
            .and_then(|ids| ids.last())
            .and_then(|id| self.executions.get(id))
    }

    /// 清理已结束的执行记录，每个任务保留最近的执行与最近一次运行
    fn prune_finished(&mut self) -> usize {
        let mut keep: HashSet<Uuid> = self.last_run.values().copied().collect();
        for ids in self.history.values() {
            if let Some(last) = ids.last() {
                keep.insert(*last);
            }
        }

        let before = self.executions.len();
        self.executions
            .retain(|id, execution| !execution.status.is_terminal() || keep.contains(id));

        let executions = &self.executions;
        for ids in self.history.values_mut() {
            ids.retain(|id| executions.contains_key(id));
        }
        self.history.retain(|_, ids| !ids.is_empty());

        before - self.executions.len()
    }
}

#[derive(Debug, Default)]
struct SchedulerState {
    queue: PriorityTaskQueue,
    graph: TaskDependencyGraph,
    table: ExecutionTable,
    /// 获取锁失败后的退避截止时间
    not_before: HashMap<Uuid, DateTime<Utc>>,
    /// 已出队、工作任务正在等待分布式锁的执行
    claimed: HashSet<Uuid>,
}

impl SchedulerState {
    fn enqueue_new(&mut self, execution: TaskExecution) -> Uuid {
        let execution_id = execution.execution_id;
        self.table.insert(execution.clone());
        self.queue.enqueue(execution);
        execution_id
    }
}

struct Coordinator {
    handle: JoinHandle<()>,
    shutdown_tx: broadcast::Sender<()>,
}

struct SchedulerInner {
    config: SchedulerConfig,
    registry: Arc<JobRegistry>,
    cron: Arc<dyn CronEvaluator>,
    lock: DistributedTaskLock,
    retry_manager: TaskRetryManager,
    health: SchedulerHealthMonitor,
    tasks: RwLock<HashMap<String, RegisteredTask>>,
    state: Mutex<SchedulerState>,
    notify: Notify,
    workers: Arc<Semaphore>,
    running: AtomicBool,
}

/// 高级任务调度器
///
/// 单个协调循环负责出队、依赖判断与派发，工作任务数量受
/// `max_concurrent_tasks` 限制。锁的获取与重试等待都发生在工作任务或定时任务中，
/// 不会阻塞协调循环。
///
/// 锁顺序：`tasks` 先于 `state`。
pub struct AdvancedTaskScheduler {
    inner: Arc<SchedulerInner>,
    coordinator: Mutex<Option<Coordinator>>,
}

impl AdvancedTaskScheduler {
    /// 使用默认锁前缀与默认CRON求值器创建调度器
    pub fn new(
        config: SchedulerConfig,
        registry: Arc<JobRegistry>,
        lock_store: Arc<dyn LockStore>,
    ) -> Self {
        Self::with_components(
            config,
            registry,
            DistributedTaskLock::new(lock_store, DEFAULT_KEY_PREFIX),
            Arc::new(DefaultCronEvaluator),
        )
    }

    pub fn with_components(
        config: SchedulerConfig,
        registry: Arc<JobRegistry>,
        lock: DistributedTaskLock,
        cron: Arc<dyn CronEvaluator>,
    ) -> Self {
        let workers = Arc::new(Semaphore::new(config.max_concurrent_tasks.max(1)));
        let health = SchedulerHealthMonitor::with_capacity(config.error_log_capacity);

        Self {
            inner: Arc::new(SchedulerInner {
                config,
                registry,
                cron,
                lock,
                retry_manager: TaskRetryManager::new(),
                health,
                tasks: RwLock::new(HashMap::new()),
                state: Mutex::new(SchedulerState::default()),
                notify: Notify::new(),
                workers,
                running: AtomicBool::new(false),
            }),
            coordinator: Mutex::new(None),
        }
    }

    /// 注册任务定义
    ///
    /// 重复注册、任务函数无法解析或依赖成环时返回错误，且不修改任何状态。
    pub async fn register_task(&self, definition: TaskDefinition) -> SchedulerResult<()> {
        definition
            .retry_config
            .validate()
            .map_err(|e| SchedulerError::invalid_params(e.to_string()))?;

        let job = self
            .inner
            .registry
            .get(&definition.func_reference)
            .await
            .ok_or_else(|| SchedulerError::job_not_found(&definition.func_reference))?;

        let mut tasks = self.inner.tasks.write().await;
        if tasks.contains_key(&definition.task_id) {
            return Err(SchedulerError::already_registered(&definition.task_id));
        }

        {
            let mut state = self.inner.state.lock().await;
            state
                .graph
                .add_task(&definition.task_id, &definition.dependencies)?;
        }

        info!(
            "注册任务: {} ({}), 优先级: {}, 依赖: {:?}",
            definition.task_id,
            definition.task_name,
            definition.priority,
            definition.dependency_ids().collect::<Vec<_>>()
        );
        tasks.insert(
            definition.task_id.clone(),
            RegisteredTask { definition, job },
        );
        Ok(())
    }

    /// 注销任务，同时取消其排队中的执行并清理重试记录
    ///
    /// 仍被其他任务依赖时保留为隐式节点，依赖方在其重新注册并完成前不会被派发。
    pub async fn unregister_task(&self, task_id: &str) -> bool {
        let mut tasks = self.inner.tasks.write().await;
        if tasks.remove(task_id).is_none() {
            return false;
        }

        let cancelled = {
            let mut state = self.inner.state.lock().await;
            state.graph.detach_task(task_id);
            state.table.last_run.remove(task_id);
            let removed = state.queue.remove_all(task_id);
            for execution in &removed {
                state.not_before.remove(&execution.execution_id);
                state.table.mark_cancelled(&execution.execution_id);
            }
            removed.len()
        };
        drop(tasks);

        self.inner.retry_manager.clear_history(task_id);
        info!("注销任务: {}, 取消排队中的执行 {} 个", task_id, cancelled);
        true
    }

    /// 立即调度一次任务执行
    pub async fn schedule_task(&self, task_id: &str) -> SchedulerResult<Uuid> {
        let tasks = self.inner.tasks.read().await;
        let registered = tasks
            .get(task_id)
            .ok_or_else(|| SchedulerError::task_not_found(task_id))?;

        let execution = TaskExecution::new(&registered.definition, Utc::now());
        let execution_id = self.inner.state.lock().await.enqueue_new(execution);
        drop(tasks);

        counter!("scheduler_tasks_scheduled_total").increment(1);
        debug!("任务 {} 已入队，执行ID: {}", task_id, execution_id);
        self.inner.notify.notify_one();
        Ok(execution_id)
    }

    /// 按CRON表达式展开未来的执行时间并逐一入队
    pub async fn schedule_cron_task(
        &self,
        task_id: &str,
        cron_expression: &str,
    ) -> SchedulerResult<Vec<Uuid>> {
        let tasks = self.inner.tasks.read().await;
        let registered = tasks
            .get(task_id)
            .ok_or_else(|| SchedulerError::task_not_found(task_id))?;

        let times = self.inner.cron.upcoming(
            cron_expression,
            Utc::now(),
            self.inner.config.cron_lookahead,
        )?;

        let execution_ids: Vec<Uuid> = {
            let mut state = self.inner.state.lock().await;
            times
                .into_iter()
                .map(|time| state.enqueue_new(TaskExecution::new(&registered.definition, time)))
                .collect()
        };
        drop(tasks);

        counter!("scheduler_tasks_scheduled_total").increment(execution_ids.len() as u64);
        info!(
            "任务 {} 按CRON表达式 '{}' 调度了 {} 次执行",
            task_id,
            cron_expression,
            execution_ids.len()
        );
        self.inner.notify.notify_one();
        Ok(execution_ids)
    }

    /// 取消尚未开始运行的执行
    ///
    /// 排队中或已出队但仍在等待分布式锁的执行都可以取消，后者在拿到锁后
    /// 直接释放而不运行。运行中的执行不可取消。
    pub async fn cancel_task(&self, execution_id: &Uuid) -> bool {
        let mut state = self.inner.state.lock().await;
        if state.queue.remove_execution(execution_id).is_some() {
            state.not_before.remove(execution_id);
            state.table.mark_cancelled(execution_id);
            info!("已取消执行: {}", execution_id);
            return true;
        }
        if state.claimed.remove(execution_id) {
            state.table.mark_cancelled(execution_id);
            info!("已取消等待锁的执行: {}", execution_id);
            return true;
        }

        match state.table.executions.get(execution_id).map(|e| e.status) {
            Some(TaskStatus::Running) => {
                warn!("执行 {} 正在运行，不支持取消运行中的任务", execution_id);
            }
            Some(status) => {
                debug!("执行 {} 当前状态为 {:?}，无法取消", execution_id, status);
            }
            None => {
                debug!("执行 {} 不存在", execution_id);
            }
        }
        false
    }

    pub async fn get_task_status(&self, execution_id: &Uuid) -> Option<TaskExecution> {
        self.inner
            .state
            .lock()
            .await
            .table
            .executions
            .get(execution_id)
            .cloned()
    }

    /// 任务的执行历史，按创建时间从早到晚
    pub async fn get_task_executions(&self, task_id: &str) -> Vec<TaskExecution> {
        let state = self.inner.state.lock().await;
        state
            .table
            .history
            .get(task_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| state.table.executions.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub async fn get_latest_execution(&self, task_id: &str) -> Option<TaskExecution> {
        self.inner.state.lock().await.table.latest(task_id).cloned()
    }

    pub async fn get_health_status(&self) -> HealthStatus {
        self.inner.health.get_health_status().await
    }

    pub fn health_monitor(&self) -> &SchedulerHealthMonitor {
        &self.inner.health
    }

    pub fn retry_manager(&self) -> &TaskRetryManager {
        &self.inner.retry_manager
    }

    pub async fn queue_size(&self) -> usize {
        self.inner.state.lock().await.queue.size(None)
    }

    pub async fn running_tasks(&self) -> Vec<TaskExecution> {
        self.inner
            .state
            .lock()
            .await
            .table
            .executions
            .values()
            .filter(|e| e.status == TaskStatus::Running)
            .cloned()
            .collect()
    }

    pub async fn registered_tasks(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.tasks.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn topological_order(&self) -> Vec<String> {
        self.inner.state.lock().await.graph.topological_sort()
    }

    /// 清理已结束的执行记录，返回清理数量
    pub async fn prune_finished_executions(&self) -> usize {
        let pruned = self.inner.state.lock().await.table.prune_finished();
        debug!("清理已结束的执行记录 {} 条", pruned);
        pruned
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// 启动协调循环
    pub async fn start(&self) -> SchedulerResult<()> {
        let mut coordinator = self.coordinator.lock().await;
        if coordinator.is_some() {
            return Err(SchedulerError::AlreadyRunning);
        }

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move { inner.run_coordinator(shutdown_rx).await });

        *coordinator = Some(Coordinator {
            handle,
            shutdown_tx,
        });
        self.inner.running.store(true, Ordering::SeqCst);
        info!(
            "调度器已启动，最大并发数: {}",
            self.inner.config.max_concurrent_tasks
        );
        Ok(())
    }

    /// 停止协调循环，并在超时内等待运行中的任务结束
    pub async fn stop(&self) -> SchedulerResult<()> {
        let Some(coordinator) = self.coordinator.lock().await.take() else {
            return Err(SchedulerError::NotRunning);
        };

        info!("正在停止调度器");
        let _ = coordinator.shutdown_tx.send(());
        if let Err(e) = coordinator.handle.await {
            error!("协调循环异常退出: {}", e);
        }
        self.inner.running.store(false, Ordering::SeqCst);

        let permits = u32::try_from(self.inner.config.max_concurrent_tasks.max(1))
            .unwrap_or(u32::MAX);
        let timeout = self.inner.config.shutdown_timeout();
        match tokio::time::timeout(timeout, self.inner.workers.acquire_many(permits)).await {
            Ok(Ok(_permits)) => {
                info!("调度器已停止");
                Ok(())
            }
            Ok(Err(e)) => Err(SchedulerError::Internal(e.to_string())),
            Err(_) => {
                warn!("等待运行中的任务超时 ({:?})", timeout);
                Err(SchedulerError::Timeout(format!(
                    "等待运行中的任务超过 {} 秒",
                    timeout.as_secs()
                )))
            }
        }
    }
}

impl SchedulerInner {
    async fn run_coordinator(self: Arc<Self>, mut shutdown_rx: broadcast::Receiver<()>) {
        info!("协调循环启动");
        loop {
            let permit = tokio::select! {
                _ = shutdown_rx.recv() => break,
                permit = Arc::clone(&self.workers).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            match self.next_ready_execution().await {
                Some((execution, registered)) => {
                    let worker = Arc::clone(&self);
                    tokio::spawn(async move {
                        worker.run_execution(execution, registered).await;
                        drop(permit);
                    });
                }
                None => {
                    drop(permit);
                    tokio::select! {
                        _ = shutdown_rx.recv() => break,
                        _ = self.notify.notified() => {}
                        _ = tokio::time::sleep(self.config.poll_interval()) => {}
                    }
                }
            }
        }
        info!("协调循环已退出");
    }

    /// 取出第一个已到期、不在退避期且依赖全部完成的执行
    async fn next_ready_execution(&self) -> Option<(TaskExecution, RegisteredTask)> {
        let tasks = self.tasks.read().await;
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let now = Utc::now();

        let graph = &state.graph;
        let table = &state.table;
        let not_before = &state.not_before;
        let execution = state.queue.pop_first_matching(|execution| {
            if !execution.is_due(now) || !tasks.contains_key(&execution.task_id) {
                return false;
            }
            if not_before
                .get(&execution.execution_id)
                .is_some_and(|until| *until > now)
            {
                return false;
            }
            match table.blocking_dependency(graph, &execution.task_id) {
                Some(dependency) => {
                    debug!(
                        "执行 {} 等待前置任务 {} 完成",
                        execution.execution_id, dependency
                    );
                    false
                }
                None => true,
            }
        })?;

        state.not_before.remove(&execution.execution_id);
        state.claimed.insert(execution.execution_id);
        let registered = tasks.get(&execution.task_id)?.clone();
        Some((execution, registered))
    }

    async fn run_execution(self: Arc<Self>, mut execution: TaskExecution, registered: RegisteredTask) {
        let task_id = execution.task_id.clone();

        let lock_id = match self
            .lock
            .acquire(
                &task_id,
                self.config.lock_timeout(),
                self.config.lock_max_wait(),
            )
            .await
        {
            Some(lock_id) => {
                self.health.record_lock_acquisition(true).await;
                lock_id
            }
            None => {
                self.health.record_lock_acquisition(false).await;
                warn!(
                    "任务 {} 获取锁失败，{:?} 后重新尝试执行 {}",
                    task_id,
                    self.config.poll_interval(),
                    execution.execution_id
                );
                self.defer(execution).await;
                return;
            }
        };

        let cancelled = {
            let mut state = self.state.lock().await;
            if state.claimed.remove(&execution.execution_id) {
                execution.mark_running();
                state.table.update(&execution);
                false
            } else {
                true
            }
        };
        if cancelled {
            self.lock.release(&task_id, &lock_id).await;
            info!("执行 {} 在等待锁期间已被取消，不再运行", execution.execution_id);
            self.notify.notify_one();
            return;
        }

        info!(
            "开始执行任务: {} (执行ID: {}, 重试次数: {})",
            task_id, execution.execution_id, execution.retry_count
        );

        let context = JobContext {
            execution_id: execution.execution_id,
            task_id: task_id.clone(),
            task_name: execution.task_name.clone(),
            retry_count: execution.retry_count,
            parameters: registered.definition.parameters.clone(),
        };

        let started = Instant::now();
        let outcome = AssertUnwindSafe(registered.job.execute(context))
            .catch_unwind()
            .await;
        let elapsed = started.elapsed();

        self.lock.release(&task_id, &lock_id).await;

        match outcome {
            Ok(Ok(())) => execution.mark_completed(),
            Ok(Err(e)) => execution.mark_failed(e.to_string()),
            Err(panic) => {
                execution.mark_failed(format!("任务函数panic: {}", panic_message(&*panic)))
            }
        }

        self.state.lock().await.table.update(&execution);
        self.health.record_execution(&execution, elapsed).await;

        if execution.status == TaskStatus::Failed {
            error!(
                "任务 {} 执行失败 (执行ID: {}): {}",
                task_id,
                execution.execution_id,
                execution.error.as_deref().unwrap_or_default()
            );
            self.schedule_retry(&execution, &registered.definition);
        } else {
            info!(
                "任务 {} 执行成功 (执行ID: {}, 耗时: {}ms)",
                task_id,
                execution.execution_id,
                elapsed.as_millis()
            );
        }

        self.notify.notify_one();
    }

    fn schedule_retry(self: &Arc<Self>, execution: &TaskExecution, definition: &TaskDefinition) {
        let config = &definition.retry_config;
        if !self.retry_manager.should_retry(execution, config) {
            warn!(
                "任务 {} 不再重试，执行 {} 保持失败状态",
                execution.task_id, execution.execution_id
            );
            return;
        }

        let delay = self.retry_manager.calculate_delay(execution, config);
        let total = self.retry_manager.record_retry(&execution.task_id);
        counter!("scheduler_task_retries_total").increment(1);
        info!(
            "任务 {} 将在 {:.3} 秒后重试 (第 {} 次, 累计 {} 次)",
            execution.task_id,
            delay.as_secs_f64(),
            execution.retry_count + 1,
            total
        );

        let inner = Arc::clone(self);
        let failed = execution.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            inner.enqueue_retry(failed).await;
        });
    }

    async fn enqueue_retry(&self, failed: TaskExecution) {
        let tasks = self.tasks.read().await;
        if !tasks.contains_key(&failed.task_id) {
            debug!("任务 {} 已注销，放弃重试", failed.task_id);
            return;
        }

        let retry = failed.retry_of(Utc::now());
        let execution_id = self.state.lock().await.enqueue_new(retry);
        drop(tasks);

        debug!(
            "任务 {} 的重试执行已入队: {} (来源: {})",
            failed.task_id, execution_id, failed.execution_id
        );
        self.notify.notify_one();
    }

    /// 获取锁失败的执行按轮询间隔退避后重新入队
    async fn defer(&self, execution: TaskExecution) {
        let tasks = self.tasks.read().await;
        let mut state = self.state.lock().await;

        if !state.claimed.remove(&execution.execution_id) {
            debug!("执行 {} 已被取消，不再重新入队", execution.execution_id);
            return;
        }
        if !tasks.contains_key(&execution.task_id) {
            state.table.mark_cancelled(&execution.execution_id);
            return;
        }

        let backoff = chrono::Duration::from_std(self.config.poll_interval())
            .unwrap_or_else(|_| chrono::Duration::zero());
        state
            .not_before
            .insert(execution.execution_id, Utc::now() + backoff);
        state.queue.enqueue(execution);
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "未知panic".to_string()
    }
}
