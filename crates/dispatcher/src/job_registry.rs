use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};

use scheduler_core::traits::JobFunction;

/// 任务函数注册表，按 `func_reference` 解析任务函数
#[derive(Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<String, Arc<dyn JobFunction>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册任务函数，同名函数会被覆盖
    pub async fn register(&self, func_reference: impl Into<String>, job: Arc<dyn JobFunction>) {
        let func_reference = func_reference.into();
        let mut jobs = self.jobs.write().await;
        if jobs.insert(func_reference.clone(), job).is_some() {
            info!("任务函数 {} 已被覆盖", func_reference);
        } else {
            debug!("注册任务函数: {}", func_reference);
        }
    }

    pub async fn unregister(&self, func_reference: &str) -> bool {
        self.jobs.write().await.remove(func_reference).is_some()
    }

    pub async fn get(&self, func_reference: &str) -> Option<Arc<dyn JobFunction>> {
        self.jobs.read().await.get(func_reference).cloned()
    }

    pub async fn contains(&self, func_reference: &str) -> bool {
        self.jobs.read().await.contains_key(func_reference)
    }

    /// 已注册的函数名，按字母序
    pub async fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.jobs.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn count(&self) -> usize {
        self.jobs.read().await.len()
    }
}
