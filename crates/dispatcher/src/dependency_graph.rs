use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use tracing::{debug, warn};

use scheduler_core::{models::TaskDependency, SchedulerError, SchedulerResult};

/// 任务依赖图
///
/// 始终保持无环：`add_task` 在提交前检测环路，检测失败时图保持不变。
/// 被引用但尚未注册的前置任务作为隐式节点存在。
#[derive(Debug, Default)]
pub struct TaskDependencyGraph {
    /// 节点插入顺序，用于拓扑排序的稳定输出
    order: Vec<String>,
    dependencies: HashMap<String, Vec<TaskDependency>>,
    dependents: HashMap<String, BTreeSet<String>>,
    /// 通过 `add_task` 显式加入的节点，其余为隐式节点
    explicit: HashSet<String>,
}

impl TaskDependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加任务及其依赖边，已存在的节点会整体替换其依赖边
    pub fn add_task(
        &mut self,
        task_id: &str,
        dependencies: &[TaskDependency],
    ) -> SchedulerResult<()> {
        let mut edges: Vec<TaskDependency> = Vec::with_capacity(dependencies.len());
        for dependency in dependencies {
            if !edges.iter().any(|d| d.task_id == dependency.task_id) {
                edges.push(dependency.clone());
            }
        }

        if edges.iter().any(|d| d.task_id == task_id) {
            warn!("任务 {} 依赖自身", task_id);
            return Err(SchedulerError::circular_dependency(task_id));
        }

        // 新边 task_id -> dep 成环，当且仅当 dep 可沿现有依赖边到达 task_id
        for dependency in &edges {
            if self.reaches(&dependency.task_id, task_id) {
                warn!(
                    "添加依赖 {} -> {} 将形成循环依赖",
                    task_id, dependency.task_id
                );
                return Err(SchedulerError::circular_dependency(task_id));
            }
        }

        self.ensure_node(task_id);
        if let Some(previous) = self.dependencies.remove(task_id) {
            for old in previous {
                if let Some(set) = self.dependents.get_mut(&old.task_id) {
                    set.remove(task_id);
                }
            }
        }

        for dependency in &edges {
            self.ensure_node(&dependency.task_id);
            self.dependents
                .entry(dependency.task_id.clone())
                .or_default()
                .insert(task_id.to_string());
        }

        self.explicit.insert(task_id.to_string());
        debug!("任务 {} 加入依赖图，依赖数量: {}", task_id, edges.len());
        self.dependencies.insert(task_id.to_string(), edges);
        Ok(())
    }

    pub fn get_dependencies(&self, task_id: &str) -> BTreeSet<String> {
        self.dependencies
            .get(task_id)
            .map(|edges| edges.iter().map(|d| d.task_id.clone()).collect())
            .unwrap_or_default()
    }

    pub fn get_dependency_edges(&self, task_id: &str) -> Vec<TaskDependency> {
        self.dependencies.get(task_id).cloned().unwrap_or_default()
    }

    pub fn get_dependents(&self, task_id: &str) -> BTreeSet<String> {
        self.dependents.get(task_id).cloned().unwrap_or_default()
    }

    /// 获取全部直接与间接前置任务
    pub fn get_transitive_dependencies(&self, task_id: &str) -> BTreeSet<String> {
        let mut result = BTreeSet::new();
        let mut queue: VecDeque<String> = self.get_dependencies(task_id).into_iter().collect();

        while let Some(current) = queue.pop_front() {
            if result.insert(current.clone()) {
                queue.extend(self.get_dependencies(&current));
            }
        }
        result
    }

    /// Kahn算法，同层按节点插入顺序输出
    pub fn topological_sort(&self) -> Vec<String> {
        let index: HashMap<&str, usize> = self
            .order
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();

        let mut in_degree: Vec<usize> = self
            .order
            .iter()
            .map(|id| self.dependencies.get(id).map_or(0, |edges| edges.len()))
            .collect();

        let mut ready: BTreeSet<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, degree)| **degree == 0)
            .map(|(i, _)| i)
            .collect();

        let mut sorted = Vec::with_capacity(self.order.len());
        while let Some(current) = ready.pop_first() {
            let task_id = &self.order[current];
            sorted.push(task_id.clone());

            for dependent in self.get_dependents(task_id) {
                if let Some(&i) = index.get(dependent.as_str()) {
                    in_degree[i] -= 1;
                    if in_degree[i] == 0 {
                        ready.insert(i);
                    }
                }
            }
        }
        sorted
    }

    /// 撤下显式节点：删除其依赖边，仍被其他任务依赖时保留为隐式节点
    ///
    /// 之后重新 `add_task` 同一节点时，依赖它的任务的边依然有效。
    /// 不再被引用的隐式节点一并清除。
    pub fn detach_task(&mut self, task_id: &str) -> bool {
        if !self.explicit.remove(task_id) {
            return false;
        }

        let previous = self.dependencies.get_mut(task_id).map(std::mem::take);
        let mut candidates = vec![task_id.to_string()];
        for edge in previous.unwrap_or_default() {
            if let Some(set) = self.dependents.get_mut(&edge.task_id) {
                set.remove(task_id);
            }
            candidates.push(edge.task_id);
        }

        for candidate in candidates {
            let referenced = self
                .dependents
                .get(&candidate)
                .is_some_and(|set| !set.is_empty());
            if !referenced && !self.explicit.contains(&candidate) {
                self.remove_task(&candidate);
            }
        }

        debug!("任务 {} 已从依赖图撤下", task_id);
        true
    }

    pub fn is_explicit(&self, task_id: &str) -> bool {
        self.explicit.contains(task_id)
    }

    /// 删除节点及其双向的所有边
    pub fn remove_task(&mut self, task_id: &str) -> bool {
        let Some(position) = self.order.iter().position(|id| id == task_id) else {
            return false;
        };
        self.order.remove(position);
        self.explicit.remove(task_id);

        if let Some(edges) = self.dependencies.remove(task_id) {
            for edge in edges {
                if let Some(set) = self.dependents.get_mut(&edge.task_id) {
                    set.remove(task_id);
                }
            }
        }

        if let Some(dependents) = self.dependents.remove(task_id) {
            for dependent in dependents {
                if let Some(edges) = self.dependencies.get_mut(&dependent) {
                    edges.retain(|d| d.task_id != task_id);
                }
            }
        }

        debug!("任务 {} 已从依赖图移除", task_id);
        true
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.dependencies.contains_key(task_id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    fn ensure_node(&mut self, task_id: &str) {
        if !self.dependencies.contains_key(task_id) {
            self.order.push(task_id.to_string());
            self.dependencies.insert(task_id.to_string(), Vec::new());
        }
    }

    /// 从 `from` 出发沿依赖边能否到达 `target`
    fn reaches(&self, from: &str, target: &str) -> bool {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut stack = vec![from];

        while let Some(current) = stack.pop() {
            if current == target {
                return true;
            }
            if !visited.insert(current) {
                continue;
            }
            if let Some(edges) = self.dependencies.get(current) {
                stack.extend(edges.iter().map(|d| d.task_id.as_str()));
            }
        }
        false
    }
}
