use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use scheduler_core::models::{TaskExecution, TaskPriority};

/// 堆中的队列项
///
/// 排序键为 `(priority, Reverse(scheduled_time), Reverse(sequence))`：
/// 优先级高者先出，同优先级按计划时间，再按入队顺序。
#[derive(Debug, Clone)]
struct QueueEntry {
    priority: TaskPriority,
    scheduled_time: DateTime<Utc>,
    sequence: u64,
    execution: TaskExecution,
}

impl QueueEntry {
    fn key(&self) -> (TaskPriority, Reverse<DateTime<Utc>>, Reverse<u64>) {
        (
            self.priority,
            Reverse(self.scheduled_time),
            Reverse(self.sequence),
        )
    }
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.sequence == other.sequence
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

/// 优先级任务队列
#[derive(Debug, Default)]
pub struct PriorityTaskQueue {
    heap: BinaryHeap<QueueEntry>,
    next_sequence: u64,
}

impl PriorityTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, execution: TaskExecution) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.heap.push(QueueEntry {
            priority: execution.priority,
            scheduled_time: execution.scheduled_time,
            sequence,
            execution,
        });
    }

    pub fn dequeue(&mut self) -> Option<TaskExecution> {
        self.heap.pop().map(|entry| entry.execution)
    }

    pub fn peek(&self) -> Option<&TaskExecution> {
        self.heap.peek().map(|entry| &entry.execution)
    }

    /// 按出队顺序取出第一个满足条件的执行实例，跳过的实例保持原有次序
    pub fn pop_first_matching<F>(&mut self, mut predicate: F) -> Option<TaskExecution>
    where
        F: FnMut(&TaskExecution) -> bool,
    {
        let mut skipped = Vec::new();
        let mut found = None;
        while let Some(entry) = self.heap.pop() {
            if predicate(&entry.execution) {
                found = Some(entry.execution);
                break;
            }
            skipped.push(entry);
        }
        self.heap.extend(skipped);
        found
    }

    /// 移除出队顺序上第一个属于 `task_id` 的执行实例
    pub fn remove(&mut self, task_id: &str) -> bool {
        let target = self
            .heap
            .iter()
            .filter(|entry| entry.execution.task_id == task_id)
            .max()
            .map(|entry| entry.sequence);

        match target {
            Some(sequence) => {
                self.heap.retain(|entry| entry.sequence != sequence);
                true
            }
            None => false,
        }
    }

    pub fn remove_execution(&mut self, execution_id: &Uuid) -> Option<TaskExecution> {
        let sequence = self
            .heap
            .iter()
            .find(|entry| &entry.execution.execution_id == execution_id)?
            .sequence;

        let mut removed = None;
        self.heap.retain(|entry| {
            if entry.sequence == sequence {
                removed = Some(entry.execution.clone());
                false
            } else {
                true
            }
        });
        removed
    }

    /// 移除某任务的全部排队实例，按出队顺序返回
    pub fn remove_all(&mut self, task_id: &str) -> Vec<TaskExecution> {
        let mut removed = Vec::new();
        self.heap.retain(|entry| {
            if entry.execution.task_id == task_id {
                removed.push(entry.clone());
                false
            } else {
                true
            }
        });
        removed.sort_by(|a, b| b.cmp(a));
        removed.into_iter().map(|entry| entry.execution).collect()
    }

    pub fn contains_execution(&self, execution_id: &Uuid) -> bool {
        self.heap
            .iter()
            .any(|entry| &entry.execution.execution_id == execution_id)
    }

    pub fn size(&self, priority: Option<TaskPriority>) -> usize {
        match priority {
            Some(priority) => self
                .heap
                .iter()
                .filter(|entry| entry.priority == priority)
                .count(),
            None => self.heap.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
