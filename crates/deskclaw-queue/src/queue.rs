//! The task queue — assignment, lifecycle transitions, retries, deadlines.
//!
//! Single-writer: every operation locks the one state mutex, does its
//! bookkeeping, and releases. Nothing here awaits external work while
//! holding the lock; two concurrent `claim_next` calls can never hand out
//! the same task.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

use crate::store::QueueStore;
use crate::task::{Task, TaskKind, TaskPriority, TaskStatus};

/// Failure policy: how many failures a task survives, and how long a failed
/// task waits before it may be claimed again. `backoff: None` means
/// immediate redelivery.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: None,
        }
    }
}

/// Counts by status, for the dashboard and logs.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct QueueStats {
    pub pending: usize,
    pub assigned: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

struct QueueState {
    tasks: HashMap<String, Task>,
    store: Option<QueueStore>,
}

impl QueueState {
    fn snapshot(&self) {
        if let Some(store) = &self.store {
            let mut tasks: Vec<&Task> = self.tasks.values().collect();
            tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
            store.save(&tasks);
        }
    }
}

/// Capability-aware task queue.
///
/// Construct one per process and share it by `Arc` — no global instance,
/// so tests run isolated queues.
pub struct TaskQueue {
    state: Mutex<QueueState>,
    policy: RetryPolicy,
}

impl TaskQueue {
    /// In-memory queue (no persistence).
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            state: Mutex::new(QueueState {
                tasks: HashMap::new(),
                store: None,
            }),
            policy,
        }
    }

    /// Queue backed by a snapshot file; existing tasks are loaded at open.
    pub fn with_store(policy: RetryPolicy, store: QueueStore) -> Self {
        let tasks = store
            .load()
            .into_iter()
            .map(|t| (t.id.clone(), t))
            .collect();
        Self {
            state: Mutex::new(QueueState {
                tasks,
                store: Some(store),
            }),
            policy,
        }
    }

    /// Add a new pending task.
    pub async fn enqueue(
        &self,
        kind: TaskKind,
        payload: impl Into<String>,
        required_capabilities: BTreeSet<String>,
        priority: TaskPriority,
        deadline: Option<DateTime<Utc>>,
    ) -> Task {
        let task = Task::new(kind, payload, required_capabilities, priority, deadline);
        let mut state = self.state.lock().await;
        tracing::debug!("📥 Task enqueued: {} ({:?}, {:?})", task.id, task.kind, task.priority);
        state.tasks.insert(task.id.clone(), task.clone());
        state.snapshot();
        task
    }

    /// Push-assign a specific pending task to a device. Fails (false) when
    /// the task is missing, not pending, or the device lacks a required
    /// capability.
    pub async fn assign(&self, id: &str, device: &str, capabilities: &BTreeSet<String>) -> bool {
        let mut state = self.state.lock().await;
        let Some(task) = state.tasks.get_mut(id) else {
            return false;
        };
        if task.status != TaskStatus::Pending || !task.eligible_for(capabilities) {
            return false;
        }
        task.status = TaskStatus::Assigned;
        task.assigned_device = Some(device.to_string());
        task.updated_at = Utc::now();
        tracing::debug!("🤝 Task {} assigned to {device}", task.id);
        state.snapshot();
        true
    }

    /// Worker-initiated pull: claim the best eligible pending task —
    /// highest priority first, FIFO within a priority band. Atomic under
    /// the queue mutex, so concurrent claimers never receive the same task.
    pub async fn claim_next(&self, device: &str, capabilities: &BTreeSet<String>) -> Option<Task> {
        let now = Utc::now();
        let mut state = self.state.lock().await;

        let best = state
            .tasks
            .values()
            .filter(|t| {
                t.status == TaskStatus::Pending
                    && t.eligible_for(capabilities)
                    && t.not_before.is_none_or(|gate| gate <= now)
            })
            .min_by(|a, b| {
                a.priority
                    .cmp(&b.priority)
                    .then(a.created_at.cmp(&b.created_at))
                    .then(a.id.cmp(&b.id))
            })
            .map(|t| t.id.clone())?;

        let task = state.tasks.get_mut(&best)?;
        task.status = TaskStatus::Assigned;
        task.assigned_device = Some(device.to_string());
        task.updated_at = now;
        let claimed = task.clone();
        tracing::debug!("🎟️ Task {} claimed by {device}", claimed.id);
        state.snapshot();
        Some(claimed)
    }

    /// Report that work has started. Legal from Assigned only; when a
    /// device id is given it must match the assignee.
    pub async fn mark_running(&self, id: &str, device: Option<&str>) -> bool {
        let mut state = self.state.lock().await;
        let Some(task) = state.tasks.get_mut(id) else {
            return false;
        };
        if task.status != TaskStatus::Assigned {
            return false;
        }
        if let Some(device) = device
            && task.assigned_device.as_deref() != Some(device)
        {
            return false;
        }
        task.status = TaskStatus::Running;
        task.updated_at = Utc::now();
        state.snapshot();
        true
    }

    /// Report success. Legal from Assigned or Running (workers may skip the
    /// running report).
    pub async fn mark_completed(&self, id: &str, result: &str) -> bool {
        let mut state = self.state.lock().await;
        let Some(task) = state.tasks.get_mut(id) else {
            return false;
        };
        if !matches!(task.status, TaskStatus::Assigned | TaskStatus::Running) {
            return false;
        }
        task.status = TaskStatus::Completed;
        task.result = Some(result.to_string());
        task.assigned_device = None;
        task.updated_at = Utc::now();
        tracing::debug!("✅ Task {} completed", task.id);
        state.snapshot();
        true
    }

    /// Report failure. Legal from Assigned or Running. The task goes back
    /// to Pending until retries are exhausted, then Failed permanently.
    pub async fn mark_failed(&self, id: &str, error: &str) -> bool {
        let mut state = self.state.lock().await;
        let Some(task) = state.tasks.get_mut(id) else {
            return false;
        };
        if !matches!(task.status, TaskStatus::Assigned | TaskStatus::Running) {
            return false;
        }
        fail_or_retry(task, error, &self.policy, Utc::now());
        state.snapshot();
        true
    }

    /// Cancel a task. Legal from Pending/Assigned/Running; false once
    /// terminal. Bookkeeping only — in-flight external work is not
    /// interrupted, the executor owns that.
    pub async fn cancel(&self, id: &str) -> bool {
        let mut state = self.state.lock().await;
        let Some(task) = state.tasks.get_mut(id) else {
            return false;
        };
        if task.status.is_terminal() {
            return false;
        }
        task.status = TaskStatus::Cancelled;
        task.assigned_device = None;
        task.updated_at = Utc::now();
        tracing::debug!("🚫 Task {} cancelled", task.id);
        state.snapshot();
        true
    }

    /// Sweep non-terminal tasks whose deadline has passed. Each one is
    /// treated exactly like a failure ("deadline exceeded"), going through
    /// the same retry-or-fail path. Returns how many were swept.
    pub async fn check_deadlines(&self, now: DateTime<Utc>) -> usize {
        let mut state = self.state.lock().await;
        let mut swept = 0;
        for task in state.tasks.values_mut() {
            if task.status.is_terminal() {
                continue;
            }
            if task.deadline.is_some_and(|deadline| deadline < now) {
                tracing::warn!("⏱️ Task {} exceeded its deadline", task.id);
                fail_or_retry(task, "deadline exceeded", &self.policy, now);
                swept += 1;
            }
        }
        if swept > 0 {
            state.snapshot();
        }
        swept
    }

    /// Remove terminal tasks untouched for longer than `older_than`.
    /// Pending/assigned/running tasks are never removed by age — only an
    /// explicit cancel or completion makes them eligible. Returns how many
    /// were removed.
    pub async fn cleanup(&self, older_than: Duration, now: DateTime<Utc>) -> usize {
        let mut state = self.state.lock().await;
        let cutoff = now - older_than;
        let before = state.tasks.len();
        state
            .tasks
            .retain(|_, task| !(task.status.is_terminal() && task.updated_at < cutoff));
        let removed = before - state.tasks.len();
        if removed > 0 {
            tracing::debug!("🧹 Cleaned up {removed} finished tasks");
            state.snapshot();
        }
        removed
    }

    /// Look up one task.
    pub async fn get(&self, id: &str) -> Option<Task> {
        self.state.lock().await.tasks.get(id).cloned()
    }

    /// All tasks, oldest first.
    pub async fn list(&self) -> Vec<Task> {
        let state = self.state.lock().await;
        let mut tasks: Vec<Task> = state.tasks.values().cloned().collect();
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        tasks
    }

    /// Counts by status.
    pub async fn stats(&self) -> QueueStats {
        let state = self.state.lock().await;
        let mut stats = QueueStats::default();
        for task in state.tasks.values() {
            match task.status {
                TaskStatus::Pending => stats.pending += 1,
                TaskStatus::Assigned => stats.assigned += 1,
                TaskStatus::Running => stats.running += 1,
                TaskStatus::Completed => stats.completed += 1,
                TaskStatus::Failed => stats.failed += 1,
                TaskStatus::Cancelled => stats.cancelled += 1,
            }
        }
        stats
    }
}

/// Shared failure path for `mark_failed` and deadline expiry: bump the
/// retry count, then either requeue (device cleared, error retained, backoff
/// gate set) or fail permanently once retries are exhausted.
fn fail_or_retry(task: &mut Task, error: &str, policy: &RetryPolicy, now: DateTime<Utc>) {
    task.retry_count += 1;
    task.error = Some(error.to_string());
    task.assigned_device = None;
    task.updated_at = now;

    if task.retry_count < policy.max_retries {
        task.status = TaskStatus::Pending;
        task.not_before = policy.backoff.map(|delay| now + delay);
        tracing::debug!(
            "🔁 Task {} requeued (attempt {}/{})",
            task.id,
            task.retry_count,
            policy.max_retries
        );
    } else {
        task.status = TaskStatus::Failed;
        tracing::warn!("❌ Task {} failed permanently: {error}", task.id);
    }
}
