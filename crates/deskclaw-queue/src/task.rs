//! Task records — the data model for queued work.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What kind of work a task carries. Closed set — unknown work goes through
/// `Custom` with a self-describing payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    LlmQuery,
    ToolExecution,
    TtsPlayback,
    Notification,
    WorkflowStep,
    Custom,
}

/// Scheduling priority. Declaration order is the sort order: urgent first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Urgent,
    High,
    Normal,
    Low,
}

/// Task lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Assigned,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// Completed, Failed, and Cancelled absorb — no transitions out.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

/// A unit of work in the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique task ID.
    pub id: String,
    pub kind: TaskKind,
    /// Opaque JSON payload, stored raw and parsed lazily via
    /// [`Task::payload_json`].
    pub payload: String,
    /// Capability tags a worker must advertise to run this task.
    /// Empty = any worker qualifies. Matching is exact and case-sensitive.
    #[serde(default)]
    pub required_capabilities: BTreeSet<String>,
    #[serde(default = "default_priority")]
    pub priority: TaskPriority,
    pub status: TaskStatus,
    /// Set iff status is Assigned or Running.
    #[serde(default)]
    pub assigned_device: Option<String>,
    #[serde(default)]
    pub result: Option<String>,
    /// Most recent failure message; retained across retries for diagnostics.
    #[serde(default)]
    pub error: Option<String>,
    /// Absolute instant after which an unfinished task is failed.
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
    /// Failures so far; monotone, capped by the queue's retry policy.
    #[serde(default)]
    pub retry_count: u32,
    /// Retry backoff gate — the task is not claimable before this instant.
    #[serde(default)]
    pub not_before: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_priority() -> TaskPriority {
    TaskPriority::Normal
}

impl Task {
    /// Create a new pending task.
    pub fn new(
        kind: TaskKind,
        payload: impl Into<String>,
        required_capabilities: BTreeSet<String>,
        priority: TaskPriority,
        deadline: Option<DateTime<Utc>>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            payload: payload.into(),
            required_capabilities,
            priority,
            status: TaskStatus::Pending,
            assigned_device: None,
            result: None,
            error: None,
            deadline,
            retry_count: 0,
            not_before: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Parse the payload defensively: anything that is not a JSON object
    /// (including invalid JSON) yields an empty object, never an error.
    pub fn payload_json(&self) -> serde_json::Map<String, serde_json::Value> {
        match serde_json::from_str::<serde_json::Value>(&self.payload) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        }
    }

    /// Whether a worker advertising `capabilities` may run this task
    /// (required set ⊆ advertised set).
    pub fn eligible_for(&self, capabilities: &BTreeSet<String>) -> bool {
        self.required_capabilities.is_subset(capabilities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(tags: &[&str]) -> BTreeSet<String> {
        tags.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_priority_order_urgent_first() {
        assert!(TaskPriority::Urgent < TaskPriority::High);
        assert!(TaskPriority::High < TaskPriority::Normal);
        assert!(TaskPriority::Normal < TaskPriority::Low);
    }

    #[test]
    fn test_terminal_states() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Assigned.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
    }

    #[test]
    fn test_payload_parsed_defensively() {
        let mut task = Task::new(
            TaskKind::LlmQuery,
            r#"{"query": "weather"}"#,
            BTreeSet::new(),
            TaskPriority::Normal,
            None,
        );
        assert_eq!(task.payload_json()["query"], "weather");

        task.payload = "{broken".into();
        assert!(task.payload_json().is_empty());

        task.payload = "[1, 2, 3]".into(); // valid JSON, not an object
        assert!(task.payload_json().is_empty());
    }

    #[test]
    fn test_capability_matching() {
        let task = Task::new(
            TaskKind::TtsPlayback,
            "{}",
            caps(&["tts", "audio"]),
            TaskPriority::Normal,
            None,
        );
        assert!(task.eligible_for(&caps(&["tts", "audio", "llm"])));
        assert!(!task.eligible_for(&caps(&["tts"])));
        assert!(!task.eligible_for(&caps(&["TTS", "audio"]))); // case-sensitive

        let open = Task::new(TaskKind::Notification, "{}", caps(&[]), TaskPriority::Low, None);
        assert!(open.eligible_for(&caps(&[]))); // empty requirements match anyone
    }

    #[test]
    fn test_minimal_record_decodes_with_defaults() {
        let json = r#"{
            "id": "t1",
            "kind": "llm_query",
            "payload": "{}",
            "status": "pending",
            "created_at": "2026-01-01T00:00:00Z",
            "updated_at": "2026-01-01T00:00:00Z"
        }"#;
        let task: Task = serde_json::from_str(json).unwrap();
        assert_eq!(task.priority, TaskPriority::Normal);
        assert_eq!(task.retry_count, 0);
        assert!(task.required_capabilities.is_empty());
    }
}
