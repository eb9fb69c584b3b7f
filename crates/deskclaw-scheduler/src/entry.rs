//! Schedule records — the data model for recurring prompts.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A recurring trigger bound to a prompt and a target agent.
///
/// The cron expression is stored as the original string (not the parsed
/// form) so records survive serialization changes. Optional fields carry
/// `#[serde(default)]` so records written by older builds still decode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleEntry {
    /// Unique schedule ID.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Optional icon shown by the UI.
    #[serde(default)]
    pub icon: Option<String>,
    /// Cron expression text, e.g. "0 9 * * *".
    pub cron: String,
    /// Prompt delivered to the executor when the schedule fires.
    pub prompt: String,
    /// Which agent executes the prompt.
    pub agent_name: String,
    /// Whether this schedule fires. Disabled schedules keep their next_run.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Creation timestamp — also the store's listing order.
    pub created_at: DateTime<Utc>,
    /// Last fire time.
    #[serde(default)]
    pub last_run: Option<DateTime<Utc>>,
    /// Next computed fire time. None when the expression has no future match.
    #[serde(default)]
    pub next_run: Option<DateTime<Utc>>,
}

fn default_enabled() -> bool {
    true
}

impl ScheduleEntry {
    /// Create a new enabled entry. `next_run` is computed by the store.
    pub fn new(name: &str, cron: &str, prompt: &str, agent_name: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            icon: None,
            cron: cron.to_string(),
            prompt: prompt.to_string(),
            agent_name: agent_name.to_string(),
            enabled: true,
            created_at: Utc::now(),
            last_run: None,
            next_run: None,
        }
    }

    /// Due when enabled and the precomputed next_run has arrived.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.enabled && self.next_run.is_some_and(|next| next <= now)
    }
}

/// Partial update applied to an existing entry. `None` leaves a field as-is.
#[derive(Debug, Clone, Default)]
pub struct ScheduleUpdate {
    pub name: Option<String>,
    pub icon: Option<Option<String>>,
    pub cron: Option<String>,
    pub prompt: Option<String>,
    pub agent_name: Option<String>,
}

/// Outcome of one schedule execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Success,
    Failure,
}

/// One entry in the execution history.
///
/// `schedule_name` is denormalized so history survives schedule deletion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: String,
    pub schedule_id: String,
    pub schedule_name: String,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    #[serde(default)]
    pub error: Option<String>,
}

impl ExecutionRecord {
    /// Open a record for a fire that is about to run.
    pub fn started(entry: &ScheduleEntry, now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            schedule_id: entry.id.clone(),
            schedule_name: entry.name.clone(),
            started_at: now,
            completed_at: None,
            status: RunStatus::Running,
            error: None,
        }
    }

    /// Close the record with the executor's outcome.
    pub fn finish(&mut self, outcome: std::result::Result<(), String>, now: DateTime<Utc>) {
        self.completed_at = Some(now);
        match outcome {
            Ok(()) => self.status = RunStatus::Success,
            Err(message) => {
                self.status = RunStatus::Failure;
                self.error = Some(message);
            }
        }
    }

    /// Wall-clock duration; undefined until the record is finished.
    pub fn duration(&self) -> Option<Duration> {
        self.completed_at.map(|done| done - self.started_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_due_check() {
        let mut entry = ScheduleEntry::new("morning", "0 9 * * *", "summarize inbox", "main");
        let now = Utc::now();
        assert!(!entry.is_due(now)); // no next_run yet

        entry.next_run = Some(now - Duration::minutes(1));
        assert!(entry.is_due(now));

        entry.enabled = false;
        assert!(!entry.is_due(now));
    }

    #[test]
    fn test_old_record_decodes_with_defaults() {
        // A record persisted before icon/last_run/next_run/enabled existed.
        let json = r#"{
            "id": "abc",
            "name": "daily",
            "cron": "0 9 * * *",
            "prompt": "hi",
            "agent_name": "main",
            "created_at": "2026-01-01T00:00:00Z"
        }"#;
        let entry: ScheduleEntry = serde_json::from_str(json).unwrap();
        assert!(entry.enabled);
        assert!(entry.icon.is_none());
        assert!(entry.next_run.is_none());
    }

    #[test]
    fn test_record_duration() {
        let entry = ScheduleEntry::new("t", "0 9 * * *", "p", "main");
        let start = Utc::now();
        let mut record = ExecutionRecord::started(&entry, start);
        assert_eq!(record.status, RunStatus::Running);
        assert!(record.duration().is_none());

        record.finish(Err("agent offline".into()), start + Duration::seconds(2));
        assert_eq!(record.status, RunStatus::Failure);
        assert_eq!(record.error.as_deref(), Some("agent offline"));
        assert_eq!(record.duration(), Some(Duration::seconds(2)));
    }
}
