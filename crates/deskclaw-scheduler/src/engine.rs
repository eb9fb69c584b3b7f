//! Scheduler engine — the tick loop that fires due schedules.
//! Uses tokio::interval for zero-overhead ticking (sleeps between checks).
//!
//! Locking rule: the store mutex covers bookkeeping only. A due schedule is
//! marked fired and its history record opened as Running *before* the lock
//! is released; the executor call (LLM, tools — arbitrarily slow) happens
//! outside the lock, and the record is finalized afterwards.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use deskclaw_core::Result;
use tokio::sync::Mutex;

use crate::entry::{ExecutionRecord, ScheduleEntry, ScheduleUpdate};
use crate::store::ScheduleStore;

/// Executes a fired schedule. Implemented by the assistant's agent runtime;
/// the engine only cares about success/failure and the error text.
#[async_trait::async_trait]
pub trait ScheduleExecutor: Send + Sync {
    async fn execute(
        &self,
        prompt: &str,
        agent_name: &str,
    ) -> std::result::Result<String, String>;
}

struct EngineState {
    store: ScheduleStore,
    history: Vec<ExecutionRecord>,
    history_path: PathBuf,
}

impl EngineState {
    /// Newest-first insert, oldest dropped past the cap.
    fn push_history(&mut self, record: ExecutionRecord, cap: usize) {
        self.history.insert(0, record);
        self.history.truncate(cap);
    }

    fn save_history(&self) {
        match serde_json::to_string_pretty(&self.history) {
            Ok(json) => {
                if let Err(e) = std::fs::write(&self.history_path, json) {
                    tracing::warn!("⚠️ Failed to write history: {e}");
                }
            }
            Err(e) => tracing::warn!("⚠️ Failed to serialize history: {e}"),
        }
    }
}

/// The scheduler engine — owns the schedule store and execution history,
/// fires due schedules through the injected executor.
///
/// Construct one at startup and hand out `Arc` handles; there is no global
/// instance, so tests run isolated engines against temp dirs.
pub struct SchedulerEngine {
    inner: Mutex<EngineState>,
    executor: Arc<dyn ScheduleExecutor>,
    history_cap: usize,
}

impl SchedulerEngine {
    /// Open an engine rooted at `data_dir` (schedules under
    /// `<data_dir>/schedules`, history in `<data_dir>/history.json`).
    pub fn new(data_dir: &Path, executor: Arc<dyn ScheduleExecutor>, history_cap: usize) -> Self {
        let store = ScheduleStore::open(&data_dir.join("schedules"));
        let history_path = data_dir.join("history.json");

        let history: Vec<ExecutionRecord> = std::fs::read_to_string(&history_path)
            .ok()
            .and_then(|json| match serde_json::from_str(&json) {
                Ok(records) => Some(records),
                Err(e) => {
                    tracing::warn!("⚠️ Discarding corrupt history.json: {e}");
                    None
                }
            })
            .unwrap_or_default();

        Self {
            inner: Mutex::new(EngineState {
                store,
                history,
                history_path,
            }),
            executor,
            history_cap,
        }
    }

    /// Create a schedule; `next_run` is computed immediately from now.
    pub async fn create_schedule(
        &self,
        name: &str,
        icon: Option<&str>,
        cron: &str,
        prompt: &str,
        agent_name: &str,
    ) -> Result<ScheduleEntry> {
        let mut state = self.inner.lock().await;
        state.store.create(name, icon, cron, prompt, agent_name, Utc::now())
    }

    /// Apply a partial update; see [`ScheduleStore::update`].
    pub async fn update_schedule(&self, id: &str, update: ScheduleUpdate) -> Result<bool> {
        let mut state = self.inner.lock().await;
        state.store.update(id, update, Utc::now())
    }

    /// Delete a schedule (idempotent).
    pub async fn delete_schedule(&self, id: &str) -> bool {
        let mut state = self.inner.lock().await;
        state.store.delete(id)
    }

    /// Enable or disable a schedule without clearing its cadence.
    pub async fn set_enabled(&self, id: &str, enabled: bool) -> bool {
        let mut state = self.inner.lock().await;
        state.store.set_enabled(id, enabled, Utc::now())
    }

    /// All schedules in creation order.
    pub async fn list_schedules(&self) -> Vec<ScheduleEntry> {
        self.inner.lock().await.store.list().to_vec()
    }

    /// Look up one schedule.
    pub async fn get_schedule(&self, id: &str) -> Option<ScheduleEntry> {
        self.inner.lock().await.store.get(id).cloned()
    }

    /// Execution history, newest first, bounded at the configured cap.
    pub async fn history(&self) -> Vec<ExecutionRecord> {
        self.inner.lock().await.history.clone()
    }

    /// One due-check cycle. Safe to call more often than the cadence —
    /// extra ticks find nothing due, because firing advances `next_run`
    /// before the lock is released.
    ///
    /// Returns `(schedule name, succeeded)` per fired schedule.
    pub async fn tick(&self, now: DateTime<Utc>) -> Vec<(String, bool)> {
        // Phase 1 (locked): claim due schedules, open Running records,
        // advance next_run so a slow executor cannot double-fire.
        let due: Vec<(ScheduleEntry, String)> = {
            let mut state = self.inner.lock().await;
            let due = state.store.due(now);
            let mut claimed = Vec::with_capacity(due.len());
            for entry in due {
                let record = ExecutionRecord::started(&entry, now);
                let record_id = record.id.clone();
                state.push_history(record, self.history_cap);
                state.store.mark_fired(&entry.id, now);
                claimed.push((entry, record_id));
            }
            if !claimed.is_empty() {
                state.save_history();
            }
            claimed
        };

        // Phase 2 (unlocked): run the executor.
        let mut results = Vec::with_capacity(due.len());
        for (entry, record_id) in due {
            tracing::info!("🔔 Schedule fired: '{}' ({})", entry.name, entry.id);
            let outcome = self.executor.execute(&entry.prompt, &entry.agent_name).await;
            let ok = outcome.is_ok();
            if let Err(e) = &outcome {
                tracing::warn!("⚠️ Schedule '{}' failed: {e}", entry.name);
            }

            // Phase 3 (locked): finalize the record.
            let mut state = self.inner.lock().await;
            if let Some(record) = state.history.iter_mut().find(|r| r.id == record_id) {
                record.finish(outcome.map(|_| ()), Utc::now());
            }
            state.save_history();
            results.push((entry.name, ok));
        }
        results
    }

    /// Run the tick loop until the process exits.
    pub async fn run(self: Arc<Self>, tick_secs: u64) {
        tracing::info!("⏰ Scheduler started (check every {tick_secs}s)");
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(tick_secs));
        loop {
            interval.tick().await;
            self.tick(Utc::now()).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::RunStatus;
    use std::sync::Mutex as StdMutex;

    /// Records invocations; fails when told to.
    struct StubExecutor {
        calls: StdMutex<Vec<(String, String)>>,
        fail_with: Option<String>,
    }

    impl StubExecutor {
        fn ok() -> Arc<Self> {
            Arc::new(Self { calls: StdMutex::new(Vec::new()), fail_with: None })
        }

        fn failing(message: &str) -> Arc<Self> {
            Arc::new(Self {
                calls: StdMutex::new(Vec::new()),
                fail_with: Some(message.to_string()),
            })
        }
    }

    #[async_trait::async_trait]
    impl ScheduleExecutor for StubExecutor {
        async fn execute(
            &self,
            prompt: &str,
            agent_name: &str,
        ) -> std::result::Result<String, String> {
            self.calls
                .lock()
                .unwrap()
                .push((prompt.to_string(), agent_name.to_string()));
            match &self.fail_with {
                Some(message) => Err(message.clone()),
                None => Ok("done".into()),
            }
        }
    }

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("deskclaw-engine-{name}"));
        std::fs::remove_dir_all(&dir).ok();
        dir
    }

    #[tokio::test]
    async fn test_tick_fires_due_schedule() {
        let dir = temp_dir("fires");
        let executor = StubExecutor::ok();
        let engine = SchedulerEngine::new(&dir, executor.clone(), 100);

        let entry = engine
            .create_schedule("minutely", None, "* * * * *", "check things", "main")
            .await
            .unwrap();

        // Nothing due before the first slot.
        assert!(engine.tick(Utc::now() - chrono::Duration::seconds(5)).await.is_empty());

        let later = Utc::now() + chrono::Duration::minutes(2);
        let fired = engine.tick(later).await;
        assert_eq!(fired, vec![("minutely".to_string(), true)]);
        assert_eq!(
            executor.calls.lock().unwrap().as_slice(),
            &[("check things".to_string(), "main".to_string())]
        );

        let updated = engine.get_schedule(&entry.id).await.unwrap();
        assert_eq!(updated.last_run, Some(later));
        assert!(updated.next_run.unwrap() > later);

        let history = engine.history().await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, RunStatus::Success);
        assert_eq!(history[0].schedule_name, "minutely");
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_failure_is_recorded_and_cadence_kept() {
        let dir = temp_dir("failure");
        let engine = SchedulerEngine::new(&dir, StubExecutor::failing("agent offline"), 100);

        let entry = engine
            .create_schedule("flaky", None, "* * * * *", "p", "main")
            .await
            .unwrap();

        let later = Utc::now() + chrono::Duration::minutes(2);
        let fired = engine.tick(later).await;
        assert_eq!(fired, vec![("flaky".to_string(), false)]);

        let history = engine.history().await;
        assert_eq!(history[0].status, RunStatus::Failure);
        assert_eq!(history[0].error.as_deref(), Some("agent offline"));
        assert!(history[0].completed_at.is_some());

        // Failure still advances next_run — no tight retry loop.
        let updated = engine.get_schedule(&entry.id).await.unwrap();
        assert!(updated.next_run.unwrap() > later);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_disabled_schedule_does_not_fire() {
        let dir = temp_dir("disabled");
        let executor = StubExecutor::ok();
        let engine = SchedulerEngine::new(&dir, executor.clone(), 100);

        let entry = engine
            .create_schedule("paused", None, "* * * * *", "p", "main")
            .await
            .unwrap();
        engine.set_enabled(&entry.id, false).await;

        let later = Utc::now() + chrono::Duration::minutes(5);
        assert!(engine.tick(later).await.is_empty());
        assert!(executor.calls.lock().unwrap().is_empty());

        // next_run survived the disable.
        assert!(engine.get_schedule(&entry.id).await.unwrap().next_run.is_some());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_history_is_bounded_newest_first() {
        let dir = temp_dir("histcap");
        let engine = SchedulerEngine::new(&dir, StubExecutor::ok(), 3);

        engine
            .create_schedule("busy", None, "* * * * *", "p", "main")
            .await
            .unwrap();

        let mut now = Utc::now();
        for _ in 0..5 {
            now += chrono::Duration::minutes(2);
            assert_eq!(engine.tick(now).await.len(), 1);
        }

        let history = engine.history().await;
        assert_eq!(history.len(), 3);
        // Newest at the head.
        assert!(history[0].started_at > history[1].started_at);
        assert!(history[1].started_at > history[2].started_at);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_history_survives_restart() {
        let dir = temp_dir("histreload");
        {
            let engine = SchedulerEngine::new(&dir, StubExecutor::ok(), 100);
            engine
                .create_schedule("s", None, "* * * * *", "p", "main")
                .await
                .unwrap();
            engine.tick(Utc::now() + chrono::Duration::minutes(2)).await;
        }

        let engine = SchedulerEngine::new(&dir, StubExecutor::ok(), 100);
        assert_eq!(engine.history().await.len(), 1);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_history_survives_schedule_deletion() {
        let dir = temp_dir("histdenorm");
        let engine = SchedulerEngine::new(&dir, StubExecutor::ok(), 100);

        let entry = engine
            .create_schedule("ephemeral", None, "* * * * *", "p", "main")
            .await
            .unwrap();
        engine.tick(Utc::now() + chrono::Duration::minutes(2)).await;
        assert!(engine.delete_schedule(&entry.id).await);
        assert!(!engine.delete_schedule(&entry.id).await); // idempotent

        let history = engine.history().await;
        assert_eq!(history[0].schedule_name, "ephemeral");
        std::fs::remove_dir_all(&dir).ok();
    }
}
