//! File-based schedule store — one JSON record per schedule.
//! Human-readable, git-friendly, read once at startup and written only on
//! changes, never on ticks.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use deskclaw_core::{DeskclawError, Result};

use crate::cron::CronExpression;
use crate::entry::{ScheduleEntry, ScheduleUpdate};

/// Owns the set of schedule records and their persistence.
///
/// Not internally synchronized — the engine serializes access behind one
/// mutex (single-writer boundary).
pub struct ScheduleStore {
    dir: PathBuf,
    entries: Vec<ScheduleEntry>,
}

impl ScheduleStore {
    /// Open a store at the given directory, loading every record file.
    /// A corrupt or unreadable record is skipped with a warning, never a
    /// crash — the assistant must still start with a damaged data dir.
    pub fn open(dir: &Path) -> Self {
        std::fs::create_dir_all(dir).ok();
        let mut entries = Vec::new();

        if let Ok(read_dir) = std::fs::read_dir(dir) {
            for file in read_dir.flatten() {
                let path = file.path();
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                match std::fs::read_to_string(&path)
                    .map_err(|e| e.to_string())
                    .and_then(|json| {
                        serde_json::from_str::<ScheduleEntry>(&json).map_err(|e| e.to_string())
                    }) {
                    Ok(entry) => entries.push(entry),
                    Err(e) => {
                        tracing::warn!("⚠️ Skipping corrupt schedule record {}: {e}", path.display());
                    }
                }
            }
        }

        // Listing order is creation order.
        entries.sort_by_key(|e| e.created_at);
        tracing::info!("📅 Loaded {} schedules from {}", entries.len(), dir.display());

        Self {
            dir: dir.to_path_buf(),
            entries,
        }
    }

    /// Create a new schedule. The cron text is validated and `next_run` is
    /// computed from `now` before anything is persisted.
    pub fn create(
        &mut self,
        name: &str,
        icon: Option<&str>,
        cron: &str,
        prompt: &str,
        agent_name: &str,
        now: DateTime<Utc>,
    ) -> Result<ScheduleEntry> {
        if name.trim().is_empty() {
            return Err(DeskclawError::Validation("schedule name is empty".into()));
        }
        let expression = CronExpression::parse(cron)?;

        let mut entry = ScheduleEntry::new(name, cron, prompt, agent_name);
        entry.icon = icon.map(|s| s.to_string());
        entry.created_at = now;
        entry.next_run = expression.next_after(now);

        self.persist(&entry);
        self.entries.push(entry.clone());
        tracing::info!("📅 Schedule created: '{}' ({})", entry.name, entry.id);
        Ok(entry)
    }

    /// Apply a partial update. Recomputes `next_run` iff the cron expression
    /// actually changed (the new text is validated first, so a bad edit
    /// leaves the entry untouched). Returns Ok(false) for an unknown id.
    pub fn update(&mut self, id: &str, update: ScheduleUpdate, now: DateTime<Utc>) -> Result<bool> {
        let new_cron = match &update.cron {
            Some(text) => Some((text.clone(), CronExpression::parse(text)?)),
            None => None,
        };

        let Some(entry) = self.entries.iter_mut().find(|e| e.id == id) else {
            return Ok(false);
        };

        if let Some(name) = update.name {
            entry.name = name;
        }
        if let Some(icon) = update.icon {
            entry.icon = icon;
        }
        if let Some(prompt) = update.prompt {
            entry.prompt = prompt;
        }
        if let Some(agent_name) = update.agent_name {
            entry.agent_name = agent_name;
        }
        if let Some((text, expression)) = new_cron
            && text != entry.cron
        {
            entry.cron = text;
            entry.next_run = expression.next_after(now);
        }

        let snapshot = entry.clone();
        self.persist(&snapshot);
        Ok(true)
    }

    /// Delete a schedule and its record file. Idempotent — an unknown id is
    /// a no-op, not an error.
    pub fn delete(&mut self, id: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        if self.entries.len() == before {
            return false;
        }
        std::fs::remove_file(self.record_path(id)).ok();
        tracing::info!("🗑️ Schedule deleted: {id}");
        true
    }

    /// Enable or disable a schedule. Disabling keeps `next_run` so
    /// re-enabling resumes the precomputed cadence; it is recomputed only
    /// when it has already passed (or was never computed).
    pub fn set_enabled(&mut self, id: &str, enabled: bool, now: DateTime<Utc>) -> bool {
        let Some(entry) = self.entries.iter_mut().find(|e| e.id == id) else {
            return false;
        };
        entry.enabled = enabled;

        if enabled && entry.next_run.is_none_or(|next| next <= now) {
            entry.next_run = CronExpression::parse(&entry.cron)
                .ok()
                .and_then(|expr| expr.next_after(now));
        }

        let snapshot = entry.clone();
        self.persist(&snapshot);
        true
    }

    /// Record a fire: sets `last_run` and recomputes `next_run` from the
    /// fire time, regardless of the execution outcome — a failing schedule
    /// retries on its normal cadence, never continuously.
    pub fn mark_fired(&mut self, id: &str, now: DateTime<Utc>) {
        let Some(entry) = self.entries.iter_mut().find(|e| e.id == id) else {
            return;
        };
        entry.last_run = Some(now);
        entry.next_run = CronExpression::parse(&entry.cron)
            .ok()
            .and_then(|expr| expr.next_after(now));
        let snapshot = entry.clone();
        self.persist(&snapshot);
    }

    /// All schedules in creation order.
    pub fn list(&self) -> &[ScheduleEntry] {
        &self.entries
    }

    /// Look up one schedule.
    pub fn get(&self, id: &str) -> Option<&ScheduleEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// Entries due at `now`, cloned for execution outside the store lock.
    pub fn due(&self, now: DateTime<Utc>) -> Vec<ScheduleEntry> {
        self.entries.iter().filter(|e| e.is_due(now)).cloned().collect()
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    fn persist(&self, entry: &ScheduleEntry) {
        let path = self.record_path(&entry.id);
        match serde_json::to_string_pretty(entry) {
            Ok(json) => {
                if let Err(e) = std::fs::write(&path, json) {
                    tracing::warn!("⚠️ Failed to write {}: {e}", path.display());
                }
            }
            Err(e) => tracing::warn!("⚠️ Failed to serialize schedule {}: {e}", entry.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn temp_store(name: &str) -> (PathBuf, ScheduleStore) {
        let dir = std::env::temp_dir().join(format!("deskclaw-sched-store-{name}"));
        std::fs::remove_dir_all(&dir).ok();
        let store = ScheduleStore::open(&dir);
        (dir, store)
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 15, 8, 0, 0).unwrap()
    }

    #[test]
    fn test_create_computes_next_run() {
        let (dir, mut store) = temp_store("create");
        let entry = store
            .create("morning", None, "0 9 * * *", "summarize", "main", now())
            .unwrap();
        assert_eq!(
            entry.next_run,
            Some(Utc.with_ymd_and_hms(2026, 2, 15, 9, 0, 0).unwrap())
        );
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_create_rejects_bad_cron() {
        let (dir, mut store) = temp_store("badcron");
        assert!(store.create("x", None, "0 25 * * *", "p", "main", now()).is_err());
        assert!(store.list().is_empty());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_roundtrip_through_disk() {
        let (dir, mut store) = temp_store("roundtrip");
        let a = store.create("a", Some("🦞"), "0 9 * * *", "p1", "main", now()).unwrap();
        let b = store
            .create("b", None, "30 10 15 * *", "p2", "research", now() + Duration::seconds(1))
            .unwrap();

        let reloaded = ScheduleStore::open(&dir);
        let listed: Vec<&str> = reloaded.list().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(listed, vec![a.id.as_str(), b.id.as_str()]); // creation order
        assert_eq!(reloaded.get(&a.id).unwrap().icon.as_deref(), Some("🦞"));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_corrupt_record_is_skipped() {
        let (dir, mut store) = temp_store("corrupt");
        store.create("good", None, "0 9 * * *", "p", "main", now()).unwrap();
        std::fs::write(dir.join("broken.json"), "{not json").unwrap();

        let reloaded = ScheduleStore::open(&dir);
        assert_eq!(reloaded.list().len(), 1);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_update_recomputes_next_run_only_on_cron_change() {
        let (dir, mut store) = temp_store("update");
        let entry = store.create("t", None, "0 9 * * *", "p", "main", now()).unwrap();
        let original_next = entry.next_run;

        // Renaming must not touch next_run.
        let update = ScheduleUpdate { name: Some("renamed".into()), ..Default::default() };
        assert!(store.update(&entry.id, update, now()).unwrap());
        assert_eq!(store.get(&entry.id).unwrap().next_run, original_next);

        // A cron change recomputes it.
        let update = ScheduleUpdate { cron: Some("0 18 * * *".into()), ..Default::default() };
        assert!(store.update(&entry.id, update, now()).unwrap());
        assert_eq!(
            store.get(&entry.id).unwrap().next_run,
            Some(Utc.with_ymd_and_hms(2026, 2, 15, 18, 0, 0).unwrap())
        );

        // Invalid cron is rejected and the entry is left untouched.
        let update = ScheduleUpdate { cron: Some("*/5 * * * *".into()), ..Default::default() };
        assert!(store.update(&entry.id, update, now()).is_err());
        assert_eq!(store.get(&entry.id).unwrap().cron, "0 18 * * *");
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_update_unknown_id() {
        let (dir, mut store) = temp_store("unknown");
        assert!(!store.update("nope", ScheduleUpdate::default(), now()).unwrap());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_delete_is_idempotent() {
        let (dir, mut store) = temp_store("delete");
        let entry = store.create("t", None, "0 9 * * *", "p", "main", now()).unwrap();
        assert!(store.delete(&entry.id));
        assert!(!store.delete(&entry.id));
        assert!(ScheduleStore::open(&dir).list().is_empty());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_disable_keeps_next_run() {
        let (dir, mut store) = temp_store("disable");
        let entry = store.create("t", None, "0 9 * * *", "p", "main", now()).unwrap();
        let next = entry.next_run;

        store.set_enabled(&entry.id, false, now());
        let disabled = store.get(&entry.id).unwrap();
        assert!(!disabled.enabled);
        assert_eq!(disabled.next_run, next);
        assert!(!disabled.is_due(next.unwrap()));

        // Re-enable before the slot passes: resumes on the precomputed time.
        store.set_enabled(&entry.id, true, now());
        assert_eq!(store.get(&entry.id).unwrap().next_run, next);

        // Re-enable after the slot passed: recomputed forward.
        store.set_enabled(&entry.id, false, now());
        let later = now() + Duration::days(1);
        store.set_enabled(&entry.id, true, later);
        assert_eq!(
            store.get(&entry.id).unwrap().next_run,
            Some(Utc.with_ymd_and_hms(2026, 2, 16, 9, 0, 0).unwrap())
        );
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_mark_fired_advances_from_fire_time() {
        let (dir, mut store) = temp_store("fired");
        let entry = store.create("t", None, "0 9 * * *", "p", "main", now()).unwrap();

        let fire_time = Utc.with_ymd_and_hms(2026, 2, 15, 9, 0, 30).unwrap();
        store.mark_fired(&entry.id, fire_time);
        let fired = store.get(&entry.id).unwrap();
        assert_eq!(fired.last_run, Some(fire_time));
        assert_eq!(
            fired.next_run,
            Some(Utc.with_ymd_and_hms(2026, 2, 16, 9, 0, 0).unwrap())
        );
        std::fs::remove_dir_all(&dir).ok();
    }
}
