//! Append-only activity journal, one JSONL file per environment.
//!
//! Entries are never rewritten; terminal outcomes arrive as a second
//! appended entry for the same action.

use crate::layout::StoreLayout;
use crate::StoreError;
use pressline_schema::ActivityRecord;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct ActivityJournal {
    layout: StoreLayout,
}

impl ActivityJournal {
    pub fn new(layout: StoreLayout) -> Self {
        Self { layout }
    }

    fn path(&self, env_id: &str) -> PathBuf {
        self.layout.journal_dir().join(format!("{env_id}.jsonl"))
    }

    pub fn append(&self, record: &ActivityRecord) -> Result<(), StoreError> {
        let line = serde_json::to_string(record)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path(record.env_id.as_str()))?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
        file.sync_all()?;
        Ok(())
    }

    /// The most recent `limit` entries for an environment, oldest first.
    /// A zero limit returns everything.
    pub fn recent(&self, env_id: &str, limit: usize) -> Result<Vec<ActivityRecord>, StoreError> {
        let path = self.path(env_id);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(path)?;
        let mut records = Vec::new();
        for (lineno, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ActivityRecord>(line) {
                Ok(rec) => records.push(rec),
                Err(e) => {
                    warn!("skipping malformed journal line {} for '{env_id}': {e}", lineno + 1);
                }
            }
        }

        if limit > 0 && records.len() > limit {
            records.drain(..records.len() - limit);
        }
        Ok(records)
    }

    /// Cascade helper for environment deletion.
    pub fn remove_env(&self, env_id: &str) -> Result<(), StoreError> {
        let path = self.path(env_id);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pressline_schema::{ActivityStatus, EnvId};

    fn test_journal() -> (tempfile::TempDir, ActivityJournal) {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(dir.path());
        layout.initialize().unwrap();
        (dir, ActivityJournal::new(layout))
    }

    fn entry(env: &str, action: &str, status: ActivityStatus) -> ActivityRecord {
        ActivityRecord {
            env_id: EnvId::new(env),
            actor: "ops".to_owned(),
            action: action.to_owned(),
            description: format!("{action} on {env}"),
            status,
            duration_ms: None,
            error: None,
            metadata: serde_json::Value::Null,
            recorded_at: "2026-01-15T12:00:00Z".to_owned(),
        }
    }

    #[test]
    fn append_and_recent_preserve_order() {
        let (_dir, journal) = test_journal();
        journal
            .append(&entry("site-dev", "sync", ActivityStatus::Started))
            .unwrap();
        journal
            .append(&entry("site-dev", "sync", ActivityStatus::Completed))
            .unwrap();

        let all = journal.recent("site-dev", 0).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].status, ActivityStatus::Started);
        assert_eq!(all[1].status, ActivityStatus::Completed);
    }

    #[test]
    fn recent_limits_to_newest() {
        let (_dir, journal) = test_journal();
        for action in ["create", "sync", "promote"] {
            journal
                .append(&entry("site-dev", action, ActivityStatus::Completed))
                .unwrap();
        }
        let last_two = journal.recent("site-dev", 2).unwrap();
        assert_eq!(last_two.len(), 2);
        assert_eq!(last_two[0].action, "sync");
        assert_eq!(last_two[1].action, "promote");
    }

    #[test]
    fn journals_are_per_environment() {
        let (_dir, journal) = test_journal();
        journal
            .append(&entry("site-dev", "sync", ActivityStatus::Completed))
            .unwrap();
        journal
            .append(&entry("site-staging", "promote", ActivityStatus::Failed))
            .unwrap();

        assert_eq!(journal.recent("site-dev", 0).unwrap().len(), 1);
        assert_eq!(journal.recent("site-staging", 0).unwrap().len(), 1);
        assert!(journal.recent("site-prod", 0).unwrap().is_empty());
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let (_dir, journal) = test_journal();
        journal
            .append(&entry("site-dev", "sync", ActivityStatus::Completed))
            .unwrap();
        let path = journal.path("site-dev");
        let mut content = fs::read_to_string(&path).unwrap();
        content.push_str("{ not json\n");
        fs::write(&path, content).unwrap();
        journal
            .append(&entry("site-dev", "promote", ActivityStatus::Completed))
            .unwrap();

        let records = journal.recent("site-dev", 0).unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn remove_env_is_idempotent() {
        let (_dir, journal) = test_journal();
        journal
            .append(&entry("site-dev", "sync", ActivityStatus::Completed))
            .unwrap();
        journal.remove_env("site-dev").unwrap();
        journal.remove_env("site-dev").unwrap();
        assert!(journal.recent("site-dev", 0).unwrap().is_empty());
    }
}
