//! Crash-safe record of how far the current run got.
//!
//! Rewritten after every action and every completed actor, so a restart
//! repeats at most the one action that was in flight.

use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use humantic_core::error::{HumanticError, Result};
use humantic_core::types::ActorId;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::lock::{RunLock, lock_path_for};

/// `run_id` format: UTC, second precision, lexically sortable.
pub const RUN_ID_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Which part of an actor's work the position points into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Actions,
    /// Steps written by older layouts. The actor restarts from index 0.
    #[serde(other)]
    Unknown,
}

/// In-flight actor and the index of its next action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    #[serde(alias = "account_id")]
    pub actor_id: ActorId,
    pub step: Step,
    pub index: usize,
}

impl Position {
    pub fn actions(actor_id: ActorId, index: usize) -> Self {
        Self {
            actor_id,
            step: Step::Actions,
            index,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub run_id: String,
    #[serde(default, alias = "completed_account_ids")]
    pub completed_actor_ids: BTreeSet<ActorId>,
    #[serde(default)]
    pub current: Option<Position>,
}

impl Checkpoint {
    /// Start a fresh run stamped with `now`.
    pub fn fresh(now: DateTime<Utc>) -> Self {
        Self {
            run_id: new_run_id(now),
            completed_actor_ids: BTreeSet::new(),
            current: None,
        }
    }

    /// True iff the run started less than `window` before `now`.
    /// An unparsable `run_id` is never recent.
    pub fn is_recent(&self, now: DateTime<Utc>, window: Duration) -> bool {
        let Some(started) = parse_run_id(&self.run_id) else {
            return false;
        };
        let window = chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::weeks(52 * 100));
        now - started < window
    }

    /// Move `actor_id` into the completed set and drop the in-flight position.
    pub fn mark_completed(&mut self, actor_id: ActorId) {
        self.completed_actor_ids.insert(actor_id);
        self.current = None;
    }

    /// Record that `actor_id` will continue at `next_index`.
    pub fn advance(&mut self, actor_id: ActorId, next_index: usize) {
        self.current = Some(Position::actions(actor_id, next_index));
    }

    pub fn is_completed(&self, actor_id: ActorId) -> bool {
        self.completed_actor_ids.contains(&actor_id)
    }

    /// Resume position for `actor_id`, if the checkpoint names it.
    pub fn resume_point(&self, actor_id: ActorId) -> Option<&Position> {
        self.current.as_ref().filter(|p| p.actor_id == actor_id)
    }
}

pub fn new_run_id(now: DateTime<Utc>) -> String {
    now.format(RUN_ID_FORMAT).to_string()
}

pub fn parse_run_id(run_id: &str) -> Option<DateTime<Utc>> {
    let head = run_id.get(..19)?;
    NaiveDateTime::parse_from_str(head, RUN_ID_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// Durable medium for the checkpoint. Exactly one record at a time.
pub trait CheckpointStore: Send + Sync {
    /// `None` when no record exists or it cannot be parsed.
    fn load(&self) -> Option<Checkpoint>;

    /// Atomically replace the whole record.
    fn save(&self, checkpoint: &Checkpoint) -> Result<()>;

    /// Remove the record. Removing a missing record succeeds.
    fn clear(&self) -> Result<()>;

    /// Exclusive lease on this record for one run, also against other
    /// processes using the same medium. `None` while another run holds it.
    fn try_lock_run(&self) -> Result<Option<RunLock>>;
}

/// JSON file replaced via temp file + rename in the same directory.
pub struct FileCheckpointStore {
    path: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn load(&self) -> Option<Checkpoint> {
        if !self.path.exists() {
            return None;
        }
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!("⚠️ Could not read checkpoint {}: {e}", self.path.display());
                return None;
            }
        };
        match serde_json::from_str(&content) {
            Ok(checkpoint) => Some(checkpoint),
            Err(e) => {
                tracing::warn!("⚠️ Corrupt checkpoint {}, ignoring: {e}", self.path.display());
                None
            }
        }
    }

    fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        let dir = self.path.parent().unwrap_or(Path::new("."));
        std::fs::create_dir_all(dir)?;
        let data = serde_json::to_vec_pretty(checkpoint)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&data)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)
            .map_err(|e| HumanticError::Checkpoint(format!("persist {}: {}", self.path.display(), e.error)))?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::info!("🧹 Cleared resume checkpoint");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn try_lock_run(&self) -> Result<Option<RunLock>> {
        RunLock::try_file(&lock_path_for(&self.path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, h, m, 0).unwrap()
    }

    #[test]
    fn test_run_id_roundtrip() {
        let now = at(10, 30);
        let run_id = new_run_id(now);
        assert_eq!(run_id, "2026-03-01T10:30:00");
        assert_eq!(parse_run_id(&run_id), Some(now));
        assert_eq!(parse_run_id("garbage"), None);
    }

    #[test]
    fn test_is_recent() {
        let window = Duration::from_secs(2 * 3600);
        let checkpoint = Checkpoint::fresh(at(10, 0));
        assert!(checkpoint.is_recent(at(11, 59), window));
        assert!(!checkpoint.is_recent(at(12, 0), window));
        assert!(!checkpoint.is_recent(at(13, 0), window));

        let broken = Checkpoint {
            run_id: "not-a-time".into(),
            ..checkpoint
        };
        assert!(!broken.is_recent(at(10, 0), window));
    }

    #[test]
    fn test_mark_completed_clears_current() {
        let mut checkpoint = Checkpoint::fresh(at(10, 0));
        checkpoint.advance(4, 2);
        assert_eq!(checkpoint.resume_point(4), Some(&Position::actions(4, 2)));
        assert_eq!(checkpoint.resume_point(5), None);

        checkpoint.mark_completed(4);
        assert!(checkpoint.is_completed(4));
        assert!(checkpoint.current.is_none());
    }

    #[test]
    fn test_file_store_roundtrip_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(&dir.path().join("state").join("humantic_state.json"));
        assert!(store.load().is_none());

        let mut checkpoint = Checkpoint::fresh(at(9, 0));
        checkpoint.mark_completed(1);
        checkpoint.advance(2, 3);
        store.save(&checkpoint).unwrap();
        assert_eq!(store.load(), Some(checkpoint));

        store.clear().unwrap();
        assert!(store.load().is_none());
        store.clear().unwrap();
    }

    #[test]
    fn test_file_stores_on_same_path_share_run_lock() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("humantic_state.json");
        let serve = FileCheckpointStore::new(&path);
        let run = FileCheckpointStore::new(&path);

        let lease = serve.try_lock_run().unwrap();
        assert!(lease.is_some());
        assert!(run.try_lock_run().unwrap().is_none());
        drop(lease);
        assert!(run.try_lock_run().unwrap().is_some());

        let other = FileCheckpointStore::new(&dir.path().join("other.json"));
        let _a = serve.try_lock_run().unwrap();
        assert!(other.try_lock_run().unwrap().is_some());
    }

    #[test]
    fn test_corrupt_file_treated_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("humantic_state.json");
        std::fs::write(&path, "{ truncated").unwrap();
        assert!(FileCheckpointStore::new(&path).load().is_none());
    }

    #[test]
    fn test_reads_legacy_layout() {
        let json = r#"{
            "run_id": "2026-03-01T09:00:00",
            "completed_account_ids": [1, 2],
            "current": {"account_id": 3, "step": "chats", "index": 2}
        }"#;
        let checkpoint: Checkpoint = serde_json::from_str(json).unwrap();
        assert!(checkpoint.is_completed(2));
        let current = checkpoint.current.unwrap();
        assert_eq!(current.actor_id, 3);
        assert_eq!(current.step, Step::Unknown);
    }
}
