//! SQLite-backed persistence for actors, system state and the run checkpoint.
//! One database file, survives restarts; all writes are single statements.

use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use humantic_core::error::{HumanticError, Result};
use humantic_core::traits::{ActorDirectory, SystemStateStore};
use humantic_core::types::{Actor, ActorId, Credentials};

use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::lock::{RunLock, lock_path_for};

const KEY_SYSTEM_SLEEP_UNTIL: &str = "system_sleep_until";
const KEY_LAST_RUN_AT: &str = "last_run_at";
const KEY_NEXT_RUN_AT: &str = "next_run_at";

fn db_err(context: &str) -> impl Fn(rusqlite::Error) -> HumanticError + '_ {
    move |e| HumanticError::Database(format!("{context}: {e}"))
}

fn parse_time(value: Option<String>) -> Option<DateTime<Utc>> {
    value
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|t| t.with_timezone(&Utc))
}

/// SQLite-backed store for all scheduler data.
pub struct SchedulerDb {
    conn: Mutex<rusqlite::Connection>,
    /// `None` for in-memory databases, which fall back to `run_flag`.
    lock_path: Option<PathBuf>,
    run_flag: Arc<AtomicBool>,
}

impl SchedulerDb {
    /// Open or create the scheduler database.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = rusqlite::Connection::open(path).map_err(db_err("DB open"))?;
        let db = Self {
            conn: Mutex::new(conn),
            lock_path: Some(lock_path_for(path)),
            run_flag: Arc::default(),
        };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = rusqlite::Connection::open_in_memory().map_err(db_err("DB open"))?;
        let db = Self {
            conn: Mutex::new(conn),
            lock_path: None,
            run_flag: Arc::default(),
        };
        db.migrate()?;
        Ok(db)
    }

    fn conn(&self) -> Result<MutexGuard<'_, rusqlite::Connection>> {
        self.conn
            .lock()
            .map_err(|_| HumanticError::Database("connection lock poisoned".into()))
    }

    /// Run migrations to create tables.
    fn migrate(&self) -> Result<()> {
        self.conn()?
            .execute_batch(
                "
            -- Automatable identities
            CREATE TABLE IF NOT EXISTS actors (
                id INTEGER PRIMARY KEY,
                label TEXT NOT NULL DEFAULT '',
                session TEXT NOT NULL DEFAULT '',
                api_id INTEGER,
                api_hash TEXT NOT NULL DEFAULT '',
                sleep_until TEXT,               -- RFC 3339, NULL = awake
                created_at TEXT NOT NULL
            );

            -- System-wide key/value state (deep sleep, run cadence)
            CREATE TABLE IF NOT EXISTS system_state (
                key TEXT PRIMARY KEY,
                value TEXT
            );

            -- Single-row run checkpoint
            CREATE TABLE IF NOT EXISTS run_checkpoint (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                data TEXT NOT NULL,             -- JSON checkpoint
                updated_at TEXT NOT NULL
            );
         ",
            )
            .map_err(db_err("Migration"))
    }

    // ─── Actors ───────────────────────────────────────────────

    /// Insert or replace an actor.
    pub fn upsert_actor(&self, actor: &Actor) -> Result<()> {
        self.conn()?
            .execute(
                "INSERT INTO actors (id, label, session, api_id, api_hash, sleep_until, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(id) DO UPDATE SET
                    label = excluded.label,
                    session = excluded.session,
                    api_id = excluded.api_id,
                    api_hash = excluded.api_hash,
                    sleep_until = excluded.sleep_until",
                rusqlite::params![
                    actor.id,
                    actor.label,
                    actor.credentials.session,
                    actor.credentials.api_id,
                    actor.credentials.api_hash,
                    actor.sleep_until.map(|t| t.to_rfc3339()),
                    Utc::now().to_rfc3339(),
                ],
            )
            .map_err(db_err("Save actor"))?;
        Ok(())
    }

    /// Remove an actor. Returns whether it existed.
    pub fn remove_actor(&self, id: ActorId) -> Result<bool> {
        let n = self
            .conn()?
            .execute("DELETE FROM actors WHERE id = ?1", [id])
            .map_err(db_err("Delete actor"))?;
        Ok(n > 0)
    }

    /// All actors ordered by id.
    pub fn load_actors(&self) -> Result<Vec<Actor>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT id, label, session, api_id, api_hash, sleep_until FROM actors ORDER BY id")
            .map_err(db_err("Load actors"))?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Actor {
                    id: row.get(0)?,
                    label: row.get(1)?,
                    credentials: Credentials {
                        session: row.get(2)?,
                        api_id: row.get(3)?,
                        api_hash: row.get(4)?,
                    },
                    sleep_until: parse_time(row.get(5)?),
                })
            })
            .map_err(db_err("Load actors"))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(db_err("Load actors"))
    }

    pub fn update_actor_sleep(&self, id: ActorId, until: Option<DateTime<Utc>>) -> Result<bool> {
        let n = self
            .conn()?
            .execute(
                "UPDATE actors SET sleep_until = ?1 WHERE id = ?2",
                rusqlite::params![until.map(|t| t.to_rfc3339()), id],
            )
            .map_err(db_err("Update actor sleep"))?;
        Ok(n > 0)
    }

    // ─── System state ─────────────────────────────────────────

    fn get_time(&self, key: &str) -> Result<Option<DateTime<Utc>>> {
        let conn = self.conn()?;
        let value: Option<Option<String>> = match conn.query_row(
            "SELECT value FROM system_state WHERE key = ?1",
            [key],
            |row| row.get(0),
        ) {
            Ok(v) => Some(v),
            Err(rusqlite::Error::QueryReturnedNoRows) => None,
            Err(e) => return Err(db_err("Read state")(e)),
        };
        Ok(parse_time(value.flatten()))
    }

    fn set_time(&self, key: &str, value: Option<DateTime<Utc>>) -> Result<()> {
        self.conn()?
            .execute(
                "INSERT OR REPLACE INTO system_state (key, value) VALUES (?1, ?2)",
                rusqlite::params![key, value.map(|t| t.to_rfc3339())],
            )
            .map_err(db_err("Write state"))?;
        Ok(())
    }
}

#[async_trait]
impl ActorDirectory for SchedulerDb {
    async fn list_actors(&self) -> Result<Vec<Actor>> {
        self.load_actors()
    }

    async fn set_actor_sleep(&self, actor_id: ActorId, until: Option<DateTime<Utc>>) -> Result<()> {
        if !self.update_actor_sleep(actor_id, until)? {
            return Err(HumanticError::Directory(format!("unknown actor {actor_id}")));
        }
        Ok(())
    }
}

#[async_trait]
impl SystemStateStore for SchedulerDb {
    async fn system_sleep_until(&self) -> Result<Option<DateTime<Utc>>> {
        self.get_time(KEY_SYSTEM_SLEEP_UNTIL)
    }

    async fn set_system_sleep_until(&self, until: Option<DateTime<Utc>>) -> Result<()> {
        self.set_time(KEY_SYSTEM_SLEEP_UNTIL, until)
    }

    async fn last_run_at(&self) -> Result<Option<DateTime<Utc>>> {
        self.get_time(KEY_LAST_RUN_AT)
    }

    async fn next_run_at(&self) -> Result<Option<DateTime<Utc>>> {
        self.get_time(KEY_NEXT_RUN_AT)
    }

    async fn record_run_scheduled(
        &self,
        started_at: DateTime<Utc>,
        next_run_at: DateTime<Utc>,
    ) -> Result<()> {
        self.set_time(KEY_LAST_RUN_AT, Some(started_at))?;
        self.set_time(KEY_NEXT_RUN_AT, Some(next_run_at))
    }
}

impl CheckpointStore for SchedulerDb {
    fn load(&self) -> Option<Checkpoint> {
        let conn = match self.conn() {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!("⚠️ Could not read checkpoint row: {e}");
                return None;
            }
        };
        let data: String = match conn.query_row(
            "SELECT data FROM run_checkpoint WHERE id = 1",
            [],
            |row| row.get(0),
        ) {
            Ok(d) => d,
            Err(rusqlite::Error::QueryReturnedNoRows) => return None,
            Err(e) => {
                tracing::warn!("⚠️ Could not read checkpoint row: {e}");
                return None;
            }
        };
        match serde_json::from_str(&data) {
            Ok(checkpoint) => Some(checkpoint),
            Err(e) => {
                tracing::warn!("⚠️ Corrupt checkpoint row, ignoring: {e}");
                None
            }
        }
    }

    fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        let data = serde_json::to_string(checkpoint)?;
        self.conn()?
            .execute(
                "INSERT OR REPLACE INTO run_checkpoint (id, data, updated_at) VALUES (1, ?1, ?2)",
                rusqlite::params![data, Utc::now().to_rfc3339()],
            )
            .map_err(|e| HumanticError::Checkpoint(format!("Save checkpoint: {e}")))?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.conn()?
            .execute("DELETE FROM run_checkpoint", [])
            .map_err(|e| HumanticError::Checkpoint(format!("Clear checkpoint: {e}")))?;
        Ok(())
    }

    fn try_lock_run(&self) -> Result<Option<RunLock>> {
        match &self.lock_path {
            Some(path) => RunLock::try_file(path),
            None => Ok(RunLock::try_flag(&self.run_flag)),
        }
    }
}
