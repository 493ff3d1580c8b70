//! Narrow seams the scheduler calls into.
//!
//! Implementations live elsewhere: SQLite directory/state in `humantic-scheduler`,
//! HTTP bridge and dry-run sessions in `humantic-bridge`, config-file settings here.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::Settings;
use crate::error::{ActionError, Result};
use crate::types::{ActionItem, Actor, ActorId};

/// Source of actors and owner of their sleep windows.
#[async_trait]
pub trait ActorDirectory: Send + Sync {
    /// All actors, in the order they should be processed.
    async fn list_actors(&self) -> Result<Vec<Actor>>;

    /// Set (or clear, with `None`) the actor's deep-sleep window.
    async fn set_actor_sleep(&self, actor_id: ActorId, until: Option<DateTime<Utc>>)
    -> Result<()>;
}

/// A live connection on behalf of one actor. Performs actions against the remote service.
#[async_trait]
pub trait ExecutionContext: Send {
    /// Whether the actor's session is currently usable.
    async fn is_authorized(&mut self) -> std::result::Result<bool, ActionError>;

    /// Perform one action. Errors are classified by the escalation policy.
    async fn perform(&mut self, item: &ActionItem) -> std::result::Result<(), ActionError>;

    /// Release the connection. Failures are logged by the implementation.
    async fn close(&mut self);
}

/// Opens execution contexts for actors.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(
        &self,
        actor: &Actor,
    ) -> std::result::Result<Box<dyn ExecutionContext>, ActionError>;
}

/// Operator notification channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_operators(&self, message: &str) -> Result<()>;
}

/// Run-time settings, re-read once per run.
#[async_trait]
pub trait SettingsSource: Send + Sync {
    async fn load_settings(&self) -> Result<Settings>;
}

#[async_trait]
impl SettingsSource for Settings {
    async fn load_settings(&self) -> Result<Settings> {
        Ok(self.clone())
    }
}

/// System-wide bookkeeping: deep sleep and run cadence.
#[async_trait]
pub trait SystemStateStore: Send + Sync {
    async fn system_sleep_until(&self) -> Result<Option<DateTime<Utc>>>;

    async fn set_system_sleep_until(&self, until: Option<DateTime<Utc>>) -> Result<()>;

    async fn last_run_at(&self) -> Result<Option<DateTime<Utc>>>;

    async fn next_run_at(&self) -> Result<Option<DateTime<Utc>>>;

    /// Record that a run started at `started_at` and the next one is due at `next_run_at`.
    async fn record_run_scheduled(
        &self,
        started_at: DateTime<Utc>,
        next_run_at: DateTime<Utc>,
    ) -> Result<()>;
}

/// Callbacks fired by the escalation policy when flood signals accumulate.
#[async_trait]
pub trait EscalationHooks: Send + Sync {
    /// Persist a cooldown window for one actor.
    async fn on_actor_sleep(&self, actor_id: ActorId, until: DateTime<Utc>) -> Result<()>;

    /// Pause all processing until `until` and notify operators.
    async fn on_system_sleep(&self, until: DateTime<Utc>, reason: &str) -> Result<()>;
}
