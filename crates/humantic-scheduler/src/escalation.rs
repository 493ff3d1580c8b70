//! Escalation policy — turns flood signals into actor and system cooldowns.
//!
//! ```text
//! action failure ──classify──► Ok | Other (skip actor) | Flood
//!                                                        │
//!            actor sleep (3–5 days) ◄────────────────────┤
//!            distinct flooded actors ≥ threshold? ──yes──► system sleep + notify → abort run
//!                                     └──no──► orchestrator cooldown (30–90 s) → next actor
//! ```

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use humantic_core::config::{MAX_WINDOW_HOURS, Settings};
use humantic_core::error::{ActionError, Result};
use humantic_core::traits::{ActorDirectory, EscalationHooks, Notifier, SystemStateStore};
use humantic_core::types::ActorId;
use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::notify::format_system_sleep;

const FLOOD_MARKERS: [&str; 5] = [
    "flood",
    "peer_flood",
    "too many requests",
    "too many attempts",
    "slowmode",
];

/// Tagged result of one action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    Ok,
    Flood,
    Other,
}

/// Flood: explicit `ActionError::Flood` or any message mentioning a rate-limit marker.
pub fn is_flood_error(error: &ActionError) -> bool {
    if matches!(error, ActionError::Flood { .. }) {
        return true;
    }
    let message = error.to_string().to_lowercase();
    FLOOD_MARKERS.iter().any(|marker| message.contains(marker))
}

pub fn classify(result: &std::result::Result<(), ActionError>) -> ActionOutcome {
    match result {
        Ok(()) => ActionOutcome::Ok,
        Err(e) if is_flood_error(e) => ActionOutcome::Flood,
        Err(_) => ActionOutcome::Other,
    }
}

/// What the orchestrator does after a flood was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escalation {
    /// Cooldown done, move on to the next actor.
    Continue,
    /// System-wide sleep fired; stop the run and keep the checkpoint.
    AbortRun,
}

/// Uniform random duration in `[min, max]` seconds.
pub(crate) fn random_secs(min: u64, max: u64) -> Duration {
    let secs = if max > min {
        rand::thread_rng().gen_range(min..=max)
    } else {
        min
    };
    Duration::from_secs(secs)
}

/// Uniform random window in `[min, max]` hours, clamped to
/// `[0, MAX_WINDOW_HOURS]` so out-of-range settings cannot overflow.
pub(crate) fn random_hours(min: f64, max: f64) -> chrono::Duration {
    let clamp = |h: f64| if h.is_nan() { 0.0 } else { h.clamp(0.0, MAX_WINDOW_HOURS) };
    let (min, max) = (clamp(min), clamp(max));
    let hours = if max > min {
        rand::thread_rng().gen_range(min..=max)
    } else {
        min
    };
    chrono::Duration::try_seconds((hours * 3600.0).round() as i64).unwrap_or_else(chrono::Duration::zero)
}

/// `from + window`, saturating at the latest representable time.
pub(crate) fn saturating_after(from: DateTime<Utc>, window: chrono::Duration) -> DateTime<Utc> {
    from.checked_add_signed(window).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Per-run flood bookkeeping. A new policy is created for every run.
pub struct EscalationPolicy {
    settings: Settings,
    flooded: HashSet<ActorId>,
    system_sleep_fired: bool,
}

impl EscalationPolicy {
    pub fn new(settings: &Settings) -> Self {
        Self {
            settings: settings.clone(),
            flooded: HashSet::new(),
            system_sleep_fired: false,
        }
    }

    pub fn flooded_count(&self) -> usize {
        self.flooded.len()
    }

    /// Handle a flood from `actor_id`. Hook failures are logged; only the
    /// system-sleep decision changes the control flow.
    pub async fn on_flood(
        &mut self,
        actor_id: ActorId,
        hooks: &dyn EscalationHooks,
        cancel: &CancellationToken,
    ) -> Escalation {
        let now = Utc::now();

        if self.settings.account_sleep_enabled {
            let window = random_hours(
                self.settings.account_sleep_min_days as f64 * 24.0,
                self.settings.account_sleep_max_days as f64 * 24.0,
            );
            let until = saturating_after(now, window);
            tracing::warn!("😴 Actor {actor_id} flooded, sleeping until {until}");
            if let Err(e) = hooks.on_actor_sleep(actor_id, until).await {
                tracing::warn!("⚠️ Failed to persist sleep for actor {actor_id}: {e}");
            }
        }

        self.flooded.insert(actor_id);
        let threshold = self.settings.flood_system_sleep_threshold as usize;
        if self.settings.system_sleep_enabled
            && !self.system_sleep_fired
            && self.flooded.len() >= threshold
        {
            self.system_sleep_fired = true;
            let window = random_hours(
                self.settings.system_sleep_min_hours,
                self.settings.system_sleep_max_hours,
            );
            let until = saturating_after(now, window);
            let reason = format!("{} actors hit flood limits in one run", self.flooded.len());
            tracing::error!("🛑 System sleep until {until}: {reason}");
            if let Err(e) = hooks.on_system_sleep(until, &reason).await {
                tracing::warn!("⚠️ Failed to apply system sleep: {e}");
            }
            return Escalation::AbortRun;
        }

        let cooldown = random_secs(
            self.settings.flood_cooldown_min_secs,
            self.settings.flood_cooldown_max_secs,
        );
        tracing::info!("🧊 Flood cooldown {}s before next actor", cooldown.as_secs());
        tokio::select! {
            _ = tokio::time::sleep(cooldown) => {}
            _ = cancel.cancelled() => {}
        }
        Escalation::Continue
    }
}

/// Hooks backed by the stores: actor sleep goes to the directory, system sleep
/// to the state store plus an operator notification.
pub struct StoreEscalationHooks {
    directory: Arc<dyn ActorDirectory>,
    state: Arc<dyn SystemStateStore>,
    notifier: Arc<dyn Notifier>,
}

impl StoreEscalationHooks {
    pub fn new(
        directory: Arc<dyn ActorDirectory>,
        state: Arc<dyn SystemStateStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            directory,
            state,
            notifier,
        }
    }
}

#[async_trait]
impl EscalationHooks for StoreEscalationHooks {
    async fn on_actor_sleep(&self, actor_id: ActorId, until: DateTime<Utc>) -> Result<()> {
        self.directory.set_actor_sleep(actor_id, Some(until)).await
    }

    async fn on_system_sleep(&self, until: DateTime<Utc>, reason: &str) -> Result<()> {
        self.state.set_system_sleep_until(Some(until)).await?;
        if let Err(e) = self.notifier.notify_operators(&format_system_sleep(until, reason)).await {
            tracing::warn!("⚠️ System sleep notification failed: {e}");
        }
        Ok(())
    }
}
