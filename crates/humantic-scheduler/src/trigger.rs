//! Trigger loop — starts a run when activity is enabled, the system is awake
//! and the randomized run interval has elapsed.
//! Uses tokio::interval, so it sleeps between checks.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use humantic_core::config::Settings;
use humantic_core::error::{HumanticError, Result};
use humantic_core::traits::EscalationHooks;
use tokio::task::JoinHandle;

use crate::escalation::{random_hours, saturating_after};
use crate::orchestrator::Orchestrator;

/// Whether a run should start at `now`.
pub fn run_is_due(
    settings: &Settings,
    now: DateTime<Utc>,
    next_run_at: Option<DateTime<Utc>>,
    system_sleep_until: Option<DateTime<Utc>>,
) -> bool {
    if !settings.enabled {
        return false;
    }
    if system_sleep_until.is_some_and(|until| now < until) {
        return false;
    }
    next_run_at.is_none_or(|next| now >= next)
}

/// Next run time: `from` plus a random interval in `[run_interval_min_hours, run_interval_max_hours]`.
pub fn next_run_after(settings: &Settings, from: DateTime<Utc>) -> DateTime<Utc> {
    let window = random_hours(settings.run_interval_min_hours, settings.run_interval_max_hours);
    saturating_after(from, window)
}

/// One check of the trigger loop. Returns whether a run was started.
pub async fn tick(orchestrator: &Orchestrator, hooks: &dyn EscalationHooks) -> Result<bool> {
    let c = orchestrator.collaborators();
    let settings = c.settings.load_settings().await?;
    let now = Utc::now();
    let next_run_at = c.state.next_run_at().await?;
    let sleep_until = c.state.system_sleep_until().await?;
    if !run_is_due(&settings, now, next_run_at, sleep_until) {
        return Ok(false);
    }

    let next = next_run_after(&settings, now);
    c.state.record_run_scheduled(now, next).await?;
    tracing::info!("🔔 Humantic run triggered (next at {next})");

    match orchestrator.run_all_actors(hooks).await {
        Ok(report) => {
            tracing::info!(
                "📣 Run {} {}: {} actions by {} actor(s)",
                report.run_id.as_deref().unwrap_or("-"),
                report.outcome,
                report.actions_performed,
                report.completed
            );
            Ok(true)
        }
        Err(HumanticError::AlreadyRunning) => {
            tracing::info!("⏳ Previous run still in progress");
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

/// Spawn the trigger loop as a background tokio task. Stops when the
/// orchestrator's cancel token fires.
pub fn spawn_trigger_loop(
    orchestrator: Arc<Orchestrator>,
    hooks: Arc<dyn EscalationHooks>,
    check_interval: std::time::Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!("⏰ Trigger loop started (check every {}s)", check_interval.as_secs());
        let cancel = orchestrator.cancel_token();
        let mut interval = tokio::time::interval(check_interval);

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = cancel.cancelled() => break,
            }
            if let Err(e) = tick(&orchestrator, hooks.as_ref()).await {
                tracing::warn!("⚠️ Trigger check failed: {e}");
            }
        }
        tracing::info!("⏹ Trigger loop stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::{Collaborators, RunOutcome};
    use crate::testing::*;
    use chrono::Duration;
    use humantic_core::traits::SystemStateStore;

    #[test]
    fn test_run_is_due() {
        let now = Utc::now();
        let settings = Settings::default();
        assert!(run_is_due(&settings, now, None, None));
        assert!(run_is_due(&settings, now, Some(now - Duration::minutes(1)), None));
        assert!(!run_is_due(&settings, now, Some(now + Duration::minutes(1)), None));
        assert!(!run_is_due(&settings, now, None, Some(now + Duration::hours(1))));
        assert!(run_is_due(&settings, now, None, Some(now - Duration::hours(1))));

        let disabled = Settings {
            enabled: false,
            ..Settings::default()
        };
        assert!(!run_is_due(&disabled, now, None, None));
    }

    #[test]
    fn test_next_run_within_interval() {
        let now = Utc::now();
        let settings = Settings::default();
        for _ in 0..20 {
            let next = next_run_after(&settings, now);
            assert!(next >= now + Duration::hours(4) && next <= now + Duration::hours(6));
        }
    }

    #[test]
    fn test_next_run_with_oversized_interval_does_not_overflow() {
        let now = Utc::now();
        let settings = Settings {
            run_interval_min_hours: 1e13,
            run_interval_max_hours: f64::INFINITY,
            ..Settings::default()
        };
        let next = next_run_after(&settings, now);
        assert!(next <= now + Duration::hours(humantic_core::config::MAX_WINDOW_HOURS as i64));

        let near_end = DateTime::<Utc>::MAX_UTC - Duration::hours(1);
        assert_eq!(next_run_after(&Settings::default(), near_end), DateTime::<Utc>::MAX_UTC);
    }

    fn orchestrator(state: Arc<MemoryState>, sessions: Arc<FakeSessions>) -> Orchestrator {
        Orchestrator::new(Collaborators {
            directory: Arc::new(FakeDirectory::with(vec![actor(1)])),
            sessions,
            checkpoints: Arc::new(MemoryCheckpoints::default()),
            settings: Arc::new(Settings {
                delay_min_secs: 1,
                delay_max_secs: 1,
                ..Settings::default()
            }),
            pools: Arc::new(pools()),
            state,
            notifier: Arc::new(RecordingNotifier::default()),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_runs_once_then_waits() {
        let state = Arc::new(MemoryState::default());
        let sessions = Arc::new(FakeSessions::default());
        let orch = orchestrator(state.clone(), sessions.clone());
        let hooks = RecordingHooks::default();

        assert!(tick(&orch, &hooks).await.unwrap());
        assert_eq!(sessions.performed_by(1).len(), 7);
        assert!(state.last_run_at().await.unwrap().is_some());
        let next = state.next_run_at().await.unwrap().unwrap();
        assert!(next > Utc::now() + Duration::hours(3));

        // Interval has not elapsed yet.
        assert!(!tick(&orch, &hooks).await.unwrap());
        assert_eq!(sessions.performed_by(1).len(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_trigger_loop_stops_on_cancel() {
        let state = Arc::new(MemoryState::default());
        let sessions = Arc::new(FakeSessions::default());
        let orch = Arc::new(orchestrator(state.clone(), sessions.clone()));
        let cancel = orch.cancel_token();

        let handle = spawn_trigger_loop(
            orch.clone(),
            Arc::new(RecordingHooks::default()),
            std::time::Duration::from_secs(300),
        );
        tokio::time::sleep(std::time::Duration::from_secs(60)).await;
        cancel.cancel();
        handle.await.unwrap();

        assert!(state.last_run_at().await.unwrap().is_some());
        assert_eq!(sessions.performed_by(1).len(), 7);
        assert!(!orch.is_running());
        let report_after_cancel = orch.run_all_actors(&RecordingHooks::default()).await.unwrap();
        // The token stays cancelled, so a further run stops before the first actor.
        assert_eq!(report_after_cancel.outcome, RunOutcome::Interrupted);
    }
}
