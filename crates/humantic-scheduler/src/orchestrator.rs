//! Orchestrator — one run over all actors, resumable and single-flight.
//!
//! ```text
//! INIT ─► load/create checkpoint ─► for each actor:
//!            completed / sleeping / no credentials / unauthorized ─► skip
//!            run actions ─► done: mark completed
//!                        ├► flood: escalate (maybe ABORT)
//!                        └► other failure: skip actor
//!         ─► ALL_DONE (clear checkpoint) | ABORTED | INTERRUPTED (checkpoint kept)
//! ```

use std::sync::Arc;

use chrono::Utc;
use humantic_core::error::{HumanticError, Result};
use humantic_core::traits::{
    ActorDirectory, EscalationHooks, Notifier, SessionFactory, SettingsSource, SystemStateStore,
};
use humantic_core::types::{Actor, ActorId};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::catalog::PoolSource;
use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::escalation::{ActionOutcome, Escalation, EscalationPolicy, StoreEscalationHooks, classify};
use crate::notify::{ActivityLog, format_actor_end, format_actor_start, format_run_end, format_run_start};
use crate::policy::RateLimiter;
use crate::runner::{ActorRunner, Progress, RunnerError};

/// Everything the orchestrator talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub directory: Arc<dyn ActorDirectory>,
    pub sessions: Arc<dyn SessionFactory>,
    pub checkpoints: Arc<dyn CheckpointStore>,
    pub settings: Arc<dyn SettingsSource>,
    pub pools: Arc<dyn PoolSource>,
    pub state: Arc<dyn SystemStateStore>,
    pub notifier: Arc<dyn Notifier>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every actor was processed; the checkpoint was cleared.
    Completed,
    /// System-wide sleep fired; the checkpoint is kept.
    Aborted,
    /// Cancelled between actions; the checkpoint is kept.
    Interrupted,
    /// Nothing ran (deep sleep or no actors).
    Skipped,
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunOutcome::Completed => write!(f, "completed"),
            RunOutcome::Aborted => write!(f, "aborted"),
            RunOutcome::Interrupted => write!(f, "interrupted"),
            RunOutcome::Skipped => write!(f, "skipped"),
        }
    }
}

/// Summary of one `run_all_actors` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub run_id: Option<String>,
    pub resumed: bool,
    /// Actors that finished their list in this call.
    pub completed: usize,
    /// Actors finished by an earlier process of the same run.
    pub already_done: usize,
    pub skipped: usize,
    pub failed: usize,
    pub flooded: usize,
    pub actions_performed: usize,
    pub outcome: RunOutcome,
}

impl RunReport {
    fn new(run_id: &str, resumed: bool) -> Self {
        Self {
            run_id: Some(run_id.to_string()),
            resumed,
            completed: 0,
            already_done: 0,
            skipped: 0,
            failed: 0,
            flooded: 0,
            actions_performed: 0,
            outcome: RunOutcome::Completed,
        }
    }

    fn skipped() -> Self {
        Self {
            run_id: None,
            resumed: false,
            completed: 0,
            already_done: 0,
            skipped: 0,
            failed: 0,
            flooded: 0,
            actions_performed: 0,
            outcome: RunOutcome::Skipped,
        }
    }
}

pub struct Orchestrator {
    c: Collaborators,
    limiter: RateLimiter,
    run_lock: Mutex<()>,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(collaborators: Collaborators) -> Self {
        Self {
            c: collaborators,
            limiter: RateLimiter::default(),
            run_lock: Mutex::new(()),
            cancel: CancellationToken::new(),
        }
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.c
    }

    /// Token observed between actions, during delays and cooldowns.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_running(&self) -> bool {
        self.run_lock.try_lock().is_err()
    }

    /// Escalation hooks backed by this orchestrator's directory, state store and notifier.
    pub fn store_hooks(&self) -> StoreEscalationHooks {
        StoreEscalationHooks::new(
            self.c.directory.clone(),
            self.c.state.clone(),
            self.c.notifier.clone(),
        )
    }

    /// Run (or resume) the current campaign over all actors.
    /// A second call while one is in progress fails with `AlreadyRunning`.
    pub async fn run_all_actors(&self, hooks: &dyn EscalationHooks) -> Result<RunReport> {
        let _guard = self
            .run_lock
            .try_lock()
            .map_err(|_| HumanticError::AlreadyRunning)?;
        let Some(_lease) = self.c.checkpoints.try_lock_run()? else {
            tracing::info!("🔒 Another process is running this campaign");
            return Err(HumanticError::AlreadyRunning);
        };

        let now = Utc::now();
        if let Some(until) = self.c.state.system_sleep_until().await? {
            if now < until {
                tracing::info!("😴 System in deep sleep until {until}, skipping run");
                return Ok(RunReport::skipped());
            }
        }

        let settings = self.c.settings.load_settings().await?;
        self.limiter.reset_all().await;
        self.limiter.set_min_interval(settings.min_action_interval()).await;
        let pools = self.c.pools.load_pools();
        let actors = self.c.directory.list_actors().await?;
        if actors.is_empty() {
            tracing::info!("📭 No actors in directory, nothing to run");
            return Ok(RunReport::skipped());
        }

        let (mut checkpoint, resumed) = match self.c.checkpoints.load() {
            Some(cp) if cp.is_recent(now, settings.checkpoint_freshness()) => {
                tracing::info!(
                    "⏯️ Resuming run {}: {} actor(s) done, current={:?}",
                    cp.run_id,
                    cp.completed_actor_ids.len(),
                    cp.current
                );
                (cp, true)
            }
            stale => {
                if let Some(old) = stale {
                    tracing::info!("🗑️ Discarding stale checkpoint of run {}", old.run_id);
                }
                let cp = Checkpoint::fresh(now);
                self.c.checkpoints.save(&cp)?;
                tracing::info!("🆕 New run {} for {} actor(s)", cp.run_id, actors.len());
                (cp, false)
            }
        };
        let run_id = checkpoint.run_id.clone();

        let activity = ActivityLog::new(self.c.notifier.clone(), settings.activity_log);
        activity
            .send(format_run_start(&run_id, actors.len(), resumed, Utc::now()))
            .await;

        let runner = ActorRunner {
            limiter: &self.limiter,
            pools: &pools,
            settings: &settings,
            activity: &activity,
            cancel: &self.cancel,
        };
        let mut escalation = EscalationPolicy::new(&settings);
        let mut report = RunReport::new(&run_id, resumed);

        for actor in &actors {
            if self.cancel.is_cancelled() {
                report.outcome = RunOutcome::Interrupted;
                break;
            }
            if checkpoint.is_completed(actor.id) {
                report.already_done += 1;
                continue;
            }
            if !self.is_runnable(actor) {
                report.skipped += 1;
                continue;
            }

            let mut ctx = match self.c.sessions.open(actor).await {
                Ok(ctx) => ctx,
                Err(e) => {
                    tracing::warn!("⚠️ Actor {} could not connect, skip: {e}", actor.id);
                    report.skipped += 1;
                    continue;
                }
            };
            match ctx.is_authorized().await {
                Ok(true) => {}
                Ok(false) => {
                    tracing::warn!("⚠️ Actor {} ({}) not authorized, skip", actor.id, actor.short_label());
                    ctx.close().await;
                    report.skipped += 1;
                    continue;
                }
                Err(e) => {
                    tracing::warn!("⚠️ Actor {} authorization check failed, skip: {e}", actor.id);
                    ctx.close().await;
                    report.skipped += 1;
                    continue;
                }
            }

            tracing::info!("▶️ Starting actor {} ({})", actor.id, actor.short_label());
            activity.send(format_actor_start(actor, Utc::now())).await;

            let resume = checkpoint.resume_point(actor.id).cloned();
            let result = {
                let store = &self.c.checkpoints;
                let checkpoint = &mut checkpoint;
                let mut persist = |actor_id: ActorId, progress: Progress| -> Result<()> {
                    match progress {
                        Progress::Actions { next_index } => checkpoint.advance(actor_id, next_index),
                        Progress::Done => checkpoint.mark_completed(actor_id),
                    }
                    store.save(checkpoint)
                };
                runner
                    .run_for_actor(ctx.as_mut(), actor, &run_id, resume.as_ref(), &mut persist)
                    .await
            };
            ctx.close().await;
            self.limiter.reset(actor.id).await;

            let success = result.is_ok();
            activity.send(format_actor_end(actor, success, Utc::now())).await;

            match result {
                Ok(performed) => {
                    report.completed += 1;
                    report.actions_performed += performed;
                    tracing::info!(
                        "🏁 Actor {} finished; {} completed so far",
                        actor.id,
                        checkpoint.completed_actor_ids.len()
                    );
                }
                Err(RunnerError::Interrupted) => {
                    tracing::info!("⏸️ Run {run_id} interrupted at actor {}", actor.id);
                    report.outcome = RunOutcome::Interrupted;
                    break;
                }
                Err(RunnerError::Persist(e)) => {
                    tracing::error!("❌ Checkpoint write failed, stopping run {run_id}: {e}");
                    return Err(e);
                }
                Err(RunnerError::Action { error, .. }) => match classify(&Err(error)) {
                    ActionOutcome::Flood => {
                        report.flooded += 1;
                        if escalation.on_flood(actor.id, hooks, &self.cancel).await
                            == Escalation::AbortRun
                        {
                            report.outcome = RunOutcome::Aborted;
                            break;
                        }
                    }
                    ActionOutcome::Other | ActionOutcome::Ok => {
                        report.failed += 1;
                    }
                },
            }
        }

        if report.outcome == RunOutcome::Completed {
            self.c.checkpoints.clear()?;
        }
        tracing::info!(
            "🤖 Run {run_id} {}: {} completed, {} skipped, {} failed, {} flooded",
            report.outcome,
            report.completed,
            report.skipped,
            report.failed,
            report.flooded
        );
        activity
            .send(format_run_end(
                &run_id,
                checkpoint.completed_actor_ids.len(),
                &report.outcome.to_string(),
                Utc::now(),
            ))
            .await;
        Ok(report)
    }

    fn is_runnable(&self, actor: &Actor) -> bool {
        if actor.is_sleeping(Utc::now()) {
            tracing::info!("😴 Actor {} sleeping until {:?}, skip", actor.id, actor.sleep_until);
            return false;
        }
        if !actor.credentials.is_complete() {
            tracing::warn!(
                "⚠️ Actor {} ({}) missing session/api_id/api_hash, skip",
                actor.id,
                actor.short_label()
            );
            return false;
        }
        true
    }
}
