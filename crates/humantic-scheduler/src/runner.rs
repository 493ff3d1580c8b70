//! Drives one actor through its action list.
//!
//! Progress is reported after every successful action so the caller can persist
//! it before the next one starts. A failed action is not reported, so a resumed
//! run re-attempts it.

use std::time::Duration;

use humantic_core::config::Settings;
use humantic_core::error::{ActionError, HumanticError};
use humantic_core::traits::ExecutionContext;
use humantic_core::types::{ActionItem, Actor, ActorId};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::catalog::{ActionPools, action_seed, build_action_list};
use crate::checkpoint::{Position, Step};
use crate::escalation::random_secs;
use crate::notify::{ActivityLog, format_action};
use crate::policy::RateLimiter;

/// Progress report passed to the persistence callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// The actor continues at `next_index`.
    Actions { next_index: usize },
    /// Every action of the actor is done.
    Done,
}

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("action {index} ({}) on {} failed: {error}", .item.kind, .item.target)]
    Action {
        index: usize,
        item: ActionItem,
        error: ActionError,
    },

    #[error("run cancelled")]
    Interrupted,

    #[error("could not persist progress: {0}")]
    Persist(HumanticError),
}

pub type ProgressFn<'f> = dyn FnMut(ActorId, Progress) -> humantic_core::Result<()> + Send + 'f;

/// Executes one actor's deterministic action list.
pub struct ActorRunner<'a> {
    pub limiter: &'a RateLimiter,
    pub pools: &'a ActionPools,
    pub settings: &'a Settings,
    pub activity: &'a ActivityLog,
    pub cancel: &'a CancellationToken,
}

impl ActorRunner<'_> {
    /// Index to start from: the saved index if `resume` names this actor at the
    /// actions step, clamped to the list length; otherwise 0.
    pub fn start_index(actor_id: ActorId, resume: Option<&Position>, len: usize) -> usize {
        match resume {
            Some(p) if p.actor_id == actor_id && p.step == Step::Actions => p.index.min(len),
            _ => 0,
        }
    }

    /// Run (or resume) `actor` for `run_id`. Returns the number of actions performed.
    pub async fn run_for_actor(
        &self,
        ctx: &mut dyn ExecutionContext,
        actor: &Actor,
        run_id: &str,
        resume: Option<&Position>,
        on_progress: &mut ProgressFn<'_>,
    ) -> Result<usize, RunnerError> {
        let actions = build_action_list(
            self.pools,
            action_seed(run_id, actor.id),
            self.settings.include_leave,
        );
        if actions.is_empty() {
            tracing::info!("📭 Actor {} has nothing to do", actor.id);
            on_progress(actor.id, Progress::Done).map_err(RunnerError::Persist)?;
            return Ok(0);
        }

        let start = Self::start_index(actor.id, resume, actions.len());
        if start > 0 {
            tracing::info!(
                "⏯️ Resuming actor {} at action {}/{}",
                actor.id,
                start + 1,
                actions.len()
            );
        }

        let mut performed = 0;
        for (index, item) in actions.iter().enumerate().skip(start) {
            if self.cancel.is_cancelled() {
                return Err(RunnerError::Interrupted);
            }

            self.limiter.wait_before_action(actor.id).await;
            let result = tokio::time::timeout(self.settings.action_timeout(), ctx.perform(item))
                .await
                .unwrap_or(Err(ActionError::Timeout(self.settings.action_timeout_secs)));
            self.limiter.record_action_done(actor.id).await;

            if let Err(error) = result {
                tracing::warn!(
                    "⚠️ Actor {} action {} ({} {}) failed: {error}",
                    actor.id,
                    index,
                    item.kind,
                    item.target
                );
                let message = format_action(
                    actor.id,
                    actor.short_label(),
                    item,
                    Some(&error.to_string()),
                    chrono::Utc::now(),
                );
                self.activity.send(message).await;
                return Err(RunnerError::Action {
                    index,
                    item: item.clone(),
                    error,
                });
            }

            performed += 1;
            on_progress(actor.id, Progress::Actions { next_index: index + 1 })
                .map_err(RunnerError::Persist)?;
            tracing::debug!("✅ Actor {} {} {}", actor.id, item.kind, item.target);
            self.activity
                .send(format_action(actor.id, actor.short_label(), item, None, chrono::Utc::now()))
                .await;

            if index + 1 < actions.len() {
                self.pause().await;
            }
        }

        on_progress(actor.id, Progress::Done).map_err(RunnerError::Persist)?;
        Ok(performed)
    }

    /// Random inter-action delay, cut short by cancellation.
    async fn pause(&self) {
        let delay: Duration = random_secs(self.settings.delay_min_secs, self.settings.delay_max_secs);
        tracing::debug!("💤 Waiting {}s before next action", delay.as_secs());
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = self.cancel.cancelled() => {}
        }
    }
}
