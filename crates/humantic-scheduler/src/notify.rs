//! Operator notifications — message formatting and the activity log.
//! The activity log never fails a run: notifier errors are logged and dropped.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use humantic_core::traits::Notifier;
use humantic_core::types::{ActionItem, Actor, ActorId};
use serde::{Deserialize, Serialize};

/// A notification to send to operators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub priority: NotifyPriority,
    /// Which component produced it.
    pub source: String,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    pub fn new(title: &str, body: &str, source: &str, priority: NotifyPriority) -> Self {
        Self {
            title: title.to_string(),
            body: body.to_string(),
            priority,
            source: source.to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// Notification priority.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum NotifyPriority {
    Low,
    Normal,
    High,
    Urgent,
}

fn stamp(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

pub fn format_run_start(run_id: &str, total_actors: usize, resumed: bool, now: DateTime<Utc>) -> String {
    let mode = if resumed { "resumed" } else { "new" };
    format!(
        "🤖 Humantic run started ({mode})\nRun: {run_id}\nActors: {total_actors}\nTime: {}",
        stamp(now)
    )
}

pub fn format_run_end(run_id: &str, completed: usize, outcome: &str, now: DateTime<Utc>) -> String {
    format!(
        "🤖 Humantic run finished\nRun: {run_id}\nActors completed: {completed}\nOutcome: {outcome}\nTime: {}",
        stamp(now)
    )
}

pub fn format_actor_start(actor: &Actor, now: DateTime<Utc>) -> String {
    format!(
        "▶️ Actor started\nActor: {}\nLabel: {}\nTime: {}",
        actor.id,
        actor.short_label(),
        stamp(now)
    )
}

pub fn format_actor_end(actor: &Actor, success: bool, now: DateTime<Utc>) -> String {
    let status = if success { "✅ ok" } else { "❌ failed" };
    format!(
        "⏹ Actor finished\nActor: {}\nLabel: {}\nStatus: {status}\nTime: {}",
        actor.id,
        actor.short_label(),
        stamp(now)
    )
}

/// One action line. Long targets are cut at 60 characters.
pub fn format_action(
    actor_id: ActorId,
    label: &str,
    item: &ActionItem,
    error: Option<&str>,
    now: DateTime<Utc>,
) -> String {
    let status = match error {
        None => "✅ ok".to_string(),
        Some(e) => format!("❌ error: {e}"),
    };
    let target = if item.target.chars().count() > 60 {
        let cut: String = item.target.chars().take(60).collect();
        format!("{cut}…")
    } else {
        item.target.clone()
    };
    format!(
        "📌 Action\nActor: id={actor_id} | {label}\nKind: {}\nTarget: {target}\nStatus: {status}\nTime: {}",
        item.kind.label(),
        stamp(now)
    )
}

pub fn format_system_sleep(until: DateTime<Utc>, reason: &str) -> String {
    format!(
        "🚨 Humantic paused system-wide\nReason: {reason}\nResumes after: {}",
        stamp(until)
    )
}

/// Optional run/actor/action messages to the operator channel.
#[derive(Clone)]
pub struct ActivityLog {
    notifier: Option<Arc<dyn Notifier>>,
}

impl ActivityLog {
    pub fn new(notifier: Arc<dyn Notifier>, enabled: bool) -> Self {
        Self {
            notifier: enabled.then_some(notifier),
        }
    }

    pub fn disabled() -> Self {
        Self { notifier: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.notifier.is_some()
    }

    pub async fn send(&self, message: String) {
        let Some(notifier) = &self.notifier else {
            return;
        };
        if let Err(e) = notifier.notify_operators(&message).await {
            tracing::warn!("⚠️ Activity log delivery failed: {e}");
        }
    }
}
