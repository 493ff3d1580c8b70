//! In-memory fakes for the collaborator traits, shared by the unit tests.

use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use humantic_core::error::{ActionError, HumanticError, Result};
use humantic_core::traits::{
    ActorDirectory, EscalationHooks, ExecutionContext, Notifier, SessionFactory, SystemStateStore,
};
use humantic_core::types::{ActionItem, Actor, ActorId, Credentials};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::catalog::ActionPools;
use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::lock::RunLock;

pub fn actor(id: ActorId) -> Actor {
    Actor::new(
        id,
        &format!("+98912{id:05}"),
        Credentials {
            session: format!("acc_{id}"),
            api_id: Some(1000 + id),
            api_hash: "hash".into(),
        },
    )
}

/// 2 channels, 1 chat, 1 message: 4 actions without leaves, 7 with.
pub fn pools() -> ActionPools {
    ActionPools {
        channels: vec!["https://t.me/alpha".into(), "https://t.me/beta".into()],
        chats: vec!["https://t.me/+gamma".into()],
        messages: vec!["@delta".into()],
    }
}

pub type Journal = Arc<StdMutex<Vec<(ActorId, ActionItem)>>>;

/// Scripted execution context. Call indexes count `perform` calls on this context.
pub struct FakeContext {
    pub actor_id: ActorId,
    pub performed: Vec<ActionItem>,
    /// When each successful `perform` happened, on the tokio clock.
    pub performed_at: Vec<tokio::time::Instant>,
    pub authorized: bool,
    pub fail_at: Option<(usize, ActionError)>,
    pub hang_at: Option<usize>,
    /// Cancel the token once this many actions have completed.
    pub cancel_after: Option<(usize, CancellationToken)>,
    pub journal: Option<Journal>,
    pub closed: Option<Arc<StdMutex<Vec<ActorId>>>>,
}

impl Default for FakeContext {
    fn default() -> Self {
        Self {
            actor_id: 0,
            performed: Vec::new(),
            performed_at: Vec::new(),
            authorized: true,
            fail_at: None,
            hang_at: None,
            cancel_after: None,
            journal: None,
            closed: None,
        }
    }
}

impl FakeContext {
    pub fn failing_at(index: usize, error: ActionError) -> Self {
        Self {
            fail_at: Some((index, error)),
            ..Self::default()
        }
    }
}

#[async_trait]
impl ExecutionContext for FakeContext {
    async fn is_authorized(&mut self) -> std::result::Result<bool, ActionError> {
        Ok(self.authorized)
    }

    async fn perform(&mut self, item: &ActionItem) -> std::result::Result<(), ActionError> {
        let call = self.performed.len();
        if self.hang_at == Some(call) {
            std::future::pending::<()>().await;
        }
        if let Some((index, error)) = &self.fail_at {
            if *index == call {
                return Err(error.clone());
            }
        }
        self.performed.push(item.clone());
        self.performed_at.push(tokio::time::Instant::now());
        if let Some(journal) = &self.journal {
            if let Ok(mut j) = journal.lock() {
                j.push((self.actor_id, item.clone()));
            }
        }
        if let Some((after, token)) = &self.cancel_after {
            if self.performed.len() == *after {
                token.cancel();
            }
        }
        Ok(())
    }

    async fn close(&mut self) {
        if let Some(closed) = &self.closed {
            if let Ok(mut c) = closed.lock() {
                c.push(self.actor_id);
            }
        }
    }
}

/// Per-actor script for `FakeSessions`.
#[derive(Clone, Default)]
pub struct Script {
    pub unauthorized: bool,
    pub open_error: Option<ActionError>,
    pub fail_at: Option<(usize, ActionError)>,
    pub cancel_after: Option<(usize, CancellationToken)>,
}

#[derive(Default)]
pub struct FakeSessions {
    pub scripts: StdMutex<HashMap<ActorId, Script>>,
    pub journal: Journal,
    pub closed: Arc<StdMutex<Vec<ActorId>>>,
}

impl FakeSessions {
    pub fn script(&self, actor_id: ActorId, script: Script) {
        if let Ok(mut s) = self.scripts.lock() {
            s.insert(actor_id, script);
        }
    }

    pub fn clear_scripts(&self) {
        if let Ok(mut s) = self.scripts.lock() {
            s.clear();
        }
    }

    pub fn performed(&self) -> Vec<(ActorId, ActionItem)> {
        self.journal.lock().map(|j| j.clone()).unwrap_or_default()
    }

    pub fn performed_by(&self, actor_id: ActorId) -> Vec<ActionItem> {
        self.performed()
            .into_iter()
            .filter(|(id, _)| *id == actor_id)
            .map(|(_, item)| item)
            .collect()
    }

    pub fn closed(&self) -> Vec<ActorId> {
        self.closed.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl SessionFactory for FakeSessions {
    async fn open(&self, actor: &Actor) -> std::result::Result<Box<dyn ExecutionContext>, ActionError> {
        let script = self
            .scripts
            .lock()
            .ok()
            .and_then(|s| s.get(&actor.id).cloned())
            .unwrap_or_default();
        if let Some(error) = script.open_error {
            return Err(error);
        }
        Ok(Box::new(FakeContext {
            actor_id: actor.id,
            authorized: !script.unauthorized,
            fail_at: script.fail_at,
            cancel_after: script.cancel_after,
            journal: Some(self.journal.clone()),
            closed: Some(self.closed.clone()),
            ..FakeContext::default()
        }))
    }
}

#[derive(Default)]
pub struct FakeDirectory {
    pub actors: Mutex<Vec<Actor>>,
}

impl FakeDirectory {
    pub fn with(actors: Vec<Actor>) -> Self {
        Self {
            actors: Mutex::new(actors),
        }
    }
}

#[async_trait]
impl ActorDirectory for FakeDirectory {
    async fn list_actors(&self) -> Result<Vec<Actor>> {
        Ok(self.actors.lock().await.clone())
    }

    async fn set_actor_sleep(&self, actor_id: ActorId, until: Option<DateTime<Utc>>) -> Result<()> {
        let mut actors = self.actors.lock().await;
        let actor = actors
            .iter_mut()
            .find(|a| a.id == actor_id)
            .ok_or_else(|| HumanticError::Directory(format!("unknown actor {actor_id}")))?;
        actor.sleep_until = until;
        Ok(())
    }
}

/// Checkpoint store that keeps the record in memory and counts writes.
#[derive(Default)]
pub struct MemoryCheckpoints {
    pub record: StdMutex<Option<Checkpoint>>,
    pub saves: StdMutex<usize>,
    pub fail_saves: StdMutex<bool>,
    pub running: Arc<AtomicBool>,
}

impl MemoryCheckpoints {
    pub fn get(&self) -> Option<Checkpoint> {
        self.record.lock().ok().and_then(|r| r.clone())
    }

    pub fn put(&self, checkpoint: Checkpoint) {
        if let Ok(mut r) = self.record.lock() {
            *r = Some(checkpoint);
        }
    }

    pub fn save_count(&self) -> usize {
        self.saves.lock().map(|s| *s).unwrap_or_default()
    }
}

impl CheckpointStore for MemoryCheckpoints {
    fn load(&self) -> Option<Checkpoint> {
        self.get()
    }

    fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        if self.fail_saves.lock().map(|f| *f).unwrap_or(false) {
            return Err(HumanticError::Checkpoint("disk full".into()));
        }
        if let Ok(mut s) = self.saves.lock() {
            *s += 1;
        }
        self.put(checkpoint.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        if let Ok(mut r) = self.record.lock() {
            *r = None;
        }
        Ok(())
    }

    fn try_lock_run(&self) -> Result<Option<RunLock>> {
        Ok(RunLock::try_flag(&self.running))
    }
}

#[derive(Default)]
pub struct MemoryState {
    pub system_sleep_until: Mutex<Option<DateTime<Utc>>>,
    pub last_run_at: Mutex<Option<DateTime<Utc>>>,
    pub next_run_at: Mutex<Option<DateTime<Utc>>>,
}

#[async_trait]
impl SystemStateStore for MemoryState {
    async fn system_sleep_until(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(*self.system_sleep_until.lock().await)
    }

    async fn set_system_sleep_until(&self, until: Option<DateTime<Utc>>) -> Result<()> {
        *self.system_sleep_until.lock().await = until;
        Ok(())
    }

    async fn last_run_at(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(*self.last_run_at.lock().await)
    }

    async fn next_run_at(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(*self.next_run_at.lock().await)
    }

    async fn record_run_scheduled(
        &self,
        started_at: DateTime<Utc>,
        next_run_at: DateTime<Utc>,
    ) -> Result<()> {
        *self.last_run_at.lock().await = Some(started_at);
        *self.next_run_at.lock().await = Some(next_run_at);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub async fn messages(&self) -> Vec<String> {
        self.messages.lock().await.clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_operators(&self, message: &str) -> Result<()> {
        if self.fail {
            return Err(HumanticError::Notify("bot blocked".into()));
        }
        self.messages.lock().await.push(message.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingHooks {
    actor_sleeps: Mutex<Vec<(ActorId, DateTime<Utc>)>>,
    system_sleeps: Mutex<Vec<(DateTime<Utc>, String)>>,
}

impl RecordingHooks {
    pub async fn actor_sleeps(&self) -> Vec<(ActorId, DateTime<Utc>)> {
        self.actor_sleeps.lock().await.clone()
    }

    pub async fn system_sleeps(&self) -> Vec<(DateTime<Utc>, String)> {
        self.system_sleeps.lock().await.clone()
    }
}

#[async_trait]
impl EscalationHooks for RecordingHooks {
    async fn on_actor_sleep(&self, actor_id: ActorId, until: DateTime<Utc>) -> Result<()> {
        self.actor_sleeps.lock().await.push((actor_id, until));
        Ok(())
    }

    async fn on_system_sleep(&self, until: DateTime<Utc>, reason: &str) -> Result<()> {
        self.system_sleeps.lock().await.push((until, reason.to_string()));
        Ok(())
    }
}
