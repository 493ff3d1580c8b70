//! Dry-run bridge: no network, every action succeeds and is logged.
//! Useful to exercise scheduling, pacing and checkpoints end to end.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use humantic_core::error::ActionError;
use humantic_core::traits::{ExecutionContext, SessionFactory};
use humantic_core::types::{ActionItem, Actor, ActorId};

#[derive(Default)]
pub struct DryRunFactory {
    performed: Arc<AtomicUsize>,
}

impl DryRunFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total actions performed by all sessions of this factory.
    pub fn performed(&self) -> usize {
        self.performed.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl SessionFactory for DryRunFactory {
    async fn open(&self, actor: &Actor) -> Result<Box<dyn ExecutionContext>, ActionError> {
        Ok(Box::new(DryRunSession {
            actor_id: actor.id,
            authorized: actor.credentials.is_complete(),
            performed: self.performed.clone(),
        }))
    }
}

pub struct DryRunSession {
    actor_id: ActorId,
    authorized: bool,
    performed: Arc<AtomicUsize>,
}

#[async_trait]
impl ExecutionContext for DryRunSession {
    async fn is_authorized(&mut self) -> Result<bool, ActionError> {
        Ok(self.authorized)
    }

    async fn perform(&mut self, item: &ActionItem) -> Result<(), ActionError> {
        self.performed.fetch_add(1, Ordering::Relaxed);
        tracing::info!("🧪 [dry-run] actor {} {} {}", self.actor_id, item.kind, item.target);
        Ok(())
    }

    async fn close(&mut self) {}
}
