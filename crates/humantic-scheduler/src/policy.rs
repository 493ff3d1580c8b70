//! Grand policy — per-actor pacing applied before every action.
//!
//! Each actor has its own clock: ten actors may act in the same second,
//! but a single actor never acts twice within `min_interval`.

use std::collections::HashMap;
use std::time::Duration;

use humantic_core::types::ActorId;
use tokio::sync::Mutex;
use tokio::time::Instant;

struct LimiterState {
    min_interval: Duration,
    last_action: HashMap<ActorId, Instant>,
}

pub struct RateLimiter {
    state: Mutex<LimiterState>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            state: Mutex::new(LimiterState {
                min_interval,
                last_action: HashMap::new(),
            }),
        }
    }

    pub async fn min_interval(&self) -> Duration {
        self.state.lock().await.min_interval
    }

    /// Applies from the next `wait_before_action` on.
    pub async fn set_min_interval(&self, min_interval: Duration) {
        self.state.lock().await.min_interval = min_interval;
    }

    /// Suspend until `actor_id` is allowed to act again. Returns immediately for a fresh actor.
    pub async fn wait_before_action(&self, actor_id: ActorId) {
        let wait = {
            let state = self.state.lock().await;
            state
                .last_action
                .get(&actor_id)
                .map(|last| state.min_interval.saturating_sub(last.elapsed()))
                .unwrap_or_default()
        };
        if !wait.is_zero() {
            tracing::debug!("⏳ Grand policy: actor {actor_id} waits {:.2}s", wait.as_secs_f64());
            tokio::time::sleep(wait).await;
        }
    }

    /// Stamp "now" as the actor's last action. Called after success and failure alike.
    pub async fn record_action_done(&self, actor_id: ActorId) {
        self.state.lock().await.last_action.insert(actor_id, Instant::now());
    }

    pub async fn reset(&self, actor_id: ActorId) {
        self.state.lock().await.last_action.remove(&actor_id);
    }

    pub async fn reset_all(&self) {
        self.state.lock().await.last_action.clear();
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}
