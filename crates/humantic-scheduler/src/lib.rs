//! # Humantic Scheduler
//!
//! Resumable multi-actor action scheduler.
//!
//! ## Architecture
//! ```text
//! Trigger loop (tokio interval) / CLI
//!   └── Orchestrator::run_all_actors
//!         ├── run lock (per checkpoint, cross-process)
//!         ├── checkpoint: load → fresh or resume
//!         ├── for each actor (sequential)
//!         │     ├── ActorRunner: deterministic shuffled list
//!         │     │     ├── RateLimiter gate (1 action / s / actor)
//!         │     │     ├── ExecutionContext::perform (timeout)
//!         │     │     └── checkpoint save after every action
//!         │     └── EscalationPolicy on failure
//!         │           ├── flood → actor sleep 3–5 days + cooldown
//!         │           └── N flooded actors → system sleep + notify
//!         └── all done → clear checkpoint
//! ```

pub mod catalog;
pub mod checkpoint;
pub mod dispatch;
pub mod escalation;
pub mod lock;
pub mod notify;
pub mod orchestrator;
pub mod persistence;
pub mod policy;
pub mod runner;
pub mod trigger;

#[cfg(test)]
pub(crate) mod testing;

pub use catalog::{ActionPools, LinkPoolDir, PoolSource, build_action_list};
pub use checkpoint::{Checkpoint, CheckpointStore, FileCheckpointStore, Position};
pub use dispatch::{DispatchNotifier, NotifyTarget};
pub use escalation::{ActionOutcome, EscalationPolicy, StoreEscalationHooks};
pub use lock::RunLock;
pub use orchestrator::{Collaborators, Orchestrator, RunOutcome, RunReport};
pub use persistence::SchedulerDb;
pub use policy::RateLimiter;
pub use runner::{ActorRunner, Progress, RunnerError};
pub use trigger::spawn_trigger_loop;
