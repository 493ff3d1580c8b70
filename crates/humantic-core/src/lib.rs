//! # Humantic Core
//!
//! Shared building blocks for the Humantic workspace:
//! - domain types (actors, action kinds, action items)
//! - error taxonomy (`HumanticError` for infrastructure, `ActionError` for remote actions)
//! - TOML configuration with per-run scheduler settings
//! - traits for the collaborators the scheduler drives (actor directory,
//!   execution contexts, notifier, settings source, escalation hooks)

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::{HumanticConfig, Settings};
pub use error::{ActionError, HumanticError, Result};
pub use types::{ActionItem, ActionKind, Actor, ActorId, Credentials};
