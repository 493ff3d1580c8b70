//! # Humantic Bridge
//!
//! Session factories that execute actions on behalf of actors.
//! - `http` — forwards to a sidecar process that owns the messaging protocol
//! - `dry_run` — logs every action and reports success

pub mod dry_run;
pub mod http;

use std::sync::Arc;

use humantic_core::config::{BridgeConfig, BridgeMode};
use humantic_core::traits::SessionFactory;

pub use dry_run::DryRunFactory;
pub use http::HttpSessionFactory;

/// Create the session factory selected by `[bridge].mode`.
pub fn factory_from_config(config: &BridgeConfig) -> Arc<dyn SessionFactory> {
    match config.mode {
        BridgeMode::DryRun => {
            tracing::info!("🧪 Bridge: dry-run (no remote calls)");
            Arc::new(DryRunFactory::new())
        }
        BridgeMode::Http => {
            tracing::info!("🌐 Bridge: HTTP sidecar at {}", config.base_url);
            Arc::new(HttpSessionFactory::new(config))
        }
    }
}
