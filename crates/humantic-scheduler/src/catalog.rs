//! Action catalog — builds each actor's deterministic, shuffled action list.
//!
//! The list for `(run_id, actor_id)` is a pure function of the pools: a resumed
//! run rebuilds exactly the same order and continues at the saved index.

use std::path::{Path, PathBuf};

use humantic_core::types::{ActionItem, ActionKind, ActorId};
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha20Rng;
use sha2::{Digest, Sha256};

/// Categorized targets the action list is built from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionPools {
    pub channels: Vec<String>,
    pub chats: Vec<String>,
    /// Private-message recipients.
    pub messages: Vec<String>,
}

impl ActionPools {
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty() && self.chats.is_empty() && self.messages.is_empty()
    }

    /// Number of actions one actor performs with these pools.
    pub fn action_count(&self, include_leave: bool) -> usize {
        let joins = self.channels.len() + self.chats.len();
        let leaves = if include_leave { joins } else { 0 };
        joins + self.messages.len() + leaves
    }
}

/// Where pools come from. Loaded once per run.
pub trait PoolSource: Send + Sync {
    fn load_pools(&self) -> ActionPools;
}

impl PoolSource for ActionPools {
    fn load_pools(&self) -> ActionPools {
        self.clone()
    }
}

/// Links-pool directory with `channels.json`, `chats.json` and `pv.json`.
pub struct LinkPoolDir {
    dir: PathBuf,
}

impl LinkPoolDir {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    /// Read `{key: [{link, ...}]}` from one file. Missing or broken files give an empty pool.
    fn load_links(&self, key: &str, filename: &str) -> Vec<String> {
        let path = self.dir.join(filename);
        if !path.exists() {
            tracing::warn!("⚠️ Links file not found: {}", path.display());
            return Vec::new();
        }
        let value: serde_json::Value = match std::fs::read_to_string(&path)
            .map_err(|e| e.to_string())
            .and_then(|s| serde_json::from_str(&s).map_err(|e| e.to_string()))
        {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("⚠️ Failed to load {}: {e}", path.display());
                return Vec::new();
            }
        };
        value
            .get(key)
            .and_then(|items| items.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.get("link").and_then(|l| l.as_str()))
                    .map(str::trim)
                    .filter(|link| !link.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl PoolSource for LinkPoolDir {
    fn load_pools(&self) -> ActionPools {
        let pools = ActionPools {
            channels: self.load_links("channels", "channels.json"),
            chats: self.load_links("chats", "chats.json"),
            messages: self.load_links("pv", "pv.json"),
        };
        tracing::debug!(
            "🔗 Links pool: {} channels, {} chats, {} pv",
            pools.channels.len(),
            pools.chats.len(),
            pools.messages.len()
        );
        pools
    }
}

/// Seed for one actor's shuffle: SHA-256 of `"{run_id}_{actor_id}"`.
pub fn action_seed(run_id: &str, actor_id: ActorId) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(format!("{run_id}_{actor_id}").as_bytes());
    hasher.finalize().into()
}

/// Concatenate joins, messages and (optionally) leaves in fixed category order,
/// then shuffle the whole list with a ChaCha20 generator keyed by `seed`.
pub fn build_action_list(pools: &ActionPools, seed: [u8; 32], include_leave: bool) -> Vec<ActionItem> {
    let mut out = Vec::with_capacity(pools.action_count(include_leave));
    out.extend(pools.channels.iter().map(|t| ActionItem::new(ActionKind::JoinChannel, t)));
    out.extend(pools.chats.iter().map(|t| ActionItem::new(ActionKind::JoinChat, t)));
    out.extend(pools.messages.iter().map(|t| ActionItem::new(ActionKind::SendMessage, t)));
    if include_leave {
        out.extend(pools.channels.iter().map(|t| ActionItem::new(ActionKind::LeaveChannel, t)));
        out.extend(pools.chats.iter().map(|t| ActionItem::new(ActionKind::LeaveChat, t)));
    }
    let mut rng = ChaCha20Rng::from_seed(seed);
    out.shuffle(&mut rng);
    out
}
