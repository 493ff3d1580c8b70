//! Domain types: actors and the actions they perform.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable integer identity of an actor (account).
pub type ActorId = i64;

/// Opaque to the scheduler; interpreted by the session factory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
    /// Session name or path on the executing side.
    #[serde(default)]
    pub session: String,
    #[serde(default)]
    pub api_id: Option<i64>,
    #[serde(default)]
    pub api_hash: String,
}

impl Credentials {
    /// All three parts must be present before an actor can be driven.
    pub fn is_complete(&self) -> bool {
        !self.session.trim().is_empty()
            && self.api_id.is_some_and(|id| id > 0)
            && !self.api_hash.trim().is_empty()
    }
}

/// One automatable identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Actor {
    pub id: ActorId,
    /// Human-readable label for logs (e.g. a phone prefix). Never used for routing.
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub credentials: Credentials,
    /// Actor is excluded from scheduling while `now < sleep_until`.
    #[serde(default)]
    pub sleep_until: Option<DateTime<Utc>>,
}

impl Actor {
    pub fn new(id: ActorId, label: &str, credentials: Credentials) -> Self {
        Self {
            id,
            label: label.to_string(),
            credentials,
            sleep_until: None,
        }
    }

    pub fn is_sleeping(&self, now: DateTime<Utc>) -> bool {
        self.sleep_until.is_some_and(|until| now < until)
    }

    /// Label truncated for log lines.
    pub fn short_label(&self) -> &str {
        let end = self
            .label
            .char_indices()
            .nth(8)
            .map(|(i, _)| i)
            .unwrap_or(self.label.len());
        &self.label[..end]
    }
}

/// What an action does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    JoinChannel,
    JoinChat,
    SendMessage,
    LeaveChannel,
    LeaveChat,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::JoinChannel => "join_channel",
            ActionKind::JoinChat => "join_chat",
            ActionKind::SendMessage => "send_message",
            ActionKind::LeaveChannel => "leave_channel",
            ActionKind::LeaveChat => "leave_chat",
        }
    }

    /// Operator-facing label used in activity messages.
    pub fn label(&self) -> &'static str {
        match self {
            ActionKind::JoinChannel => "Join channel",
            ActionKind::JoinChat => "Join group",
            ActionKind::SendMessage => "Send private message",
            ActionKind::LeaveChannel => "Leave channel",
            ActionKind::LeaveChat => "Leave group",
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single `(kind, target)` step of an actor's run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActionItem {
    pub kind: ActionKind,
    /// Opaque link or identifier of the remote entity.
    pub target: String,
}

impl ActionItem {
    pub fn new(kind: ActionKind, target: &str) -> Self {
        Self {
            kind,
            target: target.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn creds() -> Credentials {
        Credentials {
            session: "acc_1".into(),
            api_id: Some(12345),
            api_hash: "abcdef".into(),
        }
    }

    #[test]
    fn test_credentials_complete() {
        assert!(creds().is_complete());

        let mut missing_hash = creds();
        missing_hash.api_hash = "  ".into();
        assert!(!missing_hash.is_complete());

        let mut zero_id = creds();
        zero_id.api_id = Some(0);
        assert!(!zero_id.is_complete());

        assert!(!Credentials::default().is_complete());
    }

    #[test]
    fn test_actor_sleeping_window() {
        let now = Utc::now();
        let mut actor = Actor::new(1, "+98912", creds());
        assert!(!actor.is_sleeping(now));

        actor.sleep_until = Some(now + Duration::hours(1));
        assert!(actor.is_sleeping(now));

        actor.sleep_until = Some(now - Duration::seconds(1));
        assert!(!actor.is_sleeping(now));
    }

    #[test]
    fn test_short_label_is_char_safe() {
        let actor = Actor::new(1, "۰۹۱۲۳۴۵۶۷۸۹", creds());
        assert_eq!(actor.short_label().chars().count(), 8);
    }

    #[test]
    fn test_action_kind_wire_names() {
        let json = serde_json::to_string(&ActionKind::SendMessage).unwrap();
        assert_eq!(json, "\"send_message\"");
        let kind: ActionKind = serde_json::from_str("\"leave_chat\"").unwrap();
        assert_eq!(kind, ActionKind::LeaveChat);
        assert_eq!(ActionKind::JoinChannel.to_string(), "join_channel");
    }
}
