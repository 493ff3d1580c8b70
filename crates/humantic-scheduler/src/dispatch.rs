//! Notification dispatch — sends operator messages to the configured targets.
//! Supports: Telegram Bot API and a generic HTTP webhook.

use async_trait::async_trait;
use humantic_core::config::NotifyConfig;
use humantic_core::error::{HumanticError, Result};
use humantic_core::traits::Notifier;

use super::notify::{Notification, NotifyPriority};

/// Notification target configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum NotifyTarget {
    /// Telegram Bot API — send via `sendMessage`.
    Telegram { bot_token: String, chat_id: String },
    /// Generic HTTP webhook — POST with JSON body.
    Webhook {
        url: String,
        headers: Vec<(String, String)>,
    },
}

impl NotifyTarget {
    pub fn name(&self) -> &'static str {
        match self {
            NotifyTarget::Telegram { .. } => "telegram",
            NotifyTarget::Webhook { .. } => "webhook",
        }
    }
}

/// Dispatch a notification to a target channel.
/// Returns Ok(()) on success, Err(reason) on failure.
pub async fn dispatch(
    client: &reqwest::Client,
    notification: &Notification,
    target: &NotifyTarget,
) -> std::result::Result<(), String> {
    match target {
        NotifyTarget::Telegram { bot_token, chat_id } => {
            send_telegram(client, bot_token, chat_id, notification).await
        }
        NotifyTarget::Webhook { url, headers } => {
            send_webhook(client, url, headers, notification).await
        }
    }
}

/// Send notification via Telegram Bot API.
async fn send_telegram(
    client: &reqwest::Client,
    bot_token: &str,
    chat_id: &str,
    notification: &Notification,
) -> std::result::Result<(), String> {
    let url = format!("https://api.telegram.org/bot{}/sendMessage", bot_token);
    let priority_emoji = match notification.priority {
        NotifyPriority::Urgent => "🚨 ",
        NotifyPriority::High => "⚠️ ",
        NotifyPriority::Normal | NotifyPriority::Low => "",
    };

    let text = format!(
        "{}*{}*\n\n{}",
        priority_emoji,
        escape_markdown(&notification.title),
        escape_markdown(&notification.body),
    );

    let resp = client
        .post(&url)
        .json(&serde_json::json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "Markdown"
        }))
        .timeout(std::time::Duration::from_secs(10))
        .send()
        .await
        .map_err(|e| format!("Telegram send failed: {e}"))?;

    if resp.status().is_success() {
        tracing::debug!("✅ Telegram notification sent: {}", notification.title);
        Ok(())
    } else {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        Err(format!("Telegram API error {status}: {body}"))
    }
}

/// Send notification via generic HTTP webhook.
async fn send_webhook(
    client: &reqwest::Client,
    url: &str,
    headers: &[(String, String)],
    notification: &Notification,
) -> std::result::Result<(), String> {
    let mut req = client
        .post(url)
        .json(&serde_json::json!({
            "title": notification.title,
            "body": notification.body,
            "priority": format!("{:?}", notification.priority),
            "source": notification.source,
            "timestamp": notification.timestamp.to_rfc3339(),
        }))
        .timeout(std::time::Duration::from_secs(10));

    for (key, value) in headers {
        req = req.header(key.as_str(), value.as_str());
    }

    let resp = req
        .send()
        .await
        .map_err(|e| format!("Webhook send failed: {e}"))?;

    if resp.status().is_success() {
        tracing::debug!("✅ Webhook notification sent to {}: {}", url, notification.title);
        Ok(())
    } else {
        let status = resp.status();
        Err(format!("Webhook error {status}"))
    }
}

/// Escape Telegram MarkdownV1 special characters.
fn escape_markdown(s: &str) -> String {
    s.replace('_', "\\_")
        .replace('*', "\\*")
        .replace('[', "\\[")
        .replace('`', "\\`")
}

/// Build targets from the `[notify]` config section. Empty fields disable a target.
pub fn targets_from_config(config: &NotifyConfig) -> Vec<NotifyTarget> {
    let mut targets = Vec::new();

    if !config.telegram_bot_token.is_empty() && !config.telegram_chat_id.is_empty() {
        targets.push(NotifyTarget::Telegram {
            bot_token: config.telegram_bot_token.clone(),
            chat_id: config.telegram_chat_id.clone(),
        });
    }

    if !config.webhook_url.is_empty() {
        targets.push(NotifyTarget::Webhook {
            url: config.webhook_url.clone(),
            headers: config
                .webhook_headers
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        });
    }

    targets
}

/// `Notifier` that fans a message out to every configured target.
/// Succeeds if at least one target accepted it (or none are configured).
pub struct DispatchNotifier {
    client: reqwest::Client,
    targets: Vec<NotifyTarget>,
}

impl DispatchNotifier {
    pub fn new(targets: Vec<NotifyTarget>) -> Self {
        Self {
            client: reqwest::Client::new(),
            targets,
        }
    }

    pub fn from_config(config: &NotifyConfig) -> Self {
        let notifier = Self::new(targets_from_config(config));
        if notifier.targets.is_empty() {
            tracing::info!("📭 No notification targets configured; operator messages go to the log only");
        }
        notifier
    }

    pub fn targets(&self) -> &[NotifyTarget] {
        &self.targets
    }

    /// Send a prepared notification to all targets.
    pub async fn send(&self, notification: &Notification) -> Result<()> {
        if self.targets.is_empty() {
            tracing::info!("📢 {}: {}", notification.title, notification.body);
            return Ok(());
        }
        let mut errors = Vec::new();
        for target in &self.targets {
            if let Err(e) = dispatch(&self.client, notification, target).await {
                tracing::warn!("⚠️ {} notification failed: {e}", target.name());
                errors.push(e);
            }
        }
        if errors.len() == self.targets.len() {
            return Err(HumanticError::Notify(errors.join("; ")));
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for DispatchNotifier {
    async fn notify_operators(&self, message: &str) -> Result<()> {
        let priority = if message.starts_with('🚨') {
            NotifyPriority::Urgent
        } else {
            NotifyPriority::Normal
        };
        let notification = Notification::new("Humantic", message, "scheduler", priority);
        self.send(&notification).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_escape_markdown() {
        assert_eq!(escape_markdown("a_b*c[d`"), "a\\_b\\*c\\[d\\`");
    }

    #[test]
    fn test_targets_from_config() {
        assert!(targets_from_config(&NotifyConfig::default()).is_empty());

        let only_token = NotifyConfig {
            telegram_bot_token: "123:abc".into(),
            ..NotifyConfig::default()
        };
        assert!(targets_from_config(&only_token).is_empty());

        let mut headers = BTreeMap::new();
        headers.insert("X-Key".to_string(), "secret".to_string());
        let full = NotifyConfig {
            telegram_bot_token: "123:abc".into(),
            telegram_chat_id: "-100".into(),
            webhook_url: "https://hooks.example.com/humantic".into(),
            webhook_headers: headers,
        };
        let targets = targets_from_config(&full);
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].name(), "telegram");
        assert_eq!(
            targets[1],
            NotifyTarget::Webhook {
                url: "https://hooks.example.com/humantic".into(),
                headers: vec![("X-Key".into(), "secret".into())],
            }
        );
    }

    #[tokio::test]
    async fn test_no_targets_is_ok() {
        let notifier = DispatchNotifier::new(Vec::new());
        notifier.notify_operators("hello").await.unwrap();
    }
}
