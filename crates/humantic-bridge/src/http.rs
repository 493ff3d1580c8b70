//! HTTP bridge to the protocol sidecar.
//!
//! ```text
//! POST   {base}/sessions                  → {"session_id": "...", "authorized": true}
//! POST   {base}/sessions/{id}/actions     → 2xx | 429 | {"error": "FLOOD_WAIT", "wait_secs": 30}
//! DELETE {base}/sessions/{id}
//! ```

use std::time::Duration;

use async_trait::async_trait;
use humantic_core::config::BridgeConfig;
use humantic_core::error::ActionError;
use humantic_core::traits::{ExecutionContext, SessionFactory};
use humantic_core::types::{ActionItem, ActionKind, Actor};
use serde::{Deserialize, Serialize};

/// Error codes the sidecar uses for rate limiting.
const FLOOD_CODES: [&str; 5] = [
    "FLOOD_WAIT",
    "PEER_FLOOD",
    "SLOWMODE_WAIT",
    "FLOOD_PREMIUM_WAIT",
    "TOO_MANY_REQUESTS",
];

#[derive(Debug, Serialize)]
struct OpenRequest<'a> {
    actor_id: i64,
    session: &'a str,
    api_id: Option<i64>,
    api_hash: &'a str,
}

#[derive(Debug, Deserialize)]
struct OpenResponse {
    session_id: String,
    #[serde(default)]
    authorized: bool,
}

#[derive(Debug, Serialize)]
struct ActionRequest<'a> {
    kind: ActionKind,
    target: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a str>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    wait_secs: Option<u64>,
}

/// Map a non-success sidecar response to an `ActionError`.
pub fn classify_response(status: u16, body: &str) -> ActionError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let code = parsed.error.unwrap_or_default();
    let upper = code.to_uppercase();
    let detail = parsed
        .message
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| if code.is_empty() { body.trim().to_string() } else { code.clone() });

    if status == 429 || FLOOD_CODES.iter().any(|c| upper.starts_with(c)) {
        let message = if code.is_empty() {
            format!("HTTP {status}: too many requests")
        } else {
            code
        };
        return ActionError::Flood {
            message,
            wait_secs: parsed.wait_secs,
        };
    }
    if status == 401 {
        return ActionError::Unauthorized;
    }
    ActionError::Rejected(format!("HTTP {status}: {detail}"))
}

fn transport(e: reqwest::Error) -> ActionError {
    ActionError::Transport(e.to_string())
}

/// Opens sidecar sessions for actors.
pub struct HttpSessionFactory {
    client: reqwest::Client,
    base_url: String,
    api_token: Option<String>,
    message_text: String,
}

impl HttpSessionFactory {
    pub fn new(config: &BridgeConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone().filter(|t| !t.is_empty()),
            message_text: config.message_text.clone(),
        }
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }
}

#[async_trait]
impl SessionFactory for HttpSessionFactory {
    async fn open(&self, actor: &Actor) -> Result<Box<dyn ExecutionContext>, ActionError> {
        let body = OpenRequest {
            actor_id: actor.id,
            session: &actor.credentials.session,
            api_id: actor.credentials.api_id,
            api_hash: &actor.credentials.api_hash,
        };
        let resp = self
            .authed(self.client.post(format!("{}/sessions", self.base_url)))
            .json(&body)
            .send()
            .await
            .map_err(transport)?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(classify_response(status.as_u16(), &text));
        }
        let opened: OpenResponse = resp.json().await.map_err(transport)?;
        tracing::debug!("🔌 Session {} opened for actor {}", opened.session_id, actor.id);

        Ok(Box::new(HttpSession {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            api_token: self.api_token.clone(),
            message_text: self.message_text.clone(),
            session_id: opened.session_id,
            authorized: opened.authorized,
        }))
    }
}

/// One open sidecar session.
pub struct HttpSession {
    client: reqwest::Client,
    base_url: String,
    api_token: Option<String>,
    message_text: String,
    session_id: String,
    authorized: bool,
}

impl HttpSession {
    fn url(&self, suffix: &str) -> String {
        format!("{}/sessions/{}{}", self.base_url, self.session_id, suffix)
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }
}

#[async_trait]
impl ExecutionContext for HttpSession {
    async fn is_authorized(&mut self) -> Result<bool, ActionError> {
        Ok(self.authorized)
    }

    async fn perform(&mut self, item: &ActionItem) -> Result<(), ActionError> {
        let message = (item.kind == ActionKind::SendMessage).then_some(self.message_text.as_str());
        let body = ActionRequest {
            kind: item.kind,
            target: &item.target,
            message,
        };
        let resp = self
            .authed(self.client.post(self.url("/actions")))
            .json(&body)
            .send()
            .await
            .map_err(transport)?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let text = resp.text().await.unwrap_or_default();
        Err(classify_response(status.as_u16(), &text))
    }

    async fn close(&mut self) {
        let result = self.authed(self.client.delete(self.url(""))).send().await;
        match result {
            Ok(resp) if resp.status().is_success() => {
                tracing::debug!("🔌 Session {} closed", self.session_id);
            }
            Ok(resp) => {
                tracing::warn!("⚠️ Closing session {} returned {}", self.session_id, resp.status());
            }
            Err(e) => {
                tracing::warn!("⚠️ Closing session {} failed: {e}", self.session_id);
            }
        }
    }
}
