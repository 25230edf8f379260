//! Client for a served agent
//!
//! Connects through the transport collaborator, asks questions, and tracks
//! the session id across turns so follow-ups share a conversation.

use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use uuid::Uuid;

use crate::knowledge::ConfidenceLevel;
use crate::tunnel::{connect, Transport, TunnelConnection};
use crate::types::{ColloquyError, Result};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// A successful answer
#[derive(Debug, Clone, Deserialize)]
pub struct AskReply {
    pub response: String,
    pub confidence: ConfidenceLevel,
    pub based_on_sessions: Vec<String>,
    pub session_id: Uuid,
    pub followup_available: bool,
}

/// What came back from `/ask`: either an answer or payment terms to retry
/// with.
#[derive(Debug, Clone)]
pub enum AskOutcome {
    Answer(AskReply),
    PaymentRequired {
        /// Encoded payment request from the X-Cashu response header
        payment_request: Option<String>,
        amount: u64,
        unit: String,
    },
}

#[derive(Deserialize)]
struct PaymentRequiredBody {
    #[serde(default)]
    amount: u64,
    #[serde(default)]
    unit: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: String,
}

/// Agent profile as served by `GET /profile`
#[derive(Debug, Clone, Deserialize)]
pub struct AgentProfileView {
    pub agent_id: String,
    pub display_name: String,
    pub session_count: usize,
    #[serde(default)]
    pub payment: Option<serde_json::Value>,
}

pub struct AgentClient {
    tunnel: TunnelConnection,
    http: reqwest::Client,
    session_id: Option<Uuid>,
}

impl AgentClient {
    /// Open a proxy to the agent's address and wait for it to stabilize.
    pub async fn connect(transport: &dyn Transport, address: &str) -> Result<Self> {
        let tunnel = connect(transport, address).await?;
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| ColloquyError::Transport(format!("client init: {e}")))?;
        Ok(Self {
            tunnel,
            http,
            session_id: None,
        })
    }

    /// Ask a question, carrying the tracked session for follow-ups.
    pub async fn ask(
        &mut self,
        question: &str,
        context: Option<&str>,
        credential: Option<&str>,
    ) -> Result<AskOutcome> {
        let mut body = json!({ "question": question });
        if let Some(id) = self.session_id {
            body["session_id"] = json!(id);
        }
        if let Some(context) = context {
            body["context"] = json!(context);
        }

        let mut request = self
            .http
            .post(format!("{}/ask", self.tunnel.base_url()))
            .json(&body);
        if let Some(credential) = credential {
            request = request.header("X-Cashu", credential);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ColloquyError::Transport(format!("ask failed: {e}")))?;

        if response.status() == reqwest::StatusCode::PAYMENT_REQUIRED {
            let payment_request = response
                .headers()
                .get("x-cashu")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let terms: PaymentRequiredBody = response.json().await.unwrap_or(PaymentRequiredBody {
                amount: 0,
                unit: String::new(),
            });
            return Ok(AskOutcome::PaymentRequired {
                payment_request,
                amount: terms.amount,
                unit: terms.unit,
            });
        }

        if !response.status().is_success() {
            let status = response.status();
            let error: ErrorBody = response.json().await.unwrap_or(ErrorBody {
                error: status.to_string(),
            });
            return Err(ColloquyError::Transport(format!(
                "ask failed ({status}): {}",
                error.error
            )));
        }

        let reply: AskReply = response
            .json()
            .await
            .map_err(|e| ColloquyError::Transport(format!("bad ask response: {e}")))?;
        // Track the session for follow-ups
        self.session_id = Some(reply.session_id);
        Ok(AskOutcome::Answer(reply))
    }

    pub async fn profile(&self) -> Result<AgentProfileView> {
        let response = self
            .http
            .get(format!("{}/profile", self.tunnel.base_url()))
            .send()
            .await
            .map_err(|e| ColloquyError::Transport(format!("profile failed: {e}")))?;
        if !response.status().is_success() {
            return Err(ColloquyError::Transport(format!(
                "profile failed ({})",
                response.status()
            )));
        }
        response
            .json()
            .await
            .map_err(|e| ColloquyError::Transport(format!("bad profile response: {e}")))
    }

    pub async fn status(&self) -> Result<serde_json::Value> {
        let response = self
            .http
            .get(format!("{}/status", self.tunnel.base_url()))
            .send()
            .await
            .map_err(|e| ColloquyError::Transport(format!("status failed: {e}")))?;
        if !response.status().is_success() {
            return Err(ColloquyError::Transport(format!(
                "status failed ({})",
                response.status()
            )));
        }
        response
            .json()
            .await
            .map_err(|e| ColloquyError::Transport(format!("bad status response: {e}")))
    }

    pub fn session_id(&self) -> Option<Uuid> {
        self.session_id
    }

    /// Tear down the proxy. Idempotent.
    pub async fn disconnect(&mut self) -> Result<()> {
        self.session_id = None;
        self.tunnel.disconnect().await
    }
}
