//! Client for the directory service
//!
//! Registration, heartbeats, discovery and connect lookups, plus the
//! fire-and-forget heartbeat task a serving agent runs: a failed heartbeat
//! is logged and retried on the next interval, never escalated.

use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::discovery::Recommendation;
use crate::tunnel::{connect, Transport, TunnelConnection};
use crate::types::{ColloquyError, Result};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Directory `/discover` response
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoverReply {
    pub recommendations: Vec<Recommendation>,
}

/// Directory `/connect` response
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectReply {
    pub connection_key: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: String,
}

pub struct DirectoryClient {
    tunnel: TunnelConnection,
    http: reqwest::Client,
}

impl DirectoryClient {
    /// Open a proxy to the directory's address and wait for it to stabilize.
    pub async fn connect(transport: &dyn Transport, address: &str) -> Result<Self> {
        let tunnel = connect(transport, address).await?;
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| ColloquyError::Transport(format!("client init: {e}")))?;
        Ok(Self { tunnel, http })
    }

    async fn post_json(&self, path: &str, body: serde_json::Value) -> Result<reqwest::Response> {
        let response = self
            .http
            .post(format!("{}{path}", self.tunnel.base_url()))
            .json(&body)
            .send()
            .await
            .map_err(|e| ColloquyError::Transport(format!("{path} failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let error: ErrorBody = response.json().await.unwrap_or(ErrorBody {
                error: status.to_string(),
            });
            if status == reqwest::StatusCode::NOT_FOUND {
                return Err(ColloquyError::NotFound(error.error));
            }
            return Err(ColloquyError::Transport(format!(
                "{path} failed ({status}): {}",
                error.error
            )));
        }
        Ok(response)
    }

    /// Register this agent's profile.
    pub async fn register(&self, profile: serde_json::Value) -> Result<()> {
        self.post_json("/register", profile).await?;
        Ok(())
    }

    /// One heartbeat. NotFound means the directory no longer knows us.
    pub async fn heartbeat(&self, agent_id: &str) -> Result<()> {
        self.post_json("/heartbeat", json!({ "agent_id": agent_id }))
            .await?;
        Ok(())
    }

    /// Ranked recommendations for a query.
    pub async fn discover(&self, query: &str) -> Result<Vec<Recommendation>> {
        let response = self.post_json("/discover", json!({ "query": query })).await?;
        let reply: DiscoverReply = response
            .json()
            .await
            .map_err(|e| ColloquyError::Transport(format!("bad discover response: {e}")))?;
        Ok(reply.recommendations)
    }

    /// Connection locator for an online agent.
    pub async fn connect_to(&self, agent_id: &str) -> Result<ConnectReply> {
        let response = self
            .post_json("/connect", json!({ "agent_id": agent_id }))
            .await?;
        response
            .json()
            .await
            .map_err(|e| ColloquyError::Transport(format!("bad connect response: {e}")))
    }

    /// Tear down the proxy. Idempotent.
    pub async fn disconnect(&self) -> Result<()> {
        self.tunnel.disconnect().await
    }
}

/// Keep this agent alive in the directory. Re-registers when the directory
/// forgot us (restart wipes liveness), otherwise heartbeats on the interval.
pub fn spawn_heartbeat_task(
    client: Arc<DirectoryClient>,
    agent_id: String,
    profile: serde_json::Value,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match client.heartbeat(&agent_id).await {
                Ok(()) => debug!("Heartbeat ok"),
                Err(ColloquyError::NotFound(_)) => {
                    warn!("Directory lost our registration, re-registering");
                    if let Err(e) = client.register(profile.clone()).await {
                        warn!("Re-registration failed, retrying next interval: {}", e);
                    }
                }
                Err(e) => {
                    // Fire-and-forget: retried on the next interval
                    warn!("Heartbeat failed, retrying next interval: {}", e);
                }
            }
        }
    })
}
