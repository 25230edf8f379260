//! Directory HTTP surface
//!
//! - `POST /register` - upsert an agent profile
//! - `POST /heartbeat` - keep an agent online
//! - `POST /discover` - relevance-ranked recommendations for a query
//! - `POST /connect` - payment-gated connection locator lookup
//! - `GET /status` - uptime and agent counts

use hyper::body::Incoming;
use hyper::{Method, Request, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use crate::discovery::DiscoveryMatcher;
use crate::payment::PaymentGate;
use crate::registry::{AgentProfile, AgentRegistry, AgentStatus};
use crate::server::http::{
    admission_to_response, credential_header, error_response, error_to_response, json_response,
    not_found_response, read_json, HttpResponse,
};

/// Shared state for the directory server
pub struct DirectoryState {
    pub registry: Arc<AgentRegistry>,
    pub matcher: DiscoveryMatcher,
    pub gate: PaymentGate,
    pub started_at: Instant,
}

#[derive(Deserialize)]
struct AgentIdBody {
    #[serde(default)]
    agent_id: String,
}

#[derive(Deserialize)]
struct DiscoverBody {
    #[serde(default)]
    query: String,
}

/// Route one request against the directory surface.
pub async fn handle_directory_request(
    state: Arc<DirectoryState>,
    req: Request<Incoming>,
) -> HttpResponse {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    match (method, path.as_str()) {
        (Method::POST, "/register") => handle_register(state, req).await,
        (Method::POST, "/heartbeat") => handle_heartbeat(state, req).await,
        (Method::POST, "/discover") => handle_discover(state, req).await,
        (Method::POST, "/connect") => handle_connect(state, req).await,
        (Method::GET, "/status") => handle_status(state),
        _ => not_found_response(),
    }
}

async fn handle_register(state: Arc<DirectoryState>, req: Request<Incoming>) -> HttpResponse {
    let profile: AgentProfile = match read_json(req).await {
        Ok(parsed) => parsed,
        Err(response) => return response,
    };
    if profile.agent_id.trim().is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "agent_id is required and must be a string",
        );
    }
    if profile.connection_key.trim().is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "connection_key is required and must be a string",
        );
    }

    let record = state.registry.register(profile);
    info!(
        "Agent registered: {}",
        record.display_name.as_deref().unwrap_or(&record.agent_id)
    );
    json_response(
        StatusCode::OK,
        &json!({ "registered": true, "agent_id": record.agent_id }),
    )
}

async fn handle_heartbeat(state: Arc<DirectoryState>, req: Request<Incoming>) -> HttpResponse {
    let body: AgentIdBody = match read_json(req).await {
        Ok(parsed) => parsed,
        Err(response) => return response,
    };
    if body.agent_id.trim().is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "agent_id is required and must be a string",
        );
    }

    if state.registry.heartbeat(&body.agent_id) {
        json_response(StatusCode::OK, &json!({ "ok": true }))
    } else {
        error_response(StatusCode::NOT_FOUND, "Unknown agent")
    }
}

async fn handle_discover(state: Arc<DirectoryState>, req: Request<Incoming>) -> HttpResponse {
    let body: DiscoverBody = match read_json(req).await {
        Ok(parsed) => parsed,
        Err(response) => return response,
    };
    if body.query.trim().is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "query is required and must be a string",
        );
    }

    info!("Discovery query: {}", body.query);
    let online = state.registry.online_agents();
    match state.matcher.discover(&body.query, &online).await {
        Ok(recommendations) => {
            info!("Discovery complete: {} recommendation(s)", recommendations.len());
            json_response(StatusCode::OK, &json!({ "recommendations": recommendations }))
        }
        Err(e) => error_to_response(&e),
    }
}

async fn handle_connect(state: Arc<DirectoryState>, req: Request<Incoming>) -> HttpResponse {
    // Connect may be payment-gated; admission precedes everything else
    let credential = credential_header(&req);
    match state.gate.admit(credential.as_deref()).await {
        Ok(admission) => {
            if let Some(response) = admission_to_response(admission) {
                return response;
            }
        }
        Err(e) => return error_to_response(&e),
    }

    let body: AgentIdBody = match read_json(req).await {
        Ok(parsed) => parsed,
        Err(response) => return response,
    };
    if body.agent_id.trim().is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "agent_id is required and must be a string",
        );
    }

    let Some(agent) = state.registry.get(&body.agent_id) else {
        return error_response(StatusCode::NOT_FOUND, "Agent not found");
    };
    if agent.status != AgentStatus::Online {
        return error_response(StatusCode::GONE, "Agent is offline");
    }

    info!(
        "Connect requested: {}",
        agent.display_name.as_deref().unwrap_or(&agent.agent_id)
    );
    json_response(
        StatusCode::OK,
        &json!({
            "connection_key": agent.connection_key,
            "display_name": agent.display_name,
        }),
    )
}

fn handle_status(state: Arc<DirectoryState>) -> HttpResponse {
    let (total, online) = state.registry.counts();
    json_response(
        StatusCode::OK,
        &json!({
            "status": "ok",
            "uptime_seconds": state.started_at.elapsed().as_secs(),
            "agents": { "total": total, "online": online },
        }),
    )
}
