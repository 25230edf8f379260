//! Agent HTTP surface
//!
//! - `POST /ask` - payment-gated consultation
//! - `GET /profile` - expertise summary for directory listings
//! - `GET /status` - liveness and active consultation count

use hyper::body::Incoming;
use hyper::{Method, Request, StatusCode};
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use crate::consult::{ConsultationHandler, ConsultationRequest};
use crate::knowledge::{Depth, ExpertiseIndex};
use crate::payment::PaymentGate;
use crate::server::http::{
    admission_to_response, credential_header, error_response, error_to_response, json_response,
    not_found_response, read_json, HttpResponse,
};
use crate::sessions::SessionStore;

/// Shared state for the agent server
pub struct AgentState {
    pub agent_id: String,
    pub display_name: String,
    pub index_path: Option<PathBuf>,
    pub handler: ConsultationHandler,
    pub gate: PaymentGate,
    pub sessions: Arc<SessionStore>,
    pub started_at: Instant,
}

#[derive(Serialize)]
struct ProfileDomain {
    name: String,
    depth: Depth,
    tags: Vec<String>,
}

/// Route one request against the agent surface.
pub async fn handle_agent_request(state: Arc<AgentState>, req: Request<Incoming>) -> HttpResponse {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    match (method, path.as_str()) {
        (Method::POST, "/ask") => handle_ask(state, req).await,
        (Method::GET, "/profile") => handle_profile(state),
        (Method::GET, "/status") => handle_status(state),
        _ => not_found_response(),
    }
}

async fn handle_ask(state: Arc<AgentState>, req: Request<Incoming>) -> HttpResponse {
    // Admission first; the credential rides in the X-Cashu header
    let credential = credential_header(&req);
    match state.gate.admit(credential.as_deref()).await {
        Ok(admission) => {
            if let Some(response) = admission_to_response(admission) {
                return response;
            }
        }
        Err(e) => return error_to_response(&e),
    }

    let request: ConsultationRequest = match read_json(req).await {
        Ok(parsed) => parsed,
        Err(response) => return response,
    };
    if request.question.trim().is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "question is required and must be a string",
        );
    }

    match state.handler.consult(request).await {
        Ok(reply) => json_response(StatusCode::OK, &reply),
        Err(e) => error_to_response(&e),
    }
}

fn handle_profile(state: Arc<AgentState>) -> HttpResponse {
    let index = state.index_path.as_deref().and_then(ExpertiseIndex::load);

    let (domains, session_count) = match index {
        Some(index) => (
            index
                .domains
                .iter()
                .map(|d| ProfileDomain {
                    name: d.name.clone(),
                    depth: d.depth,
                    tags: d.tags.clone(),
                })
                .collect::<Vec<_>>(),
            index.session_count,
        ),
        None => (Vec::new(), 0),
    };

    let mut profile = json!({
        "agent_id": state.agent_id,
        "display_name": state.display_name,
        "domains": domains,
        "session_count": session_count,
        "status": "available",
    });
    if state.gate.config().enabled {
        profile["payment"] = json!({
            "amount": state.gate.config().amount,
            "unit": state.gate.config().unit,
        });
    }

    json_response(StatusCode::OK, &profile)
}

fn handle_status(state: Arc<AgentState>) -> HttpResponse {
    json_response(
        StatusCode::OK,
        &json!({
            "status": "ok",
            "uptime_seconds": state.started_at.elapsed().as_secs(),
            "active_consultations": state.sessions.active_count(),
        }),
    )
}
