//! Full-stack consultation: agent server behind a tunnel, client through
//! a proxy, two turns sharing one session.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tempfile::TempDir;
use tokio::net::TcpListener;

use colloquy::client::{AgentClient, AskOutcome};
use colloquy::consult::ConsultationHandler;
use colloquy::payment::PaymentGate;
use colloquy::reasoning::{Reasoner, ReasoningRequest};
use colloquy::retrieval::RetrievalEngine;
use colloquy::server::{self, AgentState};
use colloquy::sessions::SessionStore;
use colloquy::tunnel::{DirectTransport, TunnelListener};
use colloquy::types::Result;

/// Counts the messages each call carried, answers with a fixed result.
struct CountingReasoner {
    message_counts: Mutex<Vec<usize>>,
}

#[async_trait]
impl Reasoner for CountingReasoner {
    async fn reason(&self, request: ReasoningRequest) -> Result<Value> {
        self.message_counts.lock().unwrap().push(request.messages.len());
        Ok(json!({
            "response": "Answer from experience.",
            "confidence": "medium",
            "based_on_sessions": [],
            "followup_available": false
        }))
    }
}

fn write_artifact(dir: &Path) {
    let timestamp = (chrono::Utc::now() - chrono::Duration::days(3)).to_rfc3339();
    let content = format!(
        "---\nsession_id: abc-123\ntimestamp: {timestamp}\nproject: infra\ntask: nix flakes\noutcome: success\ntags:\n  - nix\n  - flakes\nduration_minutes: 45\nkey_insight: pin the flake lock\nconfidence: high\n---\n\n## What Was Built\n\nx\n\n## What Failed First\n\nx\n\n## What Worked\n\nx\n\n## Gotchas\n\nx\n\n## Code Patterns\n\nx\n"
    );
    std::fs::write(dir.join("abc-123.md"), content).unwrap();
}

#[tokio::test]
async fn two_turn_consultation_through_the_tunnel() {
    let tmp = TempDir::new().unwrap();
    write_artifact(tmp.path());

    let reasoner = Arc::new(CountingReasoner {
        message_counts: Mutex::new(Vec::new()),
    });
    let sessions = SessionStore::with_defaults();
    let handler = ConsultationHandler::new(
        RetrievalEngine::new(tmp.path().to_path_buf(), None),
        Arc::clone(&sessions),
        reasoner.clone(),
    );
    let state = Arc::new(AgentState {
        agent_id: "tunnel-agent".to_string(),
        display_name: "Tunnel Agent".to_string(),
        index_path: None,
        handler,
        gate: PaymentGate::disabled(),
        sessions: Arc::clone(&sessions),
        started_at: Instant::now(),
    });

    // Bind first, then expose the actual port
    let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = tokio::spawn(server::serve(
        listener,
        state,
        server::handle_agent_request,
    ));

    let transport = DirectTransport;
    let tunnel = TunnelListener::establish(&transport, port, None, server)
        .await
        .unwrap();

    let mut client = AgentClient::connect(&transport, tunnel.address())
        .await
        .unwrap();

    let first = match client.ask("how do I pin nix flakes", None, None).await.unwrap() {
        AskOutcome::Answer(reply) => reply,
        other => panic!("expected an answer, got {other:?}"),
    };
    assert_eq!(first.response, "Answer from experience.");

    // The client tracks the session; the follow-up reuses it
    let second = match client.ask("what about CI caching", None, None).await.unwrap() {
        AskOutcome::Answer(reply) => reply,
        other => panic!("expected an answer, got {other:?}"),
    };
    assert_eq!(second.session_id, first.session_id);

    // Turn 1 carried only the question; turn 2 carried the prior
    // question, the prior response, and the new question
    let counts = reasoner.message_counts.lock().unwrap().clone();
    assert_eq!(counts, vec![1, 3]);

    let profile = client.profile().await.unwrap();
    assert_eq!(profile.agent_id, "tunnel-agent");

    client.disconnect().await.unwrap();
    // Idempotent after a completed session
    client.disconnect().await.unwrap();
    tunnel.stop().await.unwrap();
    sessions.destroy();
}
