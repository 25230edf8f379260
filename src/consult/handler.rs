//! Consultation handler

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::consult::synthesis::{
    build_system_prompt, synthesize_schema, SynthesisResult, SYNTHESIZE_DESCRIPTION,
    SYNTHESIZE_TOOL,
};
use crate::knowledge::ConfidenceLevel;
use crate::reasoning::{ChatTurn, Reasoner, ReasoningRequest, Role};
use crate::retrieval::RetrievalEngine;
use crate::sessions::SessionStore;
use crate::types::Result;

const SYNTHESIS_MAX_TOKENS: u32 = 4096;

/// One inbound question
#[derive(Debug, Clone, Deserialize)]
pub struct ConsultationRequest {
    pub question: String,
    #[serde(default)]
    pub session_id: Option<Uuid>,
    #[serde(default)]
    pub context: Option<String>,
}

/// The answer returned to the client
#[derive(Debug, Clone, Serialize)]
pub struct ConsultationReply {
    pub response: String,
    pub confidence: ConfidenceLevel,
    pub based_on_sessions: Vec<String>,
    pub session_id: Uuid,
    pub followup_available: bool,
}

/// Orchestrates retrieval, session resolution, synthesis and recording
/// for one consultation. Payment admission happens before this runs.
pub struct ConsultationHandler {
    retrieval: RetrievalEngine,
    sessions: Arc<SessionStore>,
    reasoner: Arc<dyn Reasoner>,
}

impl ConsultationHandler {
    pub fn new(
        retrieval: RetrievalEngine,
        sessions: Arc<SessionStore>,
        reasoner: Arc<dyn Reasoner>,
    ) -> Self {
        Self {
            retrieval,
            sessions,
            reasoner,
        }
    }

    pub async fn consult(&self, request: ConsultationRequest) -> Result<ConsultationReply> {
        let retrieved = self.retrieval.retrieve(&request.question)?;
        debug!(
            "Retrieved {} artifact(s) for keywords {:?}",
            retrieved.artifacts.len(),
            retrieved.keywords
        );

        // Resolve the conversation: a supplied id that is unknown (expired
        // or never existed) silently falls back to a fresh session.
        let (session_id, history) = match request.session_id {
            Some(id) => match self.sessions.history(id) {
                Ok(history) => (id, history),
                Err(_) => (self.sessions.create_session(), Vec::new()),
            },
            None => (self.sessions.create_session(), Vec::new()),
        };

        let mut messages: Vec<ChatTurn> = Vec::with_capacity(history.len() * 2 + 1);
        for exchange in &history {
            messages.push(ChatTurn {
                role: Role::User,
                content: exchange.question.clone(),
            });
            messages.push(ChatTurn {
                role: Role::Assistant,
                content: exchange.response.clone(),
            });
        }

        let user_content = match &request.context {
            Some(context) => format!("Context: {context}\n\nQuestion: {}", request.question),
            None => request.question.clone(),
        };
        messages.push(ChatTurn {
            role: Role::User,
            content: user_content,
        });

        let output = self
            .reasoner
            .reason(ReasoningRequest {
                system: Some(build_system_prompt(&retrieved.artifacts)),
                messages,
                tool_name: SYNTHESIZE_TOOL.to_string(),
                tool_description: SYNTHESIZE_DESCRIPTION.to_string(),
                schema: synthesize_schema(),
                max_tokens: SYNTHESIS_MAX_TOKENS,
            })
            .await?;

        let result: SynthesisResult = serde_json::from_value(output)?;

        self.sessions
            .add_exchange(session_id, &request.question, &result.response)?;
        info!(
            "Consultation answered with {} source session(s)",
            result.based_on_sessions.len()
        );

        Ok(ConsultationReply {
            response: result.response,
            confidence: result.confidence,
            based_on_sessions: result.based_on_sessions,
            session_id,
            followup_available: result.followup_available,
        })
    }
}
