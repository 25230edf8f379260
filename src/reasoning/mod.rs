//! Reasoning collaborator
//!
//! The language model is a black box behind the `Reasoner` trait: given a
//! prompt and a forced output schema, it returns a structured answer or a
//! typed failure. Prompt construction belongs to the callers.

pub mod anthropic;

use async_trait::async_trait;
use serde_json::Value;

use crate::types::Result;

pub use anthropic::AnthropicReasoner;

/// A conversation turn handed to the collaborator
#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

/// One structured-output request
#[derive(Debug, Clone)]
pub struct ReasoningRequest {
    pub system: Option<String>,
    pub messages: Vec<ChatTurn>,
    /// Name of the forced tool the collaborator must call
    pub tool_name: String,
    pub tool_description: String,
    /// JSON schema of the forced tool input
    pub schema: Value,
    pub max_tokens: u32,
}

/// Blocking, cancellable external reasoning call. On timeout or error the
/// caller receives `ColloquyError::Collaborator`; retries are a caller
/// concern, never automatic.
#[async_trait]
pub trait Reasoner: Send + Sync {
    async fn reason(&self, request: ReasoningRequest) -> Result<Value>;
}
