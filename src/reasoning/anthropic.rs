//! Anthropic Messages API client with forced tool output

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::reasoning::{ReasoningRequest, Reasoner, Role};
use crate::types::{ColloquyError, Result};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    tools: Vec<ToolDefinition>,
    tool_choice: ToolChoice,
    messages: Vec<WireMessage>,
}

#[derive(Serialize)]
struct ToolDefinition {
    name: String,
    description: String,
    input_schema: Value,
}

#[derive(Serialize)]
struct ToolChoice {
    #[serde(rename = "type")]
    choice_type: &'static str,
    name: String,
}

#[derive(Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    input: Option<Value>,
}

/// Reasoner backed by the Anthropic Messages API
pub struct AnthropicReasoner {
    model: String,
    api_key: String,
    http: reqwest::Client,
}

impl AnthropicReasoner {
    pub fn new(model: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ColloquyError::Collaborator(format!("client init: {e}")))?;
        Ok(Self {
            model: model.to_string(),
            api_key: api_key.to_string(),
            http,
        })
    }

    fn build_body(&self, request: &ReasoningRequest) -> MessagesRequest {
        MessagesRequest {
            model: self.model.clone(),
            max_tokens: request.max_tokens,
            system: request.system.clone(),
            tools: vec![ToolDefinition {
                name: request.tool_name.clone(),
                description: request.tool_description.clone(),
                input_schema: request.schema.clone(),
            }],
            tool_choice: ToolChoice {
                choice_type: "tool",
                name: request.tool_name.clone(),
            },
            messages: request
                .messages
                .iter()
                .map(|turn| WireMessage {
                    role: match turn.role {
                        Role::User => "user",
                        Role::Assistant => "assistant",
                    },
                    content: turn.content.clone(),
                })
                .collect(),
        }
    }
}

#[async_trait]
impl Reasoner for AnthropicReasoner {
    async fn reason(&self, request: ReasoningRequest) -> Result<Value> {
        let body = self.build_body(&request);

        let response = self
            .http
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ColloquyError::Collaborator("reasoning call timed out".to_string())
                } else {
                    ColloquyError::Collaborator(format!("reasoning request failed: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ColloquyError::Collaborator(format!(
                "reasoning API error {status}: {detail}"
            )));
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| ColloquyError::Collaborator(format!("bad reasoning response: {e}")))?;

        parsed
            .content
            .into_iter()
            .find(|block| block.block_type == "tool_use")
            .and_then(|block| block.input)
            .ok_or_else(|| {
                ColloquyError::Collaborator("model did not call the forced tool".to_string())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reasoning::ChatTurn;
    use serde_json::json;

    #[test]
    fn request_body_forces_the_tool() {
        let reasoner =
            AnthropicReasoner::new("claude-sonnet-4-5-20250929", "sk-test", Duration::from_secs(5))
                .unwrap();
        let request = ReasoningRequest {
            system: Some("You are a directory service.".to_string()),
            messages: vec![ChatTurn {
                role: Role::User,
                content: "nix flakes".to_string(),
            }],
            tool_name: "recommend_agents".to_string(),
            tool_description: "Recommend agents.".to_string(),
            schema: json!({"type": "object"}),
            max_tokens: 2048,
        };

        let body = serde_json::to_value(reasoner.build_body(&request)).unwrap();
        assert_eq!(body["model"], "claude-sonnet-4-5-20250929");
        assert_eq!(body["system"], "You are a directory service.");
        assert_eq!(body["tool_choice"]["type"], "tool");
        assert_eq!(body["tool_choice"]["name"], "recommend_agents");
        assert_eq!(body["tools"][0]["name"], "recommend_agents");
        assert_eq!(body["messages"][0]["role"], "user");
    }
}
