//! Synthesis prompt and forced-output schema

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::knowledge::ConfidenceLevel;
use crate::retrieval::RankedArtifact;

pub const SYNTHESIZE_TOOL: &str = "synthesize_response";

pub const SYNTHESIZE_DESCRIPTION: &str =
    "Provide a synthesized response based on experience from past sessions.";

/// Forced tool input schema for a synthesized answer
pub fn synthesize_schema() -> Value {
    json!({
        "type": "object",
        "required": ["response", "confidence", "based_on_sessions", "followup_available"],
        "properties": {
            "response": {
                "type": "string",
                "description": "The synthesized answer drawing from session experience"
            },
            "confidence": {
                "type": "string",
                "enum": ["high", "medium", "low"],
                "description": "Confidence in the answer based on available session evidence"
            },
            "based_on_sessions": {
                "type": "array",
                "items": { "type": "string" },
                "description": "Session IDs that informed this answer"
            },
            "followup_available": {
                "type": "boolean",
                "description": "Whether the agent has more relevant experience to share on follow-up"
            }
        }
    })
}

/// The structured answer the collaborator must return
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisResult {
    pub response: String,
    pub confidence: ConfidenceLevel,
    pub based_on_sessions: Vec<String>,
    pub followup_available: bool,
}

/// System prompt grounding the answer in retrieved artifacts.
pub fn build_system_prompt(artifacts: &[RankedArtifact]) -> String {
    if artifacts.is_empty() {
        return "You are a knowledge agent answering questions based on your accumulated \
session experience.\n\n\
You have no relevant sessions to draw from for this question. Respond honestly that you \
don't have direct experience with this topic. Set confidence to \"low\" and \
based_on_sessions to an empty array.\n\n\
You MUST call the synthesize_response tool with your answer."
            .to_string();
    }

    let session_content = artifacts
        .iter()
        .map(|ranked| {
            let body = ranked
                .artifact
                .serialize()
                .unwrap_or_else(|_| ranked.artifact.key_insight.clone().unwrap_or_default());
            format!("--- Session: {} ---\n{}", ranked.artifact.id, body)
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "You are a knowledge agent answering questions based on your accumulated session \
experience.\n\n\
Below are relevant sessions from your past work. Answer the question by synthesizing \
insights from these sessions. Only state what you actually experienced - do not fabricate \
or extrapolate beyond the session evidence.\n\n\
{session_content}\n\n\
You MUST call the synthesize_response tool with your answer."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_retrieval_prompts_for_honesty() {
        let prompt = build_system_prompt(&[]);
        assert!(prompt.contains("no relevant sessions"));
        assert!(prompt.contains("synthesize_response"));
    }

    #[test]
    fn schema_requires_all_reply_fields() {
        let schema = synthesize_schema();
        let required = schema["required"].as_array().unwrap();
        assert_eq!(required.len(), 4);
    }

    #[test]
    fn synthesis_result_parses_from_tool_output() {
        let value = json!({
            "response": "Pin the flake lock.",
            "confidence": "high",
            "based_on_sessions": ["abc-123"],
            "followup_available": true
        });
        let result: SynthesisResult = serde_json::from_value(value).unwrap();
        assert_eq!(result.confidence, ConfidenceLevel::High);
        assert_eq!(result.based_on_sessions, vec!["abc-123"]);
    }
}
