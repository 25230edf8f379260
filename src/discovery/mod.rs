//! Agent discovery
//!
//! Ranks registered agents against a free-text query: a keyword-scored
//! shortlist first, then (when a reasoning collaborator is available) an
//! authoritative re-ranking with per-agent reasoning. Without a
//! collaborator the raw shortlist is returned with a generic rationale.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

use crate::knowledge::Depth;
use crate::reasoning::{ChatTurn, Reasoner, ReasoningRequest, Role};
use crate::registry::AgentRecord;
use crate::retrieval::scorer::{
    extract_keywords, insight_match, tag_overlap, DISCOVERY_INSIGHT_WEIGHT, DISCOVERY_TAG_WEIGHT,
};
use crate::types::{ColloquyError, Result};

/// Default shortlist size handed to the reasoning collaborator
pub const DEFAULT_SHORTLIST_SIZE: usize = 10;

const RECOMMEND_TOOL: &str = "recommend_agents";
const RECOMMEND_DESCRIPTION: &str = "Recommend agents that can best answer the user's query.";
const RECOMMEND_MAX_TOKENS: u32 = 2048;

/// A shortlisted agent with its raw score
#[derive(Debug, Clone)]
pub struct ScoredAgent {
    pub record: AgentRecord,
    pub score: f64,
}

/// A domain that contributed to a recommendation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingDomain {
    pub name: String,
    #[serde(default)]
    pub depth: Option<Depth>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// One ranked recommendation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub agent_id: String,
    pub relevance_score: f64,
    pub reasoning: String,
    pub matching_domains: Vec<MatchingDomain>,
}

/// Score agents against query keywords: per agent, the best domain score
/// under the discovery weights (tag overlap + best insight match). Agents
/// without a positive score are dropped; the rest sort descending.
pub fn shortlist(query: &str, agents: &[AgentRecord], max_results: usize) -> Vec<ScoredAgent> {
    let keywords = extract_keywords(query);
    if keywords.is_empty() {
        return Vec::new();
    }

    let mut scored: Vec<ScoredAgent> = agents
        .iter()
        .filter_map(|agent| {
            let domains = agent
                .expertise_index
                .as_ref()
                .map(|index| index.domains.as_slice())
                .unwrap_or_default();

            let mut best: f64 = 0.0;
            for domain in domains {
                let tag_score = tag_overlap(&keywords, &domain.tags);
                let best_insight = domain
                    .insights
                    .iter()
                    .map(|insight| insight_match(&keywords, insight))
                    .fold(0.0, f64::max);
                let domain_score =
                    tag_score * DISCOVERY_TAG_WEIGHT + best_insight * DISCOVERY_INSIGHT_WEIGHT;
                best = best.max(domain_score);
            }

            (best > 0.0).then(|| ScoredAgent {
                record: agent.clone(),
                score: best,
            })
        })
        .collect();

    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored.truncate(max_results);
    scored
}

fn recommend_schema() -> Value {
    json!({
        "type": "object",
        "required": ["recommendations"],
        "properties": {
            "recommendations": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["agent_id", "relevance_score", "reasoning", "matching_domains"],
                    "properties": {
                        "agent_id": { "type": "string", "description": "ID of the recommended agent" },
                        "relevance_score": { "type": "number", "description": "Relevance score 0-1" },
                        "reasoning": { "type": "string", "description": "Why this agent is a good match" },
                        "matching_domains": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "properties": {
                                    "name": { "type": "string" },
                                    "depth": { "type": "string" },
                                    "tags": { "type": "array", "items": { "type": "string" } }
                                }
                            },
                            "description": "Domains that match the query"
                        }
                    }
                }
            }
        }
    })
}

fn depth_label(depth: Depth) -> &'static str {
    match depth {
        Depth::Deep => "deep",
        Depth::Working => "working",
        Depth::Surface => "surface",
    }
}

fn build_discovery_prompt(shortlisted: &[ScoredAgent]) -> String {
    let profiles = shortlisted
        .iter()
        .map(|scored| {
            let agent = &scored.record;
            let domains = agent
                .expertise_index
                .as_ref()
                .map(|index| {
                    index
                        .domains
                        .iter()
                        .map(|d| {
                            format!(
                                "  - {} (depth: {}, tags: {})",
                                d.name,
                                depth_label(d.depth),
                                d.tags.join(", ")
                            )
                        })
                        .collect::<Vec<_>>()
                        .join("\n")
                })
                .unwrap_or_default();
            let session_count = agent
                .expertise_index
                .as_ref()
                .map(|index| index.session_count.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            let payment = agent
                .payment
                .as_ref()
                .map(|p| format!("{} {}", p.amount, p.unit))
                .unwrap_or_else(|| "free".to_string());

            format!(
                "Agent: {}\nDisplay Name: {}\nDomains:\n{}\nSession Count: {}\nPayment: {}",
                agent.agent_id,
                agent.display_name.as_deref().unwrap_or(&agent.agent_id),
                domains,
                session_count,
                payment
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n---\n\n");

    format!(
        "You are a directory service matching user queries to the best available agents.\n\n\
Below are agent profiles with their expertise domains. Recommend the agents most likely \
to answer the query well. Consider tag relevance, domain depth, and breadth of \
expertise.\n\n\
{profiles}\n\n\
You MUST call the recommend_agents tool with your recommendations. Rank by \
relevance_score descending."
    )
}

#[derive(Deserialize)]
struct RecommendOutput {
    recommendations: Vec<Recommendation>,
}

/// Matches discovery queries against online agents
pub struct DiscoveryMatcher {
    reasoner: Option<Arc<dyn Reasoner>>,
    shortlist_size: usize,
}

impl DiscoveryMatcher {
    pub fn new(reasoner: Option<Arc<dyn Reasoner>>, shortlist_size: usize) -> Self {
        Self {
            reasoner,
            shortlist_size,
        }
    }

    /// Rank online agents for a query. Empty keywords or no positive score
    /// mean zero recommendations, not an error.
    pub async fn discover(
        &self,
        query: &str,
        online_agents: &[AgentRecord],
    ) -> Result<Vec<Recommendation>> {
        let shortlisted = shortlist(query, online_agents, self.shortlist_size);
        if shortlisted.is_empty() {
            debug!("Discovery query matched no agents");
            return Ok(Vec::new());
        }

        let Some(reasoner) = &self.reasoner else {
            // No collaborator: the raw scores are the ranking
            return Ok(shortlisted
                .into_iter()
                .map(|scored| Recommendation {
                    agent_id: scored.record.agent_id.clone(),
                    relevance_score: scored.score,
                    reasoning: "Matched by keyword scoring".to_string(),
                    matching_domains: scored
                        .record
                        .expertise_index
                        .as_ref()
                        .map(|index| {
                            index
                                .domains
                                .iter()
                                .map(|d| MatchingDomain {
                                    name: d.name.clone(),
                                    depth: Some(d.depth),
                                    tags: d.tags.clone(),
                                })
                                .collect()
                        })
                        .unwrap_or_default(),
                })
                .collect());
        };

        // The collaborator's ranking is authoritative once invoked
        let output = reasoner
            .reason(ReasoningRequest {
                system: Some(build_discovery_prompt(&shortlisted)),
                messages: vec![ChatTurn {
                    role: Role::User,
                    content: query.to_string(),
                }],
                tool_name: RECOMMEND_TOOL.to_string(),
                tool_description: RECOMMEND_DESCRIPTION.to_string(),
                schema: recommend_schema(),
                max_tokens: RECOMMEND_MAX_TOKENS,
            })
            .await?;

        let parsed: RecommendOutput = serde_json::from_value(output)
            .map_err(|e| ColloquyError::Collaborator(format!("bad recommendation output: {e}")))?;
        info!(
            "Discovery produced {} recommendation(s)",
            parsed.recommendations.len()
        );
        Ok(parsed.recommendations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::{ExpertiseDomain, ExpertiseIndex};
    use crate::registry::AgentStatus;
    use async_trait::async_trait;
    use chrono::Utc;

    fn agent(id: &str, tags: &[&str], insights: &[&str]) -> AgentRecord {
        AgentRecord {
            agent_id: id.to_string(),
            display_name: Some(id.to_string()),
            connection_key: format!("tcp://127.0.0.1:1/{id}"),
            expertise_index: Some(ExpertiseIndex {
                domains: vec![ExpertiseDomain {
                    name: format!("{id} domain"),
                    summary: String::new(),
                    depth: Depth::Working,
                    tags: tags.iter().map(|t| t.to_string()).collect(),
                    artifact_ids: Vec::new(),
                    insights: insights.iter().map(|i| i.to_string()).collect(),
                }],
                session_count: 3,
                generated_at: None,
            }),
            payment: None,
            status: AgentStatus::Online,
            registered_at: Utc::now(),
            last_heartbeat: Utc::now(),
        }
    }

    #[test]
    fn stopword_only_query_yields_nothing() {
        let agents = vec![agent("a", &["nix"], &[])];
        assert!(shortlist("the and of", &agents, 10).is_empty());
    }

    #[test]
    fn unrelated_agents_are_dropped() {
        let agents = vec![agent("pg", &["postgres"], &["vacuum often"])];
        assert!(shortlist("nix flakes", &agents, 10).is_empty());
    }

    #[test]
    fn best_match_ranks_first() {
        let agents = vec![
            agent("pg", &["postgres", "sql"], &["vacuum often"]),
            agent("nix", &["nix", "flakes"], &["pin the flake lock"]),
        ];
        let scored = shortlist("how do I set up nix flakes", &agents, 10);
        assert_eq!(scored[0].record.agent_id, "nix");
        assert!(scored[0].score > 0.0);
    }

    #[test]
    fn agents_without_an_index_never_match() {
        let mut bare = agent("bare", &[], &[]);
        bare.expertise_index = None;
        assert!(shortlist("nix", &[bare], 10).is_empty());
    }

    #[tokio::test]
    async fn no_reasoner_returns_raw_shortlist_with_generic_rationale() {
        let agents = vec![agent("nix", &["nix", "flakes"], &["pin the flake lock"])];
        let matcher = DiscoveryMatcher::new(None, DEFAULT_SHORTLIST_SIZE);

        let recommendations = matcher
            .discover("how do I set up nix flakes", &agents)
            .await
            .unwrap();

        assert_eq!(recommendations.len(), 1);
        assert_eq!(recommendations[0].agent_id, "nix");
        assert!(recommendations[0].relevance_score > 0.0);
        assert_eq!(recommendations[0].reasoning, "Matched by keyword scoring");
        assert_eq!(recommendations[0].matching_domains.len(), 1);
    }

    struct FixedReasoner(Value);

    #[async_trait]
    impl Reasoner for FixedReasoner {
        async fn reason(&self, _request: ReasoningRequest) -> Result<Value> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn reasoner_ranking_is_authoritative() {
        let agents = vec![
            agent("a", &["nix"], &[]),
            agent("b", &["nix", "flakes"], &["pin the flake lock"]),
        ];
        let reasoner = Arc::new(FixedReasoner(json!({
            "recommendations": [{
                "agent_id": "a",
                "relevance_score": 0.9,
                "reasoning": "Deep nix experience",
                "matching_domains": [{ "name": "a domain", "depth": "working", "tags": ["nix"] }]
            }]
        })));
        let matcher = DiscoveryMatcher::new(Some(reasoner), DEFAULT_SHORTLIST_SIZE);

        let recommendations = matcher.discover("nix flakes", &agents).await.unwrap();
        assert_eq!(recommendations.len(), 1);
        assert_eq!(recommendations[0].agent_id, "a");
        assert_eq!(recommendations[0].reasoning, "Deep nix experience");
    }

    #[tokio::test]
    async fn collaborator_failure_propagates_typed() {
        struct FailingReasoner;

        #[async_trait]
        impl Reasoner for FailingReasoner {
            async fn reason(&self, _request: ReasoningRequest) -> Result<Value> {
                Err(ColloquyError::Collaborator("timed out".to_string()))
            }
        }

        let agents = vec![agent("nix", &["nix"], &[])];
        let matcher = DiscoveryMatcher::new(Some(Arc::new(FailingReasoner)), 10);

        let result = matcher.discover("nix", &agents).await;
        assert!(matches!(result, Err(ColloquyError::Collaborator(_))));
    }
}
