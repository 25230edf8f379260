//! Relevance scoring and artifact retrieval

pub mod engine;
pub mod scorer;

pub use engine::{RankedArtifact, RetrievalEngine, RetrievalOutcome};
pub use scorer::{extract_keywords, insight_match, recency, tag_overlap};
