//! Expertise index
//!
//! A periodically rebuilt clustering of knowledge artifacts into named
//! domains. The serving path loads the snapshot read-only; a missing or
//! unparseable index degrades retrieval to a full scan, never an error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// How deep the agent's experience runs in one domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Depth {
    Deep,
    Working,
    #[default]
    Surface,
}

/// One named cluster of related artifacts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpertiseDomain {
    pub name: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub depth: Depth,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Member artifact ids (`sessions` on disk)
    #[serde(rename = "sessions", default)]
    pub artifact_ids: Vec<String>,
    /// Key insights aggregated from member artifacts
    #[serde(rename = "key_insights", default)]
    pub insights: Vec<String>,
}

/// Versioned snapshot of the agent's expertise
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ExpertiseIndex {
    #[serde(default)]
    pub domains: Vec<ExpertiseDomain>,
    #[serde(default)]
    pub session_count: usize,
    #[serde(default)]
    pub generated_at: Option<DateTime<Utc>>,
}

impl ExpertiseIndex {
    /// Load a snapshot from YAML; any failure reads as "no index".
    pub fn load(path: &Path) -> Option<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                debug!("Expertise index not readable at {}: {}", path.display(), e);
                return None;
            }
        };
        match serde_yaml::from_str(&content) {
            Ok(index) => Some(index),
            Err(e) => {
                debug!("Expertise index unparseable at {}: {}", path.display(), e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_disk_format() {
        let yaml = "\
domains:
  - name: Nix packaging
    summary: Flake-based packaging and deploys
    depth: deep
    tags: [nix, flakes, deploy]
    sessions: [abc-123, def-456]
    key_insights:
      - Pin the nixpkgs revision in the flake lock
session_count: 12
generated_at: 2025-06-01T00:00:00Z
";
        let index: ExpertiseIndex = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(index.domains.len(), 1);
        assert_eq!(index.domains[0].depth, Depth::Deep);
        assert_eq!(index.domains[0].artifact_ids, vec!["abc-123", "def-456"]);
        assert_eq!(index.session_count, 12);
    }

    #[test]
    fn load_missing_file_is_none() {
        assert!(ExpertiseIndex::load(Path::new("/nonexistent/index.yaml")).is_none());
    }
}
