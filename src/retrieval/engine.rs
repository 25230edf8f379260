//! Artifact retrieval
//!
//! Shortlists knowledge artifacts for a question: the expertise index acts
//! as a coarse domain pre-filter when present, then every candidate gets the
//! three-signal weighted score. Index absence degrades to a full scan.

use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::knowledge::{ExpertiseIndex, KnowledgeArtifact};
use crate::retrieval::scorer::{
    extract_keywords, insight_match, recency, tag_overlap, RETRIEVAL_INSIGHT_WEIGHT,
    RETRIEVAL_RECENCY_WEIGHT, RETRIEVAL_TAG_WEIGHT,
};
use crate::types::Result;

/// Default cap on artifacts returned per question
pub const DEFAULT_MAX_ARTIFACTS: usize = 5;

/// One scored artifact with explainability data
#[derive(Debug, Clone)]
pub struct RankedArtifact {
    pub artifact: KnowledgeArtifact,
    pub score: f64,
    /// Tags whose normalized form contains or equals a query keyword
    pub matched_tags: Vec<String>,
    /// Source file name, for logs
    pub file: String,
}

/// Retrieval result: the shortlist plus what the query matched
#[derive(Debug, Clone)]
pub struct RetrievalOutcome {
    pub artifacts: Vec<RankedArtifact>,
    pub keywords: Vec<String>,
    pub matched_domains: Vec<String>,
}

/// Scores artifacts on disk against free-text questions
pub struct RetrievalEngine {
    artifacts_dir: PathBuf,
    index_path: Option<PathBuf>,
    max_artifacts: usize,
}

impl RetrievalEngine {
    pub fn new(artifacts_dir: PathBuf, index_path: Option<PathBuf>) -> Self {
        Self {
            artifacts_dir,
            index_path,
            max_artifacts: DEFAULT_MAX_ARTIFACTS,
        }
    }

    pub fn with_max_artifacts(mut self, max_artifacts: usize) -> Self {
        self.max_artifacts = max_artifacts;
        self
    }

    /// Shortlist artifacts relevant to a question.
    pub fn retrieve(&self, question: &str) -> Result<RetrievalOutcome> {
        let keywords = extract_keywords(question);

        // Domain pre-filter from the index, when one loads
        let index = self.index_path.as_deref().and_then(ExpertiseIndex::load);
        let mut matched_domains: Vec<(String, f64)> = Vec::new();
        let mut candidate_ids: Option<std::collections::HashSet<String>> = None;

        if let Some(index) = index {
            for domain in &index.domains {
                let score = tag_overlap(&keywords, &domain.tags);
                if score > 0.0 {
                    matched_domains.push((domain.name.clone(), score));
                }
            }
            matched_domains.sort_by(|a, b| b.1.total_cmp(&a.1));

            if !matched_domains.is_empty() {
                let names: std::collections::HashSet<&str> =
                    matched_domains.iter().map(|(n, _)| n.as_str()).collect();
                candidate_ids = Some(
                    index
                        .domains
                        .iter()
                        .filter(|d| names.contains(d.name.as_str()))
                        .flat_map(|d| d.artifact_ids.iter().cloned())
                        .collect(),
                );
            }
        }

        let mut ranked = self.scan_and_score(&keywords, candidate_ids.as_ref());

        // A pre-filter that eliminated everything degrades to a full scan
        // rather than returning nothing for a corpus that does have content.
        if ranked.is_empty() && candidate_ids.is_some() {
            debug!("Index pre-filter produced no candidates, rescanning full corpus");
            ranked = self.scan_and_score(&keywords, None);
        }

        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
        ranked.truncate(self.max_artifacts);

        Ok(RetrievalOutcome {
            artifacts: ranked,
            keywords,
            matched_domains: matched_domains.into_iter().map(|(n, _)| n).collect(),
        })
    }

    fn scan_and_score(
        &self,
        keywords: &[String],
        candidate_ids: Option<&std::collections::HashSet<String>>,
    ) -> Vec<RankedArtifact> {
        let mut ranked = Vec::new();

        for entry in WalkDir::new(&self.artifacts_dir)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() || entry.path().extension().map_or(true, |e| e != "md")
            {
                continue;
            }
            let Some(artifact) = read_artifact(entry.path()) else {
                continue;
            };
            if let Some(ids) = candidate_ids {
                if !ids.contains(&artifact.id) {
                    continue;
                }
            }
            ranked.push(score_artifact(keywords, artifact, entry.path()));
        }
        ranked
    }
}

fn read_artifact(path: &Path) -> Option<KnowledgeArtifact> {
    let content = std::fs::read_to_string(path).ok()?;
    match KnowledgeArtifact::parse(&content) {
        Ok(artifact) => Some(artifact),
        Err(e) => {
            // Unparseable artifacts are skipped, never fatal
            warn!("Skipping unparseable artifact {}: {}", path.display(), e);
            None
        }
    }
}

fn score_artifact(keywords: &[String], artifact: KnowledgeArtifact, path: &Path) -> RankedArtifact {
    let all_tags: Vec<String> = artifact
        .tags
        .iter()
        .chain(artifact.stack.iter())
        .cloned()
        .collect();

    let tag_score = tag_overlap(keywords, &all_tags);
    let insight_score = insight_match(keywords, artifact.key_insight.as_deref().unwrap_or(""));
    let recency_score = recency(artifact.timestamp);

    let score = tag_score * RETRIEVAL_TAG_WEIGHT
        + insight_score * RETRIEVAL_INSIGHT_WEIGHT
        + recency_score * RETRIEVAL_RECENCY_WEIGHT;

    let matched_tags = all_tags
        .into_iter()
        .filter(|tag| {
            let lower = tag.to_lowercase();
            keywords.iter().any(|kw| {
                lower.contains(kw.as_str())
                    || lower.split(['-', '_']).any(|part| part == kw.as_str())
            })
        })
        .collect();

    let file = path
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_default();

    RankedArtifact {
        artifact,
        score,
        matched_tags,
        file,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_artifact(dir: &Path, name: &str, id: &str, timestamp: &str, tags: &[&str], insight: &str) {
        let tag_list = tags
            .iter()
            .map(|t| format!("  - {t}"))
            .collect::<Vec<_>>()
            .join("\n");
        let content = format!(
            "---\nsession_id: {id}\ntimestamp: {timestamp}\nproject: p\ntask: t\noutcome: success\ntags:\n{tag_list}\nduration_minutes: 30\nkey_insight: {insight}\nconfidence: high\n---\n\n## What Was Built\n\nx\n\n## What Failed First\n\nx\n\n## What Worked\n\nx\n\n## Gotchas\n\nx\n\n## Code Patterns\n\nx\n"
        );
        fs::write(dir.join(name), content).unwrap();
    }

    fn recent() -> String {
        (chrono::Utc::now() - chrono::Duration::days(1)).to_rfc3339()
    }

    fn old() -> String {
        (chrono::Utc::now() - chrono::Duration::days(60)).to_rfc3339()
    }

    #[test]
    fn ranks_matching_artifacts_first() {
        let tmp = TempDir::new().unwrap();
        write_artifact(tmp.path(), "a.md", "a", &recent(), &["nix", "flakes"], "pin the flake lock");
        write_artifact(tmp.path(), "b.md", "b", &recent(), &["postgres"], "vacuum often");

        let engine = RetrievalEngine::new(tmp.path().to_path_buf(), None);
        let result = engine.retrieve("how do I set up nix flakes").unwrap();

        assert_eq!(result.artifacts[0].artifact.id, "a");
        assert!(result.artifacts[0].score > result.artifacts[1].score);
        assert!(result.artifacts[0].matched_tags.contains(&"nix".to_string()));
    }

    #[test]
    fn more_recent_identical_artifact_scores_at_least_as_high() {
        let tmp = TempDir::new().unwrap();
        write_artifact(tmp.path(), "new.md", "new", &recent(), &["nix"], "same insight");
        write_artifact(tmp.path(), "old.md", "old", &old(), &["nix"], "same insight");

        let engine = RetrievalEngine::new(tmp.path().to_path_buf(), None);
        let result = engine.retrieve("nix").unwrap();

        assert_eq!(result.artifacts[0].artifact.id, "new");
        assert!(result.artifacts[0].score >= result.artifacts[1].score);
    }

    #[test]
    fn index_acts_as_prefilter() {
        let tmp = TempDir::new().unwrap();
        write_artifact(tmp.path(), "a.md", "a", &recent(), &["nix"], "flake lock");
        write_artifact(tmp.path(), "b.md", "b", &recent(), &["nix"], "other nix work");

        let index_path = tmp.path().join("index.yaml");
        fs::write(
            &index_path,
            "domains:\n  - name: Nix\n    depth: deep\n    tags: [nix]\n    sessions: [a]\n",
        )
        .unwrap();

        let engine = RetrievalEngine::new(tmp.path().to_path_buf(), Some(index_path));
        let result = engine.retrieve("nix flakes").unwrap();

        assert_eq!(result.artifacts.len(), 1);
        assert_eq!(result.artifacts[0].artifact.id, "a");
        assert_eq!(result.matched_domains, vec!["Nix"]);
    }

    #[test]
    fn missing_index_degrades_to_full_scan() {
        let tmp = TempDir::new().unwrap();
        write_artifact(tmp.path(), "a.md", "a", &recent(), &["nix"], "flake lock");

        let engine = RetrievalEngine::new(
            tmp.path().to_path_buf(),
            Some(tmp.path().join("no-such-index.yaml")),
        );
        let result = engine.retrieve("nix").unwrap();
        assert_eq!(result.artifacts.len(), 1);
        assert!(result.matched_domains.is_empty());
    }

    #[test]
    fn unparseable_artifacts_are_skipped() {
        let tmp = TempDir::new().unwrap();
        write_artifact(tmp.path(), "a.md", "a", &recent(), &["nix"], "flake lock");
        fs::write(tmp.path().join("broken.md"), "not an artifact").unwrap();

        let engine = RetrievalEngine::new(tmp.path().to_path_buf(), None);
        let result = engine.retrieve("nix").unwrap();
        assert_eq!(result.artifacts.len(), 1);
    }

    #[test]
    fn stopword_only_query_returns_without_crashing() {
        let tmp = TempDir::new().unwrap();
        write_artifact(tmp.path(), "a.md", "a", &recent(), &["nix"], "flake lock");

        let engine = RetrievalEngine::new(tmp.path().to_path_buf(), None);
        let result = engine.retrieve("the and of").unwrap();
        assert!(result.keywords.is_empty());
        // Full corpus still returned (recency keeps scores comparable)
        assert_eq!(result.artifacts.len(), 1);
    }

    #[test]
    fn empty_corpus_returns_empty() {
        let tmp = TempDir::new().unwrap();
        let engine = RetrievalEngine::new(tmp.path().to_path_buf(), None);
        let result = engine.retrieve("nix").unwrap();
        assert!(result.artifacts.is_empty());
    }
}
