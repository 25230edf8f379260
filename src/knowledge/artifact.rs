//! Knowledge artifacts
//!
//! One artifact is the distilled record of a past problem-solving session:
//! YAML frontmatter (metadata used for retrieval scoring) followed by
//! markdown narrative sections. The distillation pipeline writes these;
//! the serving path only parses and re-serializes them.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

use crate::types::{ColloquyError, Result};

/// Narrative sections every distilled artifact carries, in emit order.
pub const CANONICAL_SECTIONS: [&str; 5] = [
    "What Was Built",
    "What Failed First",
    "What Worked",
    "Gotchas",
    "Code Patterns",
];

/// How the recorded session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Partial,
    Failed,
    Exploratory,
    #[default]
    Undistilled,
}

/// Confidence the distiller assigned to the artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    High,
    Medium,
    #[default]
    Low,
}

/// Immutable record of one past session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeArtifact {
    /// Artifact id (`session_id` on disk)
    #[serde(rename = "session_id", default)]
    pub id: String,
    /// When the session happened; drives recency scoring
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub task: String,
    #[serde(default)]
    pub outcome: Outcome,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub stack: Vec<String>,
    #[serde(default)]
    pub duration_minutes: Option<f64>,
    #[serde(default)]
    pub key_insight: Option<String>,
    #[serde(default)]
    pub confidence: ConfidenceLevel,
    /// Markdown body split on `## Heading` lines; not part of the frontmatter
    #[serde(skip)]
    pub sections: BTreeMap<String, String>,
}

/// Accept RFC 3339, date-only, or absent timestamps; anything else is None
/// rather than a parse failure, so one odd field never drops an artifact.
fn lenient_timestamp<'de, D>(deserializer: D) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(parse_timestamp))
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| DateTime::from_naive_utc_and_offset(dt, Utc))
}

impl KnowledgeArtifact {
    /// Parse an artifact from frontmatter-markdown text.
    pub fn parse(content: &str) -> Result<Self> {
        let (frontmatter, body) = split_frontmatter(content)?;
        let mut artifact: KnowledgeArtifact = serde_yaml::from_str(frontmatter)?;
        artifact.sections = split_sections(body);
        Ok(artifact)
    }

    /// Re-emit the artifact as frontmatter-markdown, canonical sections first.
    pub fn serialize(&self) -> Result<String> {
        let frontmatter = serde_yaml::to_string(self)?;
        let mut out = format!("---\n{frontmatter}---\n\n");
        for name in CANONICAL_SECTIONS {
            let text = self.sections.get(name).map(String::as_str).unwrap_or("");
            out.push_str(&format!("## {name}\n\n{text}\n\n"));
        }
        for (name, text) in &self.sections {
            if !CANONICAL_SECTIONS.contains(&name.as_str()) {
                out.push_str(&format!("## {name}\n\n{text}\n\n"));
            }
        }
        out.truncate(out.trim_end().len());
        out.push('\n');
        Ok(out)
    }

    /// Report everything a distiller is expected to have filled in.
    /// Empty means the artifact is complete.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.id.is_empty() {
            errors.push("Missing required field: session_id".to_string());
        }
        if self.timestamp.is_none() {
            errors.push("Missing required field: timestamp".to_string());
        }
        if self.project.is_empty() {
            errors.push("Missing required field: project".to_string());
        }
        if self.task.is_empty() {
            errors.push("Missing required field: task".to_string());
        }
        if self.tags.is_empty() {
            errors.push("tags must not be empty".to_string());
        }
        if self.duration_minutes.is_none() {
            errors.push("Missing required field: duration_minutes".to_string());
        }
        if self.key_insight.as_deref().unwrap_or("").is_empty() {
            errors.push("Missing required field: key_insight".to_string());
        }
        for name in CANONICAL_SECTIONS {
            if self.sections.get(name).map(|s| s.trim().is_empty()).unwrap_or(true) {
                errors.push(format!("Missing or empty section: {name}"));
            }
        }
        errors
    }
}

/// Split `---` delimited YAML frontmatter from the markdown body.
fn split_frontmatter(content: &str) -> Result<(&str, &str)> {
    let rest = content
        .strip_prefix("---\n")
        .or_else(|| content.strip_prefix("---\r\n"))
        .ok_or_else(|| ColloquyError::Serialize("missing frontmatter delimiter".to_string()))?;
    let end = rest
        .find("\n---")
        .ok_or_else(|| ColloquyError::Serialize("unterminated frontmatter".to_string()))?;
    let frontmatter = &rest[..end + 1];
    let body = rest[end + 4..].trim_start_matches(['-']).trim_start_matches(['\r', '\n']);
    Ok((frontmatter, body))
}

/// Split a markdown body on `## Heading` lines.
fn split_sections(body: &str) -> BTreeMap<String, String> {
    let mut sections = BTreeMap::new();
    let mut current: Option<(String, Vec<&str>)> = None;

    for line in body.lines() {
        if let Some(heading) = line.strip_prefix("## ") {
            if let Some((name, lines)) = current.take() {
                sections.insert(name, lines.join("\n").trim().to_string());
            }
            current = Some((heading.trim().to_string(), Vec::new()));
        } else if let Some((_, lines)) = current.as_mut() {
            lines.push(line);
        }
    }
    if let Some((name, lines)) = current {
        sections.insert(name, lines.join("\n").trim().to_string());
    }
    sections
}
