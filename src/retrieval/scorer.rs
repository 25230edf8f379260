//! Relevance scoring primitives
//!
//! Three independent similarity signals over extracted keywords. Pure and
//! deterministic; retrieval and discovery combine them with different
//! weights.

use chrono::{DateTime, Utc};
use std::collections::HashSet;

/// Weights for ranking artifacts against a query
pub const RETRIEVAL_TAG_WEIGHT: f64 = 0.5;
pub const RETRIEVAL_INSIGHT_WEIGHT: f64 = 0.3;
pub const RETRIEVAL_RECENCY_WEIGHT: f64 = 0.2;

/// Weights for ranking agents against a discovery query
pub const DISCOVERY_TAG_WEIGHT: f64 = 0.6;
pub const DISCOVERY_INSIGHT_WEIGHT: f64 = 0.4;

/// Recency decays linearly to zero over this many days
const RECENCY_HORIZON_DAYS: f64 = 90.0;

const STOPWORDS: [&str; 84] = [
    "a", "an", "the", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
    "from", "as", "is", "was", "are", "were", "be", "been", "being", "have", "has", "had", "do",
    "does", "did", "will", "would", "could", "should", "may", "might", "can", "shall", "not",
    "no", "nor", "so", "if", "then", "than", "that", "this", "these", "those", "it", "its", "i",
    "me", "my", "we", "us", "our", "you", "your", "he", "him", "his", "she", "her", "they",
    "them", "their", "what", "which", "who", "when", "where", "how", "why", "all", "each",
    "every", "any", "some", "about", "up", "out", "just", "also", "very",
];

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Lowercased query tokens with stopwords and single characters dropped.
pub fn extract_keywords(text: &str) -> Vec<String> {
    text.split(|c: char| !is_word_char(c))
        .map(str::to_lowercase)
        .filter(|w| w.chars().count() > 1 && !STOPWORDS.contains(&w.as_str()))
        .collect()
}

/// Fraction of keywords found in a tag set.
///
/// A keyword found as a whole token inside any tag (tags split on `-`, `_`
/// and whitespace) counts 1.0; a keyword that only appears as a substring of
/// some tag earns 0.5, at most once, and only when it is not already a
/// whole-token hit. Normalized by keyword count.
pub fn tag_overlap(keywords: &[String], tags: &[String]) -> f64 {
    if tags.is_empty() || keywords.is_empty() {
        return 0.0;
    }
    let tag_words: HashSet<String> = tags
        .iter()
        .flat_map(|t| {
            t.to_lowercase()
                .split(|c: char| c == '-' || c == '_' || c.is_whitespace())
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .collect();

    let mut hits = 0.0;
    for kw in keywords {
        if tag_words.contains(kw) {
            hits += 1.0;
        } else if tags.iter().any(|t| t.to_lowercase().contains(kw.as_str())) {
            hits += 0.5;
        }
    }
    hits / keywords.len() as f64
}

/// Fraction of keywords present as whole words in free text.
pub fn insight_match(keywords: &[String], text: &str) -> f64 {
    if text.is_empty() || keywords.is_empty() {
        return 0.0;
    }
    let words: HashSet<String> = text
        .to_lowercase()
        .split(|c: char| !is_word_char(c))
        .filter(|w| w.chars().count() > 1)
        .map(str::to_string)
        .collect();

    let hits = keywords.iter().filter(|kw| words.contains(kw.as_str())).count();
    hits as f64 / keywords.len() as f64
}

/// Linear decay from 1.0 today to 0.0 at the horizon. No timestamp scores 0.
pub fn recency(timestamp: Option<DateTime<Utc>>) -> f64 {
    recency_at(timestamp, Utc::now())
}

fn recency_at(timestamp: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
    let Some(ts) = timestamp else {
        return 0.0;
    };
    let days_old = (now - ts).num_milliseconds() as f64 / 86_400_000.0;
    (1.0 - days_old / RECENCY_HORIZON_DAYS).max(0.0)
}
