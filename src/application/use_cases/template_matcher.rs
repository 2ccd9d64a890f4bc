//! Template Matcher
//!
//! Ranks library templates against a user query:
//! - Embedding similarity from the vector index (primary signal)
//! - Tag overlap and description keyword hits (small lexical bonuses)
//! - Domain strategy vocabulary bonus
//!
//! Nothing is discarded here; thresholds are applied by the orchestrator.

use crate::application::use_cases::template_library::{
    CompiledTemplate, EmbeddingOracle, LibrarySnapshot,
};
use crate::domain::error::{AppError, Result};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

pub const TAG_OVERLAP_BONUS: f32 = 0.05;
pub const KEYWORD_BONUS: f32 = 0.02;
pub const MAX_KEYWORD_HITS: usize = 5;

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "from", "all", "any", "by", "of", "a", "an", "to", "in", "on",
    "show", "list", "get", "find", "that", "this", "are", "was", "were", "who", "what", "which",
];

/// A ranked template for one query.
#[derive(Debug, Clone)]
pub struct MatchCandidate {
    pub template: Arc<CompiledTemplate>,
    pub similarity: f32,
    pub reranked_score: f32,
    /// Human-readable explanation of the bonuses applied.
    pub reason: String,
}

pub struct TemplateMatcher {
    embedder: Arc<dyn EmbeddingOracle>,
}

impl TemplateMatcher {
    pub fn new(embedder: Arc<dyn EmbeddingOracle>) -> Self {
        Self { embedder }
    }

    /// Top `top_k` templates for `query`, best first.
    pub async fn find_matches(
        &self,
        query: &str,
        snapshot: &LibrarySnapshot,
        top_k: usize,
    ) -> Result<Vec<MatchCandidate>> {
        if snapshot.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let vector = self.embedder.embed(query).await.map_err(|e| match e {
            AppError::Cancelled(_) | AppError::ConnectionError(_) => e,
            other => AppError::ConnectionError(format!("Embedding service failed: {}", other)),
        })?;

        let query_lower = query.to_lowercase();
        let query_words: HashSet<&str> = query_lower
            .split(|c: char| !c.is_alphanumeric() && c != '_')
            .filter(|w| !w.is_empty())
            .collect();

        let mut candidates: Vec<MatchCandidate> = snapshot
            .index()
            .nearest(&vector, top_k)
            .into_iter()
            .filter_map(|(id, similarity)| {
                let template = snapshot.get(&id)?;
                let (bonus, reason) =
                    Self::score_lexical(&query_lower, &query_words, template, snapshot, query);
                Some(MatchCandidate {
                    template: Arc::clone(template),
                    similarity,
                    reranked_score: similarity + bonus,
                    reason,
                })
            })
            .collect();

        candidates.sort_by(compare_candidates);

        for c in &candidates {
            debug!(
                template_id = %c.template.id,
                similarity = c.similarity,
                reranked = c.reranked_score,
                reason = %c.reason,
                "Ranked template candidate"
            );
        }
        Ok(candidates)
    }

    /// Sum of lexical bonuses for one template, with an explanation.
    fn score_lexical(
        query_lower: &str,
        query_words: &HashSet<&str>,
        template: &CompiledTemplate,
        snapshot: &LibrarySnapshot,
        query: &str,
    ) -> (f32, String) {
        let mut bonus = 0.0f32;
        let mut reasons = Vec::new();

        let tag_hits = template
            .tags
            .iter()
            .filter(|tag| tag_matches(query_lower, query_words, tag))
            .count();
        if tag_hits > 0 {
            bonus += tag_hits as f32 * TAG_OVERLAP_BONUS;
            reasons.push(format!("tags: {}", tag_hits));
        }

        let keyword_hits = description_keywords(&template.description)
            .filter(|kw| query_words.contains(kw.as_str()))
            .take(MAX_KEYWORD_HITS)
            .count();
        if keyword_hits > 0 {
            bonus += keyword_hits as f32 * KEYWORD_BONUS;
            reasons.push(format!("keywords: {}", keyword_hits));
        }

        let strategy_bonus = snapshot
            .strategy
            .rerank_bonus(template, query, &snapshot.domain);
        if strategy_bonus > 0.0 {
            bonus += strategy_bonus;
            reasons.push(format!("{}: {:.2}", snapshot.strategy.name(), strategy_bonus));
        }

        let reason = if reasons.is_empty() {
            "similarity only".to_string()
        } else {
            reasons.join(", ")
        };
        (bonus, reason)
    }
}

/// Descending reranked score, then descending similarity, then library order.
pub fn compare_candidates(a: &MatchCandidate, b: &MatchCandidate) -> Ordering {
    b.reranked_score
        .total_cmp(&a.reranked_score)
        .then_with(|| b.similarity.total_cmp(&a.similarity))
        .then_with(|| a.template.position.cmp(&b.template.position))
}

/// A tag counts when the phrase occurs or all of its words are present.
fn tag_matches(query_lower: &str, query_words: &HashSet<&str>, tag: &str) -> bool {
    let tag_lower = tag.to_lowercase().replace('_', " ");
    if tag_lower.trim().is_empty() {
        return false;
    }
    if query_lower.contains(&tag_lower) {
        return true;
    }
    let words: Vec<&str> = tag_lower.split_whitespace().collect();
    words.len() > 1 && words.iter().all(|w| query_words.contains(w))
}

fn description_keywords(description: &str) -> impl Iterator<Item = String> + '_ {
    let mut seen = HashSet::new();
    description
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .map(|w| w.to_lowercase())
        .filter(|w| w.len() >= 3 && !STOPWORDS.contains(&w.as_str()))
        .filter(move |w| seen.insert(w.clone()))
}
