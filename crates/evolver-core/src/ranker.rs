//! Relevance-ranked retrieval over knowledge documents.
//!
//! Scores documents against a free-text query with a keyword + recency
//! heuristic and packs the winners into a single prompt context block.
//! Ranking is pure; only [`retrieve_context`] touches the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use knowledge_store::{DocumentFilter, DocumentOrigin, KnowledgeDocument, KnowledgeStore};

use crate::domain::Result;

/// Tokens this short or shorter are dropped from the query.
pub const MAX_IGNORED_TOKEN_LEN: usize = 2;
/// Score for a keyword present anywhere in the content.
pub const CONTENT_HIT: f64 = 1.0;
/// Extra score for a keyword present in the file name.
pub const FILE_NAME_HIT: f64 = 0.5;
/// Per-occurrence bonus for repeated keywords.
pub const OCCURRENCE_STEP: f64 = 0.1;
/// Cap on the per-keyword occurrence bonus.
pub const OCCURRENCE_CAP: f64 = 2.0;
/// Age at which the recency bonus reaches zero.
pub const RECENCY_HORIZON_DAYS: f64 = 365.0;
/// Per-document character budget in the formatted context.
pub const CONTEXT_CHAR_BUDGET: usize = 10_000;
pub const TRUNCATION_MARKER: &str = "\n...[content truncated]";

/// A document with its relevance score for one query. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredDocument {
    pub document: KnowledgeDocument,
    pub score: f64,
}

/// Lowercased query keywords longer than [`MAX_IGNORED_TOKEN_LEN`], first occurrence order.
pub fn keywords(query: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for token in query.to_lowercase().split_whitespace() {
        if token.chars().count() <= MAX_IGNORED_TOKEN_LEN {
            continue;
        }
        if !out.iter().any(|k| k == token) {
            out.push(token.to_string());
        }
    }
    out
}

/// Recency bonus in `[0, 1]`: 1 for a document created at `now`, 0 at a year or older.
pub fn recency_bonus(created_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let age_days = (now - created_at).num_milliseconds() as f64 / 86_400_000.0;
    (1.0 - age_days / RECENCY_HORIZON_DAYS).clamp(0.0, 1.0)
}

/// Score one document against pre-extracted keywords.
pub fn score_document(doc: &KnowledgeDocument, keywords: &[String], now: DateTime<Utc>) -> f64 {
    let content = doc.content.to_lowercase();
    let file_name = doc.file_name.to_lowercase();

    let mut score = 0.0;
    for keyword in keywords {
        if content.contains(keyword.as_str()) {
            score += CONTENT_HIT;
        }
        if file_name.contains(keyword.as_str()) {
            score += FILE_NAME_HIT;
        }
        let occurrences = content.matches(keyword.as_str()).count();
        score += (occurrences as f64 * OCCURRENCE_STEP).min(OCCURRENCE_CAP);
    }

    score + recency_bonus(doc.created_at, now)
}

/// Rank `documents` against `query` as of `now`.
///
/// Returns at most `limit` documents with a positive score, highest first.
/// Equal scores keep their input order.
pub fn rank_at(
    query: &str,
    documents: &[KnowledgeDocument],
    limit: usize,
    now: DateTime<Utc>,
) -> Vec<ScoredDocument> {
    let keywords = keywords(query);

    let mut scored: Vec<ScoredDocument> = documents
        .iter()
        .filter_map(|doc| {
            let score = score_document(doc, &keywords, now);
            if score > 0.0 {
                Some(ScoredDocument {
                    document: doc.clone(),
                    score,
                })
            } else {
                None
            }
        })
        .collect();

    // Vec::sort_by is stable, which the tie-break relies on.
    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scored.truncate(limit);
    scored
}

/// Rank `documents` against `query` as of the current time.
pub fn rank(query: &str, documents: &[KnowledgeDocument], limit: usize) -> Vec<ScoredDocument> {
    rank_at(query, documents, limit, Utc::now())
}

fn origin_annotation(doc: &KnowledgeDocument) -> String {
    match doc.origin {
        DocumentOrigin::Repository => match doc.repository_slug() {
            Some(slug) => format!(" [from {slug}]"),
            None => " [from repository]".to_string(),
        },
        DocumentOrigin::Upload => format!(" [uploaded document: {}]", doc.file_name),
        DocumentOrigin::External => String::new(),
    }
}

fn truncate_content(content: &str) -> String {
    match content.char_indices().nth(CONTEXT_CHAR_BUDGET) {
        Some((cut, _)) => format!("{}{}", &content[..cut], TRUNCATION_MARKER),
        None => content.to_string(),
    }
}

/// Render ranked documents as one context block, blank-line separated.
pub fn format_context(ranked: &[ScoredDocument]) -> String {
    ranked
        .iter()
        .map(|scored| {
            let doc = &scored.document;
            let language = if doc.language.is_empty() {
                "text"
            } else {
                doc.language.as_str()
            };
            format!(
                "### {}{}\n```{}\n{}\n```",
                doc.file_name,
                origin_annotation(doc),
                language,
                truncate_content(&doc.content)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Ranked documents plus their rendered context.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedContext {
    pub documents: Vec<ScoredDocument>,
    pub context: String,
}

impl RetrievedContext {
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

/// Fetch candidates from the store, rank them and render the context.
pub async fn retrieve_context(
    store: &dyn KnowledgeStore,
    query: &str,
    filter: &DocumentFilter,
    limit: usize,
) -> Result<RetrievedContext> {
    let candidates = store.query(filter).await?;
    let documents = rank(query, &candidates, limit);
    let context = format_context(&documents);
    Ok(RetrievedContext { documents, context })
}
