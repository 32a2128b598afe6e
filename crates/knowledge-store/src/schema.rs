//! Record types held by the knowledge store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Content digest (SHA-256 hex string).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentDigest(String);

impl ContentDigest {
    /// Compute the SHA-256 digest of the given bytes.
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        ContentDigest(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 12 hex chars).
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl std::fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a document came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentOrigin {
    Upload,
    Repository,
    External,
}

impl DocumentOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentOrigin::Upload => "upload",
            DocumentOrigin::Repository => "repository",
            DocumentOrigin::External => "external",
        }
    }
}

impl std::fmt::Display for DocumentOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DocumentOrigin {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "upload" => Ok(DocumentOrigin::Upload),
            "repository" => Ok(DocumentOrigin::Repository),
            "external" => Ok(DocumentOrigin::External),
            other => Err(format!("unknown document origin: {other}")),
        }
    }
}

/// A stored reference document used to ground mutation prompts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeDocument {
    pub id: String,
    pub file_name: String,
    pub file_path: String,
    pub content: String,
    pub origin: DocumentOrigin,
    pub language: String,
    pub repo_owner: Option<String>,
    pub repo_name: Option<String>,
    pub content_digest: ContentDigest,
    pub created_at: DateTime<Utc>,
}

impl KnowledgeDocument {
    /// Create a document stamped with a fresh id and the current time.
    ///
    /// `file_path` defaults to `file_name` until [`Self::with_path`] is used.
    pub fn new(
        file_name: impl Into<String>,
        content: impl Into<String>,
        origin: DocumentOrigin,
        language: impl Into<String>,
    ) -> Self {
        let file_name = file_name.into();
        let content = content.into();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            file_path: file_name.clone(),
            file_name,
            content_digest: ContentDigest::from_bytes(content.as_bytes()),
            content,
            origin,
            language: language.into(),
            repo_owner: None,
            repo_name: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.file_path = path.into();
        self
    }

    pub fn with_repository(mut self, owner: impl Into<String>, name: impl Into<String>) -> Self {
        self.repo_owner = Some(owner.into());
        self.repo_name = Some(name.into());
        self
    }

    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = at;
        self
    }

    /// Replace the content, keeping the digest in step.
    pub fn refresh_content(&mut self, content: String) {
        self.content_digest = ContentDigest::from_bytes(content.as_bytes());
        self.content = content;
    }

    /// `owner/name` when the document came from a repository.
    pub fn repository_slug(&self) -> Option<String> {
        match (&self.repo_owner, &self.repo_name) {
            (Some(owner), Some(name)) => Some(format!("{owner}/{name}")),
            _ => None,
        }
    }
}

/// Read filter for [`crate::KnowledgeStore::query`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentFilter {
    pub language: Option<String>,
    pub origin: Option<DocumentOrigin>,
    pub limit: usize,
}

impl DocumentFilter {
    /// Candidate pool size fetched before relevance ranking.
    pub const DEFAULT_LIMIT: usize = 100;

    pub fn all() -> Self {
        Self {
            language: None,
            origin: None,
            limit: Self::DEFAULT_LIMIT,
        }
    }

    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn origin(mut self, origin: DocumentOrigin) -> Self {
        self.origin = Some(origin);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn matches(&self, doc: &KnowledgeDocument) -> bool {
        if let Some(language) = &self.language {
            if &doc.language != language {
                return false;
            }
        }
        if let Some(origin) = self.origin {
            if doc.origin != origin {
                return false;
            }
        }
        true
    }
}

impl Default for DocumentFilter {
    fn default() -> Self {
        Self::all()
    }
}

/// A repository registered as a knowledge source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchedRepo {
    pub id: String,
    pub owner: String,
    pub name: String,
    pub branch: String,
    pub active: bool,
    pub files_count: usize,
    pub last_sync: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl WatchedRepo {
    pub fn new(owner: impl Into<String>, name: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            owner: owner.into(),
            name: name.into(),
            branch: branch.into(),
            active: true,
            files_count: 0,
            last_sync: None,
            created_at: Utc::now(),
        }
    }

    pub fn slug(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

/// Aggregate counts over the stored documents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeStats {
    pub total: usize,
    pub uploaded: usize,
    pub repository: usize,
    pub external: usize,
    /// `(language, count)` sorted by count descending.
    pub by_language: Vec<(String, usize)>,
    /// `(repo name, count)` over repository documents, sorted by count descending.
    pub by_repo: Vec<(String, usize)>,
}

impl KnowledgeStats {
    /// Compute statistics over a document slice.
    pub fn from_documents<'a>(docs: impl IntoIterator<Item = &'a KnowledgeDocument>) -> Self {
        use std::collections::BTreeMap;

        let mut stats = KnowledgeStats::default();
        let mut languages: BTreeMap<String, usize> = BTreeMap::new();
        let mut repos: BTreeMap<String, usize> = BTreeMap::new();

        for doc in docs {
            stats.total += 1;
            match doc.origin {
                DocumentOrigin::Upload => stats.uploaded += 1,
                DocumentOrigin::Repository => {
                    stats.repository += 1;
                    if let Some(name) = &doc.repo_name {
                        *repos.entry(name.clone()).or_default() += 1;
                    }
                }
                DocumentOrigin::External => stats.external += 1,
            }
            *languages.entry(doc.language.clone()).or_default() += 1;
        }

        stats.by_language = sorted_desc(languages);
        stats.by_repo = sorted_desc(repos);
        stats
    }
}

fn sorted_desc(counts: std::collections::BTreeMap<String, usize>) -> Vec<(String, usize)> {
    let mut out: Vec<(String, usize)> = counts.into_iter().collect();
    // stable: equal counts stay in key order
    out.sort_by(|a, b| b.1.cmp(&a.1));
    out
}
