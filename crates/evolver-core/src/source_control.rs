//! Source-control gateway.
//!
//! Read and write operations against a hosted repository. Writes carry the
//! blob SHA observed at read time, so a concurrent change surfaces as
//! [`EvolverError::Conflict`] instead of being overwritten.

use async_trait::async_trait;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::GitHubConfig;
use crate::domain::{EvolverError, RepositoryTarget, Result};

/// One entry of a recursive tree listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    pub path: String,
    /// `blob` or `tree`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Size in bytes; absent for trees.
    #[serde(default)]
    pub size: u64,
}

impl TreeEntry {
    pub fn blob(path: impl Into<String>, size: u64) -> Self {
        Self {
            path: path.into(),
            kind: "blob".to_string(),
            size,
        }
    }

    pub fn is_blob(&self) -> bool {
        self.kind == "blob"
    }
}

/// File content as served by the host, plus the blob SHA used for conditional writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFile {
    pub path: String,
    pub sha: String,
    /// Base64, possibly wrapped with newlines.
    pub content_base64: String,
}

impl RemoteFile {
    pub fn from_text(path: impl Into<String>, sha: impl Into<String>, text: &str) -> Self {
        Self {
            path: path.into(),
            sha: sha.into(),
            content_base64: encode_content(text),
        }
    }

    /// Decode the content as UTF-8 text.
    pub fn decode_text(&self) -> Result<String> {
        decode_content(&self.content_base64)
    }
}

/// A conditional write of one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpdate {
    pub path: String,
    /// New content as plain text; encoded by the gateway.
    pub content: String,
    /// Blob SHA the write is conditioned on.
    pub expected_sha: String,
    pub message: String,
}

/// A commit on the target branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitSummary {
    pub sha: String,
    pub author_name: String,
    pub message: String,
}

/// A CI/deployment status report attached to a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckRun {
    /// `queued`, `in_progress` or `completed`.
    pub status: String,
    /// Set once completed: `success`, `failure`, `cancelled`, ...
    pub conclusion: Option<String>,
}

impl CheckRun {
    pub fn pending() -> Self {
        Self {
            status: "in_progress".to_string(),
            conclusion: None,
        }
    }

    pub fn completed(conclusion: &str) -> Self {
        Self {
            status: "completed".to_string(),
            conclusion: Some(conclusion.to_string()),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == "completed"
    }

    pub fn succeeded(&self) -> bool {
        self.is_completed() && self.conclusion.as_deref() == Some("success")
    }
}

/// Hosted repository operations used by the orchestrator, tracker and sync.
#[async_trait]
pub trait SourceControl: Send + Sync {
    /// Recursive tree listing of `repo.branch`.
    async fn list_tree(&self, repo: &RepositoryTarget) -> Result<Vec<TreeEntry>>;

    /// Content and blob SHA of `path` at `repo.branch`.
    async fn get_file(&self, repo: &RepositoryTarget, path: &str) -> Result<RemoteFile>;

    /// Conditionally write a file on `repo.branch`, returning the new commit SHA.
    ///
    /// Fails with [`EvolverError::Conflict`] if the file no longer has `expected_sha`.
    async fn put_file(&self, repo: &RepositoryTarget, update: &FileUpdate) -> Result<String>;

    /// Commits on `repo.branch`, newest first.
    async fn list_commits(&self, repo: &RepositoryTarget) -> Result<Vec<CommitSummary>>;

    /// Check runs attached to `sha`, most recent first.
    async fn check_runs(&self, repo: &RepositoryTarget, sha: &str) -> Result<Vec<CheckRun>>;
}

/// Encode text for the contents API.
pub fn encode_content(text: &str) -> String {
    base64::engine::general_purpose::STANDARD.encode(text.as_bytes())
}

/// Decode contents-API base64 (newline-wrapped) into UTF-8 text.
pub fn decode_content(encoded: &str) -> Result<String> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(compact)
        .map_err(|e| EvolverError::Decode(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| EvolverError::Decode(e.to_string()))
}

// ---------------------------------------------------------------------------
// GitHub REST client
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct TreeResponse {
    #[serde(default)]
    tree: Vec<TreeEntry>,
}

#[derive(Deserialize)]
struct ContentResponse {
    sha: String,
    #[serde(default)]
    content: String,
}

#[derive(Serialize)]
struct PutContentRequest<'a> {
    message: &'a str,
    content: String,
    sha: &'a str,
    branch: &'a str,
}

#[derive(Deserialize)]
struct PutContentResponse {
    commit: Option<CommitRef>,
}

#[derive(Deserialize)]
struct CommitRef {
    sha: Option<String>,
}

#[derive(Deserialize)]
struct CommitListItem {
    sha: String,
    commit: CommitDetail,
}

#[derive(Deserialize)]
struct CommitDetail {
    author: Option<CommitAuthor>,
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct CommitAuthor {
    #[serde(default)]
    name: String,
}

#[derive(Deserialize)]
struct CheckRunsResponse {
    #[serde(default)]
    check_runs: Vec<CheckRun>,
}

#[derive(Deserialize)]
struct ApiError {
    message: Option<String>,
}

/// GitHub REST v3 client.
pub struct GitHubClient {
    config: GitHubConfig,
    http_client: reqwest::Client,
}

impl GitHubClient {
    pub fn new(config: GitHubConfig) -> Self {
        let http_client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .build()
            .expect("Failed to create HTTP client");

        GitHubClient {
            config,
            http_client,
        }
    }

    pub fn from_env() -> Self {
        Self::new(GitHubConfig::from_env())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base.trim_end_matches('/'), path)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> Result<reqwest::RequestBuilder> {
        let token = self
            .config
            .token
            .as_deref()
            .ok_or_else(|| EvolverError::source_control("GitHub token not configured"))?;
        Ok(self
            .http_client
            .request(method, self.url(path))
            .header(reqwest::header::ACCEPT, "application/vnd.github.v3+json")
            .header(reqwest::header::AUTHORIZATION, format!("token {token}")))
    }

    /// Send a request and return the body of a successful response.
    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<(reqwest::StatusCode, String)> {
        let response = builder
            .send()
            .await
            .map_err(|e| EvolverError::source_control(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| EvolverError::source_control(e.to_string()))?;
        Ok((status, body))
    }

    fn api_error(status: reqwest::StatusCode, body: &str) -> EvolverError {
        let message = serde_json::from_str::<ApiError>(body)
            .ok()
            .and_then(|e| e.message)
            .unwrap_or_else(|| format!("GitHub API error (HTTP {})", status.as_u16()));
        EvolverError::source_control(message)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let (status, body) = self.send(self.request(reqwest::Method::GET, path)?).await?;
        if !status.is_success() {
            return Err(Self::api_error(status, &body));
        }
        serde_json::from_str(&body)
            .map_err(|e| EvolverError::source_control(format!("malformed response: {e}")))
    }
}

#[async_trait]
impl SourceControl for GitHubClient {
    async fn list_tree(&self, repo: &RepositoryTarget) -> Result<Vec<TreeEntry>> {
        let path = format!(
            "/repos/{}/{}/git/trees/{}?recursive=1",
            repo.owner, repo.name, repo.branch
        );
        let tree: TreeResponse = self.get_json(&path).await?;
        debug!(repo = %repo, entries = tree.tree.len(), "listed tree");
        Ok(tree.tree)
    }

    async fn get_file(&self, repo: &RepositoryTarget, path: &str) -> Result<RemoteFile> {
        let api_path = format!(
            "/repos/{}/{}/contents/{}?ref={}",
            repo.owner, repo.name, path, repo.branch
        );
        let content: ContentResponse = self.get_json(&api_path).await?;
        Ok(RemoteFile {
            path: path.to_string(),
            sha: content.sha,
            content_base64: content.content,
        })
    }

    async fn put_file(&self, repo: &RepositoryTarget, update: &FileUpdate) -> Result<String> {
        let api_path = format!("/repos/{}/{}/contents/{}", repo.owner, repo.name, update.path);
        let payload = PutContentRequest {
            message: &update.message,
            content: encode_content(&update.content),
            sha: &update.expected_sha,
            branch: &repo.branch,
        };
        let builder = self.request(reqwest::Method::PUT, &api_path)?.json(&payload);
        let (status, body) = self.send(builder).await?;

        if status == reqwest::StatusCode::CONFLICT {
            warn!(path = %update.path, "conditional write rejected: file changed upstream");
            return Err(EvolverError::Conflict {
                path: update.path.clone(),
            });
        }
        if !status.is_success() {
            return Err(Self::api_error(status, &body));
        }

        let parsed: PutContentResponse = serde_json::from_str(&body)
            .map_err(|e| EvolverError::source_control(format!("malformed response: {e}")))?;
        parsed
            .commit
            .and_then(|c| c.sha)
            .ok_or_else(|| EvolverError::source_control("commit response carried no sha"))
    }

    async fn list_commits(&self, repo: &RepositoryTarget) -> Result<Vec<CommitSummary>> {
        let path = format!(
            "/repos/{}/{}/commits?sha={}",
            repo.owner, repo.name, repo.branch
        );
        let items: Vec<CommitListItem> = self.get_json(&path).await?;
        Ok(items
            .into_iter()
            .map(|item| CommitSummary {
                sha: item.sha,
                author_name: item.commit.author.map(|a| a.name).unwrap_or_default(),
                message: item.commit.message,
            })
            .collect())
    }

    async fn check_runs(&self, repo: &RepositoryTarget, sha: &str) -> Result<Vec<CheckRun>> {
        let path = format!(
            "/repos/{}/{}/commits/{}/check-runs",
            repo.owner, repo.name, sha
        );
        let runs: CheckRunsResponse = self.get_json(&path).await?;
        Ok(runs.check_runs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_strips_wrapping_newlines() {
        let encoded = encode_content("export const answer = 42;\n");
        let wrapped = format!("{}\n{}", &encoded[..10], &encoded[10..]);
        assert_eq!(decode_content(&wrapped).unwrap(), "export const answer = 42;\n");
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(matches!(
            decode_content("***not base64***"),
            Err(EvolverError::Decode(_))
        ));
    }

    #[test]
    fn multibyte_text_survives_encoding() {
        let text = "const greeting = 'héllo ✓';";
        let file = RemoteFile::from_text("a.ts", "sha", text);
        assert_eq!(file.decode_text().unwrap(), text);
    }

    #[test]
    fn check_run_success_requires_completion() {
        assert!(CheckRun::completed("success").succeeded());
        assert!(!CheckRun::completed("failure").succeeded());
        assert!(!CheckRun::pending().succeeded());
        assert!(!CheckRun::pending().is_completed());
    }

    #[tokio::test]
    async fn missing_token_fails_before_network() {
        let client = GitHubClient::new(GitHubConfig {
            token: None,
            api_base: "http://127.0.0.1:9".to_string(),
            user_agent: "test".to_string(),
        });
        let err = client
            .list_tree(&RepositoryTarget::new("o", "r", "main"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("token not configured"));
    }
}
