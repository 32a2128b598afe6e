//! In-memory fakes for the gateway traits (testing only)
//!
//! `ScriptedModel` replays queued replies and records every prompt.
//! `MemorySourceControl` holds a single-branch repository with blob SHAs,
//! conditional writes and a scripted sequence of check-run responses.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use knowledge_store::ContentDigest;

use crate::domain::{EvolverError, RepositoryTarget, Result};
use crate::model_gateway::ModelGateway;
use crate::source_control::{
    CheckRun, CommitSummary, FileUpdate, RemoteFile, SourceControl, TreeEntry,
};

// ---------------------------------------------------------------------------
// ScriptedModel
// ---------------------------------------------------------------------------

/// Model gateway that answers from a queue. An exhausted queue is a failure.
#[derive(Debug, Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<std::result::Result<String, String>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reply(self, reply: impl Into<String>) -> Self {
        self.push_reply(reply);
        self
    }

    pub fn with_failure(self, message: impl Into<String>) -> Self {
        self.replies.lock().unwrap().push_back(Err(message.into()));
        self
    }

    pub fn push_reply(&self, reply: impl Into<String>) {
        self.replies.lock().unwrap().push_back(Ok(reply.into()));
    }

    /// Prompts received so far, in order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn remaining(&self) -> usize {
        self.replies.lock().unwrap().len()
    }
}

#[async_trait]
impl ModelGateway for ScriptedModel {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        match self.replies.lock().unwrap().pop_front() {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(message)) => Err(EvolverError::model(message)),
            None => Err(EvolverError::model("no scripted reply left")),
        }
    }
}

// ---------------------------------------------------------------------------
// MemorySourceControl
// ---------------------------------------------------------------------------

/// Per-operation call counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub list_tree: usize,
    pub get_file: usize,
    pub put_file: usize,
    pub list_commits: usize,
    pub check_runs: usize,
}

#[derive(Debug)]
struct StoredFile {
    content: String,
    sha: String,
}

#[derive(Debug, Default)]
struct RepoState {
    files: BTreeMap<String, StoredFile>,
    commits: Vec<CommitSummary>,
    next_commit_shas: VecDeque<String>,
    commit_counter: u64,
    check_run_script: VecDeque<std::result::Result<Vec<CheckRun>, String>>,
    check_run_fallback: Vec<CheckRun>,
    checked_shas: Vec<String>,
    failing_paths: Vec<String>,
    calls: CallCounts,
}

/// In-memory repository. The target's owner, name and branch are ignored.
#[derive(Debug, Default)]
pub struct MemorySourceControl {
    state: Mutex<RepoState>,
}

fn blob_sha(content: &str) -> String {
    ContentDigest::from_bytes(content.as_bytes()).as_str()[..40].to_string()
}

impl MemorySourceControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(self, path: impl Into<String>, content: impl Into<String>) -> Self {
        self.set_file(path, content);
        self
    }

    /// Commit SHAs handed out by successive `put_file` calls.
    pub fn with_commit_shas<I, S>(self, shas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state
            .lock()
            .unwrap()
            .next_commit_shas
            .extend(shas.into_iter().map(Into::into));
        self
    }

    /// Queue one check-runs response.
    pub fn with_check_runs(self, runs: Vec<CheckRun>) -> Self {
        self.state
            .lock()
            .unwrap()
            .check_run_script
            .push_back(Ok(runs));
        self
    }

    /// Queue one failed check-runs poll.
    pub fn with_check_run_failure(self, message: impl Into<String>) -> Self {
        self.state
            .lock()
            .unwrap()
            .check_run_script
            .push_back(Err(message.into()));
        self
    }

    /// Response once the script is exhausted (default: no runs).
    pub fn with_check_run_fallback(self, runs: Vec<CheckRun>) -> Self {
        self.state.lock().unwrap().check_run_fallback = runs;
        self
    }

    /// Make `get_file` fail for `path`.
    pub fn with_unreadable(self, path: impl Into<String>) -> Self {
        self.state.lock().unwrap().failing_paths.push(path.into());
        self
    }

    pub fn with_commit(self, sha: impl Into<String>, author: impl Into<String>, message: impl Into<String>) -> Self {
        self.state.lock().unwrap().commits.insert(
            0,
            CommitSummary {
                sha: sha.into(),
                author_name: author.into(),
                message: message.into(),
            },
        );
        self
    }

    /// Write a file directly, as an out-of-band change would.
    pub fn set_file(&self, path: impl Into<String>, content: impl Into<String>) {
        let content = content.into();
        let sha = blob_sha(&content);
        self.state
            .lock()
            .unwrap()
            .files
            .insert(path.into(), StoredFile { content, sha });
    }

    pub fn file_text(&self, path: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .files
            .get(path)
            .map(|f| f.content.clone())
    }

    pub fn file_sha(&self, path: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .files
            .get(path)
            .map(|f| f.sha.clone())
    }

    pub fn calls(&self) -> CallCounts {
        self.state.lock().unwrap().calls
    }

    /// Commits, newest first.
    pub fn commits(&self) -> Vec<CommitSummary> {
        self.state.lock().unwrap().commits.clone()
    }

    /// SHAs passed to `check_runs`, in call order.
    pub fn checked_shas(&self) -> Vec<String> {
        self.state.lock().unwrap().checked_shas.clone()
    }
}

#[async_trait]
impl SourceControl for MemorySourceControl {
    async fn list_tree(&self, _repo: &RepositoryTarget) -> Result<Vec<TreeEntry>> {
        let mut state = self.state.lock().unwrap();
        state.calls.list_tree += 1;
        Ok(state
            .files
            .iter()
            .map(|(path, f)| TreeEntry::blob(path.clone(), f.content.len() as u64))
            .collect())
    }

    async fn get_file(&self, _repo: &RepositoryTarget, path: &str) -> Result<RemoteFile> {
        let mut state = self.state.lock().unwrap();
        state.calls.get_file += 1;
        if state.failing_paths.iter().any(|p| p == path) {
            return Err(EvolverError::source_control(format!("failed to fetch {path}")));
        }
        let file = state
            .files
            .get(path)
            .ok_or_else(|| EvolverError::source_control("Not Found"))?;
        Ok(RemoteFile::from_text(path, file.sha.clone(), &file.content))
    }

    async fn put_file(&self, _repo: &RepositoryTarget, update: &FileUpdate) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state.calls.put_file += 1;

        let current_sha = state.files.get(&update.path).map(|f| f.sha.clone());
        if current_sha.as_deref() != Some(update.expected_sha.as_str()) {
            return Err(EvolverError::Conflict {
                path: update.path.clone(),
            });
        }

        state.files.insert(
            update.path.clone(),
            StoredFile {
                content: update.content.clone(),
                sha: blob_sha(&update.content),
            },
        );

        state.commit_counter += 1;
        let commit_sha = match state.next_commit_shas.pop_front() {
            Some(sha) => sha,
            None => format!("commit-{}", state.commit_counter),
        };
        state.commits.insert(
            0,
            CommitSummary {
                sha: commit_sha.clone(),
                author_name: "evolver".to_string(),
                message: update.message.clone(),
            },
        );
        Ok(commit_sha)
    }

    async fn list_commits(&self, _repo: &RepositoryTarget) -> Result<Vec<CommitSummary>> {
        let mut state = self.state.lock().unwrap();
        state.calls.list_commits += 1;
        Ok(state.commits.clone())
    }

    async fn check_runs(&self, _repo: &RepositoryTarget, sha: &str) -> Result<Vec<CheckRun>> {
        let mut state = self.state.lock().unwrap();
        state.calls.check_runs += 1;
        state.checked_shas.push(sha.to_string());
        match state.check_run_script.pop_front() {
            Some(Ok(runs)) => Ok(runs),
            Some(Err(message)) => Err(EvolverError::source_control(message)),
            None => Ok(state.check_run_fallback.clone()),
        }
    }
}
