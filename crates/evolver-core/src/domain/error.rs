//! Error taxonomy for the evolver.
//!
//! Every variant except `ConfigurationMissing` is recovered locally: it ends
//! the current cycle and the loop carries on.

use knowledge_store::StoreError;

/// Which external collaborator a failed call was aimed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upstream {
    Model,
    SourceControl,
    KnowledgeStore,
}

impl std::fmt::Display for Upstream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Upstream::Model => f.write_str("model"),
            Upstream::SourceControl => f.write_str("source control"),
            Upstream::KnowledgeStore => f.write_str("knowledge store"),
        }
    }
}

/// Evolver errors.
#[derive(Debug, thiserror::Error)]
pub enum EvolverError {
    #[error("configuration missing: {0}")]
    ConfigurationMissing(String),

    #[error("{service} call failed: {message}")]
    UpstreamCallFailed { service: Upstream, message: String },

    #[error("conflict: {path} changed since it was read")]
    Conflict { path: String },

    #[error("no eligible files found for mutation")]
    NoEligibleTarget,

    #[error("no optimizations found for {path}")]
    NoImprovementProduced { path: String },

    #[error("deployment of {sha} timed out after {attempts} polls")]
    DeploymentTimedOut { sha: String, attempts: u32 },

    #[error("decode error: {0}")]
    Decode(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EvolverError {
    pub fn model(message: impl Into<String>) -> Self {
        EvolverError::UpstreamCallFailed {
            service: Upstream::Model,
            message: message.into(),
        }
    }

    pub fn source_control(message: impl Into<String>) -> Self {
        EvolverError::UpstreamCallFailed {
            service: Upstream::SourceControl,
            message: message.into(),
        }
    }
}

/// Result type for evolver operations.
pub type Result<T> = std::result::Result<T, EvolverError>;
