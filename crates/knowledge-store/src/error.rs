//! Error types for knowledge-store

use thiserror::Error;

/// Errors raised by knowledge store implementations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// No document with the given id
    #[error("document not found: {id}")]
    DocumentNotFound { id: String },

    /// No watched repository with the given id
    #[error("repository not found: {id}")]
    RepoNotFound { id: String },

    /// A watched repository with the same owner/name is already registered
    #[error("repository already exists: {owner}/{name}")]
    AlreadyExists { owner: String, name: String },

    /// Backing file could not be read or written
    #[error("store io failed: {0}")]
    Io(#[from] std::io::Error),

    /// Backing file held malformed JSON
    #[error("store serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn already_exists_names_the_repository() {
        let err = StoreError::AlreadyExists {
            owner: "rust-lang".to_string(),
            name: "cargo".to_string(),
        };
        assert_eq!(err.to_string(), "repository already exists: rust-lang/cargo");
    }

    #[test]
    fn not_found_carries_id() {
        let err = StoreError::DocumentNotFound {
            id: "doc-1".to_string(),
        };
        assert!(err.to_string().contains("doc-1"));
    }
}
