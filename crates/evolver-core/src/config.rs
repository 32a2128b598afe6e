//! Runtime configuration.
//!
//! Values come from the environment with explicit builder overrides. Only
//! presence is validated; formats are left to the upstream services.

use std::path::PathBuf;
use std::time::Duration;

use crate::domain::{EvolverError, RepositoryTarget, Result};

/// Generative model endpoint settings.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// API key; required to start the loop.
    pub api_key: Option<String>,
    pub model: String,
    pub api_base: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelConfig {
            api_key: non_empty_env("GEMINI_API_KEY"),
            model: std::env::var("GEMINI_MODEL")
                .unwrap_or_else(|_| "gemini-2.0-flash-exp".to_string()),
            api_base: std::env::var("GEMINI_API_BASE")
                .unwrap_or_else(|_| "https://generativelanguage.googleapis.com".to_string()),
            temperature: 0.7,
            max_output_tokens: 8192,
        }
    }
}

impl ModelConfig {
    pub fn from_env() -> Self {
        Self::default()
    }

    pub fn with_api_key(mut self, key: &str) -> Self {
        self.api_key = Some(key.to_string());
        self
    }

    pub fn with_api_base(mut self, base: &str) -> Self {
        self.api_base = base.trim_end_matches('/').to_string();
        self
    }
}

/// Source-control hosting API settings.
#[derive(Debug, Clone)]
pub struct GitHubConfig {
    pub token: Option<String>,
    pub api_base: String,
    pub user_agent: String,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        GitHubConfig {
            token: non_empty_env("GITHUB_TOKEN"),
            api_base: std::env::var("GITHUB_API_BASE")
                .unwrap_or_else(|_| "https://api.github.com".to_string()),
            user_agent: format!("evolver/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl GitHubConfig {
    pub fn from_env() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }

    pub fn with_api_base(mut self, base: &str) -> Self {
        self.api_base = base.trim_end_matches('/').to_string();
        self
    }
}

/// Fixed delays and ceilings of the evolution loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleTiming {
    /// Delay between cycle starts.
    pub cycle_interval: Duration,
    /// Pause between self-dialogue calls.
    pub dialogue_pause: Duration,
    /// Delay between deployment status polls.
    pub poll_interval: Duration,
    /// Poll ceiling before a deployment is declared timed out.
    pub max_poll_attempts: u32,
}

impl Default for CycleTiming {
    fn default() -> Self {
        Self {
            cycle_interval: Duration::from_secs(60),
            dialogue_pause: Duration::from_secs(2),
            poll_interval: Duration::from_secs(10),
            max_poll_attempts: 60,
        }
    }
}

/// Top-level evolver configuration.
#[derive(Debug, Clone)]
pub struct EvolverConfig {
    pub model: ModelConfig,
    pub github: GitHubConfig,
    pub target: RepositoryTarget,
    pub timing: CycleTiming,
    /// JSON file backing the knowledge store.
    pub knowledge_path: PathBuf,
}

impl EvolverConfig {
    /// Read every setting from the environment.
    pub fn from_env() -> Self {
        EvolverConfig {
            model: ModelConfig::from_env(),
            github: GitHubConfig::from_env(),
            target: RepositoryTarget::new(
                std::env::var("EVOLVER_TARGET_OWNER").unwrap_or_default(),
                std::env::var("EVOLVER_TARGET_REPO").unwrap_or_default(),
                std::env::var("EVOLVER_TARGET_BRANCH").unwrap_or_else(|_| "main".to_string()),
            ),
            timing: CycleTiming::default(),
            knowledge_path: std::env::var("EVOLVER_KNOWLEDGE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(".evolver/knowledge.json")),
        }
    }

    pub fn with_target(mut self, target: RepositoryTarget) -> Self {
        self.target = target;
        self
    }

    pub fn with_timing(mut self, timing: CycleTiming) -> Self {
        self.timing = timing;
        self
    }

    /// The model credential is the only setting the loop cannot start without.
    pub fn require_model_credential(&self) -> Result<&str> {
        self.model
            .api_key
            .as_deref()
            .ok_or_else(|| EvolverError::ConfigurationMissing("GEMINI_API_KEY".to_string()))
    }

    /// Target owner and name must be present.
    pub fn require_target(&self) -> Result<&RepositoryTarget> {
        if self.target.owner.trim().is_empty() {
            return Err(EvolverError::ConfigurationMissing(
                "EVOLVER_TARGET_OWNER".to_string(),
            ));
        }
        if self.target.name.trim().is_empty() {
            return Err(EvolverError::ConfigurationMissing(
                "EVOLVER_TARGET_REPO".to_string(),
            ));
        }
        Ok(&self.target)
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
