#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! LLM-backed collaborators for the escalation engine.
//!
//! Supports Anthropic Claude and any `OpenAI`-compatible chat endpoint
//! (`OpenAI`, Groq, or a local server via `AI_BASE_URL`). The crate
//! provides the [`LlmMessageGenerator`] that drafts escalation posts and
//! the [`EmbeddingSimilarity`] used to group reports with similar
//! descriptions. [`LlmLocationExtractor`] names a hotspot from its report
//! text when reverse geocoding fails.

pub mod extract;
pub mod message;
pub mod providers;
pub mod similarity;

pub use extract::LlmLocationExtractor;
pub use message::LlmMessageGenerator;
pub use similarity::EmbeddingSimilarity;

use road_intel_engine::collaborators::CollaboratorError;
use thiserror::Error;

/// Errors that can occur during AI operations.
#[derive(Debug, Error)]
pub enum AiError {
    /// HTTP request to the provider failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Provider-specific error.
    #[error("Provider error: {message}")]
    Provider {
        /// Description of what went wrong.
        message: String,
    },

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config {
        /// Description.
        message: String,
    },
}

impl AiError {
    fn into_collaborator(self, service: &str) -> CollaboratorError {
        let service = service.to_string();
        let message = self.to_string();
        match self {
            Self::Http(_) | Self::Provider { .. } => CollaboratorError::Request { service, message },
            Self::Json(_) => CollaboratorError::InvalidResponse { service, message },
            Self::Config { .. } => CollaboratorError::NotConfigured { service, message },
        }
    }
}

impl From<AiError> for CollaboratorError {
    fn from(value: AiError) -> Self {
        value.into_collaborator("llm")
    }
}
