//! Place names pulled out of report text by an LLM.

use async_trait::async_trait;
use road_intel_engine::collaborators::{CollaboratorError, LocationExtractor};

use crate::providers::LlmProvider;

const MAX_TOKENS: u32 = 50;

const SYSTEM_PROMPT: &str = "You extract place names from citizen road damage reports.";

/// Builds the extraction prompt for `text`.
#[must_use]
pub fn build_prompt(text: &str) -> String {
    format!(
        "Extract only location names, landmarks, or area names from this text.\n\
         Return as a comma-separated list. If none found, return empty string.\n\
         Text: {}",
        text.trim()
    )
}

/// Splits a comma-separated reply into trimmed, non-empty tags.
#[must_use]
pub fn parse_tags(reply: &str) -> Vec<String> {
    reply
        .split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// [`LocationExtractor`] backed by an [`LlmProvider`].
pub struct LlmLocationExtractor {
    provider: Box<dyn LlmProvider>,
}

impl LlmLocationExtractor {
    /// Creates an extractor using `provider`.
    #[must_use]
    pub fn new(provider: Box<dyn LlmProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl LocationExtractor for LlmLocationExtractor {
    async fn extract(&self, text: &str) -> Result<Vec<String>, CollaboratorError> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let reply = self
            .provider
            .complete(SYSTEM_PROMPT, &build_prompt(text), MAX_TOKENS)
            .await
            .map_err(|e| e.into_collaborator(self.provider.name()))?;

        let tags = parse_tags(&reply);
        log::debug!("Extracted {} location tag(s) with {}", tags.len(), self.provider.name());
        Ok(tags)
    }
}
