//! Escalation posts drafted by an LLM.

use async_trait::async_trait;
use road_intel_engine::collaborators::{CollaboratorError, MessageGenerator, MessageRequest};

use crate::providers::LlmProvider;

const MAX_TOKENS: u32 = 100;

const SYSTEM_PROMPT: &str = "You write public posts on behalf of citizens reporting road damage. \
                             Reply with the post text only.";

/// Builds the user prompt for a hotspot.
#[must_use]
pub fn build_prompt(request: &MessageRequest) -> String {
    format!(
        "Generate a short, factual and firm Twitter post (under 250 characters) \
         tagging a municipality about an unresolved pothole hotspot.\n\
         Location: {}\n\
         Reports: {} citizen reports\n\
         Severity: {}\n\
         Tone: civic accountability, not aggressive. End with relevant hashtags.",
        request.location, request.report_count, request.severity
    )
}

/// Strips wrapping quotes models like to add around the post.
fn clean_reply(reply: &str) -> String {
    let trimmed = reply.trim();
    trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(trimmed)
        .trim()
        .to_string()
}

/// [`MessageGenerator`] backed by an [`LlmProvider`].
pub struct LlmMessageGenerator {
    provider: Box<dyn LlmProvider>,
}

impl LlmMessageGenerator {
    /// Creates a generator using `provider`.
    #[must_use]
    pub fn new(provider: Box<dyn LlmProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl MessageGenerator for LlmMessageGenerator {
    async fn generate(&self, request: &MessageRequest) -> Result<String, CollaboratorError> {
        let prompt = build_prompt(request);
        log::debug!(
            "Requesting escalation post from {} for {}",
            self.provider.name(),
            request.location
        );

        let reply = self
            .provider
            .complete(SYSTEM_PROMPT, &prompt, MAX_TOKENS)
            .await
            .map_err(|e| e.into_collaborator(self.provider.name()))?;

        Ok(clean_reply(&reply))
    }
}
