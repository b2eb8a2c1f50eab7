//! LLM provider abstraction and implementations.
//!
//! Supports Anthropic Claude and `OpenAI`-compatible chat completion APIs
//! (`OpenAI`, Groq, Ollama, vLLM, ...) via a common trait.

pub mod anthropic;
pub mod openai;

use crate::AiError;

/// Groq's `OpenAI`-compatible endpoint.
pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";

/// Trait for LLM providers.
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    /// Sends a single-turn completion request and returns the text reply.
    ///
    /// # Errors
    ///
    /// Returns [`AiError`] if the request fails or the reply has no text.
    async fn complete(&self, system_prompt: &str, prompt: &str, max_tokens: u32)
    -> Result<String, AiError>;

    /// Provider name for logs and error messages.
    fn name(&self) -> &'static str;
}

/// Creates an LLM provider based on environment variables.
///
/// If `AI_PROVIDER` is explicitly set, uses that provider. Otherwise
/// auto-detects from available credentials:
///
/// 1. `GROQ_API_KEY` set -> Groq (Llama 3)
/// 2. `ANTHROPIC_API_KEY` set -> Anthropic Claude
/// 3. `OPENAI_API_KEY` set -> `OpenAI`
///
/// `AI_MODEL` overrides the model and `AI_BASE_URL` points the `OpenAI`
/// provider at any compatible server.
///
/// # Errors
///
/// Returns [`AiError::Config`] if the requested provider has no API key.
pub fn create_provider_from_env() -> Result<Box<dyn LlmProvider>, AiError> {
    create_provider(|key| std::env::var(key).ok())
}

fn create_provider(
    env: impl Fn(&str) -> Option<String>,
) -> Result<Box<dyn LlmProvider>, AiError> {
    let provider = env("AI_PROVIDER").unwrap_or_else(|| detect_provider(&env));
    let require = |key: &str| {
        env(key).ok_or_else(|| AiError::Config {
            message: format!("{key} environment variable not set"),
        })
    };

    match provider.to_lowercase().as_str() {
        "groq" => {
            let api_key = require("GROQ_API_KEY")?;
            let model = env("AI_MODEL").unwrap_or_else(|| "llama3-8b-8192".to_string());
            let base_url = env("AI_BASE_URL").unwrap_or_else(|| GROQ_BASE_URL.to_string());
            Ok(Box::new(
                openai::OpenAiProvider::new(api_key, model).with_base_url(base_url),
            ))
        }
        "anthropic" | "claude" => {
            let api_key = require("ANTHROPIC_API_KEY")?;
            let model =
                env("AI_MODEL").unwrap_or_else(|| "claude-sonnet-4-20250514".to_string());
            Ok(Box::new(anthropic::AnthropicProvider::new(api_key, model)))
        }
        "openai" | "gpt" => {
            // Local servers usually accept any key.
            let api_key = match env("AI_BASE_URL") {
                Some(_) => env("OPENAI_API_KEY").unwrap_or_default(),
                None => require("OPENAI_API_KEY")?,
            };
            let model = env("AI_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string());
            let mut provider = openai::OpenAiProvider::new(api_key, model);
            if let Some(base_url) = env("AI_BASE_URL") {
                provider = provider.with_base_url(base_url);
            }
            Ok(Box::new(provider))
        }
        other => Err(AiError::Config {
            message: format!("Unknown AI provider: {other}. Use 'groq', 'anthropic', or 'openai'."),
        }),
    }
}

/// Picks a provider name from the credentials that are present.
fn detect_provider(env: &impl Fn(&str) -> Option<String>) -> String {
    for (key, provider) in [
        ("GROQ_API_KEY", "groq"),
        ("ANTHROPIC_API_KEY", "anthropic"),
        ("OPENAI_API_KEY", "openai"),
    ] {
        if env(key).is_some() {
            log::info!("Auto-detected AI provider: {provider} ({key} found)");
            return provider.to_string();
        }
    }

    if env("AI_BASE_URL").is_some() {
        log::info!("Auto-detected AI provider: openai-compatible (AI_BASE_URL found)");
        return "openai".to_string();
    }

    log::warn!(
        "No AI credentials detected. Set one of: GROQ_API_KEY, ANTHROPIC_API_KEY, \
         OPENAI_API_KEY or AI_BASE_URL. You can also set AI_PROVIDER explicitly."
    );

    // Produces a clear error about the missing key.
    "groq".to_string()
}

/// Extracts the message from a provider's JSON error body, falling back to
/// the raw body.
pub(crate) fn error_message(status: reqwest::StatusCode, body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(ToString::to_string))
        .unwrap_or_else(|| format!("HTTP {status}: {body}"))
}
