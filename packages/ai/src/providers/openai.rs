//! `OpenAI`-compatible chat completion provider.
//!
//! Also used for Groq and self-hosted servers through a custom base URL.

use serde::{Deserialize, Serialize};

use super::{LlmProvider, error_message};
use crate::AiError;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// `OpenAI` API provider.
pub struct OpenAiProvider {
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAiProvider {
    /// Creates a new provider against the `OpenAI` API.
    #[must_use]
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            api_key,
            model,
            base_url: DEFAULT_BASE_URL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Points the provider at another `OpenAI`-compatible server.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAiMessage<'a>>,
    max_tokens: u32,
}

#[derive(Serialize)]
struct OpenAiMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
}

#[derive(Deserialize)]
struct OpenAiResponseMessage {
    content: Option<String>,
}

fn response_text(response: OpenAiResponse) -> Result<String, AiError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .ok_or_else(|| AiError::Provider {
            message: "No text in chat completion response".to_string(),
        })
}

#[async_trait::async_trait]
impl LlmProvider for OpenAiProvider {
    async fn complete(
        &self,
        system_prompt: &str,
        prompt: &str,
        max_tokens: u32,
    ) -> Result<String, AiError> {
        let mut messages = Vec::with_capacity(2);
        if !system_prompt.is_empty() {
            messages.push(OpenAiMessage {
                role: "system",
                content: system_prompt,
            });
        }
        messages.push(OpenAiMessage {
            role: "user",
            content: prompt,
        });

        let request = OpenAiRequest {
            model: &self.model,
            messages,
            max_tokens,
        };

        let mut builder = self.client.post(self.endpoint()).json(&request);
        if !self.api_key.is_empty() {
            builder = builder.bearer_auth(&self.api_key);
        }
        let resp = builder.send().await?;

        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            return Err(AiError::Provider {
                message: error_message(status, &body),
            });
        }

        response_text(serde_json::from_str(&body)?)
    }

    fn name(&self) -> &'static str {
        "openai-compatible"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_is_normalized() {
        let provider = OpenAiProvider::new(String::new(), "llama3-8b-8192".to_string())
            .with_base_url("https://api.groq.com/openai/v1/");
        assert_eq!(
            provider.endpoint(),
            "https://api.groq.com/openai/v1/chat/completions"
        );
    }

    #[test]
    fn takes_first_choice_trimmed() {
        let body = r#"{"choices":[
            {"message":{"role":"assistant","content":"  Fix the road. #Pune \n"},"finish_reason":"stop"},
            {"message":{"role":"assistant","content":"ignored"}}
        ]}"#;
        let text = response_text(serde_json::from_str(body).unwrap()).unwrap();
        assert_eq!(text, "Fix the road. #Pune");
    }

    #[test]
    fn missing_or_blank_content_is_an_error() {
        for body in [
            r#"{"choices":[]}"#,
            r#"{"choices":[{"message":{"content":null}}]}"#,
            r#"{"choices":[{"message":{"content":"   "}}]}"#,
        ] {
            assert!(response_text(serde_json::from_str(body).unwrap()).is_err());
        }
    }
}
