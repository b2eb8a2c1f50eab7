//! Anthropic Claude provider implementation.

use serde::{Deserialize, Serialize};

use super::{LlmProvider, error_message};
use crate::AiError;

/// Anthropic Claude API provider.
pub struct AnthropicProvider {
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    /// Creates a new Anthropic provider.
    #[must_use]
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            api_key,
            model,
            client: reqwest::Client::new(),
        }
    }
}

/// Anthropic API request body.
#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "str::is_empty")]
    system: &'a str,
    messages: [AnthropicMessage<'a>; 1],
}

#[derive(Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: &'a str,
}

/// Anthropic API response body.
#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContentBlock>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicContentBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

fn response_text(response: AnthropicResponse) -> Result<String, AiError> {
    let text = response
        .content
        .into_iter()
        .filter_map(|block| match block {
            AnthropicContentBlock::Text { text } => Some(text),
            AnthropicContentBlock::Other => None,
        })
        .collect::<Vec<_>>()
        .join("\n");

    if text.trim().is_empty() {
        return Err(AiError::Provider {
            message: "No text in Anthropic response".to_string(),
        });
    }
    Ok(text.trim().to_string())
}

#[async_trait::async_trait]
impl LlmProvider for AnthropicProvider {
    async fn complete(
        &self,
        system_prompt: &str,
        prompt: &str,
        max_tokens: u32,
    ) -> Result<String, AiError> {
        let request = AnthropicRequest {
            model: &self.model,
            max_tokens,
            system: system_prompt,
            messages: [AnthropicMessage {
                role: "user",
                content: prompt,
            }],
        };

        let resp = self
            .client
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await?;

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
        "anthropic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_text_blocks_and_skips_others() {
        let body = r##"{"content":[
            {"type":"text","text":"Pothole on MG Road. "},
            {"type":"thinking","thinking":"..."},
            {"type":"text","text":"#FixOurRoads"}
        ],"stop_reason":"end_turn"}"##;
        let text = response_text(serde_json::from_str(body).unwrap()).unwrap();
        assert_eq!(text, "Pothole on MG Road. \n#FixOurRoads");
    }

    #[test]
    fn empty_reply_is_an_error() {
        let body = r#"{"content":[]}"#;
        assert!(matches!(
            response_text(serde_json::from_str(body).unwrap()),
            Err(AiError::Provider { .. })
        ));
    }

    #[test]
    fn request_omits_empty_system_prompt() {
        let request = AnthropicRequest {
            model: "m",
            max_tokens: 100,
            system: "",
            messages: [AnthropicMessage {
                role: "user",
                content: "hi",
            }],
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("system").is_none());
        assert_eq!(json["messages"][0]["content"], "hi");
    }
}
