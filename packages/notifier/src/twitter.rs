//! X (Twitter) v2 API client.
//!
//! Posts are created with `POST /2/tweets` using an OAuth 2.0 user access
//! token with the `tweet.write` scope. Any 2xx answer means the post went
//! out, even when its body cannot be read.

use async_trait::async_trait;
use road_intel_engine::collaborators::{CollaboratorError, Notifier};
use serde::{Deserialize, Serialize};

use crate::NotifyError;

/// Default API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.twitter.com";

#[derive(Serialize)]
struct CreateTweet<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct CreateTweetResponse {
    data: Option<TweetData>,
}

#[derive(Deserialize)]
struct TweetData {
    id: String,
}

/// Pulls a readable message out of an API error body.
fn error_detail(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return body.to_string();
    };
    value["detail"]
        .as_str()
        .or_else(|| value["errors"][0]["message"].as_str())
        .or_else(|| value["title"].as_str())
        .map_or_else(|| body.to_string(), ToString::to_string)
}

/// Parses the id of the created post.
fn tweet_id(body: &str) -> Option<String> {
    serde_json::from_str::<CreateTweetResponse>(body)
        .ok()
        .and_then(|response| response.data)
        .map(|d| d.id)
}

/// [`Notifier`] that publishes each message as a post.
pub struct TwitterNotifier {
    bearer_token: String,
    base_url: String,
    client: reqwest::Client,
}

impl TwitterNotifier {
    /// Creates a notifier authenticating with `bearer_token`.
    #[must_use]
    pub fn new(bearer_token: String) -> Self {
        Self {
            bearer_token,
            base_url: DEFAULT_BASE_URL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Creates a notifier from `TWITTER_BEARER_TOKEN` (and optionally
    /// `TWITTER_API_BASE_URL`).
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Config`] if the token is not set.
    pub fn from_env() -> Result<Self, NotifyError> {
        let token = std::env::var("TWITTER_BEARER_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| NotifyError::Config {
                message: "TWITTER_BEARER_TOKEN environment variable not set".to_string(),
            })?;
        let mut notifier = Self::new(token);
        if let Ok(base_url) = std::env::var("TWITTER_API_BASE_URL") {
            notifier.base_url = base_url.trim_end_matches('/').to_string();
        }
        Ok(notifier)
    }

    /// Creates a post and returns its id, if the response carried one.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError`] if the request fails or is rejected.
    pub async fn create_tweet(&self, text: &str) -> Result<Option<String>, NotifyError> {
        let resp = self
            .client
            .post(format!("{}/2/tweets", self.base_url))
            .bearer_auth(&self.bearer_token)
            .json(&CreateTweet { text })
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await?;
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                message: error_detail(&body),
            });
        }

        let body = match resp.text().await {
            Ok(body) => body,
            Err(e) => {
                log::warn!("Post accepted with HTTP {status} but the body was unreadable: {e}");
                return Ok(None);
            }
        };
        let id = tweet_id(&body);
        if id.is_none() {
            log::warn!(
                "Post accepted with HTTP {status} but no id was returned: {}",
                error_detail(&body)
            );
        }
        Ok(id)
    }
}

#[async_trait]
impl Notifier for TwitterNotifier {
    async fn publish(&self, message: &str) -> Result<(), CollaboratorError> {
        match self.create_tweet(message).await? {
            Some(id) => log::info!("Published post {id}"),
            None => log::info!("Published post"),
        }
        Ok(())
    }
}
