//! Description similarity from sentence embeddings.
//!
//! Texts are embedded through an `OpenAI`-compatible `/embeddings`
//! endpoint in a single request and compared by cosine similarity.

use async_trait::async_trait;
use road_intel_engine::collaborators::{CollaboratorError, TextSimilarity};
use serde::{Deserialize, Serialize};

use crate::AiError;
use crate::providers::error_message;

const SERVICE: &str = "embeddings";
const DEFAULT_MODEL: &str = "text-embedding-3-small";

/// Cosine similarity of two vectors, clamped to `0.0..=1.0`.
///
/// Mismatched lengths and zero vectors score `0.0`.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0_f64, 0.0_f64, 0.0_f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a <= 0.0 || norm_b <= 0.0 {
        return 0.0;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(0.0, 1.0)
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

/// Orders embeddings by their `index` and checks that all inputs are present.
fn ordered_embeddings(
    response: EmbeddingResponse,
    expected: usize,
) -> Result<Vec<Vec<f32>>, AiError> {
    let mut slots: Vec<Option<Vec<f32>>> = vec![None; expected];
    for item in response.data {
        if let Some(slot) = slots.get_mut(item.index) {
            *slot = Some(item.embedding);
        }
    }
    slots
        .into_iter()
        .enumerate()
        .map(|(i, slot)| {
            slot.ok_or_else(|| AiError::Provider {
                message: format!("Missing embedding for input {i}"),
            })
        })
        .collect()
}

/// [`TextSimilarity`] backed by an embeddings API.
pub struct EmbeddingSimilarity {
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl EmbeddingSimilarity {
    /// Creates a client for `base_url` (e.g. `https://api.openai.com/v1`).
    #[must_use]
    pub fn new(base_url: impl Into<String>, api_key: String, model: String) -> Self {
        Self {
            api_key,
            model,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Builds a client from `EMBEDDING_BASE_URL`, `EMBEDDING_MODEL` and
    /// `EMBEDDING_API_KEY` (falling back to `OPENAI_API_KEY`).
    ///
    /// # Errors
    ///
    /// Returns [`AiError::Config`] if neither a base URL nor an API key is
    /// set.
    pub fn from_env() -> Result<Self, AiError> {
        let base_url = std::env::var("EMBEDDING_BASE_URL").ok();
        let api_key = std::env::var("EMBEDDING_API_KEY")
            .or_else(|_| std::env::var("OPENAI_API_KEY"))
            .ok();

        if base_url.is_none() && api_key.is_none() {
            return Err(AiError::Config {
                message: "EMBEDDING_BASE_URL or EMBEDDING_API_KEY must be set".to_string(),
            });
        }

        let model = std::env::var("EMBEDDING_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        Ok(Self::new(
            base_url.unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            api_key.unwrap_or_default(),
            model,
        ))
    }

    async fn embed(&self, inputs: Vec<&str>) -> Result<Vec<Vec<f32>>, AiError> {
        let expected = inputs.len();
        let request = EmbeddingRequest {
            model: &self.model,
            input: inputs,
        };

        let mut builder = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .json(&request);
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

        ordered_embeddings(serde_json::from_str(&body)?, expected)
    }
}

#[async_trait]
impl TextSimilarity for EmbeddingSimilarity {
    async fn scores(&self, text: &str, others: &[String]) -> Result<Vec<f64>, CollaboratorError> {
        if others.is_empty() {
            return Ok(Vec::new());
        }

        let inputs = std::iter::once(text)
            .chain(others.iter().map(String::as_str))
            .collect();
        let embeddings = self
            .embed(inputs)
            .await
            .map_err(|e| e.into_collaborator(SERVICE))?;

        let (first, rest) = embeddings
            .split_first()
            .ok_or_else(|| CollaboratorError::InvalidResponse {
                service: SERVICE.to_string(),
                message: "empty embedding list".to_string(),
            })?;
        log::debug!("Scored description against {} candidates", rest.len());
        Ok(rest.iter().map(|e| cosine_similarity(first, e)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_of_parallel_and_orthogonal_vectors() {
        assert!((cosine_similarity(&[1.0, 2.0], &[2.0, 4.0]) - 1.0).abs() < 1e-9);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-9);
        let half = cosine_similarity(&[1.0, 0.0], &[1.0, 3.0_f32.sqrt()]);
        assert!((half - 0.5).abs() < 1e-6);
    }

    #[test]
    fn cosine_is_clamped_and_guarded() {
        assert!(cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]).abs() < f64::EPSILON);
        assert!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]).abs() < f64::EPSILON);
        assert!(cosine_similarity(&[1.0], &[1.0, 0.0]).abs() < f64::EPSILON);
        assert!(cosine_similarity(&[], &[]).abs() < f64::EPSILON);
    }

    #[test]
    fn embeddings_are_reordered_by_index() {
        let body = r#"{"object":"list","data":[
            {"object":"embedding","index":1,"embedding":[0.0,1.0]},
            {"object":"embedding","index":0,"embedding":[1.0,0.0]}
        ],"model":"text-embedding-3-small"}"#;
        let embeddings = ordered_embeddings(serde_json::from_str(body).unwrap(), 2).unwrap();
        assert_eq!(embeddings, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn missing_embedding_is_an_error() {
        let body = r#"{"data":[{"index":0,"embedding":[1.0]}]}"#;
        assert!(ordered_embeddings(serde_json::from_str(body).unwrap(), 2).is_err());
    }

    #[tokio::test]
    async fn no_candidates_skip_the_request() {
        let similarity = EmbeddingSimilarity::new(
            "http://127.0.0.1:9",
            String::new(),
            DEFAULT_MODEL.to_string(),
        );
        assert!(similarity.scores("deep pothole", &[]).await.unwrap().is_empty());
    }
}
