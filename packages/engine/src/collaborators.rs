//! Interfaces to the external services the engine depends on.
//!
//! Each collaborator is an async trait object injected into the engine
//! components. Adapter crates provide network-backed implementations; the
//! simple local implementations here keep the engine usable offline.

use async_trait::async_trait;
use road_intel_report_models::{Coordinates, Severity};
use serde::{Deserialize, Serialize};

/// A failed call to an external collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollaboratorError {
    /// The service could not be reached or returned an error status.
    #[error("{service} request failed: {message}")]
    Request {
        /// Service name.
        service: String,
        /// Error detail.
        message: String,
    },

    /// The service answered with something unusable.
    #[error("{service} returned an invalid response: {message}")]
    InvalidResponse {
        /// Service name.
        service: String,
        /// Error detail.
        message: String,
    },

    /// The collaborator is missing credentials or settings.
    #[error("{service} is not configured: {message}")]
    NotConfigured {
        /// Service name.
        service: String,
        /// What is missing.
        message: String,
    },
}

/// Scores how similar a text is to each of a list of other texts.
#[async_trait]
pub trait TextSimilarity: Send + Sync {
    /// Returns one score in `0.0..=1.0` per entry of `others`, in order.
    ///
    /// # Errors
    ///
    /// Returns [`CollaboratorError`] if scoring fails.
    async fn scores(&self, text: &str, others: &[String]) -> Result<Vec<f64>, CollaboratorError>;
}

/// Turns coordinates into a human-readable place name.
#[async_trait]
pub trait LocationNamer: Send + Sync {
    /// Names the location.
    ///
    /// # Errors
    ///
    /// Returns [`CollaboratorError`] if the lookup fails.
    async fn name(&self, coordinates: Coordinates) -> Result<String, CollaboratorError>;
}

/// Pulls place names and landmarks out of free text.
#[async_trait]
pub trait LocationExtractor: Send + Sync {
    /// Returns the location mentions found in `text`, possibly none.
    ///
    /// # Errors
    ///
    /// Returns [`CollaboratorError`] if extraction fails.
    async fn extract(&self, text: &str) -> Result<Vec<String>, CollaboratorError>;
}

/// Input to a [`MessageGenerator`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRequest {
    /// Human-readable location of the hotspot.
    pub location: String,
    /// Number of citizen reports in the hotspot.
    pub report_count: usize,
    /// Highest severity in the hotspot.
    pub severity: Severity,
}

/// Drafts the body of an escalation message.
#[async_trait]
pub trait MessageGenerator: Send + Sync {
    /// Generates message text (without the municipal handle).
    ///
    /// # Errors
    ///
    /// Returns [`CollaboratorError`] if generation fails.
    async fn generate(&self, request: &MessageRequest) -> Result<String, CollaboratorError>;
}

/// Publishes an escalation message.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Publishes the final message.
    ///
    /// # Errors
    ///
    /// Returns [`CollaboratorError`] if publishing fails. The message must
    /// be treated as not published.
    async fn publish(&self, message: &str) -> Result<(), CollaboratorError>;
}

/// Similarity that never matches, leaving clustering purely spatial.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTextSimilarity;

#[async_trait]
impl TextSimilarity for NoTextSimilarity {
    async fn scores(&self, _text: &str, others: &[String]) -> Result<Vec<f64>, CollaboratorError> {
        Ok(vec![0.0; others.len()])
    }
}

/// Names a location by its rounded coordinates.
#[derive(Debug, Clone, Copy, Default)]
pub struct CoordinateNamer;

#[async_trait]
impl LocationNamer for CoordinateNamer {
    async fn name(&self, coordinates: Coordinates) -> Result<String, CollaboratorError> {
        Ok(coordinates.to_string())
    }
}

/// Severity-specific fixed message templates.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateMessageGenerator;

impl TemplateMessageGenerator {
    /// Renders the template for a request.
    #[must_use]
    pub fn render(request: &MessageRequest) -> String {
        let MessageRequest {
            location,
            report_count,
            severity,
        } = request;

        match severity {
            Severity::Severe => format!(
                "URGENT: {report_count} citizen reports of a hazardous pothole near {location}. \
                 Immediate repair needed before it damages vehicles or injures riders. \
                 #RoadSafety #FixOurRoads"
            ),
            Severity::Moderate => format!(
                "{report_count} citizens have reported a pothole near {location} that is still \
                 unrepaired. Please add it to the priority maintenance queue. #RoadRepair"
            ),
            Severity::Minor => format!(
                "{report_count} citizen reports of road wear near {location}. \
                 Please schedule routine maintenance. #CivicTech"
            ),
        }
    }
}

#[async_trait]
impl MessageGenerator for TemplateMessageGenerator {
    async fn generate(&self, request: &MessageRequest) -> Result<String, CollaboratorError> {
        Ok(Self::render(request))
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn request(severity: Severity) -> MessageRequest {
        MessageRequest {
            location: "FC Road, Pune".to_string(),
            report_count: 12,
            severity,
        }
    }

    #[test]
    fn templates_mention_location_and_count() {
        for severity in Severity::all() {
            let text = TemplateMessageGenerator::render(&request(*severity));
            assert!(text.contains("FC Road, Pune"), "{text}");
            assert!(text.contains("12"), "{text}");
        }
        assert!(TemplateMessageGenerator::render(&request(Severity::Severe)).starts_with("URGENT"));
    }

    #[test]
    fn templates_leave_room_for_a_handle() {
        for severity in Severity::all() {
            let text = TemplateMessageGenerator::render(&request(*severity));
            assert!(text.chars().count() < 250, "{text}");
        }
    }

    #[tokio::test]
    async fn coordinate_namer_uses_four_decimals() {
        let name = CoordinateNamer
            .name(Coordinates::new(18.520_43, 73.856_74).unwrap())
            .await
            .unwrap();
        assert_eq!(name, "18.5204, 73.8567");
    }

    #[tokio::test]
    async fn no_similarity_scores_zero() {
        let scores = NoTextSimilarity
            .scores("pothole", &["pothole".to_string(), "crater".to_string()])
            .await
            .unwrap();
        assert_eq!(scores, vec![0.0, 0.0]);
    }
}
