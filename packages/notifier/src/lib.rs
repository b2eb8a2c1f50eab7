#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Notifiers that publish escalation messages.
//!
//! [`TwitterNotifier`] posts to the X (Twitter) v2 API; [`LogNotifier`]
//! only logs, for dry runs and local development.

pub mod twitter;

pub use twitter::TwitterNotifier;

use async_trait::async_trait;
use road_intel_engine::collaborators::{CollaboratorError, Notifier};
use thiserror::Error;

/// Errors from publishing a message.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API rejected the post.
    #[error("Rejected with HTTP {status}: {message}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Error detail from the response body.
        message: String,
    },

    /// Missing credentials.
    #[error("Configuration error: {message}")]
    Config {
        /// Description.
        message: String,
    },
}

impl From<NotifyError> for CollaboratorError {
    fn from(value: NotifyError) -> Self {
        let service = "twitter".to_string();
        let message = value.to_string();
        match value {
            NotifyError::Http(_) | NotifyError::Rejected { .. } => {
                Self::Request { service, message }
            }
            NotifyError::Config { .. } => Self::NotConfigured { service, message },
        }
    }
}

/// Dry-run notifier that writes messages to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn publish(&self, message: &str) -> Result<(), CollaboratorError> {
        log::info!("[dry run] Would publish: {message}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn log_notifier_always_succeeds() {
        assert!(LogNotifier.publish("@PuneMunicipal pothole").await.is_ok());
    }

    #[test]
    fn rejected_post_is_a_request_error() {
        let err = CollaboratorError::from(NotifyError::Rejected {
            status: 403,
            message: "duplicate content".to_string(),
        });
        assert_eq!(
            err,
            CollaboratorError::Request {
                service: "twitter".to_string(),
                message: "Rejected with HTTP 403: duplicate content".to_string(),
            }
        );
    }
}
