#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Reverse geocoding for hotspot locations.
//!
//! Turns hotspot centroids into readable place names for escalation
//! messages using Nominatim / OpenStreetMap. The public instance allows
//! **1 request per second**, so lookups are paced by [`RateLimiter`].

pub mod nominatim;

pub use nominatim::NominatimNamer;

use std::time::Duration;

use road_intel_engine::collaborators::CollaboratorError;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// A reverse geocoding result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Place {
    /// Full address line as returned by the geocoder.
    pub display_name: String,
    /// Street name, if known.
    pub road: Option<String>,
    /// Neighbourhood or suburb, if known.
    pub locality: Option<String>,
    /// City, town or village, if known.
    pub city: Option<String>,
}

impl Place {
    /// Short label such as `"FC Road, Shivajinagar, Pune"`, falling back to
    /// the full display name when no address parts are known.
    #[must_use]
    pub fn label(&self) -> String {
        let parts: Vec<&str> = [&self.road, &self.locality, &self.city]
            .into_iter()
            .filter_map(|p| p.as_deref())
            .collect();
        if parts.is_empty() {
            self.display_name.clone()
        } else {
            parts.join(", ")
        }
    }
}

/// Errors from geocoding operations.
#[derive(Debug, Error)]
pub enum GeocodeError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Response parsing failed.
    #[error("Parse error: {message}")]
    Parse {
        /// Description of the parsing failure.
        message: String,
    },

    /// Rate limit exceeded.
    #[error("Rate limit exceeded")]
    RateLimited,

    /// The geocoder has no place for these coordinates.
    #[error("No place found")]
    NoResult,
}

impl From<GeocodeError> for CollaboratorError {
    fn from(value: GeocodeError) -> Self {
        let service = "nominatim".to_string();
        let message = value.to_string();
        match value {
            GeocodeError::Http(_) | GeocodeError::RateLimited => Self::Request { service, message },
            GeocodeError::Parse { .. } | GeocodeError::NoResult => {
                Self::InvalidResponse { service, message }
            }
        }
    }
}

/// Spaces out calls so that at most one starts per interval.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Creates a limiter allowing one call per `interval`.
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(None),
        }
    }

    /// Waits until the next call may start.
    pub async fn acquire(&self) {
        let mut last = self.last.lock().await;
        if let Some(previous) = *last {
            let ready_at = previous + self.interval;
            if ready_at > Instant::now() {
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_prefers_address_parts() {
        let place = Place {
            display_name: "FC Road, Shivajinagar, Pune, Maharashtra, 411004, India".to_string(),
            road: Some("FC Road".to_string()),
            locality: None,
            city: Some("Pune".to_string()),
        };
        assert_eq!(place.label(), "FC Road, Pune");

        let bare = Place {
            road: None,
            city: None,
            ..place
        };
        assert_eq!(bare.label(), bare.display_name);
    }

    #[test]
    fn errors_map_to_collaborator_kinds() {
        assert!(matches!(
            CollaboratorError::from(GeocodeError::RateLimited),
            CollaboratorError::Request { .. }
        ));
        assert!(matches!(
            CollaboratorError::from(GeocodeError::NoResult),
            CollaboratorError::InvalidResponse { .. }
        ));
    }

    #[tokio::test]
    async fn limiter_spaces_out_calls() {
        let limiter = RateLimiter::new(Duration::from_millis(40));
        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(80));
    }
}
