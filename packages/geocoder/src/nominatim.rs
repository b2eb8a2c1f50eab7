//! Nominatim / OpenStreetMap reverse geocoder client.
//!
//! See <https://nominatim.org/release-docs/develop/api/Reverse/>

use std::time::Duration;

use async_trait::async_trait;
use road_intel_engine::collaborators::{CollaboratorError, LocationNamer};
use road_intel_report_models::Coordinates;

use crate::{GeocodeError, Place, RateLimiter};

/// Public Nominatim instance.
pub const DEFAULT_BASE_URL: &str = "https://nominatim.openstreetmap.org";

const USER_AGENT: &str = concat!("road_intel/", env!("CARGO_PKG_VERSION"));

/// Reverse geocodes a single point at street-level zoom.
///
/// The caller is responsible for rate limiting.
///
/// # Errors
///
/// Returns [`GeocodeError`] if the HTTP request or response parsing fails.
pub async fn reverse_single(
    client: &reqwest::Client,
    base_url: &str,
    coordinates: Coordinates,
) -> Result<Option<Place>, GeocodeError> {
    let resp = client
        .get(format!("{}/reverse", base_url.trim_end_matches('/')))
        .query(&[
            ("lat", coordinates.latitude.to_string()),
            ("lon", coordinates.longitude.to_string()),
            ("format", "jsonv2".to_string()),
            ("zoom", "17".to_string()),
            ("addressdetails", "1".to_string()),
        ])
        .send()
        .await?;

    if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(GeocodeError::RateLimited);
    }

    let body: serde_json::Value = resp.error_for_status()?.json().await?;
    parse_response(&body)
}

/// Parses a Nominatim reverse response.
fn parse_response(body: &serde_json::Value) -> Result<Option<Place>, GeocodeError> {
    if !body.is_object() {
        return Err(GeocodeError::Parse {
            message: "Nominatim response is not an object".to_string(),
        });
    }

    // Points in the sea or otherwise unmatched.
    if body.get("error").is_some() {
        return Ok(None);
    }

    let display_name = body["display_name"]
        .as_str()
        .ok_or_else(|| GeocodeError::Parse {
            message: "Missing display_name in Nominatim response".to_string(),
        })?
        .to_string();

    let address = &body["address"];
    let first_of = |keys: &[&str]| {
        keys.iter()
            .find_map(|k| address[*k].as_str())
            .map(String::from)
    };

    Ok(Some(Place {
        display_name,
        road: first_of(&["road", "pedestrian", "highway"]),
        locality: first_of(&["neighbourhood", "suburb", "quarter"]),
        city: first_of(&["city", "town", "village", "county"]),
    }))
}

/// [`LocationNamer`] that asks Nominatim for the nearest address.
pub struct NominatimNamer {
    client: reqwest::Client,
    base_url: String,
    limiter: RateLimiter,
}

impl NominatimNamer {
    /// Creates a namer for `base_url` paced at one request per second.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError::Http`] if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>) -> Result<Self, GeocodeError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            limiter: RateLimiter::new(Duration::from_secs(1)),
        })
    }

    /// Creates a namer using `NOMINATIM_BASE_URL` or the public instance.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError::Http`] if the HTTP client cannot be built.
    pub fn from_env() -> Result<Self, GeocodeError> {
        Self::new(
            std::env::var("NOMINATIM_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
        )
    }
}

#[async_trait]
impl LocationNamer for NominatimNamer {
    async fn name(&self, coordinates: Coordinates) -> Result<String, CollaboratorError> {
        self.limiter.acquire().await;
        let place = reverse_single(&self.client, &self.base_url, coordinates)
            .await?
            .ok_or(GeocodeError::NoResult)?;
        let label = place.label();
        log::debug!("Reverse geocoded {coordinates} to {label}");
        Ok(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_reverse_result() {
        let body = serde_json::json!({
            "place_id": 123,
            "lat": "18.5204",
            "lon": "73.8567",
            "display_name": "Shivaji Road, Budhwar Peth, Pune, Maharashtra, 411002, India",
            "address": {
                "road": "Shivaji Road",
                "suburb": "Budhwar Peth",
                "city": "Pune",
                "state": "Maharashtra",
                "country": "India"
            }
        });
        let place = parse_response(&body).unwrap().unwrap();
        assert_eq!(place.road.as_deref(), Some("Shivaji Road"));
        assert_eq!(place.locality.as_deref(), Some("Budhwar Peth"));
        assert_eq!(place.label(), "Shivaji Road, Budhwar Peth, Pune");
    }

    #[test]
    fn falls_back_through_address_keys() {
        let body = serde_json::json!({
            "display_name": "Lonavala, Maharashtra, India",
            "address": { "town": "Lonavala" }
        });
        let place = parse_response(&body).unwrap().unwrap();
        assert_eq!(place.city.as_deref(), Some("Lonavala"));
        assert_eq!(place.road, None);
    }

    #[test]
    fn unmatched_point_is_none() {
        let body = serde_json::json!({ "error": "Unable to geocode" });
        assert!(parse_response(&body).unwrap().is_none());
    }

    #[test]
    fn rejects_malformed_bodies() {
        assert!(parse_response(&serde_json::json!([])).is_err());
        assert!(parse_response(&serde_json::json!({ "address": {} })).is_err());
    }
}
