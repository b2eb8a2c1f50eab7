//! Engine configuration.
//!
//! Loaded from an optional TOML file and then overridden by environment
//! variables. Every field has a default, so an empty (or missing) file is a
//! valid configuration.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Default config file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "road_intel.toml";

/// Largest accepted recency window, in days.
pub const MAX_RECENCY_WINDOW_DAYS: i64 = 3650;

/// Largest accepted claim lease, in minutes (one year).
pub const MAX_CLAIM_LEASE_MINUTES: i64 = 525_600;

/// Handle used when a city has no configured mapping.
pub const FALLBACK_HANDLE: &str = "@MunicipalCorp";

/// Errors that can occur while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// The config file is not valid TOML for [`EngineConfig`].
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range or could not be parsed.
    #[error("Invalid value for {key}: {value}")]
    InvalidValue {
        /// Config key or environment variable.
        key: String,
        /// The offending value.
        value: String,
    },
}

/// Tunables for aggregation and escalation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Reports within this many meters of a hotspot centroid join it.
    pub radius_m: f64,
    /// Reports whose text scores at least this against a hotspot's text
    /// join it regardless of distance.
    pub similarity_threshold: f64,
    /// Only hotspots founded within this many days accept new reports.
    pub recency_window_days: i64,
    /// Minimum member count for escalation.
    pub hotspot_threshold: usize,
    /// Maximum published message length in characters, handle included.
    pub message_max_chars: usize,
    /// Escalation claims older than this are considered abandoned.
    pub claim_lease_minutes: i64,
    /// City assigned to reports that don't carry one.
    pub default_city: String,
    /// Municipal handle per lower-case city.
    pub handles: BTreeMap<String, String>,
    /// Handle used for cities missing from `handles`.
    pub fallback_handle: String,
    /// Default radius of nearby searches.
    pub nearby_radius_km: f64,
    /// Period of the escalation bot loop.
    pub bot_interval_hours: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let handles = [
            ("pune", "@PuneMunicipal"),
            ("mumbai", "@mybmc"),
            ("delhi", "@MCD_Delhi"),
            ("bangalore", "@BBMPCOMM"),
        ]
        .into_iter()
        .map(|(city, handle)| (city.to_string(), handle.to_string()))
        .collect();

        Self {
            radius_m: 25.0,
            similarity_threshold: 0.7,
            recency_window_days: 30,
            hotspot_threshold: 10,
            message_max_chars: 280,
            claim_lease_minutes: 60,
            default_city: "pune".to_string(),
            handles,
            fallback_handle: FALLBACK_HANDLE.to_string(),
            nearby_radius_km: 2.0,
            bot_interval_hours: 6,
        }
    }
}

impl EngineConfig {
    /// Parses a TOML document. Missing keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the document is malformed or a value is
    /// out of range.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::de::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the config file at `path` (if it exists) and applies
    /// environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed, or an
    /// override is invalid.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            log::debug!("Loading config from {}", path.display());
            Self::from_toml_str(&std::fs::read_to_string(path)?)?
        } else {
            log::debug!("No config at {}, using defaults", path.display());
            Self::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Applies overrides from a variable lookup (normally the process
    /// environment).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if a variable does not parse
    /// or the result fails validation.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(v) = lookup("ROAD_INTEL_RADIUS_M") {
            self.radius_m = parse_var("ROAD_INTEL_RADIUS_M", &v)?;
        }
        if let Some(v) = lookup("ROAD_INTEL_SIMILARITY_THRESHOLD") {
            self.similarity_threshold = parse_var("ROAD_INTEL_SIMILARITY_THRESHOLD", &v)?;
        }
        if let Some(v) = lookup("ROAD_INTEL_RECENCY_WINDOW_DAYS") {
            self.recency_window_days = parse_var("ROAD_INTEL_RECENCY_WINDOW_DAYS", &v)?;
        }
        if let Some(v) = lookup("HOTSPOT_THRESHOLD") {
            self.hotspot_threshold = parse_var("HOTSPOT_THRESHOLD", &v)?;
        }
        if let Some(v) = lookup("ROAD_INTEL_DEFAULT_CITY") {
            self.default_city = v.trim().to_lowercase();
        }
        self.validate()
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key: &str, value: String| {
            Err(ConfigError::InvalidValue {
                key: key.to_string(),
                value,
            })
        };

        if !self.radius_m.is_finite() || self.radius_m < 0.0 {
            return invalid("radius_m", self.radius_m.to_string());
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return invalid(
                "similarity_threshold",
                self.similarity_threshold.to_string(),
            );
        }
        if !(0..=MAX_RECENCY_WINDOW_DAYS).contains(&self.recency_window_days) {
            return invalid(
                "recency_window_days",
                self.recency_window_days.to_string(),
            );
        }
        if self.hotspot_threshold == 0 {
            return invalid("hotspot_threshold", "0".to_string());
        }
        if self.message_max_chars == 0 {
            return invalid("message_max_chars", "0".to_string());
        }
        if !(1..=MAX_CLAIM_LEASE_MINUTES).contains(&self.claim_lease_minutes) {
            return invalid(
                "claim_lease_minutes",
                self.claim_lease_minutes.to_string(),
            );
        }
        if self.default_city.trim().is_empty() {
            return invalid("default_city", String::new());
        }
        Ok(())
    }

    /// Municipal handle for `city` (case-insensitive), or the fallback.
    #[must_use]
    pub fn handle_for(&self, city: &str) -> &str {
        self.handles
            .get(&city.trim().to_lowercase())
            .unwrap_or(&self.fallback_handle)
    }

    /// The recency window as a duration, saturating at the largest
    /// accepted window.
    #[must_use]
    pub fn recency_window(&self) -> chrono::Duration {
        chrono::Duration::try_days(self.recency_window_days.clamp(0, MAX_RECENCY_WINDOW_DAYS))
            .unwrap_or_default()
    }

    /// The claim lease as a duration, saturating at the largest accepted
    /// lease.
    #[must_use]
    pub fn claim_lease(&self) -> chrono::Duration {
        chrono::Duration::try_minutes(self.claim_lease_minutes.clamp(1, MAX_CLAIM_LEASE_MINUTES))
            .unwrap_or_default()
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = EngineConfig::default();
        assert!((config.radius_m - 25.0).abs() < f64::EPSILON);
        assert!((config.similarity_threshold - 0.7).abs() < f64::EPSILON);
        assert_eq!(config.recency_window_days, 30);
        assert_eq!(config.hotspot_threshold, 10);
        assert_eq!(config.message_max_chars, 280);
        assert_eq!(config.default_city, "pune");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
            radius_m = 40.0
            hotspot_threshold = 3

            [handles]
            chennai = "@chennaicorp"
            "#,
        )
        .unwrap();

        assert!((config.radius_m - 40.0).abs() < f64::EPSILON);
        assert_eq!(config.hotspot_threshold, 3);
        assert_eq!(config.message_max_chars, 280);
        assert_eq!(config.handle_for("Chennai"), "@chennaicorp");
        // Replacing the table drops the built-in cities.
        assert_eq!(config.handle_for("pune"), FALLBACK_HANDLE);
    }

    #[test]
    fn rejects_out_of_range_values() {
        let err = EngineConfig::from_toml_str("similarity_threshold = 1.5").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }), "{err}");

        let err = EngineConfig::from_toml_str("hotspot_threshold = 0").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }), "{err}");

        let err = EngineConfig::from_toml_str("recency_window_days = 100000000").unwrap_err();
        assert!(
            matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "recency_window_days"),
            "{err}"
        );

        let err = EngineConfig::from_toml_str(&format!("claim_lease_minutes = {}", i64::MAX))
            .unwrap_err();
        assert!(
            matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "claim_lease_minutes"),
            "{err}"
        );

        assert!(EngineConfig::from_toml_str("recency_window_days = 3650").is_ok());
        assert!(EngineConfig::from_toml_str("claim_lease_minutes = 525600").is_ok());

        assert!(matches!(
            EngineConfig::from_toml_str("radius_m = \"wide\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn durations_saturate_for_unvalidated_values() {
        let config = EngineConfig {
            recency_window_days: i64::MAX,
            claim_lease_minutes: i64::MAX,
            ..EngineConfig::default()
        };
        assert_eq!(config.recency_window().num_days(), MAX_RECENCY_WINDOW_DAYS);
        assert_eq!(config.claim_lease().num_minutes(), MAX_CLAIM_LEASE_MINUTES);
    }

    #[test]
    fn environment_overrides_file_values() {
        let mut config = EngineConfig::default();
        config
            .apply_overrides(|key| match key {
                "HOTSPOT_THRESHOLD" => Some("4".to_string()),
                "ROAD_INTEL_RADIUS_M" => Some(" 12.5 ".to_string()),
                "ROAD_INTEL_DEFAULT_CITY" => Some("Mumbai".to_string()),
                _ => None,
            })
            .unwrap();

        assert_eq!(config.hotspot_threshold, 4);
        assert!((config.radius_m - 12.5).abs() < f64::EPSILON);
        assert_eq!(config.default_city, "mumbai");
    }

    #[test]
    fn bad_environment_value_is_an_error() {
        let mut config = EngineConfig::default();
        let err = config
            .apply_overrides(|key| (key == "HOTSPOT_THRESHOLD").then(|| "ten".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "HOTSPOT_THRESHOLD"));
    }

    #[test]
    fn handle_lookup_falls_back() {
        let config = EngineConfig::default();
        assert_eq!(config.handle_for("pune"), "@PuneMunicipal");
        assert_eq!(config.handle_for(" MUMBAI "), "@mybmc");
        assert_eq!(config.handle_for("delhi"), "@MCD_Delhi");
        assert_eq!(config.handle_for("bangalore"), "@BBMPCOMM");
        assert_eq!(config.handle_for("nagpur"), "@MunicipalCorp");
    }

    #[test]
    fn missing_file_uses_defaults() {
        let path = std::env::temp_dir().join("road_intel_missing_config.toml");
        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.message_max_chars, 280);
    }
}
