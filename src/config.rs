//! Navigator configuration.

use chrono::format::{Item, StrftimeItems};
use serde::{Deserialize, Serialize};

use crate::error::{NavigationError, Result};

/// Meters in one statute mile.
pub const METERS_PER_MILE: f64 = 1609.344;

/// ETA clock format, e.g. "3:07 PM".
pub const DEFAULT_ETA_FORMAT: &str = "%-I:%M %p";

/// A one-shot spoken cue fired when the distance left in a leg drops
/// below `distance_m`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnouncementThreshold {
    /// Distance from the end of the leg in meters
    pub distance_m: f64,
    /// Spoken prefix, e.g. "In 1 mile"
    pub label: String,
}

impl AnnouncementThreshold {
    pub fn new(distance_m: f64, label: &str) -> Self {
        Self {
            distance_m,
            label: label.to_string(),
        }
    }
}

/// Configuration for progress tracking and announcements.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigatorConfig {
    /// Off-route threshold in coordinate space (degrees).
    /// A fix farther than this from the nearest leg triggers a reroute.
    /// Default: 0.0006 (~66 m at mid-latitudes)
    pub off_route_threshold: f64,

    /// Distance thresholds announced once per leg.
    /// Default: 1 mile and 1000 feet
    pub announcement_thresholds: Vec<AnnouncementThreshold>,

    /// chrono format string for the ETA clock time.
    /// Default: "%-I:%M %p" (e.g. "3:07 PM")
    pub eta_format: String,
}

impl Default for NavigatorConfig {
    fn default() -> Self {
        Self {
            off_route_threshold: 0.0006,
            announcement_thresholds: vec![
                AnnouncementThreshold::new(METERS_PER_MILE, "In 1 mile"),
                AnnouncementThreshold::new(304.8, "In 1000 feet"),
            ],
            eta_format: DEFAULT_ETA_FORMAT.to_string(),
        }
    }
}

impl NavigatorConfig {
    /// Parse a (possibly partial) JSON config. Missing fields keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: NavigatorConfig =
            serde_json::from_str(json).map_err(|e| NavigationError::Config {
                message: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject thresholds that could never fire or would fire on every fix,
    /// and ETA formats chrono cannot render.
    pub fn validate(&self) -> Result<()> {
        if !(self.off_route_threshold.is_finite() && self.off_route_threshold > 0.0) {
            return Err(NavigationError::Config {
                message: format!(
                    "off_route_threshold must be positive, got {}",
                    self.off_route_threshold
                ),
            });
        }
        if let Some(bad) = self
            .announcement_thresholds
            .iter()
            .find(|t| !(t.distance_m.is_finite() && t.distance_m > 0.0))
        {
            return Err(NavigationError::Config {
                message: format!(
                    "announcement threshold '{}' has invalid distance {}",
                    bad.label, bad.distance_m
                ),
            });
        }
        if !is_valid_eta_format(&self.eta_format) {
            return Err(NavigationError::Config {
                message: format!("eta_format '{}' is not a valid strftime format", self.eta_format),
            });
        }
        Ok(())
    }
}

/// Whether chrono can render `format` without error.
pub fn is_valid_eta_format(format: &str) -> bool {
    !StrftimeItems::new(format).any(|item| matches!(item, Item::Error))
}
