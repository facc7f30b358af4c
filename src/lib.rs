//! # Route Progress
//!
//! Turn-by-turn progress tracking against a pre-computed navigation route.
//!
//! This library provides:
//! - Nearest-leg snapping of GPS fixes using an R-tree over route geometry
//! - Monotonic progress tracking with ETA, time and distance remaining
//! - One-shot distance announcements per leg ("In 1 mile, ...")
//! - Off-route detection with in-place rerouting
//! - Saved and in-progress destination persistence
//!
//! ## Features
//!
//! - **`http`** - GraphHopper routing and Nominatim geocoding clients
//! - **`persistence`** - SQLite destination store
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use route_progress::{
//!     Destination, GeometryIndex, GpsPoint, NavigatorConfig, ProgressTracker, Route,
//!     RouteResponse, RawInstruction, FixOutcome,
//! };
//!
//! let response = RouteResponse {
//!     points: vec![[0.0, 0.0], [0.01, 0.0]],
//!     distance_m: 1113.0,
//!     time_ms: 60_000,
//!     instructions: vec![
//!         RawInstruction { sign: 0, text: "Continue".into(), distance_m: 1113.0, time_ms: 60_000, interval: [0, 1] },
//!         RawInstruction { sign: 4, text: "Arrive at destination".into(), distance_m: 0.0, time_ms: 0, interval: [1, 1] },
//!     ],
//! };
//!
//! let config = NavigatorConfig::default();
//! let destination = Destination::new("Office", GpsPoint::new(0.0, 0.01));
//! let mut route = Route::from_response(destination, response, &config.announcement_thresholds).unwrap();
//! let index = GeometryIndex::build(&route);
//! let mut tracker = ProgressTracker::new(&config);
//!
//! let outcome = tracker.on_position(&mut route, &index, GpsPoint::new(0.0, 0.005), chrono::Local::now());
//! if let FixOutcome::Progress(update) = outcome {
//!     println!("{} remaining, arriving {}", update.time_remaining, update.eta);
//! }
//! ```

use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{NavigationError, OptionExt, Result};

// Configuration
pub mod config;
pub use config::{AnnouncementThreshold, NavigatorConfig, DEFAULT_ETA_FORMAT, METERS_PER_MILE};

// Route model built from routing responses
pub mod route;
pub use route::{Instruction, RawInstruction, Route, RouteResponse};

// Spatial index over per-instruction geometry
pub mod geometry;
pub use geometry::{GeometryIndex, LegGeometry, Snap};

// Progress state machine
pub mod progress;
pub use progress::{FixOutcome, ProgressTracker, ProgressUpdate};

// Position feed contract
pub mod feed;
pub use feed::{FeedHandle, PositionCallback, PositionFeed, SharedPositionFeed};

// External collaborator contracts
pub mod services;
pub use services::{GeocodingService, ProgressListener, RoutingService};

// Saved / in-progress destinations
pub mod store;
pub use store::{DestinationStore, MemoryStore};

// SQLite destination store
#[cfg(feature = "persistence")]
pub mod persistence;
#[cfg(feature = "persistence")]
pub use persistence::SqliteStore;

// Route lifecycle
pub mod navigator;
pub use navigator::{NavigationPhase, Navigator, RouteHandle};

// HTTP collaborators
#[cfg(feature = "http")]
pub mod http;
#[cfg(feature = "http")]
pub use http::{GraphHopperClient, NominatimClient, ServiceEndpoints};

// ============================================================================
// Core Types
// ============================================================================

/// A GPS coordinate with latitude and longitude.
///
/// # Example
/// ```
/// use route_progress::GpsPoint;
/// let point = GpsPoint::new(37.2296, -80.4139); // Blacksburg
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GpsPoint {
    /// Create a new GPS point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

/// Bounding box for a route.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Bounds {
    /// Create bounds from GPS points.
    pub fn from_points(points: &[GpsPoint]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        let mut min_lat = f64::MAX;
        let mut max_lat = f64::MIN;
        let mut min_lng = f64::MAX;
        let mut max_lng = f64::MIN;

        for p in points {
            min_lat = min_lat.min(p.latitude);
            max_lat = max_lat.max(p.latitude);
            min_lng = min_lng.min(p.longitude);
            max_lng = max_lng.max(p.longitude);
        }

        Some(Self {
            min_lat,
            max_lat,
            min_lng,
            max_lng,
        })
    }
}

/// Where a trip is going. The display name identifies the trip for
/// persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Destination {
    pub name: String,
    pub point: GpsPoint,
}

impl Destination {
    pub fn new(name: &str, point: GpsPoint) -> Self {
        Self {
            name: name.to_string(),
            point,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
