//! Contracts for the collaborators around the progress engine.
//!
//! Routing and geocoding are black boxes that either return a result or fail;
//! the GUI consumes progress through a [`ProgressListener`].

use crate::error::Result;
use crate::progress::ProgressUpdate;
use crate::route::{Route, RouteResponse};
use crate::{Destination, GpsPoint};

/// Turn-by-turn routing between two points.
pub trait RoutingService: Send + Sync {
    /// Route from `from` to `to`. Ordering matters.
    fn navigate(&self, from: GpsPoint, to: GpsPoint) -> Result<RouteResponse>;
}

/// Free-text place search.
pub trait GeocodingService: Send + Sync {
    fn search(&self, query: &str) -> Result<Vec<Destination>>;
}

/// Receives progress for the active route.
///
/// Callbacks run on whichever thread delivers position fixes. Implementations
/// that touch UI state must marshal onto the UI thread themselves.
pub trait ProgressListener: Send + Sync {
    /// ETA, remaining time/distance and per-instruction distances.
    fn on_progress(&self, update: &ProgressUpdate);

    /// The route was replaced after going off route. Instruction rows should
    /// be rebuilt from the new route.
    fn on_reroute(&self, _route: &Route) {}

    /// Text to speak. Fire-and-forget.
    fn on_announcement(&self, _text: &str) {}
}
