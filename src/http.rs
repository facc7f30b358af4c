//! HTTP clients for the routing and geocoding services.
//!
//! - GraphHopper `/route` for turn-by-turn routing (first path only)
//! - Nominatim `/search` for free-text geocoding
//!
//! Both are async on `reqwest`. The sync collaborator traits are implemented
//! by blocking on an owned tokio runtime, so they must not be called from
//! inside another tokio runtime.

use std::time::Duration;

use log::{debug, info, warn};
use reqwest::Client;
use serde::Deserialize;
use tokio::runtime::Runtime;

use crate::error::{NavigationError, Result};
use crate::route::{RawInstruction, RouteResponse};
use crate::services::{GeocodingService, RoutingService};
use crate::{Destination, GpsPoint};

const USER_AGENT: &str = concat!("route-progress/", env!("CARGO_PKG_VERSION"));

/// Service locations and request settings.
#[derive(Debug, Clone)]
pub struct ServiceEndpoints {
    /// GraphHopper route endpoint. Default: http://localhost:8989/route
    pub routing_url: String,
    /// Nominatim search endpoint. Default: http://localhost:8088/search
    pub geocoding_url: String,
    /// GraphHopper vehicle profile. Default: "car"
    pub profile: String,
    /// Per-request timeout. Default: 15 seconds
    pub timeout_secs: u64,
}

impl Default for ServiceEndpoints {
    fn default() -> Self {
        Self {
            routing_url: "http://localhost:8989/route".to_string(),
            geocoding_url: "http://localhost:8088/search".to_string(),
            profile: "car".to_string(),
            timeout_secs: 15,
        }
    }
}

fn build_client(endpoints: &ServiceEndpoints) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(endpoints.timeout_secs))
        .build()
        .map_err(|e| NavigationError::Internal {
            message: format!("Failed to create HTTP client: {}", e),
        })
}

fn build_runtime() -> Result<Runtime> {
    Runtime::new().map_err(|e| NavigationError::Internal {
        message: format!("Failed to create tokio runtime: {}", e),
    })
}

// ============================================================================
// GraphHopper
// ============================================================================

#[derive(Debug, Deserialize)]
struct GhResponse {
    #[serde(default)]
    paths: Vec<GhPath>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GhPath {
    distance: f64,
    time: u64,
    points: GhPoints,
    instructions: Vec<RawInstruction>,
}

#[derive(Debug, Deserialize)]
struct GhPoints {
    coordinates: Vec<Vec<f64>>,
}

/// Turn a GraphHopper `/route` body (unencoded points) into a [`RouteResponse`].
pub fn parse_route_body(body: &str) -> Result<RouteResponse> {
    let parsed: GhResponse = serde_json::from_str(body).map_err(|e| {
        NavigationError::RoutingFailed {
            message: format!("Parse error: {}", e),
        }
    })?;

    let Some(path) = parsed.paths.into_iter().next() else {
        return Err(NavigationError::RoutingFailed {
            message: parsed
                .message
                .unwrap_or_else(|| "response contained no paths".to_string()),
        });
    };

    // Elevation-enabled responses carry a third coordinate; ignore it.
    let points = path
        .points
        .coordinates
        .iter()
        .map(|c| match c.as_slice() {
            [lon, lat, ..] => Ok([*lon, *lat]),
            _ => Err(NavigationError::MalformedRoute {
                message: format!("coordinate with {} values", c.len()),
            }),
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(RouteResponse {
        points,
        distance_m: path.distance,
        time_ms: path.time,
        instructions: path.instructions,
    })
}

/// GraphHopper routing client.
pub struct GraphHopperClient {
    client: Client,
    endpoints: ServiceEndpoints,
    runtime: Runtime,
}

impl GraphHopperClient {
    pub fn new(endpoints: ServiceEndpoints) -> Result<Self> {
        Ok(Self {
            client: build_client(&endpoints)?,
            runtime: build_runtime()?,
            endpoints,
        })
    }

    /// Request a route from `from` to `to`.
    pub async fn fetch_route(&self, from: GpsPoint, to: GpsPoint) -> Result<RouteResponse> {
        debug!(
            "[GraphHopper] Route ({:.5}, {:.5}) -> ({:.5}, {:.5})",
            from.latitude, from.longitude, to.latitude, to.longitude
        );

        let response = self
            .client
            .get(&self.endpoints.routing_url)
            .query(&[
                ("point", format!("{},{}", from.latitude, from.longitude)),
                ("point", format!("{},{}", to.latitude, to.longitude)),
                ("profile", self.endpoints.profile.clone()),
                ("points_encoded", "false".to_string()),
            ])
            .send()
            .await
            .map_err(|e| NavigationError::RoutingFailed {
                message: format!("Request error: {}", e),
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| NavigationError::RoutingFailed {
                message: format!("Read error: {}", e),
            })?;

        if !status.is_success() {
            warn!("[GraphHopper] HTTP {}", status);
            return Err(NavigationError::RoutingFailed {
                message: format!("HTTP {}", status),
            });
        }

        let route = parse_route_body(&body)?;
        info!(
            "[GraphHopper] {} points, {} instructions, {:.0} m",
            route.points.len(),
            route.instructions.len(),
            route.distance_m
        );
        Ok(route)
    }
}

impl RoutingService for GraphHopperClient {
    fn navigate(&self, from: GpsPoint, to: GpsPoint) -> Result<RouteResponse> {
        self.runtime.block_on(self.fetch_route(from, to))
    }
}

// ============================================================================
// Nominatim
// ============================================================================

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    display_name: String,
    lat: String,
    lon: String,
}

/// Turn a Nominatim `/search` body into destinations.
///
/// An `{"error": ...}` object or unparseable coordinates fail the whole search.
pub fn parse_search_body(body: &str) -> Result<Vec<Destination>> {
    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|_| NavigationError::search_failed())?;
    if value.get("error").is_some() {
        return Err(NavigationError::search_failed());
    }

    let places: Vec<NominatimPlace> =
        serde_json::from_value(value).map_err(|_| NavigationError::search_failed())?;

    places
        .into_iter()
        .map(|place| {
            let lat = place.lat.parse::<f64>();
            let lon = place.lon.parse::<f64>();
            match (lat, lon) {
                (Ok(lat), Ok(lon)) => Ok(Destination::new(
                    &place.display_name,
                    GpsPoint::new(lat, lon),
                )),
                _ => Err(NavigationError::search_failed()),
            }
        })
        .collect()
}

/// Nominatim geocoding client.
pub struct NominatimClient {
    client: Client,
    endpoints: ServiceEndpoints,
    runtime: Runtime,
}

impl NominatimClient {
    pub fn new(endpoints: ServiceEndpoints) -> Result<Self> {
        Ok(Self {
            client: build_client(&endpoints)?,
            runtime: build_runtime()?,
            endpoints,
        })
    }

    /// Search for places matching `query`.
    pub async fn fetch_places(&self, query: &str) -> Result<Vec<Destination>> {
        let response = self
            .client
            .get(&self.endpoints.geocoding_url)
            .query(&[("q", query), ("format", "json")])
            .send()
            .await
            .map_err(|e| {
                warn!("[Nominatim] Request error: {}", e);
                NavigationError::search_failed()
            })?;

        let body = response
            .text()
            .await
            .map_err(|_| NavigationError::search_failed())?;
        let places = parse_search_body(&body)?;
        debug!("[Nominatim] '{}' -> {} results", query, places.len());
        Ok(places)
    }
}

impl GeocodingService for NominatimClient {
    fn search(&self, query: &str) -> Result<Vec<Destination>> {
        self.runtime.block_on(self.fetch_places(query))
    }
}
