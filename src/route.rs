//! Route model built from a routing service response.
//!
//! A [`Route`] is immutable per revision apart from each instruction's pending
//! announcement thresholds. Rerouting builds a brand new `Route` value.

use serde::{Deserialize, Serialize};

use crate::config::{AnnouncementThreshold, METERS_PER_MILE};
use crate::error::{NavigationError, OptionExt, Result};
use crate::{Bounds, Destination, GpsPoint};

/// Longest trip duration accepted from a routing service (30 days).
pub const MAX_ROUTE_TIME_MS: u64 = 30 * 24 * 60 * 60 * 1000;

/// Longest trip distance accepted from a routing service.
pub const MAX_ROUTE_DISTANCE_M: f64 = 100_000_000.0;

// ============================================================================
// Service Response
// ============================================================================

/// One raw instruction as returned by the routing service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawInstruction {
    /// Maneuver code (GraphHopper sign convention)
    pub sign: i32,
    pub text: String,
    #[serde(rename = "distance")]
    pub distance_m: f64,
    #[serde(rename = "time")]
    pub time_ms: u64,
    /// Inclusive [start, end] indices into the response points
    pub interval: [usize; 2],
}

/// A routing service result, normalized to plain `[lon, lat]` points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteResponse {
    /// Path points as `[lon, lat]` pairs
    pub points: Vec<[f64; 2]>,
    #[serde(rename = "distance")]
    pub distance_m: f64,
    #[serde(rename = "time")]
    pub time_ms: u64,
    pub instructions: Vec<RawInstruction>,
}

// ============================================================================
// Route Model
// ============================================================================

/// One leg of the route.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// Inclusive [start, end] indices into `Route::path`
    pub interval: [usize; 2],
    pub distance_m: f64,
    pub time_ms: u64,
    /// Cumulative distance before this leg
    pub distance_since_start_m: f64,
    /// Cumulative time before this leg
    pub time_since_start_ms: u64,
    /// Upcoming maneuver code (taken from the next raw instruction)
    pub sign: i32,
    /// Upcoming maneuver text (taken from the next raw instruction)
    pub text: String,
    /// Thresholds not yet spoken for this leg, largest first
    pub pending_thresholds: Vec<AnnouncementThreshold>,
}

impl Instruction {
    /// Distance from route start to the end of this leg.
    pub fn end_distance_m(&self) -> f64 {
        self.distance_since_start_m + self.distance_m
    }

    /// Consume the first pending threshold that is due.
    ///
    /// A threshold is due when the distance left is within it and the leg is
    /// longer than it. Legs shorter than a threshold never announce it.
    pub fn take_due_threshold(&mut self, distance_left_m: f64) -> Option<AnnouncementThreshold> {
        let leg_distance = self.distance_m;
        let pos = self.pending_thresholds.iter().position(|t| {
            distance_left_m <= t.distance_m && leg_distance > t.distance_m
        })?;
        Some(self.pending_thresholds.remove(pos))
    }
}

/// One planned trip.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub destination: Destination,
    pub path: Vec<GpsPoint>,
    pub total_distance_m: f64,
    pub total_time_ms: u64,
    pub instructions: Vec<Instruction>,
}

impl Route {
    /// Build a route from a routing service response.
    ///
    /// The raw trailing "arrive" instruction is dropped and every remaining
    /// instruction takes the sign/text of the one after it, so each leg
    /// describes the maneuver at its end.
    pub fn from_response(
        destination: Destination,
        response: RouteResponse,
        thresholds: &[AnnouncementThreshold],
    ) -> Result<Self> {
        if response.points.is_empty() {
            return Err(NavigationError::MalformedRoute {
                message: "response has no points".to_string(),
            });
        }
        if response.instructions.len() < 2 {
            return Err(NavigationError::MalformedRoute {
                message: format!(
                    "response has {} instructions, at least 2 required",
                    response.instructions.len()
                ),
            });
        }

        if !(response.distance_m.is_finite()
            && (0.0..=MAX_ROUTE_DISTANCE_M).contains(&response.distance_m))
        {
            return Err(NavigationError::MalformedRoute {
                message: format!("invalid route distance {}", response.distance_m),
            });
        }
        if response.time_ms > MAX_ROUTE_TIME_MS {
            return Err(NavigationError::MalformedRoute {
                message: format!("route time {} ms out of range", response.time_ms),
            });
        }

        let path: Vec<GpsPoint> = response
            .points
            .iter()
            .map(|[lon, lat]| GpsPoint::new(*lat, *lon))
            .collect();
        let last_index = path.len() - 1;

        let mut ordered = thresholds.to_vec();
        ordered.sort_by(|a, b| b.distance_m.total_cmp(&a.distance_m));

        let mut instructions = Vec::with_capacity(response.instructions.len() - 1);
        let mut distance_since_start_m = 0.0;
        let mut time_since_start_ms: u64 = 0;

        for pair in response.instructions.windows(2) {
            let (leg, next) = (&pair[0], &pair[1]);
            let [start, end] = leg.interval;
            if start > end || end > last_index {
                return Err(NavigationError::MalformedRoute {
                    message: format!(
                        "interval [{}, {}] out of range for {} points",
                        start,
                        end,
                        path.len()
                    ),
                });
            }
            if !(leg.distance_m.is_finite()
                && (0.0..=MAX_ROUTE_DISTANCE_M).contains(&leg.distance_m))
            {
                return Err(NavigationError::MalformedRoute {
                    message: format!("invalid leg distance {}", leg.distance_m),
                });
            }
            if time_since_start_ms.saturating_add(leg.time_ms) > MAX_ROUTE_TIME_MS {
                return Err(NavigationError::MalformedRoute {
                    message: format!("leg time {} ms out of range", leg.time_ms),
                });
            }

            instructions.push(Instruction {
                interval: leg.interval,
                distance_m: leg.distance_m,
                time_ms: leg.time_ms,
                distance_since_start_m,
                time_since_start_ms,
                sign: next.sign,
                text: next.text.clone(),
                pending_thresholds: ordered.clone(),
            });

            distance_since_start_m += leg.distance_m;
            time_since_start_ms += leg.time_ms;
        }

        let final_end = instructions
            .last()
            .map(|i| i.interval[1])
            .ok_or_malformed("no instructions")?;
        if final_end != last_index {
            return Err(NavigationError::MalformedRoute {
                message: format!(
                    "last leg ends at point {}, path ends at {}",
                    final_end, last_index
                ),
            });
        }

        Ok(Self {
            destination,
            path,
            total_distance_m: response.distance_m,
            total_time_ms: response.time_ms,
            instructions,
        })
    }

    /// Path points belonging to one instruction (inclusive interval).
    pub fn leg_points(&self, instruction_index: usize) -> &[GpsPoint] {
        match self.instructions.get(instruction_index) {
            Some(instruction) => {
                let [start, end] = instruction.interval;
                &self.path[start..=end]
            }
            None => &[],
        }
    }

    /// Miles from the current position to the end of every instruction.
    /// Negative values mean the instruction has already been passed.
    pub fn miles_remaining_per_instruction(&self, distance_traveled_m: f64) -> Vec<f64> {
        self.instructions
            .iter()
            .map(|i| (i.end_distance_m() - distance_traveled_m) / METERS_PER_MILE)
            .collect()
    }

    /// Bounding box of the path, for fitting the map view.
    pub fn bounds(&self) -> Option<Bounds> {
        Bounds::from_points(&self.path)
    }
}

// ============================================================================
// Tests
// ============================================================================
