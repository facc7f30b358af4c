//! # Progress Tracker
//!
//! Consumes position fixes one at a time and turns them into progress along
//! the active route.
//!
//! ## Per-fix pipeline
//! 1. Snap the fix to the nearest instruction geometry
//! 2. Off-route check: offset above threshold requests a reroute, nothing else
//! 3. Noise rejection: snaps behind the confirmed instruction are dropped
//! 4. Advance: a snap ahead of the confirmed instruction is a leg entry
//! 5. Derived metrics: distance/time travelled, ETA, remaining totals
//! 6. At most one announcement (leg entry beats distance thresholds)

use std::fmt::Write;

use chrono::{DateTime, Duration, Local};
use log::{debug, warn};

use crate::config::{is_valid_eta_format, NavigatorConfig, DEFAULT_ETA_FORMAT, METERS_PER_MILE};
use crate::geometry::{GeometryIndex, Snap};
use crate::route::Route;
use crate::GpsPoint;

/// Everything the UI needs after an accepted fix.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    /// Instruction the fix snapped to
    pub instruction_index: usize,
    /// Whether this fix confirmed a new instruction
    pub leg_entry: bool,
    /// Fraction of the current instruction already travelled
    pub fraction: f64,
    pub distance_traveled_m: f64,
    pub time_elapsed_ms: f64,
    /// Arrival clock time, `None` if it falls outside the representable range
    pub eta_time: Option<DateTime<Local>>,
    /// Arrival clock time, formatted with the configured ETA format.
    /// Empty when `eta_time` is `None`.
    pub eta: String,
    pub time_remaining_ms: f64,
    /// Remaining time as `H:MM`
    pub time_remaining: String,
    pub miles_remaining: f64,
    /// Miles to the end of each instruction; negative once passed
    pub instruction_miles: Vec<f64>,
    /// Text to speak for this fix, if any
    pub announcement: Option<String>,
}

/// What the tracker decided about one fix.
#[derive(Debug, Clone, PartialEq)]
pub enum FixOutcome {
    /// Fix accepted; progress advanced or refreshed.
    Progress(ProgressUpdate),
    /// Fix is too far from the route; reroute from this point.
    Reroute(GpsPoint),
    /// Fix snapped behind confirmed progress (GPS noise) or could not be snapped.
    Discarded,
}

/// Monotonic progress state for one route revision.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    last_confirmed: Option<usize>,
    off_route_threshold: f64,
    eta_format: String,
}

impl ProgressTracker {
    pub fn new(config: &NavigatorConfig) -> Self {
        let eta_format = if is_valid_eta_format(&config.eta_format) {
            config.eta_format.clone()
        } else {
            warn!(
                "[ProgressTracker] Invalid eta_format '{}', using '{}'",
                config.eta_format, DEFAULT_ETA_FORMAT
            );
            DEFAULT_ETA_FORMAT.to_string()
        };
        Self {
            last_confirmed: None,
            off_route_threshold: config.off_route_threshold,
            eta_format,
        }
    }

    /// Highest instruction confirmed so far, `None` before the first fix.
    pub fn last_confirmed_index(&self) -> Option<usize> {
        self.last_confirmed
    }

    /// Forget all progress. Called whenever the route is (re)built.
    pub fn reset(&mut self) {
        self.last_confirmed = None;
    }

    /// Process one position fix against `route`.
    ///
    /// `index` must have been built from the same route revision.
    pub fn on_position(
        &mut self,
        route: &mut Route,
        index: &GeometryIndex,
        point: GpsPoint,
        now: DateTime<Local>,
    ) -> FixOutcome {
        let Some(snap) = index.nearest(point) else {
            return FixOutcome::Discarded;
        };

        if snap.offset > self.off_route_threshold {
            debug!(
                "[ProgressTracker] Off route: offset {:.6} > {:.6} at instruction {}",
                snap.offset, self.off_route_threshold, snap.instruction_index
            );
            return FixOutcome::Reroute(point);
        }

        let leg_entry = match self.last_confirmed {
            Some(confirmed) if snap.instruction_index < confirmed => {
                debug!(
                    "[ProgressTracker] Discarding fix on instruction {} behind confirmed {}",
                    snap.instruction_index, confirmed
                );
                return FixOutcome::Discarded;
            }
            Some(confirmed) => snap.instruction_index > confirmed,
            None => true,
        };
        if leg_entry {
            debug!(
                "[ProgressTracker] Entered instruction {}",
                snap.instruction_index
            );
            self.last_confirmed = Some(snap.instruction_index);
        }

        match self.build_update(route, &snap, leg_entry, now) {
            Some(update) => FixOutcome::Progress(update),
            None => FixOutcome::Discarded,
        }
    }

    fn build_update(
        &self,
        route: &mut Route,
        snap: &Snap,
        leg_entry: bool,
        now: DateTime<Local>,
    ) -> Option<ProgressUpdate> {
        let t = snap.fraction;
        let instruction = route.instructions.get(snap.instruction_index)?;

        let distance_traveled_m = instruction.distance_since_start_m + instruction.distance_m * t;
        let time_elapsed_ms = instruction.time_since_start_ms as f64 + instruction.time_ms as f64 * t;
        let time_remaining_ms = (route.total_time_ms as f64 - time_elapsed_ms).max(0.0);
        let miles_remaining = (route.total_distance_m - distance_traveled_m) / METERS_PER_MILE;
        let instruction_miles = route.miles_remaining_per_instruction(distance_traveled_m);

        let eta_time = Duration::try_milliseconds(time_remaining_ms.round() as i64)
            .and_then(|remaining| now.checked_add_signed(remaining));
        let eta = eta_time.map(|at| self.format_eta(at)).unwrap_or_default();

        let announcement = if leg_entry {
            Some(format!(
                "In {:.1} miles, {}",
                instruction_miles[snap.instruction_index], instruction.text
            ))
        } else {
            let instruction = route.instructions.get_mut(snap.instruction_index)?;
            let distance_left_m = instruction.distance_m * (1.0 - t);
            instruction
                .take_due_threshold(distance_left_m)
                .map(|threshold| format!("{}, {}", threshold.label, instruction.text))
        };

        Some(ProgressUpdate {
            instruction_index: snap.instruction_index,
            leg_entry,
            fraction: t,
            distance_traveled_m,
            time_elapsed_ms,
            eta_time,
            eta,
            time_remaining_ms,
            time_remaining: format_hours_minutes(time_remaining_ms),
            miles_remaining,
            instruction_miles,
            announcement,
        })
    }

    fn format_eta(&self, eta: DateTime<Local>) -> String {
        let mut text = String::new();
        if write!(text, "{}", eta.format(&self.eta_format)).is_err() {
            text.clear();
            let _ = write!(text, "{}", eta.format(DEFAULT_ETA_FORMAT));
        }
        text
    }
}

/// Format a duration in milliseconds as `H:MM`.
pub fn format_hours_minutes(ms: f64) -> String {
    let total_minutes = (ms.max(0.0) / 60_000.0).floor() as u64;
    format!("{}:{:02}", total_minutes / 60, total_minutes % 60)
}

// ============================================================================
// Tests
// ============================================================================
