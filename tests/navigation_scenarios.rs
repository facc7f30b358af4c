//! End-to-end navigation scenarios.
//!
//! Drives a [`Navigator`] through a [`SharedPositionFeed`] exactly as a GPS
//! reader would, with a scripted routing service and a recording listener.
//!
//! Run with: `cargo test --test navigation_scenarios`
//! SQLite resume scenario: `cargo test --test navigation_scenarios --features persistence`

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use route_progress::{
    Destination, GeocodingService, GpsPoint, MemoryStore, NavigationError, NavigationPhase,
    Navigator, ProgressListener, ProgressUpdate, RawInstruction, Result, Route, RouteResponse,
    RoutingService, SharedPositionFeed,
};

const METERS_PER_DEGREE: f64 = 111_319.49;
const LEG0_M: f64 = 2000.0;
const LEG1_M: f64 = 500.0;
const LEG0_DEG: f64 = LEG0_M / METERS_PER_DEGREE;
const LEG1_DEG: f64 = LEG1_M / METERS_PER_DEGREE;

// ============================================================================
// Collaborators
// ============================================================================

/// Hands out queued responses, then falls back to a straight line.
struct ScriptedRouting {
    responses: Mutex<VecDeque<RouteResponse>>,
    calls: Mutex<Vec<(GpsPoint, GpsPoint)>>,
}

impl ScriptedRouting {
    fn new(responses: Vec<RouteResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<(GpsPoint, GpsPoint)> {
        self.calls.lock().unwrap().clone()
    }
}

impl RoutingService for ScriptedRouting {
    fn navigate(&self, from: GpsPoint, to: GpsPoint) -> Result<RouteResponse> {
        self.calls.lock().unwrap().push((from, to));
        if let Some(response) = self.responses.lock().unwrap().pop_front() {
            return Ok(response);
        }
        Ok(straight_response(from, to))
    }
}

struct NoGeocoder;

impl GeocodingService for NoGeocoder {
    fn search(&self, _query: &str) -> Result<Vec<Destination>> {
        Err(NavigationError::GeocodingFailed {
            message: "offline".to_string(),
        })
    }
}

#[derive(Default)]
struct Recorder {
    updates: Mutex<Vec<ProgressUpdate>>,
    announcements: Mutex<Vec<String>>,
    reroutes: Mutex<Vec<Route>>,
}

impl Recorder {
    fn updates(&self) -> Vec<ProgressUpdate> {
        self.updates.lock().unwrap().clone()
    }

    fn announcements(&self) -> Vec<String> {
        self.announcements.lock().unwrap().clone()
    }

    fn last_announcement(&self) -> Option<String> {
        self.updates().last().and_then(|u| u.announcement.clone())
    }
}

impl ProgressListener for Recorder {
    fn on_progress(&self, update: &ProgressUpdate) {
        self.updates.lock().unwrap().push(update.clone());
    }

    fn on_reroute(&self, route: &Route) {
        self.reroutes.lock().unwrap().push(route.clone());
    }

    fn on_announcement(&self, text: &str) {
        self.announcements.lock().unwrap().push(text.to_string());
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn raw(sign: i32, text: &str, distance_m: f64, time_ms: u64, interval: [usize; 2]) -> RawInstruction {
    RawInstruction {
        sign,
        text: text.to_string(),
        distance_m,
        time_ms,
        interval,
    }
}

/// East 2000 m along the equator, then north 500 m.
fn l_shaped_response() -> RouteResponse {
    RouteResponse {
        points: vec![[0.0, 0.0], [LEG0_DEG, 0.0], [LEG0_DEG, LEG1_DEG]],
        distance_m: LEG0_M + LEG1_M,
        time_ms: 150_000,
        instructions: vec![
            raw(0, "Continue onto College Avenue", LEG0_M, 120_000, [0, 1]),
            raw(-2, "Turn left onto Main Street", LEG1_M, 30_000, [1, 2]),
            raw(4, "Arrive at destination", 0.0, 0, [2, 2]),
        ],
    }
}

fn straight_response(from: GpsPoint, to: GpsPoint) -> RouteResponse {
    let distance = (to.latitude - from.latitude).hypot(to.longitude - from.longitude)
        * METERS_PER_DEGREE;
    RouteResponse {
        points: vec![[from.longitude, from.latitude], [to.longitude, to.latitude]],
        distance_m: distance,
        time_ms: 60_000,
        instructions: vec![
            raw(0, "Head northeast", distance, 60_000, [0, 1]),
            raw(4, "Arrive at destination", 0.0, 0, [1, 1]),
        ],
    }
}

fn destination() -> Destination {
    Destination::new("Main Street Library", GpsPoint::new(LEG1_DEG, LEG0_DEG))
}

/// A point `meters` along the first (eastbound) leg.
fn on_first_leg(meters: f64) -> GpsPoint {
    GpsPoint::new(0.0, meters / METERS_PER_DEGREE)
}

struct Session {
    navigator: Navigator,
    feed: Arc<SharedPositionFeed>,
    routing: Arc<ScriptedRouting>,
    recorder: Arc<Recorder>,
}

/// Select the L-shaped route from the route start and start tracking.
fn started_session() -> Session {
    let _ = env_logger::builder().is_test(true).try_init();

    let feed = Arc::new(SharedPositionFeed::with_position(GpsPoint::new(0.0, 0.0)));
    let routing = Arc::new(ScriptedRouting::new(vec![l_shaped_response()]));
    let mut navigator = Navigator::new(
        routing.clone(),
        Arc::new(NoGeocoder),
        feed.clone(),
        Box::new(MemoryStore::new()),
    );
    navigator
        .select(destination())
        .expect("failed to select route");

    let recorder = Arc::new(Recorder::default());
    navigator
        .start(recorder.clone())
        .expect("failed to start route");

    Session {
        navigator,
        feed,
        routing,
        recorder,
    }
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn test_three_raw_instructions_make_two_legs() {
    let s = started_session();
    let route = s.navigator.active_route().unwrap().route().unwrap();

    assert_eq!(route.instructions.len(), 2);
    assert_eq!(route.instructions[0].text, "Turn left onto Main Street");
    assert_eq!(route.instructions[0].sign, -2);
    assert_eq!(route.instructions[1].text, "Arrive at destination");
    assert_eq!(route.instructions[1].distance_since_start_m, LEG0_M);
    assert_eq!(route.instructions[1].time_since_start_ms, 120_000);
}

#[test]
fn test_drive_announces_each_cue_once() {
    let s = started_session();

    // Immediate pass from the last known position enters leg 0.
    assert_eq!(
        s.recorder.announcements(),
        vec!["In 1.2 miles, Turn left onto Main Street".to_string()]
    );

    s.feed.publish(on_first_leg(500.0));
    assert_eq!(
        s.recorder.last_announcement().as_deref(),
        Some("In 1 mile, Turn left onto Main Street")
    );

    s.feed.publish(on_first_leg(1000.0));
    s.feed.publish(on_first_leg(1200.0));
    assert_eq!(s.recorder.last_announcement(), None);

    s.feed.publish(on_first_leg(1800.0));
    assert_eq!(
        s.recorder.last_announcement().as_deref(),
        Some("In 1000 feet, Turn left onto Main Street")
    );

    s.feed.publish(on_first_leg(1900.0));
    assert_eq!(s.recorder.last_announcement(), None);

    // Around the corner onto leg 1.
    s.feed.publish(GpsPoint::new(LEG1_DEG * 0.4, LEG0_DEG));
    let update = s.recorder.updates().last().cloned().unwrap();
    assert!(update.leg_entry);
    assert_eq!(update.instruction_index, 1);
    assert_eq!(
        update.announcement.as_deref(),
        Some("In 0.2 miles, Arrive at destination")
    );

    assert_eq!(s.recorder.announcements().len(), 4);
    assert_eq!(s.routing.calls().len(), 1);
}

#[test]
fn test_one_announcement_per_fix() {
    let _ = env_logger::builder().is_test(true).try_init();

    // First fix lands deep into leg 0: entry and both thresholds are due.
    let feed = Arc::new(SharedPositionFeed::with_position(on_first_leg(1800.0)));
    let routing = Arc::new(ScriptedRouting::new(vec![l_shaped_response()]));
    let mut navigator = Navigator::new(
        routing,
        Arc::new(NoGeocoder),
        feed.clone(),
        Box::new(MemoryStore::new()),
    );
    navigator.select(destination()).unwrap();
    let recorder = Arc::new(Recorder::default());
    navigator.start(recorder.clone()).unwrap();

    feed.publish(on_first_leg(1850.0));
    feed.publish(on_first_leg(1900.0));
    feed.publish(on_first_leg(1950.0));

    let spoken: Vec<Option<String>> = recorder
        .updates()
        .into_iter()
        .map(|u| u.announcement)
        .collect();
    assert_eq!(
        spoken,
        vec![
            Some("In 0.1 miles, Turn left onto Main Street".to_string()),
            Some("In 1 mile, Turn left onto Main Street".to_string()),
            Some("In 1000 feet, Turn left onto Main Street".to_string()),
            None,
        ]
    );
    assert_eq!(recorder.announcements().len(), 3);
}

#[test]
fn test_progress_never_moves_backward() {
    let s = started_session();
    let handle = s.navigator.active_route().unwrap().clone();

    s.feed.publish(on_first_leg(1500.0));
    s.feed.publish(GpsPoint::new(LEG1_DEG * 0.5, LEG0_DEG));
    assert_eq!(handle.last_confirmed_index(), Some(1));
    let accepted = s.recorder.updates().len();

    // Jitter back onto leg 0, near the corner but closer to leg 0.
    s.feed.publish(on_first_leg(LEG0_M * 0.95));

    assert_eq!(s.recorder.updates().len(), accepted);
    assert_eq!(handle.last_confirmed_index(), Some(1));

    // Travelled distance is non-decreasing across accepted fixes.
    let traveled: Vec<f64> = s
        .recorder
        .updates()
        .iter()
        .map(|u| u.distance_traveled_m)
        .collect();
    assert!(traveled.windows(2).all(|w| w[1] >= w[0]));
    let last = s.recorder.updates().last().cloned().unwrap();
    assert!((last.distance_traveled_m - 2250.0).abs() < 1e-6);
    assert!(last.miles_remaining > 0.0);
}

#[test]
fn test_off_route_fix_reroutes_to_same_destination() {
    let s = started_session();
    let handle = s.navigator.active_route().unwrap().clone();
    s.feed.publish(on_first_leg(600.0));

    let off_route = GpsPoint::new(0.003, LEG0_DEG * 0.5);
    s.feed.publish(off_route);

    let calls = s.routing.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1], (off_route, destination().point));

    let reroutes = s.recorder.reroutes.lock().unwrap().clone();
    assert_eq!(reroutes.len(), 1);
    assert_eq!(reroutes[0].path[0], off_route);
    assert_eq!(reroutes[0].destination, destination());

    assert_eq!(handle.revision(), 1);
    assert_eq!(handle.phase(), NavigationPhase::Tracking);
    assert_eq!(handle.last_confirmed_index(), None);
    assert!(s.navigator.active_route().unwrap().same_trip(&handle));

    // The old callback keeps driving the replacement route.
    let before = s.recorder.updates().len();
    let midpoint = GpsPoint::new(
        (off_route.latitude + destination().point.latitude) / 2.0,
        (off_route.longitude + destination().point.longitude) / 2.0,
    );
    s.feed.publish(midpoint);

    let updates = s.recorder.updates();
    assert_eq!(updates.len(), before + 1);
    let update = updates.last().unwrap();
    assert!(update.leg_entry);
    assert_eq!(update.instruction_index, 0);
    assert!(update
        .announcement
        .as_deref()
        .is_some_and(|a| a.ends_with("Arrive at destination")));
}

#[test]
fn test_reroute_restores_distance_cues() {
    let _ = env_logger::builder().is_test(true).try_init();

    let off_route = GpsPoint::new(0.003, LEG0_DEG * 0.5);
    let east_m = 3000.0;
    let replacement = RouteResponse {
        points: vec![
            [off_route.longitude, off_route.latitude],
            [off_route.longitude + east_m / METERS_PER_DEGREE, off_route.latitude],
        ],
        distance_m: east_m,
        time_ms: 180_000,
        instructions: vec![
            raw(0, "Head east", east_m, 180_000, [0, 1]),
            raw(4, "Arrive at destination", 0.0, 0, [1, 1]),
        ],
    };

    let feed = Arc::new(SharedPositionFeed::with_position(GpsPoint::new(0.0, 0.0)));
    let routing = Arc::new(ScriptedRouting::new(vec![l_shaped_response(), replacement]));
    let mut navigator = Navigator::new(
        routing,
        Arc::new(NoGeocoder),
        feed.clone(),
        Box::new(MemoryStore::new()),
    );
    navigator.select(destination()).unwrap();
    let recorder = Arc::new(Recorder::default());
    navigator.start(recorder.clone()).unwrap();

    // "In 1 mile" is spent on the original first leg.
    feed.publish(on_first_leg(500.0));
    assert_eq!(
        recorder.last_announcement().as_deref(),
        Some("In 1 mile, Turn left onto Main Street")
    );
    let updates_before = recorder.updates().len();
    let announcements_before = recorder.announcements().len();

    feed.publish(off_route);
    assert_eq!(recorder.reroutes.lock().unwrap().len(), 1);
    assert_eq!(recorder.updates().len(), updates_before);
    assert_eq!(recorder.announcements().len(), announcements_before);

    let along = |meters: f64| {
        GpsPoint::new(
            off_route.latitude,
            off_route.longitude + meters / METERS_PER_DEGREE,
        )
    };
    feed.publish(along(0.0));
    assert!(recorder.updates().last().unwrap().leg_entry);

    feed.publish(along(1500.0));
    assert_eq!(
        recorder.last_announcement().as_deref(),
        Some("In 1 mile, Arrive at destination")
    );
}

#[test]
fn test_end_stops_updates_but_keeps_route() {
    let mut s = started_session();
    s.feed.publish(on_first_leg(300.0));
    let accepted = s.recorder.updates().len();

    s.navigator.end();
    s.feed.publish(on_first_leg(900.0));

    assert_eq!(s.recorder.updates().len(), accepted);
    assert_eq!(s.feed.subscriber_count(), 0);
    assert_eq!(s.navigator.phase(), NavigationPhase::Idle);
    assert_eq!(
        s.navigator.save(None).unwrap(),
        "Main Street Library".to_string()
    );
}

#[cfg(feature = "persistence")]
#[test]
fn test_resume_after_restart() {
    use route_progress::SqliteStore;
    use tempfile::TempDir;

    let tmp_dir = TempDir::new().expect("failed to create temp dir");
    let db_path = tmp_dir.path().join("navigation.db");
    let path = db_path.to_str().unwrap();
    let feed = Arc::new(SharedPositionFeed::with_position(GpsPoint::new(0.0, 0.0)));

    {
        let mut navigator = Navigator::new(
            Arc::new(ScriptedRouting::new(vec![l_shaped_response()])),
            Arc::new(NoGeocoder),
            feed.clone(),
            Box::new(SqliteStore::new(path).unwrap()),
        );
        navigator.select(destination()).unwrap();
        navigator.start(Arc::new(Recorder::default())).unwrap();
        // Dropped mid-route without end()
    }
    assert_eq!(feed.subscriber_count(), 0);

    let mut navigator = Navigator::new(
        Arc::new(ScriptedRouting::new(vec![l_shaped_response()])),
        Arc::new(NoGeocoder),
        feed,
        Box::new(SqliteStore::new(path).unwrap()),
    );
    let handle = navigator.resume().unwrap().expect("route in progress");
    assert_eq!(handle.destination().unwrap(), destination());

    navigator.start(Arc::new(Recorder::default())).unwrap();
    navigator.end();
    assert!(navigator.resume().unwrap().is_none());
}
