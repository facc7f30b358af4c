//! # Route Lifecycle
//!
//! Owns the active route and wires it to the position feed.
//!
//! ## Architecture
//!
//! A [`RouteHandle`] is the stable identity of a trip. It holds the current
//! route revision, its geometry index and the progress tracker behind a single
//! mutex. Rerouting computes a new `Route` value outside the lock and swaps it
//! in atomically, so closures registered with the feed keep working and no fix
//! is ever snapped against a half-built index.
//!
//! The [`Navigator`] handles selection, start/end, persistence of saved and
//! in-progress destinations, and geocoding search.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Local;
use log::{debug, info, warn};

use crate::config::NavigatorConfig;
use crate::error::{NavigationError, Result};
use crate::feed::{FeedHandle, PositionFeed};
use crate::geometry::GeometryIndex;
use crate::progress::{FixOutcome, ProgressTracker};
use crate::route::Route;
use crate::services::{GeocodingService, ProgressListener, RoutingService};
use crate::store::{unique_name, DestinationStore};
use crate::{Destination, GpsPoint};

/// Where a route is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationPhase {
    /// Selected but not subscribed to the feed (or ended)
    Idle,
    /// Subscribed; fixes update progress
    Tracking,
    /// A replacement route is being fetched; fixes are ignored
    Rerouting,
}

/// Everything replaced together on reroute.
#[derive(Debug)]
struct Session {
    route: Route,
    index: GeometryIndex,
    tracker: ProgressTracker,
    phase: NavigationPhase,
    revision: u64,
}

// ============================================================================
// Route Handle
// ============================================================================

/// Stable, cloneable handle to one trip.
///
/// All clones observe the same route; a reroute is visible through every one.
#[derive(Debug, Clone)]
pub struct RouteHandle {
    session: Arc<Mutex<Session>>,
    config: Arc<NavigatorConfig>,
}

impl RouteHandle {
    /// Wrap a freshly built route. Progress starts from nothing.
    pub fn new(route: Route, config: Arc<NavigatorConfig>) -> Self {
        let index = GeometryIndex::build(&route);
        let tracker = ProgressTracker::new(&config);
        Self {
            session: Arc::new(Mutex::new(Session {
                route,
                index,
                tracker,
                phase: NavigationPhase::Idle,
                revision: 0,
            })),
            config,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Session>> {
        self.session.lock().map_err(|_| NavigationError::Internal {
            message: "route session lock poisoned".to_string(),
        })
    }

    /// Read the current route revision.
    pub fn with_route<F, R>(&self, f: F) -> Option<R>
    where
        F: FnOnce(&Route) -> R,
    {
        self.lock().ok().map(|session| f(&session.route))
    }

    /// Snapshot of the current route revision.
    pub fn route(&self) -> Option<Route> {
        self.with_route(Route::clone)
    }

    pub fn destination(&self) -> Option<Destination> {
        self.with_route(|r| r.destination.clone())
    }

    pub fn phase(&self) -> NavigationPhase {
        self.lock()
            .map(|s| s.phase)
            .unwrap_or(NavigationPhase::Idle)
    }

    /// Number of times the route has been replaced by a reroute.
    pub fn revision(&self) -> u64 {
        self.lock().map(|s| s.revision).unwrap_or(0)
    }

    pub fn last_confirmed_index(&self) -> Option<usize> {
        self.lock().ok().and_then(|s| s.tracker.last_confirmed_index())
    }

    /// Whether two handles refer to the same trip.
    pub fn same_trip(&self, other: &RouteHandle) -> bool {
        Arc::ptr_eq(&self.session, &other.session)
    }

    fn set_phase(&self, phase: NavigationPhase) {
        if let Ok(mut session) = self.lock() {
            session.phase = phase;
        }
    }

    fn rename(&self, name: &str) {
        if let Ok(mut session) = self.lock() {
            session.route.destination.name = name.to_string();
        }
    }

    /// Run one fix through the tracker and notify `listener`.
    ///
    /// Fixes are ignored unless the route is tracking. An off-route fix
    /// triggers a synchronous reroute from that fix.
    pub fn process_fix(
        &self,
        point: GpsPoint,
        routing: &dyn RoutingService,
        listener: &dyn ProgressListener,
    ) -> FixOutcome {
        let outcome = {
            let Ok(mut guard) = self.lock() else {
                return FixOutcome::Discarded;
            };
            if guard.phase != NavigationPhase::Tracking {
                return FixOutcome::Discarded;
            }
            let session = &mut *guard;
            let outcome =
                session
                    .tracker
                    .on_position(&mut session.route, &session.index, point, Local::now());
            if matches!(outcome, FixOutcome::Reroute(_)) {
                session.phase = NavigationPhase::Rerouting;
            }
            outcome
        };

        match &outcome {
            FixOutcome::Progress(update) => {
                listener.on_progress(update);
                if let Some(text) = &update.announcement {
                    listener.on_announcement(text);
                }
            }
            FixOutcome::Reroute(from) => {
                if let Err(e) = self.reroute(*from, routing, Some(listener)) {
                    warn!("[RouteHandle] Reroute failed, keeping current route: {}", e);
                }
            }
            FixOutcome::Discarded => {}
        }

        outcome
    }

    /// Replace the route with a fresh one from `from` to the same destination.
    ///
    /// The routing call happens without holding the session lock. If the
    /// route was ended or replaced meanwhile, the result is dropped. On
    /// failure the previous route stays in place.
    pub fn reroute(
        &self,
        from: GpsPoint,
        routing: &dyn RoutingService,
        listener: Option<&dyn ProgressListener>,
    ) -> Result<()> {
        let (destination, revision, phase_before) = {
            let session = self.lock()?;
            (
                session.route.destination.clone(),
                session.revision,
                session.phase,
            )
        };

        info!(
            "[RouteHandle] Rerouting to '{}' from ({:.5}, {:.5})",
            destination.name, from.latitude, from.longitude
        );

        let rebuilt = routing
            .navigate(from, destination.point)
            .and_then(|response| {
                Route::from_response(destination, response, &self.config.announcement_thresholds)
            });

        let new_route = {
            let mut session = self.lock()?;
            if session.revision != revision || session.phase != phase_before {
                debug!("[RouteHandle] Route changed during reroute, dropping result");
                return Ok(());
            }
            if phase_before == NavigationPhase::Rerouting {
                session.phase = NavigationPhase::Tracking;
            }

            let route = rebuilt?;
            session.index = GeometryIndex::build(&route);
            session.route = route;
            session.tracker.reset();
            session.revision += 1;
            session.route.clone()
        };

        info!(
            "[RouteHandle] Rerouted: {} instructions, {:.0} m",
            new_route.instructions.len(),
            new_route.total_distance_m
        );
        if let Some(listener) = listener {
            listener.on_reroute(&new_route);
        }
        Ok(())
    }
}

// ============================================================================
// Navigator
// ============================================================================

/// Route lifecycle manager.
pub struct Navigator {
    config: Arc<NavigatorConfig>,
    routing: Arc<dyn RoutingService>,
    geocoder: Arc<dyn GeocodingService>,
    feed: Arc<dyn PositionFeed>,
    store: Box<dyn DestinationStore>,
    active: Option<RouteHandle>,
    listener: Option<Arc<dyn ProgressListener>>,
    subscription: Option<FeedHandle>,
}

impl Navigator {
    /// Create a navigator with default configuration.
    pub fn new(
        routing: Arc<dyn RoutingService>,
        geocoder: Arc<dyn GeocodingService>,
        feed: Arc<dyn PositionFeed>,
        store: Box<dyn DestinationStore>,
    ) -> Self {
        Self {
            config: Arc::new(NavigatorConfig::default()),
            routing,
            geocoder,
            feed,
            store,
            active: None,
            listener: None,
            subscription: None,
        }
    }

    /// Replace the configuration. Applies to routes selected afterwards.
    ///
    /// Fails with [`NavigationError::Config`] if the configuration is invalid.
    pub fn with_config(mut self, config: NavigatorConfig) -> Result<Self> {
        config.validate()?;
        self.config = Arc::new(config);
        Ok(self)
    }

    pub fn config(&self) -> &NavigatorConfig {
        &self.config
    }

    /// The selected route, if any.
    pub fn active_route(&self) -> Option<&RouteHandle> {
        self.active.as_ref()
    }

    pub fn phase(&self) -> NavigationPhase {
        self.active
            .as_ref()
            .map(RouteHandle::phase)
            .unwrap_or(NavigationPhase::Idle)
    }

    pub fn is_started(&self) -> bool {
        self.subscription.is_some()
    }

    // ========================================================================
    // Selection
    // ========================================================================

    /// Plan a route from the last known position to `destination`.
    ///
    /// On failure nothing changes: the previously selected route (if any)
    /// stays selected and keeps tracking.
    pub fn select(&mut self, destination: Destination) -> Result<RouteHandle> {
        let from = self.feed.last_position().ok_or(NavigationError::NoPosition)?;

        let route = self
            .routing
            .navigate(from, destination.point)
            .and_then(|response| {
                Route::from_response(
                    destination.clone(),
                    response,
                    &self.config.announcement_thresholds,
                )
            })
            .map_err(|e| {
                warn!("[Navigator] No route to '{}': {}", destination.name, e);
                e
            })?;

        info!(
            "[Navigator] Selected '{}': {} instructions, {:.0} m, {} ms",
            destination.name,
            route.instructions.len(),
            route.total_distance_m,
            route.total_time_ms
        );

        self.end();
        let handle = RouteHandle::new(route, Arc::clone(&self.config));
        self.active = Some(handle.clone());
        Ok(handle)
    }

    /// Select a saved destination by name.
    pub fn select_saved(&mut self, name: &str) -> Result<RouteHandle> {
        let destination = self
            .store
            .saved()?
            .into_iter()
            .find(|d| d.name == name)
            .ok_or_else(|| NavigationError::Persistence {
                message: format!("no saved destination named '{}'", name),
            })?;
        self.select(destination)
    }

    /// Re-select the destination that was in progress when the process last
    /// exited without ending navigation.
    pub fn resume(&mut self) -> Result<Option<RouteHandle>> {
        match self.store.current()? {
            Some(destination) => {
                info!("[Navigator] Resuming route to '{}'", destination.name);
                self.select(destination).map(Some)
            }
            None => Ok(None),
        }
    }

    // ========================================================================
    // Start / End
    // ========================================================================

    /// Subscribe the selected route to the position feed.
    ///
    /// One fix is processed immediately from the last known position so the
    /// listener is populated before the next fix arrives.
    pub fn start(&mut self, listener: Arc<dyn ProgressListener>) -> Result<()> {
        let handle = self.active.clone().ok_or(NavigationError::NoActiveRoute)?;
        if self.subscription.is_some() {
            return Err(NavigationError::AlreadyStarted);
        }

        handle.set_phase(NavigationPhase::Tracking);

        let callback_handle = handle.clone();
        let routing = Arc::clone(&self.routing);
        let callback_listener = Arc::clone(&listener);
        self.subscription = Some(self.feed.add_callback(Arc::new(move |point: GpsPoint| {
            callback_handle.process_fix(point, routing.as_ref(), callback_listener.as_ref());
        })));
        self.listener = Some(Arc::clone(&listener));

        if let Some(destination) = handle.destination() {
            if let Err(e) = self.store.set_current(Some(&destination)) {
                warn!("[Navigator] Failed to record route in progress: {}", e);
            }
            info!("[Navigator] Started route to '{}'", destination.name);
        }

        if let Some(point) = self.feed.last_position() {
            handle.process_fix(point, self.routing.as_ref(), listener.as_ref());
        }
        Ok(())
    }

    /// Stop tracking. Safe to call at any time, including when not started.
    ///
    /// The route stays selected so it can still be saved.
    pub fn end(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            self.feed.remove_callback(subscription);
            if let Some(handle) = &self.active {
                handle.set_phase(NavigationPhase::Idle);
            }
            if let Err(e) = self.store.set_current(None) {
                warn!("[Navigator] Failed to clear route in progress: {}", e);
            }
            info!("[Navigator] Ended route");
        }
        self.listener = None;
    }

    /// Reroute the active route from `from` immediately.
    pub fn reroute(&self, from: GpsPoint) -> Result<()> {
        let handle = self.active.as_ref().ok_or(NavigationError::NoActiveRoute)?;
        handle.reroute(from, self.routing.as_ref(), self.listener.as_deref())
    }

    // ========================================================================
    // Saved Destinations
    // ========================================================================

    /// Save the active destination, under `name` or its display name.
    ///
    /// Name collisions get a " (n)" suffix. Returns the name used.
    pub fn save(&mut self, name: Option<&str>) -> Result<String> {
        let handle = self.active.as_ref().ok_or(NavigationError::NoActiveRoute)?;
        let destination = handle.destination().ok_or(NavigationError::NoActiveRoute)?;

        let existing: Vec<String> = self.store.saved()?.into_iter().map(|d| d.name).collect();
        let base = name.unwrap_or(&destination.name);
        let final_name = unique_name(base, |n| existing.iter().any(|e| e == n));

        self.store
            .insert_saved(&Destination::new(&final_name, destination.point))?;
        handle.rename(&final_name);
        info!("[Navigator] Saved destination '{}'", final_name);
        Ok(final_name)
    }

    /// Remove the active destination from the saved list.
    pub fn delete(&mut self) -> Result<bool> {
        let destination = self
            .active
            .as_ref()
            .and_then(RouteHandle::destination)
            .ok_or(NavigationError::NoActiveRoute)?;
        let removed = self.store.remove_saved(&destination.name)?;
        if removed {
            info!("[Navigator] Deleted saved destination '{}'", destination.name);
        }
        Ok(removed)
    }

    pub fn saved_destinations(&self) -> Result<Vec<Destination>> {
        self.store.saved()
    }

    // ========================================================================
    // Search
    // ========================================================================

    /// Geocode a free-text query.
    ///
    /// Any service failure becomes the generic search error message.
    pub fn search(&self, query: &str) -> Result<Vec<Destination>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        self.geocoder.search(query).map_err(|e| {
            warn!("[Navigator] Search for '{}' failed: {}", query, e);
            NavigationError::search_failed()
        })
    }
}

impl Drop for Navigator {
    /// Unsubscribe without clearing the in-progress record, so an exit
    /// mid-route can be resumed.
    fn drop(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            self.feed.remove_callback(subscription);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
