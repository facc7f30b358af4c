//! Position feed contract.
//!
//! The GPS reader that parses NMEA lives outside this crate; it pushes
//! `(lat, lon)` fixes into a [`PositionFeed`]. [`SharedPositionFeed`] is an
//! in-process implementation the reader (or a test) can publish into.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};

use log::{debug, warn};

use crate::GpsPoint;

/// Callback invoked with every delivered fix.
pub type PositionCallback = Arc<dyn Fn(GpsPoint) + Send + Sync>;

/// Opaque registration handle returned by [`PositionFeed::add_callback`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FeedHandle(u64);

/// A source of position fixes.
///
/// Implementations deliver fixes in arrival order, one at a time, and
/// never call a callback after `remove_callback` for it has returned.
pub trait PositionFeed: Send + Sync {
    fn add_callback(&self, callback: PositionCallback) -> FeedHandle;

    /// Unregister a callback. Unknown handles are ignored.
    fn remove_callback(&self, handle: FeedHandle);

    /// Most recent fix, if any has been received.
    fn last_position(&self) -> Option<GpsPoint>;
}

/// One registered callback. `active` is cleared on removal so a delivery
/// already holding a snapshot skips it.
#[derive(Clone)]
struct Registration {
    callback: PositionCallback,
    active: Arc<AtomicBool>,
}

/// In-process position feed.
///
/// `publish` holds a delivery lock, so fixes are serialized even when
/// published from several threads. `remove_callback` called from another
/// thread waits for an in-flight delivery to finish; called from inside a
/// callback it returns immediately and the removed callback is skipped for
/// the rest of that delivery.
#[derive(Default)]
pub struct SharedPositionFeed {
    callbacks: Mutex<BTreeMap<FeedHandle, Registration>>,
    last: Mutex<Option<GpsPoint>>,
    delivery: Mutex<()>,
    delivering: Mutex<Option<ThreadId>>,
    next_id: AtomicU64,
}

impl SharedPositionFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a feed that already knows a position.
    pub fn with_position(point: GpsPoint) -> Self {
        let feed = Self::default();
        if let Ok(mut last) = feed.last.lock() {
            *last = Some(point);
        }
        feed
    }

    /// Deliver a fix to every registered callback.
    ///
    /// Invalid coordinates (NaN, out of range) are dropped here so the
    /// tracker never sees them. Returns whether the fix was delivered.
    pub fn publish(&self, point: GpsPoint) -> bool {
        if !point.is_valid() {
            warn!(
                "[PositionFeed] Dropping invalid fix ({}, {})",
                point.latitude, point.longitude
            );
            return false;
        }

        let Ok(_delivery) = self.delivery.lock() else {
            return false;
        };
        self.set_delivering(Some(thread::current().id()));
        if let Ok(mut last) = self.last.lock() {
            *last = Some(point);
        }

        // Snapshot so callbacks may add/remove registrations re-entrantly.
        let snapshot: Vec<Registration> = match self.callbacks.lock() {
            Ok(callbacks) => callbacks.values().cloned().collect(),
            Err(_) => {
                self.set_delivering(None);
                return false;
            }
        };
        for registration in snapshot {
            if registration.active.load(Ordering::SeqCst) {
                (registration.callback)(point);
            }
        }
        self.set_delivering(None);
        true
    }

    /// Number of registered callbacks.
    pub fn subscriber_count(&self) -> usize {
        self.callbacks.lock().map(|c| c.len()).unwrap_or(0)
    }

    fn set_delivering(&self, thread: Option<ThreadId>) {
        if let Ok(mut delivering) = self.delivering.lock() {
            *delivering = thread;
        }
    }

    fn is_delivering_thread(&self) -> bool {
        self.delivering
            .lock()
            .map(|d| *d == Some(thread::current().id()))
            .unwrap_or(false)
    }
}

impl PositionFeed for SharedPositionFeed {
    fn add_callback(&self, callback: PositionCallback) -> FeedHandle {
        let handle = FeedHandle(self.next_id.fetch_add(1, Ordering::Relaxed));
        if let Ok(mut callbacks) = self.callbacks.lock() {
            callbacks.insert(
                handle,
                Registration {
                    callback,
                    active: Arc::new(AtomicBool::new(true)),
                },
            );
        }
        debug!("[PositionFeed] Registered callback {:?}", handle);
        handle
    }

    fn remove_callback(&self, handle: FeedHandle) {
        let removed = self.callbacks.lock().ok().and_then(|mut callbacks| {
            let registration = callbacks.remove(&handle)?;
            registration.active.store(false, Ordering::SeqCst);
            Some(registration)
        });
        if removed.is_none() {
            return;
        }

        // Wait out a delivery running on another thread.
        if !self.is_delivering_thread() {
            drop(self.delivery.lock());
        }
        debug!("[PositionFeed] Removed callback {:?}", handle);
    }

    fn last_position(&self) -> Option<GpsPoint> {
        self.last.lock().ok().and_then(|last| *last)
    }
}
