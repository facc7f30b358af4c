//! Saved and in-progress destinations.
//!
//! Two logical records: "saved" (name -> coordinates) and "current" (the
//! destination of an in-progress route, read at startup to resume).

use std::collections::BTreeMap;

use crate::error::Result;
use crate::{Destination, GpsPoint};

/// Storage for saved and in-progress destinations.
pub trait DestinationStore: Send {
    /// All saved destinations, ordered by name.
    fn saved(&self) -> Result<Vec<Destination>>;

    /// Insert or overwrite a saved destination keyed by its name.
    fn insert_saved(&mut self, destination: &Destination) -> Result<()>;

    /// Remove a saved destination. Returns whether it existed.
    fn remove_saved(&mut self, name: &str) -> Result<bool>;

    /// Destination of the route in progress, if any.
    fn current(&self) -> Result<Option<Destination>>;

    /// Record (or clear with `None`) the route in progress.
    fn set_current(&mut self, destination: Option<&Destination>) -> Result<()>;
}

/// Pick a name that does not collide with `taken`, appending " (n)".
///
/// "Home" stays "Home" if free, otherwise becomes "Home (1)", "Home (2)", ...
pub fn unique_name<F>(name: &str, taken: F) -> String
where
    F: Fn(&str) -> bool,
{
    if !taken(name) {
        return name.to_string();
    }
    (1..)
        .map(|n| format!("{} ({})", name, n))
        .find(|candidate| !taken(candidate))
        .unwrap_or_else(|| name.to_string())
}

/// In-memory destination store.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    saved: BTreeMap<String, GpsPoint>,
    current: Option<Destination>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DestinationStore for MemoryStore {
    fn saved(&self) -> Result<Vec<Destination>> {
        Ok(self
            .saved
            .iter()
            .map(|(name, point)| Destination::new(name, *point))
            .collect())
    }

    fn insert_saved(&mut self, destination: &Destination) -> Result<()> {
        self.saved
            .insert(destination.name.clone(), destination.point);
        Ok(())
    }

    fn remove_saved(&mut self, name: &str) -> Result<bool> {
        Ok(self.saved.remove(name).is_some())
    }

    fn current(&self) -> Result<Option<Destination>> {
        Ok(self.current.clone())
    }

    fn set_current(&mut self, destination: Option<&Destination>) -> Result<()> {
        self.current = destination.cloned();
        Ok(())
    }
}
