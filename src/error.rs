//! Unified error handling for the route-progress library.
//!
//! Nothing here is fatal to the process: collaborator failures surface as
//! "no route" / "no results", and the tracker degrades to "no update this fix".

use thiserror::Error;

/// Unified error type for route-progress operations.
#[derive(Debug, Error)]
pub enum NavigationError {
    /// Routing service response could not be turned into a route
    #[error("Malformed route: {message}")]
    MalformedRoute { message: String },

    /// Routing service was unreachable or returned an error
    #[error("Routing failed: {message}")]
    RoutingFailed { message: String },

    /// Geocoding service was unreachable or returned an error
    #[error("{message}")]
    GeocodingFailed { message: String },

    /// Operation requires a selected route
    #[error("No route selected")]
    NoActiveRoute,

    /// `start` called on a route that is already tracking
    #[error("Route already started")]
    AlreadyStarted,

    /// No position fix is known yet
    #[error("No position fix available")]
    NoPosition,

    /// Destination store error
    #[error("Persistence error: {message}")]
    Persistence { message: String },

    /// SQLite error from the destination store
    #[cfg(feature = "persistence")]
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Generic internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Message shown to the user when a search cannot be completed.
pub const SEARCH_ERROR_MESSAGE: &str = "Error Processing Request, Try Again...";

impl NavigationError {
    /// Build a geocoding failure carrying the user-facing search error text.
    pub fn search_failed() -> Self {
        NavigationError::GeocodingFailed {
            message: SEARCH_ERROR_MESSAGE.to_string(),
        }
    }
}

/// Result type alias for route-progress operations.
pub type Result<T> = std::result::Result<T, NavigationError>;

/// Extension trait for converting Option to NavigationError.
pub trait OptionExt<T> {
    /// Convert Option to Result with a malformed route error.
    fn ok_or_malformed(self, message: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_malformed(self, message: &str) -> Result<T> {
        self.ok_or_else(|| NavigationError::MalformedRoute {
            message: message.to_string(),
        })
    }
}
