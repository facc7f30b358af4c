//! # SQLite Destination Store
//!
//! Persists saved destinations and the in-progress route so an interrupted
//! navigation can resume after restart.
//!
//! ## Tables
//! - `saved`: one row per named destination
//! - `current`: at most one row, the destination being navigated to

use log::{debug, info};
use rusqlite::{params, Connection, OptionalExtension, Result as SqlResult};

use crate::error::Result;
use crate::store::DestinationStore;
use crate::{Destination, GpsPoint};

/// SQLite-backed [`DestinationStore`].
pub struct SqliteStore {
    db: Connection,
}

impl SqliteStore {
    /// Open (or create) a store at the given database path.
    pub fn new(db_path: &str) -> Result<Self> {
        info!("[SqliteStore] Opening {}", db_path);
        let db = Connection::open(db_path)?;
        Self::init_schema(&db)?;
        Ok(Self { db })
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        Self::new(":memory:")
    }

    fn init_schema(conn: &Connection) -> SqlResult<()> {
        conn.execute_batch(
            r#"
            -- Named destinations
            CREATE TABLE IF NOT EXISTS saved (
                name TEXT PRIMARY KEY,
                lat REAL NOT NULL,
                lon REAL NOT NULL
            );

            -- Route in progress (single row)
            CREATE TABLE IF NOT EXISTS current (
                id INTEGER PRIMARY KEY CHECK (id = 0),
                name TEXT NOT NULL,
                lat REAL NOT NULL,
                lon REAL NOT NULL
            );
            "#,
        )
    }
}

impl DestinationStore for SqliteStore {
    fn saved(&self) -> Result<Vec<Destination>> {
        let mut stmt = self
            .db
            .prepare("SELECT name, lat, lon FROM saved ORDER BY name")?;
        let rows = stmt.query_map([], |row| {
            Ok(Destination {
                name: row.get(0)?,
                point: GpsPoint::new(row.get(1)?, row.get(2)?),
            })
        })?;
        let saved = rows.collect::<SqlResult<Vec<_>>>()?;
        Ok(saved)
    }

    fn insert_saved(&mut self, destination: &Destination) -> Result<()> {
        self.db.execute(
            "INSERT OR REPLACE INTO saved (name, lat, lon) VALUES (?, ?, ?)",
            params![
                destination.name,
                destination.point.latitude,
                destination.point.longitude
            ],
        )?;
        debug!("[SqliteStore] Saved '{}'", destination.name);
        Ok(())
    }

    fn remove_saved(&mut self, name: &str) -> Result<bool> {
        let removed = self
            .db
            .execute("DELETE FROM saved WHERE name = ?", params![name])?;
        Ok(removed > 0)
    }

    fn current(&self) -> Result<Option<Destination>> {
        let current = self
            .db
            .query_row("SELECT name, lat, lon FROM current WHERE id = 0", [], |row| {
                Ok(Destination {
                    name: row.get(0)?,
                    point: GpsPoint::new(row.get(1)?, row.get(2)?),
                })
            })
            .optional()?;
        Ok(current)
    }

    fn set_current(&mut self, destination: Option<&Destination>) -> Result<()> {
        match destination {
            Some(d) => {
                self.db.execute(
                    "INSERT OR REPLACE INTO current (id, name, lat, lon) VALUES (0, ?, ?, ?)",
                    params![d.name, d.point.latitude, d.point.longitude],
                )?;
            }
            None => {
                self.db.execute("DELETE FROM current", [])?;
            }
        }
        Ok(())
    }
}
