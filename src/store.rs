//! Observation store — append-only SQLite log of audit observations.
//!
//! The log is the source of truth: verdicts are always recomputed from it
//! and nothing here is ever updated or deleted. Each append is one INSERT,
//! so records are atomic; the field map travels as a JSON column to keep
//! the schema stable while target field sets evolve.

use crate::collect::Observation;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Faults the orchestrator must distinguish so it can retry persistence
/// and fall back to an in-memory hold.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("encoding error: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Durable, append-only home for observations.
pub trait ObservationStore: Send {
    /// Append one record. Per-record atomic.
    fn append(&mut self, obs: &Observation) -> Result<(), StoreError>;
    /// Read back every record, oldest first.
    fn load_all(&self) -> Result<Vec<Observation>, StoreError>;
}

/// SQLite-backed observation store.
pub struct SqliteStore {
    db: Connection,
}

impl SqliteStore {
    /// Open or create a store at the given path.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Connection::open(path)?;
        Self::init(db)
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    /// Default store at ~/.pricelens/observations.db.
    pub fn default_store() -> Result<Self, StoreError> {
        let path = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(".pricelens")
            .join("observations.db");
        Self::open(&path)
    }

    fn init(db: Connection) -> Result<Self, StoreError> {
        db.execute_batch(
            "CREATE TABLE IF NOT EXISTS observations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                identity_id TEXT NOT NULL,
                target_name TEXT NOT NULL,
                query TEXT NOT NULL,
                status TEXT NOT NULL,
                error TEXT,
                fields TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_observations_target
                ON observations (target_name, query, timestamp);",
        )?;
        Ok(Self { db })
    }
}

impl ObservationStore for SqliteStore {
    fn append(&mut self, obs: &Observation) -> Result<(), StoreError> {
        let fields = serde_json::to_string(&obs.fields)?;
        let status = serde_json::to_string(&obs.status)?;
        self.db.execute(
            "INSERT INTO observations
                (timestamp, identity_id, target_name, query, status, error, fields)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                obs.timestamp.to_rfc3339(),
                obs.identity_id,
                obs.target_name,
                obs.query,
                status,
                obs.error,
                fields,
            ],
        )?;
        Ok(())
    }

    fn load_all(&self) -> Result<Vec<Observation>, StoreError> {
        let mut stmt = self.db.prepare(
            "SELECT timestamp, identity_id, target_name, query, status, error, fields
             FROM observations ORDER BY id ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?;

        let mut observations = Vec::new();
        for row in rows {
            let (timestamp, identity_id, target_name, query, status, error, fields) = row?;
            observations.push(Observation {
                timestamp: chrono::DateTime::parse_from_rfc3339(&timestamp)
                    .map_err(|e| {
                        serde_json::Error::io(std::io::Error::new(
                            std::io::ErrorKind::InvalidData,
                            e,
                        ))
                    })?
                    .with_timezone(&chrono::Utc),
                identity_id,
                target_name,
                query,
                status: serde_json::from_str(&status)?,
                error,
                fields: serde_json::from_str(&fields)?,
            });
        }
        Ok(observations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collect::ObservationStatus;
    use crate::normalize::PriceValue;
    use chrono::Utc;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn sample(identity: &str, price: PriceValue) -> Observation {
        let mut fields = BTreeMap::new();
        fields.insert("base_price".to_string(), price);
        fields.insert("fee_bag".to_string(), PriceValue::Missing);
        Observation {
            timestamp: Utc::now(),
            identity_id: identity.to_string(),
            target_name: "RYANAIR".to_string(),
            query: "MAD-BRU".to_string(),
            fields,
            status: ObservationStatus::Ok,
            error: None,
        }
    }

    #[test]
    fn test_round_trip_field_for_field() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let obs = sample("win-chrome", PriceValue::Amount(45.99));
        store.append(&obs).unwrap();

        let loaded = store.load_all().unwrap();
        assert_eq!(loaded.len(), 1);
        let back = &loaded[0];
        assert_eq!(back.identity_id, obs.identity_id);
        assert_eq!(back.target_name, obs.target_name);
        assert_eq!(back.query, obs.query);
        assert_eq!(back.status, obs.status);
        assert_eq!(back.error, obs.error);
        assert_eq!(back.fields, obs.fields);
        assert_eq!(back.timestamp.timestamp_millis(), obs.timestamp.timestamp_millis());
    }

    #[test]
    fn test_append_only_ordering_preserved() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        for (i, identity) in ["a", "b", "c"].iter().enumerate() {
            store
                .append(&sample(identity, PriceValue::Amount(40.0 + i as f64)))
                .unwrap();
        }
        let loaded = store.load_all().unwrap();
        let ids: Vec<&str> = loaded.iter().map(|o| o.identity_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_error_observation_round_trips() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let mut obs = sample("mac-safari", PriceValue::Missing);
        obs.status = ObservationStatus::Error;
        obs.error = Some("navigation failed: connection refused".to_string());
        store.append(&obs).unwrap();

        let back = &store.load_all().unwrap()[0];
        assert_eq!(back.status, ObservationStatus::Error);
        assert_eq!(back.error.as_deref(), Some("navigation failed: connection refused"));
    }

    #[test]
    fn test_reopen_from_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("observations.db");

        {
            let mut store = SqliteStore::open(&path).unwrap();
            store
                .append(&sample("win-chrome", PriceValue::Amount(38.50)))
                .unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        let loaded = store.load_all().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(
            loaded[0].fields["base_price"],
            PriceValue::Amount(38.50)
        );
    }
}
