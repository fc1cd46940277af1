//! # Trajectory Store
//!
//! SQLite sink for simulated trajectories.
//!
//! - `trajectories`: one row per train, full trajectory as a MessagePack blob
//! - `samples`: one row per sample, for ad-hoc SQL over positions and times
//!
//! Inserting a train that already exists replaces its rows.

use log::{debug, info};
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{Result, TrackError};
use crate::{FleetResult, Trajectory};

fn db_error(e: rusqlite::Error) -> TrackError {
    TrackError::PersistenceError {
        message: e.to_string(),
    }
}

/// SQLite-backed trajectory storage.
pub struct TrajectoryStore {
    db: Connection,
}

impl TrajectoryStore {
    /// Open (or create) a store at the given path.
    pub fn open(db_path: &str) -> Result<Self> {
        let db = Connection::open(db_path).map_err(db_error)?;
        Self::init_schema(&db)?;
        info!("[TrajectoryStore] Opened {}", db_path);
        Ok(Self { db })
    }

    /// In-memory store (for testing).
    pub fn open_in_memory() -> Result<Self> {
        Self::open(":memory:")
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS trajectories (
                train_id TEXT PRIMARY KEY,
                start_time_ms INTEGER NOT NULL,   -- Unix timestamp (milliseconds)
                sample_count INTEGER NOT NULL,
                data BLOB NOT NULL
            );

            CREATE TABLE IF NOT EXISTS samples (
                train_id TEXT NOT NULL REFERENCES trajectories(train_id) ON DELETE CASCADE,
                seq INTEGER NOT NULL,
                latitude REAL NOT NULL,
                longitude REAL NOT NULL,
                timestamp_ms INTEGER NOT NULL,   -- Unix timestamp (milliseconds)
                PRIMARY KEY (train_id, seq)
            );

            CREATE INDEX IF NOT EXISTS idx_samples_timestamp ON samples(timestamp_ms);
            "#,
        )
        .map_err(db_error)
    }

    /// Store one trajectory, replacing any previous run of the same train.
    pub fn insert_trajectory(&mut self, trajectory: &Trajectory) -> Result<()> {
        let blob = rmp_serde::to_vec(trajectory).map_err(|e| TrackError::PersistenceError {
            message: format!("Failed to encode {}: {}", trajectory.train_id, e),
        })?;

        let tx = self.db.transaction().map_err(db_error)?;
        tx.execute(
            "DELETE FROM trajectories WHERE train_id = ?",
            params![trajectory.train_id],
        )
        .map_err(db_error)?;
        tx.execute(
            "INSERT INTO trajectories (train_id, start_time_ms, sample_count, data) VALUES (?, ?, ?, ?)",
            params![
                trajectory.train_id,
                trajectory.start_time.timestamp_millis(),
                trajectory.samples.len() as i64,
                blob
            ],
        )
        .map_err(db_error)?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO samples (train_id, seq, latitude, longitude, timestamp_ms) VALUES (?, ?, ?, ?, ?)",
                )
                .map_err(db_error)?;
            for (seq, sample) in trajectory.samples.iter().enumerate() {
                stmt.execute(params![
                    trajectory.train_id,
                    seq as i64,
                    sample.position.latitude,
                    sample.position.longitude,
                    sample.timestamp.timestamp_millis()
                ])
                .map_err(db_error)?;
            }
        }
        tx.commit().map_err(db_error)?;

        debug!(
            "[TrajectoryStore] Stored {} ({} samples)",
            trajectory.train_id,
            trajectory.samples.len()
        );
        Ok(())
    }

    /// Store every trajectory of a fleet run. Returns how many were written.
    pub fn insert_result(&mut self, result: &FleetResult) -> Result<usize> {
        for trajectory in &result.trajectories {
            self.insert_trajectory(trajectory)?;
        }
        info!(
            "[TrajectoryStore] Stored {} trajectories, {} samples",
            result.len(),
            result.sample_count()
        );
        Ok(result.len())
    }

    pub fn load_trajectory(&self, train_id: &str) -> Result<Option<Trajectory>> {
        let blob: Option<Vec<u8>> = self
            .db
            .query_row(
                "SELECT data FROM trajectories WHERE train_id = ?",
                params![train_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_error)?;

        blob.map(|bytes| {
            rmp_serde::from_slice(&bytes).map_err(|e| TrackError::PersistenceError {
                message: format!("Failed to decode {}: {}", train_id, e),
            })
        })
        .transpose()
    }

    /// Total rows in the samples table.
    pub fn sample_count(&self) -> Result<usize> {
        let count: i64 = self
            .db
            .query_row("SELECT COUNT(*) FROM samples", [], |row| row.get(0))
            .map_err(db_error)?;
        Ok(count as usize)
    }

    /// Stored train ids, sorted.
    pub fn train_ids(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .db
            .prepare("SELECT train_id FROM trajectories ORDER BY train_id")
            .map_err(db_error)?;
        let ids = stmt
            .query_map([], |row| row.get(0))
            .map_err(db_error)?
            .collect::<std::result::Result<Vec<String>, _>>()
            .map_err(db_error)?;
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{GeoPoint, TrajectorySample};
    use chrono::{Duration, TimeZone, Utc};

    fn trajectory(id: &str, n: usize) -> Trajectory {
        let start = Utc.with_ymd_and_hms(2024, 8, 1, 6, 0, 0).unwrap();
        Trajectory {
            train_id: id.to_string(),
            start_time: start,
            samples: (0..n)
                .map(|i| TrajectorySample {
                    position: GeoPoint::new(6.9 + i as f64 * 0.01, 79.8),
                    timestamp: start + Duration::seconds(60 * i as i64),
                })
                .collect(),
            name: Some("Udarata Menike".to_string()),
            origin: Some(GeoPoint::new(6.9, 79.8)),
            destination: None,
        }
    }

    #[test]
    fn test_insert_and_load() {
        let mut store = TrajectoryStore::open_in_memory().unwrap();
        let original = trajectory("1001", 5);
        store.insert_trajectory(&original).unwrap();

        let loaded = store.load_trajectory("1001").unwrap().unwrap();
        assert_eq!(loaded, original);
        assert_eq!(store.sample_count().unwrap(), 5);
        assert!(store.load_trajectory("missing").unwrap().is_none());
    }

    #[test]
    fn test_reinsert_replaces_samples() {
        let mut store = TrajectoryStore::open_in_memory().unwrap();
        store.insert_trajectory(&trajectory("1001", 5)).unwrap();
        store.insert_trajectory(&trajectory("1001", 2)).unwrap();

        assert_eq!(store.sample_count().unwrap(), 2);
        assert_eq!(store.load_trajectory("1001").unwrap().unwrap().samples.len(), 2);
    }

    #[test]
    fn test_insert_result() {
        let mut store = TrajectoryStore::open_in_memory().unwrap();
        let result = FleetResult {
            trajectories: vec![trajectory("b", 3), trajectory("a", 4)],
            failures: vec![],
        };
        assert_eq!(store.insert_result(&result).unwrap(), 2);
        assert_eq!(store.train_ids().unwrap(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(store.sample_count().unwrap(), 7);
    }

    #[test]
    fn test_file_backed_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracks.db");
        let path = path.to_str().unwrap();

        {
            let mut store = TrajectoryStore::open(path).unwrap();
            store.insert_trajectory(&trajectory("1001", 3)).unwrap();
        }

        let store = TrajectoryStore::open(path).unwrap();
        assert_eq!(store.train_ids().unwrap(), vec!["1001".to_string()]);
    }

    #[test]
    fn test_sample_rows_keep_milliseconds() {
        let mut store = TrajectoryStore::open_in_memory().unwrap();
        let mut sub_second = trajectory("1001", 2);
        let start = Utc.with_ymd_and_hms(2024, 8, 1, 6, 0, 0).unwrap() + Duration::milliseconds(250);
        sub_second.start_time = start;
        for (i, sample) in sub_second.samples.iter_mut().enumerate() {
            sample.timestamp = start + Duration::seconds(60 * i as i64);
        }
        store.insert_trajectory(&sub_second).unwrap();

        let stored: Vec<i64> = store
            .db
            .prepare("SELECT timestamp_ms FROM samples WHERE train_id = ? ORDER BY seq")
            .unwrap()
            .query_map(params!["1001"], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<_, _>>()
            .unwrap();
        assert_eq!(
            stored,
            vec![start.timestamp_millis(), start.timestamp_millis() + 60_000]
        );

        let start_ms: i64 = store
            .db
            .query_row("SELECT start_time_ms FROM trajectories", [], |row| row.get(0))
            .unwrap();
        assert_eq!(start_ms % 1000, 250);
    }
}
