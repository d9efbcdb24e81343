//! Vehicle registry and detection history.
//!
//! The pipeline only sees the [`VehicleRegistry`] and [`DetectionLog`] traits.
//! [`SqliteStore`] is the persistent implementation; [`InMemoryStore`] backs
//! tests and dry runs.

use anyhow::{anyhow, Result};
use rusqlite::{params, Connection, OpenFlags};
use serde::Serialize;
use std::sync::{Arc, Mutex};

/// Default number of rows returned by [`SqliteStore::list_detections`].
pub const DEFAULT_DETECTION_LIMIT: usize = 100;

/// One row appended to the detection history.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectionRecord {
    /// Local wall-clock time, ISO-8601 to the second.
    pub timestamp: String,
    pub plate: String,
    pub province: Option<String>,
    pub snapshot: Option<Vec<u8>>,
    pub registered: bool,
}

/// A vehicle known to the registry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RegisteredVehicle {
    pub plate: String,
    pub province: Option<String>,
    pub driver_name: Option<String>,
}

/// Summary row of the detection history (no snapshot).
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DetectionSummary {
    pub timestamp: String,
    pub plate: String,
    pub province: Option<String>,
    pub registered: bool,
}

pub trait VehicleRegistry {
    fn is_registered(&mut self, plate: &str) -> Result<bool>;
}

pub trait DetectionLog {
    /// Append-only; every call adds one row.
    fn log_detection(&mut self, record: &DetectionRecord) -> Result<()>;
}

/// Everything the pipeline needs from storage.
pub trait PlateStore: VehicleRegistry + DetectionLog + Send {}

impl<T: VehicleRegistry + DetectionLog + Send> PlateStore for T {}

pub(crate) fn open_db_connection(db_path: &str) -> Result<Connection> {
    if db_path.starts_with("file:") {
        return Ok(Connection::open_with_flags(
            db_path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI,
        )?);
    }
    Ok(Connection::open(db_path)?)
}

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(db_path: &str) -> Result<Self> {
        let conn = open_db_connection(db_path)
            .map_err(|e| anyhow!("failed to open database {}: {}", db_path, e))?;
        let mut store = Self { conn };
        store.ensure_schema()?;
        Ok(store)
    }

    fn ensure_schema(&mut self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS registered_vehicles (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              plate TEXT NOT NULL,
              province TEXT,
              driver_name TEXT
            );

            CREATE TABLE IF NOT EXISTS detections (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              timestamp TEXT NOT NULL,
              plate TEXT,
              province TEXT,
              snapshot BLOB,
              registered INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_registered_plate ON registered_vehicles(plate);
            "#,
        )?;
        Ok(())
    }

    pub fn register_vehicle(
        &mut self,
        plate: &str,
        province: Option<&str>,
        driver_name: Option<&str>,
    ) -> Result<()> {
        if plate.trim().is_empty() {
            return Err(anyhow!("plate required"));
        }
        self.conn.execute(
            "INSERT INTO registered_vehicles (plate, province, driver_name) VALUES (?1, ?2, ?3)",
            params![plate, province, driver_name],
        )?;
        Ok(())
    }

    pub fn list_vehicles(&self) -> Result<Vec<RegisteredVehicle>> {
        let mut stmt = self
            .conn
            .prepare("SELECT plate, province, driver_name FROM registered_vehicles ORDER BY id ASC")?;
        let rows = stmt.query_map([], |row| {
            Ok(RegisteredVehicle {
                plate: row.get(0)?,
                province: row.get(1)?,
                driver_name: row.get(2)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Most recent detections first.
    pub fn list_detections(&self, limit: usize) -> Result<Vec<DetectionSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT timestamp, plate, province, registered FROM detections ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            let registered: Option<i64> = row.get(3)?;
            Ok(DetectionSummary {
                timestamp: row.get(0)?,
                plate: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                province: row.get(2)?,
                registered: registered.unwrap_or(0) != 0,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Snapshot bytes of the most recent detection of `plate`, if any.
    pub fn latest_snapshot(&self, plate: &str) -> Result<Option<Vec<u8>>> {
        let mut stmt = self.conn.prepare(
            "SELECT snapshot FROM detections WHERE plate = ?1 AND snapshot IS NOT NULL ORDER BY id DESC LIMIT 1",
        )?;
        let mut rows = stmt.query(params![plate])?;
        let snapshot = match rows.next()? {
            Some(row) => Some(row.get(0)?),
            None => None,
        };
        Ok(snapshot)
    }
}

impl VehicleRegistry for SqliteStore {
    fn is_registered(&mut self, plate: &str) -> Result<bool> {
        let mut stmt = self
            .conn
            .prepare("SELECT 1 FROM registered_vehicles WHERE plate = ?1 LIMIT 1")?;
        let mut rows = stmt.query(params![plate])?;
        let found = rows.next()?.is_some();
        Ok(found)
    }
}

impl DetectionLog for SqliteStore {
    fn log_detection(&mut self, record: &DetectionRecord) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO detections (timestamp, plate, province, snapshot, registered)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                record.timestamp,
                record.plate,
                record.province,
                record.snapshot,
                record.registered as i64
            ],
        )?;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct InMemoryInner {
    vehicles: Vec<RegisteredVehicle>,
    detections: Vec<DetectionRecord>,
}

/// Shared in-memory store. Clones see the same data.
#[derive(Clone, Debug, Default)]
pub struct InMemoryStore {
    inner: Arc<Mutex<InMemoryInner>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, InMemoryInner>> {
        self.inner
            .lock()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }

    pub fn register_vehicle(
        &self,
        plate: &str,
        province: Option<&str>,
        driver_name: Option<&str>,
    ) -> Result<()> {
        if plate.trim().is_empty() {
            return Err(anyhow!("plate required"));
        }
        self.lock()?.vehicles.push(RegisteredVehicle {
            plate: plate.to_string(),
            province: province.map(str::to_string),
            driver_name: driver_name.map(str::to_string),
        });
        Ok(())
    }

    /// All logged records, oldest first.
    pub fn detections(&self) -> Result<Vec<DetectionRecord>> {
        Ok(self.lock()?.detections.clone())
    }
}

impl VehicleRegistry for InMemoryStore {
    fn is_registered(&mut self, plate: &str) -> Result<bool> {
        Ok(self.lock()?.vehicles.iter().any(|v| v.plate == plate))
    }
}

impl DetectionLog for InMemoryStore {
    fn log_detection(&mut self, record: &DetectionRecord) -> Result<()> {
        self.lock()?.detections.push(record.clone());
        Ok(())
    }
}
