//! SQLite-backed incident audit store
//!
//! Incidents are append-only. Timestamps are stored as fixed-width RFC 3339
//! UTC strings with millisecond precision, so ordering and range filters can
//! compare the text column directly.

use crate::error::AuditError;
use crate::models::{Incident, IncidentStatus, NewIncident};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection};
use std::io::Write;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const CSV_HEADER: [&str; 5] = ["timestamp", "process_name", "pid", "cpu_load", "status"];

struct StoreState {
    conn: Connection,
    initialized: bool,
}

/// Persistent log of remediation incidents
pub struct AuditStore {
    state: Mutex<StoreState>,
}

/// Row as stored, before timestamp and status are parsed
struct IncidentRow {
    id: i64,
    timestamp: String,
    process_name: String,
    pid: u32,
    cpu_load: String,
    status: String,
}

impl IncidentRow {
    fn into_incident(self) -> Result<Incident, AuditError> {
        let timestamp = DateTime::parse_from_rfc3339(&self.timestamp)
            .map_err(|e| AuditError::CorruptRow {
                id: self.id,
                reason: format!("bad timestamp '{}': {}", self.timestamp, e),
            })?
            .with_timezone(&Utc);
        let status: IncidentStatus = self
            .status
            .parse()
            .map_err(|reason| AuditError::CorruptRow { id: self.id, reason })?;

        Ok(Incident {
            id: self.id,
            timestamp,
            process_name: self.process_name,
            process_id: self.pid,
            cpu_load: self.cpu_load,
            status,
        })
    }
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl AuditStore {
    /// Open (or create) the store at `path`, creating parent directories
    pub fn open(path: &Path) -> Result<Self, AuditError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        Ok(Self::with_connection(conn))
    }

    pub fn open_in_memory() -> Result<Self, AuditError> {
        Ok(Self::with_connection(Connection::open_in_memory()?))
    }

    fn with_connection(conn: Connection) -> Self {
        Self {
            state: Mutex::new(StoreState {
                conn,
                initialized: false,
            }),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreState>, AuditError> {
        self.state.lock().map_err(|_| AuditError::Poisoned)
    }

    /// Create the schema if missing; safe to call repeatedly
    pub fn init(&self) -> Result<(), AuditError> {
        let mut state = self.lock()?;
        Self::ensure_schema(&mut state)
    }

    fn ensure_schema(state: &mut StoreState) -> Result<(), AuditError> {
        if !state.initialized {
            state.conn.execute_batch(include_str!("../schema.sql"))?;
            state.initialized = true;
        }
        Ok(())
    }

    /// Append one incident and return it with its assigned id
    pub fn record(&self, incident: &NewIncident) -> Result<Incident, AuditError> {
        let mut state = self.lock()?;
        Self::ensure_schema(&mut state)?;

        // Stored precision is milliseconds; return what a later query would
        let stamp = format_timestamp(&incident.timestamp);
        state.conn.execute(
            "INSERT INTO incidents (timestamp, process_name, pid, cpu_load, status)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                stamp,
                incident.process_name,
                incident.process_id,
                incident.cpu_load,
                incident.status.as_str()
            ],
        )?;
        let id = state.conn.last_insert_rowid();

        IncidentRow {
            id,
            timestamp: stamp,
            process_name: incident.process_name.clone(),
            pid: incident.process_id,
            cpu_load: incident.cpu_load.clone(),
            status: incident.status.as_str().to_string(),
        }
        .into_incident()
    }

    /// Incidents at or after `since`, oldest first
    pub fn query(&self, since: DateTime<Utc>) -> Result<Vec<Incident>, AuditError> {
        let mut state = self.lock()?;
        Self::ensure_schema(&mut state)?;

        let mut stmt = state.conn.prepare(
            "SELECT id, timestamp, process_name, pid, cpu_load, status
             FROM incidents WHERE timestamp >= ?1 ORDER BY timestamp ASC, id ASC",
        )?;
        let rows = stmt
            .query_map(params![format_timestamp(&since)], Self::map_incident)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter().map(IncidentRow::into_incident).collect()
    }

    fn map_incident(row: &rusqlite::Row) -> rusqlite::Result<IncidentRow> {
        Ok(IncidentRow {
            id: row.get(0)?,
            timestamp: row.get(1)?,
            process_name: row.get(2)?,
            pid: row.get(3)?,
            cpu_load: row.get(4)?,
            status: row.get(5)?,
        })
    }

    /// Write incidents since `since` as CSV; returns the number of data rows
    pub fn export_csv<W: Write>(&self, since: DateTime<Utc>, writer: W) -> Result<usize, AuditError> {
        let incidents = self.query(since)?;
        let mut csv = csv::Writer::from_writer(writer);

        csv.write_record(CSV_HEADER)?;
        for incident in &incidents {
            csv.write_record([
                format_timestamp(&incident.timestamp),
                incident.process_name.clone(),
                incident.process_id.to_string(),
                incident.cpu_load.clone(),
                incident.status.as_str().to_string(),
            ])?;
        }
        csv.flush()?;

        Ok(incidents.len())
    }
}
