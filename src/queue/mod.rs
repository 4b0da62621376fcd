//! # Durable Queue Module
//!
//! Crash-safe store-and-forward buffer between ingestion and the remote
//! sink.
//!
//! This module handles:
//! - Persisting telemetry records in an SQLite file
//! - Reading the oldest records in insertion order
//! - Removing forwarded records in one transaction
//! - The forwarder task that drains the queue into the sink
//!
//! Row ids come from an `AUTOINCREMENT` key, so they only ever grow and a
//! removed id is never handed out again, not even after a restart.

pub mod forwarder;

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rusqlite::{params, Connection};
use tracing::{error, info};

use crate::error::{RelayError, Result};
use crate::telemetry::{ChannelType, TelemetryRecord};

pub use forwarder::Forwarder;

const CREATE_BUFFER_TABLE: &str = "CREATE TABLE IF NOT EXISTS buffer (
    uid INTEGER PRIMARY KEY AUTOINCREMENT,
    client_name TEXT NOT NULL,
    client_address TEXT,
    sender_address TEXT,
    fix_timestamp REAL,
    latitude REAL,
    longitude REAL,
    channel_type INTEGER NOT NULL
)";

const INSERT_ROW: &str = "INSERT INTO buffer
    (client_name, client_address, sender_address, fix_timestamp, latitude, longitude, channel_type)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)";

const SELECT_OLDEST: &str = "SELECT uid, client_name, client_address, sender_address,
    fix_timestamp, latitude, longitude, channel_type
    FROM buffer ORDER BY uid ASC LIMIT ?1";

const DELETE_ROW: &str = "DELETE FROM buffer WHERE uid = ?1";

/// One queued record
#[derive(Debug, Clone, PartialEq)]
pub struct QueueRow {
    /// Unique, increasing row id
    pub id: i64,

    /// The stored record
    pub record: TelemetryRecord,
}

/// Row exactly as stored, before the channel code is checked
struct StoredRow {
    id: i64,
    client_name: String,
    client_address: Option<String>,
    sender_address: Option<String>,
    fix_timestamp: Option<f64>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    channel_type: i32,
}

impl StoredRow {
    fn read(id: i64, row: &rusqlite::Row<'_>) -> Result<Self> {
        Ok(Self {
            id,
            client_name: row.get(1)?,
            client_address: row.get(2)?,
            sender_address: row.get(3)?,
            fix_timestamp: row.get(4)?,
            latitude: row.get(5)?,
            longitude: row.get(6)?,
            channel_type: row.get(7)?,
        })
    }

    fn into_queue_row(self) -> Result<QueueRow> {
        let channel_type = ChannelType::from_code(self.channel_type).ok_or_else(|| RelayError::CorruptRow {
            id: self.id,
            reason: format!("unknown channel type {}", self.channel_type),
        })?;

        // SQLite stores NaN as NULL
        Ok(QueueRow {
            id: self.id,
            record: TelemetryRecord {
                client_name: self.client_name,
                client_channel_address: self.client_address,
                sender_address: self.sender_address,
                fix_timestamp: self.fix_timestamp.unwrap_or(f64::NAN),
                latitude: self.latitude.unwrap_or(f64::NAN),
                longitude: self.longitude.unwrap_or(f64::NAN),
                channel_type,
            },
        })
    }
}

fn lock(conn: &Mutex<Connection>) -> MutexGuard<'_, Connection> {
    // Every operation is its own transaction; a panicking holder leaves
    // nothing half-written behind
    conn.lock().unwrap_or_else(PoisonError::into_inner)
}

fn insert_row(conn: &mut Connection, record: &TelemetryRecord) -> Result<i64> {
    conn.prepare_cached(INSERT_ROW)?.execute(params![
        record.client_name,
        record.client_channel_address,
        record.sender_address,
        record.fix_timestamp,
        record.latitude,
        record.longitude,
        record.channel_type.code(),
    ])?;
    Ok(conn.last_insert_rowid())
}

fn select_oldest(conn: &mut Connection, limit: usize) -> Result<Vec<QueueRow>> {
    let decoded = {
        let mut stmt = conn.prepare_cached(SELECT_OLDEST)?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            let id: i64 = row.get(0)?;
            Ok((id, StoredRow::read(id, row).and_then(StoredRow::into_queue_row)))
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()?
    };

    let mut valid = Vec::with_capacity(decoded.len());
    let mut corrupt = Vec::new();
    for (id, row) in decoded {
        match row {
            Ok(row) => valid.push(row),
            Err(e) => {
                error!("dropping undecodable queue row {}: {}", id, e);
                corrupt.push(id);
            }
        }
    }

    if !corrupt.is_empty() {
        delete_rows(conn, &corrupt)?;
    }
    Ok(valid)
}

fn delete_rows(conn: &mut Connection, ids: &[i64]) -> Result<usize> {
    let tx = conn.transaction()?;
    let mut removed = 0;
    {
        let mut stmt = tx.prepare_cached(DELETE_ROW)?;
        for id in ids {
            removed += stmt.execute(params![id])?;
        }
    }
    tx.commit()?;
    Ok(removed)
}

fn count_rows(conn: &Connection) -> Result<u64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM buffer", [], |row| row.get(0))?;
    Ok(count as u64)
}

/// Handle to the durable queue
///
/// Cheap to clone; all clones share one SQLite connection. Statements run
/// on the blocking pool and hold the connection only for their own
/// statements, so enqueues never wait on a slow forward and file I/O never
/// stalls a receive loop.
#[derive(Clone)]
pub struct DurableQueue {
    conn: Arc<Mutex<Connection>>,
    location: String,
}

impl std::fmt::Debug for DurableQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurableQueue")
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}

impl DurableQueue {
    /// Open (or create) the queue file
    ///
    /// Runs synchronously; meant for startup.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be opened or the table cannot be
    /// created
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let location = path.as_ref().display().to_string();
        let queue = Self::init(Connection::open(path)?, location)?;
        let pending = count_rows(&lock(&queue.conn))?;
        info!("Opened queue {} ({} pending records)", queue.location, pending);
        Ok(queue)
    }

    /// Open a queue that lives only in memory
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?, ":memory:".to_string())
    }

    fn init(conn: Connection, location: String) -> Result<Self> {
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.execute_batch(CREATE_BUFFER_TABLE)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            location,
        })
    }

    #[cfg(test)]
    fn conn(&self) -> MutexGuard<'_, Connection> {
        lock(&self.conn)
    }

    /// Run `op` against the connection on the blocking pool
    async fn blocking<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = lock(&conn);
            op(&mut conn)
        })
        .await
        .map_err(|e| RelayError::Task(format!("queue operation aborted: {}", e)))?
    }

    /// Where the queue is stored
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Append a record
    ///
    /// # Returns
    ///
    /// * `Result<i64>` - Id of the new row
    pub async fn enqueue(&self, record: &TelemetryRecord) -> Result<i64> {
        let record = record.clone();
        self.blocking(move |conn| insert_row(conn, &record)).await
    }

    /// Read up to `limit` of the oldest rows, oldest first
    ///
    /// A row that cannot be decoded (unknown channel type, wrong column
    /// type) is logged with its id and deleted, so it never blocks the rows
    /// behind it. The result may then hold fewer than `limit` rows.
    ///
    /// # Errors
    ///
    /// Returns error on storage failure
    pub async fn oldest(&self, limit: usize) -> Result<Vec<QueueRow>> {
        self.blocking(move |conn| select_oldest(conn, limit)).await
    }

    /// Remove rows by id in a single transaction
    ///
    /// Either every listed row is removed or none is. Ids that are not in
    /// the queue are ignored.
    ///
    /// # Returns
    ///
    /// * `Result<usize>` - Number of rows actually removed
    pub async fn remove(&self, ids: &[i64]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        let ids = ids.to_vec();
        self.blocking(move |conn| delete_rows(conn, &ids)).await
    }

    /// Number of records waiting to be forwarded
    pub async fn len(&self) -> Result<u64> {
        self.blocking(|conn| count_rows(conn)).await
    }

    /// Whether nothing is waiting to be forwarded
    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }
}
