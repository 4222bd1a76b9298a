// 🗄️ Aggregation Store - Per-customer, time-ordered transaction index
// SQLite backend: one row per transaction id, indexed by (customer_id, occurred_at)

use crate::transaction::Transaction;
use rusqlite::{params, Connection};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Backing service unreachable or the statement failed. Never retried here.
    #[error("Aggregation store unavailable")]
    Unavailable(#[from] rusqlite::Error),

    #[error("Stored record for transaction {id} is corrupt")]
    CorruptRecord {
        id: u64,
        #[source]
        source: serde_json::Error,
    },

    #[error("Transaction id {0} does not fit the store's signed 64-bit key")]
    IdOutOfRange(u64),

    #[error("Unable to serialize transaction {id}")]
    Serialize {
        id: u64,
        #[source]
        source: serde_json::Error,
    },
}

/// Range-queryable store the validator aggregates against
pub trait AggregationStore {
    /// Record a transaction. Re-inserting an id replaces the earlier record.
    fn insert(&mut self, tx: &Transaction) -> Result<(), StoreError>;

    /// Customer's records with `min_ts <= occurred_at <= max_ts`, latest first
    fn range_query(
        &self,
        customer_id: &str,
        min_ts: i64,
        max_ts: i64,
    ) -> Result<Vec<Transaction>, StoreError>;

    /// Wipe all stored state
    fn reset(&mut self) -> Result<(), StoreError>;
}

// ============================================================================
// SQLITE STORE
// ============================================================================

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        // Enable WAL mode for crash recovery
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    pub fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        setup_schema(&conn)?;
        Ok(SqliteStore { conn })
    }

    /// Number of stored transactions across all customers
    pub fn count(&self) -> Result<i64, StoreError> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM loads", [], |row| row.get(0))?;
        Ok(count)
    }
}

fn setup_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS loads (
            id INTEGER PRIMARY KEY,
            customer_id TEXT NOT NULL,
            occurred_at INTEGER NOT NULL,
            body TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_loads_customer_time ON loads(customer_id, occurred_at)",
        [],
    )?;

    Ok(())
}

impl AggregationStore for SqliteStore {
    fn insert(&mut self, tx: &Transaction) -> Result<(), StoreError> {
        let body = serde_json::to_string(tx).map_err(|source| StoreError::Serialize {
            id: tx.id(),
            source,
        })?;

        let key = i64::try_from(tx.id()).map_err(|_| StoreError::IdOutOfRange(tx.id()))?;
        self.conn.execute(
            "INSERT OR REPLACE INTO loads (id, customer_id, occurred_at, body)
             VALUES (?1, ?2, ?3, ?4)",
            params![key, tx.customer_id(), tx.timestamp(), body],
        )?;

        debug!(
            id = tx.id(),
            customer_id = tx.customer_id(),
            occurred_at = tx.timestamp(),
            "stored transaction"
        );
        Ok(())
    }

    fn range_query(
        &self,
        customer_id: &str,
        min_ts: i64,
        max_ts: i64,
    ) -> Result<Vec<Transaction>, StoreError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, body FROM loads
             WHERE customer_id = ?1 AND occurred_at BETWEEN ?2 AND ?3
             ORDER BY occurred_at DESC, id DESC",
        )?;

        let rows = stmt
            .query_map(params![customer_id, min_ts, max_ts], |row| {
                let id: i64 = row.get(0)?;
                let body: String = row.get(1)?;
                Ok((id as u64, body))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, body)| {
                serde_json::from_str(&body).map_err(|source| StoreError::CorruptRecord { id, source })
            })
            .collect()
    }

    fn reset(&mut self) -> Result<(), StoreError> {
        self.conn.execute("DELETE FROM loads", [])?;
        debug!("aggregation store reset");
        Ok(())
    }
}
