//! SQLite archive of orders the engine canceled

use crate::error::{TradingError, TradingResult};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

pub mod canceled_orders;

pub use canceled_orders::{ArchivedOrder, CanceledOrderStore};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS canceled_orders (
    id                    INTEGER PRIMARY KEY AUTOINCREMENT,
    symbol                TEXT    NOT NULL,
    order_id              INTEGER NOT NULL,
    order_list_id         INTEGER NOT NULL,
    client_order_id       TEXT    NOT NULL,
    price                 REAL    NOT NULL,
    orig_qty              REAL    NOT NULL,
    executed_qty          REAL    NOT NULL,
    cummulative_quote_qty REAL    NOT NULL,
    status                TEXT    NOT NULL,
    time_in_force         TEXT    NOT NULL,
    order_type            TEXT    NOT NULL,
    side                  TEXT    NOT NULL,
    canceled_at           TEXT    NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_canceled_orders_symbol
    ON canceled_orders (symbol, canceled_at);
";

/// Shared SQLite connection
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) a database file and ensure the schema exists
    pub fn new<P: AsRef<Path>>(path: P) -> TradingResult<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Self::init(Connection::open(path)?)
    }

    /// Create an in-memory database (for testing)
    pub fn new_in_memory() -> TradingResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> TradingResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Database {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub(crate) fn lock(&self) -> TradingResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| TradingError::Database("connection mutex poisoned".to_string()))
    }

    /// Check database health
    pub fn health_check(&self) -> TradingResult<bool> {
        let conn = self.lock()?;
        let result: i32 = conn.query_row("SELECT 1", [], |row| row.get(0))?;
        Ok(result == 1)
    }
}
