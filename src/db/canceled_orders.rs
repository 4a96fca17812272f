//! Canceled order archive operations

use crate::core::types::CanceledOrder;
use crate::db::Database;
use crate::error::TradingResult;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Row};
use serde::Serialize;

/// A canceled order as stored, with the time it was archived.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArchivedOrder {
    pub id: i64,
    pub order: CanceledOrder,
    pub canceled_at: DateTime<Utc>,
}

impl ArchivedOrder {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let canceled_at: String = row.get(13)?;
        let canceled_at = DateTime::parse_from_rfc3339(&canceled_at)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(13, rusqlite::types::Type::Text, Box::new(e))
            })?;

        Ok(ArchivedOrder {
            id: row.get(0)?,
            order: CanceledOrder {
                symbol: row.get(1)?,
                order_id: row.get::<_, i64>(2)? as u64,
                order_list_id: row.get(3)?,
                client_order_id: row.get(4)?,
                price: row.get(5)?,
                orig_qty: row.get(6)?,
                executed_qty: row.get(7)?,
                cummulative_quote_qty: row.get(8)?,
                status: row.get(9)?,
                time_in_force: row.get(10)?,
                order_type: row.get(11)?,
                side: row.get(12)?,
            },
            canceled_at,
        })
    }
}

#[derive(Clone)]
pub struct CanceledOrderStore {
    db: Database,
}

impl CanceledOrderStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Archive one canceled order
    pub fn record(&self, order: &CanceledOrder) -> TradingResult<i64> {
        self.record_at(order, Utc::now())
    }

    pub fn record_at(&self, order: &CanceledOrder, canceled_at: DateTime<Utc>) -> TradingResult<i64> {
        let conn = self.db.lock()?;
        conn.execute(
            "INSERT INTO canceled_orders (
                symbol, order_id, order_list_id, client_order_id, price, orig_qty,
                executed_qty, cummulative_quote_qty, status, time_in_force,
                order_type, side, canceled_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                order.symbol,
                order.order_id as i64,
                order.order_list_id,
                order.client_order_id,
                order.price,
                order.orig_qty,
                order.executed_qty,
                order.cummulative_quote_qty,
                order.status,
                order.time_in_force,
                order.order_type,
                order.side,
                canceled_at.to_rfc3339_opts(SecondsFormat::Micros, true),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Most recent cancels for a symbol, newest first
    pub fn recent(&self, symbol: &str, limit: usize) -> TradingResult<Vec<ArchivedOrder>> {
        let conn = self.db.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, symbol, order_id, order_list_id, client_order_id, price, orig_qty,
                    executed_qty, cummulative_quote_qty, status, time_in_force,
                    order_type, side, canceled_at
             FROM canceled_orders
             WHERE symbol = ?1
             ORDER BY canceled_at DESC, id DESC
             LIMIT ?2",
        )?;

        let rows = stmt.query_map(params![symbol, limit as i64], |row| ArchivedOrder::from_row(row))?;
        let orders = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(orders)
    }

    pub fn count(&self, symbol: &str) -> TradingResult<i64> {
        let conn = self.db.lock()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM canceled_orders WHERE symbol = ?1",
            params![symbol],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
