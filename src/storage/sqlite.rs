//! SQLite-backed `OrderStore`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use tracing::{debug, info};

use super::{ExecutionState, OrderStore, StoreError};
use crate::types::{Amount, Order, OrderRecord, OrderStatus, OutPoint, Utxo};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS orders (
        id            TEXT PRIMARY KEY,
        address       TEXT NOT NULL UNIQUE,
        trader_script TEXT NOT NULL,
        timestamp     INTEGER NOT NULL,
        input_asset   TEXT NOT NULL,
        input_amount  INTEGER NOT NULL,
        output_asset  TEXT NOT NULL,
        output_amount INTEGER NOT NULL,
        status        TEXT NOT NULL DEFAULT 'Pending'
    )",
    "CREATE INDEX IF NOT EXISTS idx_orders_status ON orders (status)",
    "CREATE TABLE IF NOT EXISTS trade_executions (
        order_id   TEXT NOT NULL,
        txid       TEXT NOT NULL,
        vout       INTEGER NOT NULL,
        value      INTEGER NOT NULL,
        state      TEXT NOT NULL,
        updated_at INTEGER NOT NULL,
        PRIMARY KEY (order_id, txid, vout)
    )",
];

const ORDER_COLUMNS: &str = "id, address, trader_script, timestamp, input_asset, input_amount, \
                             output_asset, output_amount, status";

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) the database at `url` and apply the schema.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);

        // Every connection to `:memory:` is its own database, so pin one.
        let in_memory = url.contains(":memory:");
        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 5 })
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        info!(url, "Order store ready");
        Ok(store)
    }

    pub async fn in_memory() -> Result<Self, StoreError> {
        Self::connect("sqlite::memory:").await
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }
}

fn to_i64(value: u64) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| StoreError::AmountOutOfRange(value))
}

fn record_from_row(row: &SqliteRow) -> Result<OrderRecord, StoreError> {
    let id: String = row.try_get("id")?;
    let corrupt = |message: String| StoreError::Corrupt {
        id: id.clone(),
        message,
    };

    let millis: i64 = row.try_get("timestamp")?;
    let timestamp = DateTime::<Utc>::from_timestamp_millis(millis)
        .ok_or_else(|| corrupt(format!("timestamp {millis} out of range")))?;

    let status: String = row.try_get("status")?;
    let status = OrderStatus::from_str(&status).map_err(corrupt)?;

    let input_amount: i64 = row.try_get("input_amount")?;
    let output_amount: i64 = row.try_get("output_amount")?;
    let input_amount = u64::try_from(input_amount)
        .map_err(|_| corrupt(format!("negative input amount {input_amount}")))?;
    let output_amount = u64::try_from(output_amount)
        .map_err(|_| corrupt(format!("negative output amount {output_amount}")))?;

    Ok(OrderRecord {
        order: Order {
            id: id.clone(),
            address: row.try_get("address")?,
            trader_script: row.try_get("trader_script")?,
            timestamp,
            input: Amount {
                asset: row.try_get("input_asset")?,
                amount: input_amount,
            },
            output: Amount {
                asset: row.try_get("output_asset")?,
                amount: output_amount,
            },
        },
        status,
    })
}

#[async_trait]
impl OrderStore for SqliteStore {
    async fn save_order(&self, order: &Order) -> Result<(), StoreError> {
        let result = sqlx::query(
            "INSERT INTO orders (id, address, trader_script, timestamp, input_asset, \
             input_amount, output_asset, output_amount, status) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&order.id)
        .bind(&order.address)
        .bind(&order.trader_script)
        .bind(order.timestamp.timestamp_millis())
        .bind(&order.input.asset)
        .bind(to_i64(order.input.amount)?)
        .bind(&order.output.asset)
        .bind(to_i64(order.output.amount)?)
        .bind(OrderStatus::Pending.as_str())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                debug!(order_id = %order.id, address = %order.address, "Order saved");
                Ok(())
            }
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(StoreError::DuplicateAddress(order.address.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn fetch_order_by_id(&self, id: &str) -> Result<Option<OrderRecord>, StoreError> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(record_from_row).transpose()
    }

    async fn fetch_order_id_by_address(&self, address: &str) -> Result<Option<String>, StoreError> {
        let row = sqlx::query("SELECT id FROM orders WHERE address = ?")
            .bind(address)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.try_get::<String, _>("id")).transpose()?)
    }

    async fn fetch_orders_to_fulfill(&self) -> Result<Vec<OrderRecord>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE status IN (?, ?) ORDER BY timestamp ASC"
        ))
        .bind(OrderStatus::Pending.as_str())
        .bind(OrderStatus::Funded.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(record_from_row).collect()
    }

    async fn update_order_status(&self, id: &str, status: OrderStatus) -> Result<bool, StoreError> {
        let from = status.predecessors();
        if from.is_empty() {
            return Ok(false);
        }

        let placeholders = vec!["?"; from.len()].join(", ");
        let sql = format!("UPDATE orders SET status = ? WHERE id = ? AND status IN ({placeholders})");
        let mut query = sqlx::query(&sql).bind(status.as_str()).bind(id);
        for prev in from {
            query = query.bind(prev.as_str());
        }

        let applied = query.execute(&self.pool).await?.rows_affected() == 1;
        debug!(order_id = id, status = %status, applied, "Status update");
        Ok(applied)
    }

    async fn execution_state(
        &self,
        order_id: &str,
        outpoint: &OutPoint,
    ) -> Result<Option<ExecutionState>, StoreError> {
        let row = sqlx::query(
            "SELECT state FROM trade_executions WHERE order_id = ? AND txid = ? AND vout = ?",
        )
        .bind(order_id)
        .bind(&outpoint.txid)
        .bind(outpoint.vout)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let state: String = row.try_get("state")?;
        match state.as_str() {
            "executing" => Ok(Some(ExecutionState::Executing)),
            "executed" => Ok(Some(ExecutionState::Executed)),
            other => Err(StoreError::Corrupt {
                id: order_id.to_string(),
                message: format!("unknown execution state {other} for {outpoint}"),
            }),
        }
    }

    async fn fetch_executed_unspents(&self, order_id: &str) -> Result<Vec<Utxo>, StoreError> {
        let rows = sqlx::query(
            "SELECT txid, vout, value FROM trade_executions \
             WHERE order_id = ? AND state = ? ORDER BY updated_at ASC",
        )
        .bind(order_id)
        .bind(ExecutionState::Executed.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let value: i64 = row.try_get("value")?;
                Ok(Utxo {
                    txid: row.try_get("txid")?,
                    vout: row.try_get("vout")?,
                    value: u64::try_from(value).map_err(|_| StoreError::Corrupt {
                        id: order_id.to_string(),
                        message: format!("negative execution value {value}"),
                    })?,
                    prevout: None,
                })
            })
            .collect()
    }

    async fn mark_executing(&self, order_id: &str, unspent: &Utxo) -> Result<bool, StoreError> {
        let inserted = sqlx::query(
            "INSERT OR IGNORE INTO trade_executions (order_id, txid, vout, value, state, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(order_id)
        .bind(&unspent.txid)
        .bind(unspent.vout)
        .bind(to_i64(unspent.value)?)
        .bind(ExecutionState::Executing.as_str())
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(inserted == 1)
    }

    async fn mark_executed(&self, order_id: &str, outpoint: &OutPoint) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE trade_executions SET state = ?, updated_at = ? \
             WHERE order_id = ? AND txid = ? AND vout = ?",
        )
        .bind(ExecutionState::Executed.as_str())
        .bind(Utc::now().timestamp_millis())
        .bind(order_id)
        .bind(&outpoint.txid)
        .bind(outpoint.vout)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn clear_execution(&self, order_id: &str, outpoint: &OutPoint) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM trade_executions WHERE order_id = ? AND txid = ? AND vout = ?")
            .bind(order_id)
            .bind(&outpoint.txid)
            .bind(outpoint.vout)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
