//! Persistence layer.
//!
//! Defines the `OrderStore` trait the watcher and the HTTP API share, and a
//! SQLite implementation. Status writes are compare-and-set: a transition is
//! applied only when the persisted status is one of the target's allowed
//! predecessors.

pub mod sqlite;

use async_trait::async_trait;

use crate::types::{Order, OrderRecord, OrderStatus, OutPoint, Utxo};

/// Progress of a single funding output through trade execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    /// Marked before the wallet call. Left behind only if a pass was
    /// interrupted mid-call, so the outcome is unknown.
    Executing,
    /// The wallet acknowledged the trade.
    Executed,
}

impl ExecutionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionState::Executing => "executing",
            ExecutionState::Executed => "executed",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Address already has an order: {0}")]
    DuplicateAddress(String),

    #[error("Corrupt row for order {id}: {message}")]
    Corrupt { id: String, message: String },

    #[error("Amount out of range: {0}")]
    AmountOutOfRange(u64),
}

/// Storage for orders, their status, and per-output execution markers.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Insert a new order with status `Pending`.
    async fn save_order(&self, order: &Order) -> Result<(), StoreError>;

    async fn fetch_order_by_id(&self, id: &str) -> Result<Option<OrderRecord>, StoreError>;

    async fn fetch_order_id_by_address(&self, address: &str) -> Result<Option<String>, StoreError>;

    /// Orders the watcher still has work for (`Pending` or `Funded`),
    /// oldest first.
    async fn fetch_orders_to_fulfill(&self) -> Result<Vec<OrderRecord>, StoreError>;

    /// Move an order to `status`. Returns `false` when the persisted status
    /// is not an allowed predecessor (or the order does not exist), in which
    /// case nothing is written.
    async fn update_order_status(&self, id: &str, status: OrderStatus) -> Result<bool, StoreError>;

    async fn execution_state(
        &self,
        order_id: &str,
        outpoint: &OutPoint,
    ) -> Result<Option<ExecutionState>, StoreError>;

    /// Outputs already consumed by an executed trade for this order.
    async fn fetch_executed_unspents(&self, order_id: &str) -> Result<Vec<Utxo>, StoreError>;

    /// Record that a trade for `unspent` is about to execute. Returns `false`
    /// if a marker already exists.
    async fn mark_executing(&self, order_id: &str, unspent: &Utxo) -> Result<bool, StoreError>;

    async fn mark_executed(&self, order_id: &str, outpoint: &OutPoint) -> Result<(), StoreError>;

    /// Drop the marker after a failed execution so the output is retried.
    async fn clear_execution(&self, order_id: &str, outpoint: &OutPoint) -> Result<(), StoreError>;
}
