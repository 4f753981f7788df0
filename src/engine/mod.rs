//! Core engine: watch funding addresses, expire stale orders, and settle
//! funded ones trade by trade.
//!
//! Scheduler → (per tick) → Evaluator(order) → Funding → Executor → wallet.

pub mod evaluator;
pub mod executor;
pub mod funding;
pub mod scheduler;

use crate::chain::ChainError;
use crate::storage::StoreError;
use crate::types::{OutPoint, Trade, TradeReceipt};
use crate::wallet::WalletError;

/// A trade the wallet accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutedTrade {
    pub trade: Trade,
    pub receipt: TradeReceipt,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Failure of a single trade inside a batch.
#[derive(Debug, thiserror::Error)]
pub enum TradeError {
    #[error("Failed to fetch prevout of {outpoint}: {source}")]
    Prevout {
        outpoint: OutPoint,
        #[source]
        source: ChainError,
    },

    #[error("Trade for {0} is not funded")]
    NotFunded(OutPoint),

    #[error("Execution of {0} was interrupted earlier; outcome unknown, manual reconciliation needed")]
    OutcomeUnknown(OutPoint),

    #[error("Wallet failed to execute trade for {outpoint}: {source}")]
    Wallet {
        outpoint: OutPoint,
        #[source]
        source: WalletError,
    },

    #[error("Execution marker error: {0}")]
    Store(#[from] StoreError),
}

/// A batch aborted part-way. Trades in `executed` went through and are
/// not rolled back.
#[derive(Debug, thiserror::Error)]
#[error("Batch aborted after {} executed trade(s): {source}", .executed.len())]
pub struct BatchError {
    pub executed: Vec<ExecutedTrade>,
    #[source]
    pub source: TradeError,
}

/// Failure evaluating one order. Scoped to that order; retried next tick.
#[derive(Debug, thiserror::Error)]
pub enum EvaluationError {
    #[error("Error fetching unspents: {0}")]
    Unspents(#[source] ChainError),

    #[error("Error reading executed outputs: {0}")]
    Store(#[source] StoreError),

    #[error("Error executing trades: {0}")]
    Execution(#[from] BatchError),
}

/// Failure of a whole tick.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("Error fetching orders to fulfill: {0}")]
    FetchPending(#[source] StoreError),
}
