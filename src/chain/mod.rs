//! Chain explorer integration.
//!
//! Defines the `ChainClient` trait the watcher reads the ledger through and
//! provides an Esplora REST implementation:
//! - unspent outputs of a funding address
//! - previous-output detail of a single output
//! - transaction history of an address (served to the HTTP API)

pub mod esplora;

use async_trait::async_trait;

use crate::types::{Prevout, TxHistoryEntry, Utxo};

#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("Explorer request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Explorer returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Output {txid}:{vout} not found")]
    OutputNotFound { txid: String, vout: u32 },
}

/// Read access to the ledger.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Unspent outputs currently paying to `address`, in explorer order.
    async fn fetch_unspents(&self, address: &str) -> Result<Vec<Utxo>, ChainError>;

    /// Detail of output `vout` of transaction `txid`.
    async fn fetch_prevout(&self, txid: &str, vout: u32) -> Result<Prevout, ChainError>;

    async fn fetch_transaction_history(&self, address: &str) -> Result<Vec<TxHistoryEntry>, ChainError>;
}
