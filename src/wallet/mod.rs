//! Wallet service integration.
//!
//! The wallet owns the keys: it hands out funding addresses for new orders
//! and executes (signs and broadcasts) trades the watcher builds. Trade
//! construction protocol and signing are the wallet's business; this crate
//! only calls it.

pub mod ocean;

use async_trait::async_trait;

use crate::types::{Trade, TradeReceipt};

#[derive(Debug, thiserror::Error)]
pub enum WalletError {
    #[error("Wallet request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Wallet returned {status}: {message}")]
    Rejected { status: u16, message: String },
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WalletService: Send + Sync {
    /// A fresh address for a new order to be funded at.
    async fn new_funding_address(&self) -> Result<String, WalletError>;

    /// Execute one trade. Returns once the wallet has accepted it.
    async fn execute_trade(&self, trade: &Trade) -> Result<TradeReceipt, WalletError>;
}
