//! In-memory chain and wallet services for integration testing.
//!
//! Deterministic stand-ins for the explorer and the wallet daemon. Funding
//! is simulated by pushing outputs onto an address; the wallet records every
//! trade it accepts and can be told to reject the next N calls.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use swapwatch::chain::{ChainClient, ChainError};
use swapwatch::types::{Prevout, Trade, TradeReceipt, TxHistoryEntry, Utxo, LBTC_ASSET};
use swapwatch::wallet::{WalletError, WalletService};

// ---------------------------------------------------------------------------
// Chain
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MockChain {
    unspents: Mutex<HashMap<String, Vec<Utxo>>>,
    prevouts: Mutex<HashMap<(String, u32), Prevout>>,
    calls: AtomicUsize,
    down: Mutex<bool>,
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pay `value` L-BTC to `address` in a transaction named `txid`.
    pub fn fund(&self, address: &str, txid: &str, value: u64) {
        self.unspents
            .lock()
            .unwrap()
            .entry(address.to_string())
            .or_default()
            .push(Utxo {
                txid: txid.to_string(),
                vout: 0,
                value,
                prevout: None,
            });
        self.prevouts.lock().unwrap().insert(
            (txid.to_string(), 0),
            Prevout {
                script_pubkey: format!("0014{txid}"),
                value: Some(value),
                asset: Some(LBTC_ASSET.to_string()),
            },
        );
    }

    /// Remove an output from the unspent set, as if the wallet spent it.
    pub fn spend(&self, address: &str, txid: &str) {
        if let Some(list) = self.unspents.lock().unwrap().get_mut(address) {
            list.retain(|u| u.txid != txid);
        }
    }

    pub fn set_down(&self, down: bool) {
        *self.down.lock().unwrap() = down;
    }

    /// Number of calls made against the chain so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn enter(&self) -> Result<(), ChainError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if *self.down.lock().unwrap() {
            return Err(ChainError::Status {
                status: 503,
                body: "explorer unavailable".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn fetch_unspents(&self, address: &str) -> Result<Vec<Utxo>, ChainError> {
        self.enter()?;
        Ok(self
            .unspents
            .lock()
            .unwrap()
            .get(address)
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_prevout(&self, txid: &str, vout: u32) -> Result<Prevout, ChainError> {
        self.enter()?;
        self.prevouts
            .lock()
            .unwrap()
            .get(&(txid.to_string(), vout))
            .cloned()
            .ok_or_else(|| ChainError::OutputNotFound {
                txid: txid.to_string(),
                vout,
            })
    }

    async fn fetch_transaction_history(&self, address: &str) -> Result<Vec<TxHistoryEntry>, ChainError> {
        self.enter()?;
        Ok(self
            .unspents
            .lock()
            .unwrap()
            .get(address)
            .map(|list| {
                list.iter()
                    .map(|u| TxHistoryEntry {
                        txid: u.txid.clone(),
                        confirmed: false,
                        block_hash: None,
                        block_time: None,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// Wallet
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MockWallet {
    next_address: AtomicUsize,
    executed: Mutex<Vec<Trade>>,
    /// Reject this many upcoming `execute_trade` calls.
    reject_next: AtomicUsize,
    /// Reject only once this many trades have been accepted.
    accept_before_reject: Mutex<Option<usize>>,
}

impl MockWallet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject `count` trades once `after` trades have been accepted.
    pub fn reject_after(&self, after: usize, count: usize) {
        *self.accept_before_reject.lock().unwrap() = Some(after);
        self.reject_next.store(count, Ordering::SeqCst);
    }

    pub fn executed(&self) -> Vec<Trade> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl WalletService for MockWallet {
    async fn new_funding_address(&self) -> Result<String, WalletError> {
        let n = self.next_address.fetch_add(1, Ordering::SeqCst);
        Ok(format!("ex1qmock{n:04}"))
    }

    async fn execute_trade(&self, trade: &Trade) -> Result<TradeReceipt, WalletError> {
        let mut executed = self.executed.lock().unwrap();
        let threshold = *self.accept_before_reject.lock().unwrap();
        if threshold.is_some_and(|after| executed.len() >= after)
            && self.reject_next.load(Ordering::SeqCst) > 0
        {
            self.reject_next.fetch_sub(1, Ordering::SeqCst);
            return Err(WalletError::Rejected {
                status: 500,
                message: "insufficient counterparty liquidity".into(),
            });
        }
        executed.push(trade.clone());
        Ok(TradeReceipt {
            txid: format!("settle-{}", trade.terms.funding.txid),
        })
    }
}
