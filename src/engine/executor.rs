//! Trade executor.
//!
//! Builds one trade per funding output and executes them one after another
//! against the wallet service. The first failure aborts the batch; trades
//! already executed stay executed.
//!
//! Each output carries a persisted execution marker (`executing` before the
//! wallet call, `executed` after) so that a retried batch skips outputs it
//! already consumed and refuses to guess about an interrupted call.

use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::{BatchError, ExecutedTrade, TradeError};
use crate::chain::ChainClient;
use crate::storage::{ExecutionState, OrderStore, StoreError};
use crate::types::{Order, Trade, TradeStatus, Utxo};
use crate::wallet::WalletService;

pub struct TradeExecutor {
    chain: Arc<dyn ChainClient>,
    wallet: Arc<dyn WalletService>,
    store: Arc<dyn OrderStore>,
}

impl TradeExecutor {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        wallet: Arc<dyn WalletService>,
        store: Arc<dyn OrderStore>,
    ) -> Self {
        Self {
            chain,
            wallet,
            store,
        }
    }

    /// Execute a trade for every output in `unspents`, in the given order.
    ///
    /// Outputs already executed in an earlier pass are skipped. On success
    /// the trades executed in this pass are returned.
    pub async fn execute(
        &self,
        order: &Order,
        unspents: &[Utxo],
    ) -> Result<Vec<ExecutedTrade>, BatchError> {
        info!(order_id = %order.id, count = unspents.len(), "Executing trades");

        let mut executed = Vec::with_capacity(unspents.len());
        for unspent in unspents {
            match self.execute_one(order, unspent).await {
                Ok(Some(trade)) => executed.push(trade),
                Ok(None) => {}
                Err(StepError { settled, source }) => {
                    executed.extend(settled);
                    warn!(
                        order_id = %order.id,
                        executed = executed.len(),
                        error = %source,
                        "Trade batch aborted"
                    );
                    return Err(BatchError { executed, source });
                }
            }
        }

        info!(order_id = %order.id, executed = executed.len(), "Batch execution complete");
        Ok(executed)
    }

    async fn execute_one(
        &self,
        order: &Order,
        unspent: &Utxo,
    ) -> Result<Option<ExecutedTrade>, StepError> {
        let outpoint = unspent.outpoint();

        match self.store.execution_state(&order.id, &outpoint).await? {
            Some(ExecutionState::Executed) => {
                debug!(order_id = %order.id, outpoint = %outpoint, "Already executed, skipping");
                return Ok(None);
            }
            Some(ExecutionState::Executing) => return Err(TradeError::OutcomeUnknown(outpoint).into()),
            None => {}
        }

        let prevout = self
            .chain
            .fetch_prevout(&unspent.txid, unspent.vout)
            .await
            .map_err(|source| TradeError::Prevout {
                outpoint: outpoint.clone(),
                source,
            })?;

        let mut funded = unspent.clone();
        funded.prevout = Some(prevout);

        let trade = Trade::from_funded_order(order, &funded);
        if trade.status != TradeStatus::Funded {
            return Err(TradeError::NotFunded(outpoint).into());
        }

        if !self.store.mark_executing(&order.id, &funded).await? {
            return Err(TradeError::OutcomeUnknown(outpoint).into());
        }

        match self.wallet.execute_trade(&trade).await {
            Ok(receipt) => {
                info!(
                    order_id = %order.id,
                    outpoint = %outpoint,
                    txid = %receipt.txid,
                    "Executed trade for order"
                );
                let done = ExecutedTrade { trade, receipt };
                if let Err(e) = self.store.mark_executed(&order.id, &outpoint).await {
                    error!(
                        order_id = %order.id,
                        outpoint = %outpoint,
                        txid = %done.receipt.txid,
                        error = %e,
                        "Failed to record executed trade"
                    );
                    return Err(StepError {
                        settled: Some(done),
                        source: e.into(),
                    });
                }
                Ok(Some(done))
            }
            Err(source) => {
                if let Err(e) = self.store.clear_execution(&order.id, &outpoint).await {
                    error!(order_id = %order.id, outpoint = %outpoint, error = %e, "Failed to clear execution marker");
                }
                Err(TradeError::Wallet { outpoint, source }.into())
            }
        }
    }
}

/// A failed step, with the trade the wallet accepted if the failure came
/// after it.
struct StepError {
    settled: Option<ExecutedTrade>,
    source: TradeError,
}

impl From<TradeError> for StepError {
    fn from(source: TradeError) -> Self {
        Self {
            settled: None,
            source,
        }
    }
}

impl From<StoreError> for StepError {
    fn from(e: StoreError) -> Self {
        TradeError::from(e).into()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
