//! Per-order evaluation.
//!
//! One pass over one order, in fixed order:
//! 1. terminal orders are left alone (no chain or wallet calls)
//! 2. expiry: a `Pending` order past the window becomes `Expired` and the
//!    pass ends there. Expiry is terminal; funding that arrives later is
//!    never acted on. `Funded` orders do not expire, nor do `Pending` ones
//!    with trades already executed.
//! 3. unspent retrieval
//! 4. funding check
//! 5. `Pending → Funded`
//! 6. trade execution
//! 7. `Funded → Fulfilled`, only when every trade went through
//!
//! Status write failures are logged and do not abort the pass. A write the
//! store refuses because the persisted status moved underneath us (e.g. a
//! manual edit) stops the pass.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::executor::TradeExecutor;
use super::funding::{funding_sufficient, total_value};
use super::{EvaluationError, ExecutedTrade};
use crate::chain::ChainClient;
use crate::storage::OrderStore;
use crate::types::{Order, OrderRecord, OrderStatus, Utxo};
use crate::wallet::WalletService;

/// Default time an order may stay unfunded.
pub const DEFAULT_EXPIRY: Duration = Duration::from_secs(10 * 60);

/// Outcome of one evaluation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evaluation {
    /// Already `Expired` or `Fulfilled`; nothing to do.
    Settled(OrderStatus),
    /// Marked `Expired` in this pass.
    Expired,
    AwaitingFunds { received: u64, required: u64 },
    /// The store refused a transition because the status moved.
    Superseded,
    /// Every trade executed; `trades` holds the ones from this pass.
    Fulfilled { trades: Vec<ExecutedTrade> },
}

pub struct OrderEvaluator {
    chain: Arc<dyn ChainClient>,
    store: Arc<dyn OrderStore>,
    executor: TradeExecutor,
    expiry: chrono::Duration,
}

impl OrderEvaluator {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        wallet: Arc<dyn WalletService>,
        store: Arc<dyn OrderStore>,
        expiry: Duration,
    ) -> Self {
        let executor = TradeExecutor::new(chain.clone(), wallet, store.clone());
        Self {
            chain,
            store,
            executor,
            expiry: chrono::Duration::from_std(expiry).unwrap_or(chrono::Duration::MAX),
        }
    }

    /// Run one pass over `record` as of `now`.
    pub async fn evaluate(
        &self,
        record: &OrderRecord,
        now: DateTime<Utc>,
    ) -> Result<Evaluation, EvaluationError> {
        let order = &record.order;
        let mut status = record.status;
        debug!(order_id = %order.id, address = %order.address, status = %status, "Watching");

        if status.is_terminal() {
            return Ok(Evaluation::Settled(status));
        }

        if status == OrderStatus::Pending && order.is_expired_at(now, self.expiry) {
            if self.partly_settled(order).await? {
                // Trades went out while the Funded write was failing.
                warn!(order_id = %order.id, "Order past expiry but already partly settled, continuing");
            } else {
                info!(order_id = %order.id, created = %order.timestamp, "Order expired");
                self.transition(order, OrderStatus::Expired).await;
                return Ok(Evaluation::Expired);
            }
        }

        let unspents = self
            .chain
            .fetch_unspents(&order.address)
            .await
            .map_err(EvaluationError::Unspents)?;

        let counted = self.with_executed(order, &unspents).await?;
        let received = total_value(&counted);
        if !funding_sufficient(&counted, order.input.amount) {
            debug!(order_id = %order.id, received, required = order.input.amount, "Awaiting funds");
            return Ok(Evaluation::AwaitingFunds {
                received,
                required: order.input.amount,
            });
        }

        if status == OrderStatus::Pending {
            match self.transition(order, OrderStatus::Funded).await {
                Some(true) => status = OrderStatus::Funded,
                Some(false) => return Ok(Evaluation::Superseded),
                None => {}
            }
        }

        let trades = self.executor.execute(order, &unspents).await?;

        // The Funded write may have failed above; Fulfilled only follows Funded.
        if status == OrderStatus::Pending {
            self.transition(order, OrderStatus::Funded).await;
        }
        self.transition(order, OrderStatus::Fulfilled).await;

        Ok(Evaluation::Fulfilled { trades })
    }

    async fn partly_settled(&self, order: &Order) -> Result<bool, EvaluationError> {
        let executed = self
            .store
            .fetch_executed_unspents(&order.id)
            .await
            .map_err(EvaluationError::Store)?;
        Ok(!executed.is_empty())
    }

    /// Current unspents plus outputs this order already consumed in earlier
    /// passes, so a partially settled order still counts as funded.
    async fn with_executed(
        &self,
        order: &Order,
        unspents: &[Utxo],
    ) -> Result<Vec<Utxo>, EvaluationError> {
        let executed = self
            .store
            .fetch_executed_unspents(&order.id)
            .await
            .map_err(EvaluationError::Store)?;

        let mut counted = unspents.to_vec();
        for spent in executed {
            if !counted.iter().any(|u| u.outpoint() == spent.outpoint()) {
                counted.push(spent);
            }
        }
        Ok(counted)
    }

    /// Request a status transition. `None` when the write itself failed.
    async fn transition(&self, order: &Order, status: OrderStatus) -> Option<bool> {
        match self.store.update_order_status(&order.id, status).await {
            Ok(true) => {
                info!(order_id = %order.id, status = %status, "Order status updated");
                Some(true)
            }
            Ok(false) => {
                warn!(order_id = %order.id, status = %status, "Status transition refused, persisted status has moved");
                Some(false)
            }
            Err(e) => {
                error!(order_id = %order.id, status = %status, error = %e, "Error updating order status");
                None
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
