//! Watcher scheduler.
//!
//! Runs a unit of work, sleeps for the configured interval, repeats. The
//! sleep starts after the work finishes, so passes never overlap and drift
//! under load. A shutdown signal stops the loop, including mid-sleep.

use chrono::Utc;
use serde::Deserialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

use super::evaluator::{Evaluation, OrderEvaluator};
use super::WatchError;
use crate::storage::OrderStore;

/// What the loop does when a whole tick fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Log and try again next tick.
    Skip,
    /// Stop the loop and hand the error to the caller.
    #[default]
    Terminate,
}

/// Counts of per-order outcomes within one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub orders: usize,
    pub awaiting: usize,
    pub expired: usize,
    pub fulfilled: usize,
    pub trades: usize,
    pub superseded: usize,
    pub settled: usize,
    pub failed: usize,
}

impl TickReport {
    fn record(&mut self, outcome: &Evaluation) {
        match outcome {
            Evaluation::Settled(_) => self.settled += 1,
            Evaluation::Expired => self.expired += 1,
            Evaluation::AwaitingFunds { .. } => self.awaiting += 1,
            Evaluation::Superseded => self.superseded += 1,
            Evaluation::Fulfilled { trades } => {
                self.fulfilled += 1;
                self.trades += trades.len();
            }
        }
    }
}

/// Call `work`, then sleep `interval`, until `shutdown` flips to `true`
/// (or its sender is dropped). An error from `work` ends the loop.
pub async fn start_watching<F, Fut, E>(
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
    mut work: F,
) -> Result<(), E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), E>>,
{
    loop {
        if *shutdown.borrow() {
            return Ok(());
        }

        work().await?;

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return Ok(());
                }
            }
        }
    }
}

/// Periodically evaluates every order that still needs work.
pub struct Watcher {
    store: Arc<dyn OrderStore>,
    evaluator: OrderEvaluator,
    interval: Duration,
    policy: FailurePolicy,
}

impl Watcher {
    pub fn new(
        store: Arc<dyn OrderStore>,
        evaluator: OrderEvaluator,
        interval: Duration,
        policy: FailurePolicy,
    ) -> Self {
        Self {
            store,
            evaluator,
            interval,
            policy,
        }
    }

    /// One pass over all pending orders, sequentially. A failing order is
    /// logged and counted; it never stops the others.
    pub async fn tick(&self) -> Result<TickReport, WatchError> {
        let records = self
            .store
            .fetch_orders_to_fulfill()
            .await
            .map_err(WatchError::FetchPending)?;
        info!(count = records.len(), "Pending orders");

        let mut report = TickReport {
            orders: records.len(),
            ..TickReport::default()
        };

        for record in &records {
            match self.evaluator.evaluate(record, Utc::now()).await {
                Ok(outcome) => report.record(&outcome),
                Err(e) => {
                    report.failed += 1;
                    warn!(order_id = %record.order.id, error = %e, "Error in fulfilling order");
                }
            }
        }

        Ok(report)
    }

    /// Tick until shutdown. Returns `Err` only under
    /// [`FailurePolicy::Terminate`] when a tick fails.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<(), WatchError> {
        info!(
            interval_secs = self.interval.as_secs(),
            policy = ?self.policy,
            "Watcher service started"
        );

        let this = self;
        let result = start_watching(self.interval, shutdown, move || async move {
            match this.tick().await {
                Ok(report) => {
                    log_tick_report(&report);
                    Ok(())
                }
                Err(e) if this.policy == FailurePolicy::Skip => {
                    error!(error = %e, "Tick failed, waiting for next tick");
                    Ok(())
                }
                Err(e) => Err(e),
            }
        })
        .await;

        match &result {
            Ok(()) => info!("Watcher stopped"),
            Err(e) => error!(error = %e, "Watcher terminated"),
        }
        result
    }
}

fn log_tick_report(report: &TickReport) {
    if report.orders == 0 {
        return;
    }
    info!(
        orders = report.orders,
        awaiting = report.awaiting,
        expired = report.expired,
        fulfilled = report.fulfilled,
        trades = report.trades,
        superseded = report.superseded,
        failed = report.failed,
        "Tick complete"
    );
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
