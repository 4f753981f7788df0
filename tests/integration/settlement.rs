//! Settlement scenarios driven through the watcher tick by tick.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tower::ServiceExt;

use swapwatch::api::{build_router, ApiState};
use swapwatch::engine::evaluator::{OrderEvaluator, DEFAULT_EXPIRY};
use swapwatch::engine::scheduler::{FailurePolicy, Watcher};
use swapwatch::storage::sqlite::SqliteStore;
use swapwatch::storage::OrderStore;
use swapwatch::types::{Order, OrderStatus, USDT_ASSET};

use crate::mock_services::{MockChain, MockWallet};

struct Harness {
    store: Arc<SqliteStore>,
    chain: Arc<MockChain>,
    wallet: Arc<MockWallet>,
}

impl Harness {
    async fn new() -> Self {
        Self {
            store: Arc::new(SqliteStore::in_memory().await.unwrap()),
            chain: Arc::new(MockChain::new()),
            wallet: Arc::new(MockWallet::new()),
        }
    }

    fn watcher(&self, interval: Duration) -> Watcher {
        let evaluator = OrderEvaluator::new(
            self.chain.clone(),
            self.wallet.clone(),
            self.store.clone(),
            DEFAULT_EXPIRY,
        );
        Watcher::new(self.store.clone(), evaluator, interval, FailurePolicy::Terminate)
    }

    /// Persist a 0.0005 L-BTC -> 30 USDt order on `address`.
    async fn place(&self, address: &str, age: ChronoDuration) -> Order {
        let order = Order::new(address, "0014beef", "L-BTC", "0.0005", "USDt", "30", Utc::now() - age)
            .unwrap();
        self.store.save_order(&order).await.unwrap();
        order
    }

    async fn status(&self, id: &str) -> OrderStatus {
        self.store.fetch_order_by_id(id).await.unwrap().unwrap().status
    }
}

#[tokio::test]
async fn test_order_funded_in_two_payments() {
    let h = Harness::new().await;
    let watcher = h.watcher(Duration::from_millis(10));
    let order = h.place("ex1qtwo", ChronoDuration::zero()).await;

    h.chain.fund("ex1qtwo", "aa01", 20_000);
    let report = watcher.tick().await.unwrap();
    assert_eq!(report.awaiting, 1);
    assert_eq!(h.status(&order.id).await, OrderStatus::Pending);
    assert!(h.wallet.executed().is_empty());

    h.chain.fund("ex1qtwo", "aa02", 30_000);
    let report = watcher.tick().await.unwrap();
    assert_eq!(report.fulfilled, 1);
    assert_eq!(report.trades, 2);
    assert_eq!(h.status(&order.id).await, OrderStatus::Fulfilled);

    let trades = h.wallet.executed();
    let outputs: Vec<u64> = trades.iter().map(|t| t.terms.output.amount).collect();
    assert_eq!(outputs, vec![1_200_000_000, 1_800_000_000]);
    assert!(trades.iter().all(|t| t.terms.output.asset == USDT_ASSET));
    assert!(trades.iter().all(|t| t.terms.trader_script == "0014beef"));

    // Fulfilled orders drop out of the watch set.
    let report = watcher.tick().await.unwrap();
    assert_eq!(report.orders, 0);
    assert_eq!(h.wallet.executed().len(), 2);
}

#[tokio::test]
async fn test_partial_failure_resumes_without_duplicates() {
    let h = Harness::new().await;
    let watcher = h.watcher(Duration::from_millis(10));
    let order = h.place("ex1qpartial", ChronoDuration::zero()).await;
    h.chain.fund("ex1qpartial", "bb01", 25_000);
    h.chain.fund("ex1qpartial", "bb02", 25_000);
    h.wallet.reject_after(1, 1);

    let report = watcher.tick().await.unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(h.status(&order.id).await, OrderStatus::Funded);
    assert_eq!(h.wallet.executed().len(), 1);

    // The wallet spent the first output; it no longer shows as unspent.
    h.chain.spend("ex1qpartial", "bb01");

    let report = watcher.tick().await.unwrap();
    assert_eq!(report.fulfilled, 1);
    assert_eq!(report.trades, 1);
    assert_eq!(h.status(&order.id).await, OrderStatus::Fulfilled);

    let funded: Vec<String> = h
        .wallet
        .executed()
        .iter()
        .map(|t| t.terms.funding.txid.clone())
        .collect();
    assert_eq!(funded, vec!["bb01", "bb02"]);
}

#[tokio::test]
async fn test_stale_order_expires_without_chain_calls() {
    let h = Harness::new().await;
    let watcher = h.watcher(Duration::from_millis(10));
    let order = h.place("ex1qstale", ChronoDuration::minutes(11)).await;

    let report = watcher.tick().await.unwrap();
    assert_eq!(report.expired, 1);
    assert_eq!(h.status(&order.id).await, OrderStatus::Expired);
    assert_eq!(h.chain.calls(), 0);

    // Late funds are never traded.
    h.chain.fund("ex1qstale", "cc01", 50_000);
    let report = watcher.tick().await.unwrap();
    assert_eq!(report.orders, 0);
    assert!(h.wallet.executed().is_empty());
    assert_eq!(h.status(&order.id).await, OrderStatus::Expired);
}

#[tokio::test]
async fn test_explorer_outage_leaves_orders_pending() {
    let h = Harness::new().await;
    let watcher = h.watcher(Duration::from_millis(10));
    let first = h.place("ex1qout1", ChronoDuration::zero()).await;
    let second = h.place("ex1qout2", ChronoDuration::zero()).await;
    h.chain.fund("ex1qout1", "dd01", 50_000);
    h.chain.fund("ex1qout2", "dd02", 60_000);

    h.chain.set_down(true);
    let report = watcher.tick().await.unwrap();
    assert_eq!(report.failed, 2);
    assert_eq!(h.status(&first.id).await, OrderStatus::Pending);
    assert_eq!(h.status(&second.id).await, OrderStatus::Pending);

    h.chain.set_down(false);
    let report = watcher.tick().await.unwrap();
    assert_eq!(report.fulfilled, 2);
    assert_eq!(h.status(&first.id).await, OrderStatus::Fulfilled);
    assert_eq!(h.status(&second.id).await, OrderStatus::Fulfilled);
}

#[tokio::test]
async fn test_offer_lifecycle_over_http() {
    let h = Harness::new().await;
    let watcher = h.watcher(Duration::from_millis(10));
    let app = build_router(Arc::new(ApiState {
        store: h.store.clone(),
        chain: h.chain.clone(),
        wallet: h.wallet.clone(),
    }));

    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/offer")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(
                    "input=0.0005&output=30&inputCurrency=L-BTC&outputCurrency=USDt&traderScript=0014beef",
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    let location = resp.headers()[header::LOCATION].to_str().unwrap().to_string();

    let view = get_json(&app, &location).await;
    assert_eq!(view["status"], "Pending");
    let address = view["address"].as_str().unwrap().to_string();
    assert_eq!(address, "ex1qmock0000");

    h.chain.fund(&address, "ee01", 50_000);
    watcher.tick().await.unwrap();

    let view = get_json(&app, &location).await;
    assert_eq!(view["status"], "Fulfilled");
    assert_eq!(view["transactions"].as_array().unwrap().len(), 1);
    assert_eq!(view["transactions"][0]["txid"], "ee01");

    let resp = app
        .oneshot(
            Request::builder()
                .uri(format!("/offer/address/{address}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(resp.headers()[header::LOCATION].to_str().unwrap(), location);
}

#[tokio::test]
async fn test_watcher_run_settles_and_stops() {
    let h = Harness::new().await;
    let watcher = h.watcher(Duration::from_millis(10));
    let order = h.place("ex1qrun", ChronoDuration::zero()).await;

    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(async move { watcher.run(rx).await });

    h.chain.fund("ex1qrun", "ff01", 50_000);
    let mut status = OrderStatus::Pending;
    for _ in 0..100 {
        status = h.status(&order.id).await;
        if status == OrderStatus::Fulfilled {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(status, OrderStatus::Fulfilled);

    tx.send(true).unwrap();
    let result = tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("watcher did not stop")
        .unwrap();
    assert!(result.is_ok());
    assert_eq!(h.wallet.executed().len(), 1);
}

async fn get_json(app: &axum::Router, uri: &str) -> serde_json::Value {
    let resp = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = axum::body::to_bytes(resp.into_body(), 100_000).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}
