//! HTTP client for the Ocean wallet gateway.
//!
//! Endpoints:
//! - `POST /v1/address` → `{"address": "..."}`
//! - `POST /v1/trade` with a JSON `Trade` → `{"txid": "..."}`
//!
//! Errors come back as non-2xx with `{"error": "..."}` (or a plain body).
//! Auth: optional `Authorization: Bearer {token}`.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

use super::{WalletError, WalletService};
use crate::types::{Trade, TradeReceipt};

pub const DEFAULT_ENDPOINT: &str = "localhost:18000";

#[derive(Debug, Deserialize)]
struct AddressResponse {
    address: String,
}

#[derive(Debug, Deserialize)]
struct TradeResponse {
    txid: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

pub struct OceanClient {
    http: Client,
    base_url: String,
    token: Option<Secret<String>>,
}

impl OceanClient {
    /// Build a client for the wallet at `endpoint`. A bare `host:port` is
    /// treated as plain HTTP.
    pub fn new(
        endpoint: &str,
        token: Option<Secret<String>>,
        timeout: Duration,
    ) -> Result<Self, WalletError> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("swapwatch/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url: normalize_endpoint(endpoint),
            token,
        })
    }

    fn post(&self, path: &str) -> RequestBuilder {
        let req = self.http.post(format!("{}{}", self.base_url, path));
        match &self.token {
            Some(token) => req.bearer_auth(token.expose_secret()),
            None => req,
        }
    }
}

fn normalize_endpoint(endpoint: &str) -> String {
    let endpoint = endpoint.trim().trim_end_matches('/');
    let endpoint = if endpoint.is_empty() { DEFAULT_ENDPOINT } else { endpoint };
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint.to_string()
    } else {
        format!("http://{endpoint}")
    }
}

async fn check(resp: Response) -> Result<Response, WalletError> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorResponse>(&body)
        .map(|e| e.error)
        .unwrap_or(body);
    Err(WalletError::Rejected { status, message })
}

#[async_trait]
impl WalletService for OceanClient {
    async fn new_funding_address(&self) -> Result<String, WalletError> {
        let resp = check(self.post("/v1/address").send().await?).await?;
        let body: AddressResponse = resp.json().await?;
        debug!(address = %body.address, "Derived funding address");
        Ok(body.address)
    }

    async fn execute_trade(&self, trade: &Trade) -> Result<TradeReceipt, WalletError> {
        let resp = check(self.post("/v1/trade").json(trade).send().await?).await?;
        let body: TradeResponse = resp.json().await?;
        info!(
            order_id = %trade.order_id,
            funding = %trade.terms.funding,
            txid = %body.txid,
            "Trade executed"
        );
        Ok(TradeReceipt { txid: body.txid })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
