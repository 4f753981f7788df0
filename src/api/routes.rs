//! API route handlers.
//!
//! Reads return JSON; order creation and address lookup answer with a
//! 303 redirect to the order's page. State is shared via `Arc<ApiState>`.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Form, Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::chain::{ChainClient, ChainError};
use crate::storage::{OrderStore, StoreError};
use crate::types::{Currency, Order, OrderError, TxHistoryEntry};
use crate::wallet::{WalletError, WalletService};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Services the handlers reach. No mutable state of its own.
pub struct ApiState {
    pub store: Arc<dyn OrderStore>,
    pub chain: Arc<dyn ChainClient>,
    pub wallet: Arc<dyn WalletService>,
}

pub type AppState = Arc<ApiState>;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Offer not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    InvalidOrder(#[from] OrderError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Wallet(#[from] WalletError),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::InvalidOrder(_) => StatusCode::BAD_REQUEST,
            ApiError::Store(StoreError::DuplicateAddress(_)) => StatusCode::CONFLICT,
            ApiError::Store(_) | ApiError::Chain(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Wallet(_) => StatusCode::BAD_GATEWAY,
        };
        if status.is_server_error() {
            warn!(error = %self, "API request failed");
        }
        let body = ErrorResponse {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferForm {
    pub input: String,
    pub output: String,
    pub input_currency: String,
    pub output_currency: String,
    pub trader_script: String,
}

#[derive(Debug, Serialize)]
pub struct OfferView {
    pub id: String,
    pub address: String,
    pub input_value: String,
    pub input_currency: String,
    pub output_value: String,
    pub output_currency: String,
    pub input_asset_hash: String,
    pub input_amount: u64,
    pub status: String,
    pub date: String,
    pub transactions: Vec<TransactionView>,
}

#[derive(Debug, Serialize)]
pub struct TransactionView {
    pub txid: String,
    pub txid_short: String,
    pub confirmed: bool,
    pub date: Option<String>,
    pub block_hash: Option<String>,
    pub block_time: Option<i64>,
}

impl From<TxHistoryEntry> for TransactionView {
    fn from(tx: TxHistoryEntry) -> Self {
        Self {
            txid_short: tx.txid_short(),
            date: tx.date(),
            txid: tx.txid,
            confirmed: tx.confirmed,
            block_hash: tx.block_hash,
            block_time: tx.block_time,
        }
    }
}

fn ticker(asset: &str) -> String {
    Currency::from_asset(asset)
        .map(|c| c.ticker().to_string())
        .unwrap_or_else(|| asset.to_string())
}

fn offer_location(id: &str) -> String {
    format!("/offer/{}", urlencoding::encode(id))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// POST /api/offer: take a fresh funding address and persist a `Pending`
/// order for it.
pub async fn create_offer(
    State(state): State<AppState>,
    Form(form): Form<OfferForm>,
) -> Result<Redirect, ApiError> {
    let address = state.wallet.new_funding_address().await?;
    let order = Order::new(
        &address,
        &form.trader_script,
        &form.input_currency,
        &form.input,
        &form.output_currency,
        &form.output,
        Utc::now(),
    )?;
    state.store.save_order(&order).await?;

    info!(
        order_id = %order.id,
        address = %order.address,
        input = %order.input_value(),
        output = %order.output_value(),
        "Order created"
    );
    Ok(Redirect::to(&offer_location(&order.id)))
}

/// GET /offer/address/:address
pub async fn offer_by_address(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Redirect, ApiError> {
    match state.store.fetch_order_id_by_address(&address).await? {
        Some(id) => Ok(Redirect::to(&offer_location(&id))),
        None => Err(ApiError::NotFound(address)),
    }
}

/// GET /offer/:id
pub async fn get_offer(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<OfferView>, ApiError> {
    let record = state
        .store
        .fetch_order_by_id(&id)
        .await?
        .ok_or(ApiError::NotFound(id))?;
    let order = record.order;

    let transactions = state
        .chain
        .fetch_transaction_history(&order.address)
        .await?
        .into_iter()
        .map(TransactionView::from)
        .collect();

    Ok(Json(OfferView {
        input_value: order.input_value().to_string(),
        input_currency: ticker(&order.input.asset),
        output_value: order.output_value().to_string(),
        output_currency: ticker(&order.output.asset),
        input_amount: order.input.amount,
        date: order.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
        status: record.status.to_string(),
        transactions,
        input_asset_hash: order.input.asset,
        address: order.address,
        id: order.id,
    }))
}
