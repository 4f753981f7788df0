//! Shared types for the swap watcher.
//!
//! These types form the data model used across all modules: orders and
//! their persisted status, ledger outputs, and the ephemeral trades built
//! from them. Storage, chain, wallet, and engine modules all depend on
//! this file and nothing else in the crate.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Currency
// ---------------------------------------------------------------------------

/// Liquid Bitcoin asset id.
pub const LBTC_ASSET: &str = "6f0279e9ed041c3d710a9f57d0c02928416460c4b722ae3457a11eec381c526d";
/// Tether USD asset id on Liquid.
pub const USDT_ASSET: &str = "ce091c998b83c78bb71a632313ba3760f1763d9cfcffae02258ffa9865a37bd2";

/// Decimal places used when an asset is not one of the known currencies.
const DEFAULT_PRECISION: u32 = 8;

/// A currency accepted by order intake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Currency {
    Lbtc,
    Usdt,
}

impl Currency {
    pub fn ticker(&self) -> &'static str {
        match self {
            Currency::Lbtc => "L-BTC",
            Currency::Usdt => "USDt",
        }
    }

    pub fn asset_id(&self) -> &'static str {
        match self {
            Currency::Lbtc => LBTC_ASSET,
            Currency::Usdt => USDT_ASSET,
        }
    }

    /// Number of decimal places between the display unit and the
    /// smallest on-chain unit.
    pub fn precision(&self) -> u32 {
        8
    }

    /// Look a currency up by its asset id.
    pub fn from_asset(asset: &str) -> Option<Self> {
        match asset {
            LBTC_ASSET => Some(Currency::Lbtc),
            USDT_ASSET => Some(Currency::Usdt),
            _ => None,
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.ticker())
    }
}

impl FromStr for Currency {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "L-BTC" | "LBTC" => Ok(Currency::Lbtc),
            "USDT" => Ok(Currency::Usdt),
            _ => Err(OrderError::UnknownCurrency(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Order
// ---------------------------------------------------------------------------

/// An asset amount in the asset's smallest unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Amount {
    pub asset: String,
    pub amount: u64,
}

impl Amount {
    /// The amount expressed in display units (e.g. 0.0005 L-BTC).
    pub fn to_decimal(&self) -> Decimal {
        let precision = Currency::from_asset(&self.asset)
            .map(|c| c.precision())
            .unwrap_or(DEFAULT_PRECISION);
        Decimal::from_i128_with_scale(self.amount as i128, precision).normalize()
    }
}

/// A swap request anchored to a funding address and an expiry clock.
///
/// The order's status lives in the store, not here; see [`OrderRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    /// Address the trader funds. Unique per order.
    pub address: String,
    /// Hex script the counterparty output pays to.
    pub trader_script: String,
    /// Creation time, anchor of the expiry window.
    pub timestamp: DateTime<Utc>,
    /// Funding required before any trade executes.
    pub input: Amount,
    /// What the counterparty sends back for the full input.
    pub output: Amount,
}

impl Order {
    /// Build a new order from intake values.
    ///
    /// `input_value` and `output_value` are decimal strings in display units.
    pub fn new(
        address: &str,
        trader_script: &str,
        input_currency: &str,
        input_value: &str,
        output_currency: &str,
        output_value: &str,
        now: DateTime<Utc>,
    ) -> Result<Self, OrderError> {
        if address.trim().is_empty() {
            return Err(OrderError::MissingAddress);
        }
        let trader_script = trader_script.trim();
        if !is_hex(trader_script) {
            return Err(OrderError::InvalidScript(trader_script.to_string()));
        }

        let input_currency: Currency = input_currency.parse()?;
        let output_currency: Currency = output_currency.parse()?;
        if input_currency == output_currency {
            return Err(OrderError::SameCurrency(input_currency.to_string()));
        }

        let input = to_units(input_value, input_currency.precision())?;
        let output = to_units(output_value, output_currency.precision())?;

        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            address: address.trim().to_string(),
            trader_script: trader_script.to_lowercase(),
            timestamp: now,
            input: Amount {
                asset: input_currency.asset_id().to_string(),
                amount: input,
            },
            output: Amount {
                asset: output_currency.asset_id().to_string(),
                amount: output,
            },
        })
    }

    /// Whether more than `window` has elapsed since the order was created.
    pub fn is_expired_at(&self, now: DateTime<Utc>, window: chrono::Duration) -> bool {
        now - self.timestamp > window
    }

    pub fn input_value(&self) -> Decimal {
        self.input.to_decimal()
    }

    pub fn output_value(&self) -> Decimal {
        self.output.to_decimal()
    }
}

/// Convert a display-unit decimal string into smallest units.
fn to_units(value: &str, precision: u32) -> Result<u64, OrderError> {
    let parsed = Decimal::from_str(value.trim())
        .map_err(|_| OrderError::InvalidAmount(value.to_string()))?;
    if parsed <= Decimal::ZERO {
        return Err(OrderError::InvalidAmount(value.to_string()));
    }

    let scaled = parsed
        .checked_mul(Decimal::from(10u64.pow(precision)))
        .ok_or_else(|| OrderError::InvalidAmount(value.to_string()))?;
    if !scaled.fract().is_zero() {
        return Err(OrderError::TooPrecise {
            value: value.to_string(),
            precision,
        });
    }

    scaled
        .to_u64()
        .ok_or_else(|| OrderError::InvalidAmount(value.to_string()))
}

fn is_hex(s: &str) -> bool {
    !s.is_empty() && s.len() % 2 == 0 && s.chars().all(|c| c.is_ascii_hexdigit())
}

// ---------------------------------------------------------------------------
// Order status
// ---------------------------------------------------------------------------

/// Persisted order status.
///
/// `Pending → Funded → Fulfilled`, or `Pending → Expired`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Funded,
    Fulfilled,
    Expired,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "Pending",
            OrderStatus::Funded => "Funded",
            OrderStatus::Fulfilled => "Fulfilled",
            OrderStatus::Expired => "Expired",
        }
    }

    /// Statuses from which a transition into `self` is allowed.
    pub fn predecessors(&self) -> &'static [OrderStatus] {
        match self {
            OrderStatus::Pending => &[],
            OrderStatus::Funded => &[OrderStatus::Pending],
            OrderStatus::Fulfilled => &[OrderStatus::Funded],
            OrderStatus::Expired => &[OrderStatus::Pending],
        }
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        next.predecessors().contains(self)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Fulfilled | OrderStatus::Expired)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(OrderStatus::Pending),
            "Funded" => Ok(OrderStatus::Funded),
            "Fulfilled" => Ok(OrderStatus::Fulfilled),
            "Expired" => Ok(OrderStatus::Expired),
            other => Err(format!("Unknown order status: {other}")),
        }
    }
}

/// An order together with its persisted status, as read from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRecord {
    pub order: Order,
    pub status: OrderStatus,
}

// ---------------------------------------------------------------------------
// Ledger outputs
// ---------------------------------------------------------------------------

/// Reference to a transaction output.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutPoint {
    pub txid: String,
    pub vout: u32,
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.txid, self.vout)
    }
}

/// Previous-transaction detail of an unspent output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prevout {
    pub script_pubkey: String,
    /// `None` for confidential outputs.
    pub value: Option<u64>,
    /// `None` for confidential outputs.
    pub asset: Option<String>,
}

/// An unspent output paying to an order's funding address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    pub txid: String,
    pub vout: u32,
    /// Value in the input asset's smallest unit.
    pub value: u64,
    /// Populated by the trade executor just before trade construction.
    pub prevout: Option<Prevout>,
}

impl Utxo {
    pub fn outpoint(&self) -> OutPoint {
        OutPoint {
            txid: self.txid.clone(),
            vout: self.vout,
        }
    }
}

/// A transaction touching an order's funding address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxHistoryEntry {
    pub txid: String,
    pub confirmed: bool,
    pub block_hash: Option<String>,
    /// Unix seconds.
    pub block_time: Option<i64>,
}

impl TxHistoryEntry {
    /// `abcdef...uvwxyz` form for compact display.
    pub fn txid_short(&self) -> String {
        let len = self.txid.len();
        match (self.txid.get(..6), self.txid.get(len.saturating_sub(6)..)) {
            (Some(head), Some(tail)) if len > 12 => format!("{head}...{tail}"),
            _ => self.txid.clone(),
        }
    }

    pub fn date(&self) -> Option<String> {
        self.block_time
            .and_then(|t| DateTime::<Utc>::from_timestamp(t, 0))
            .map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string())
    }
}

// ---------------------------------------------------------------------------
// Trade
// ---------------------------------------------------------------------------

/// Whether a trade is backed by a usable funding output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeStatus {
    Funded,
    Unfunded,
}

/// The executable swap payload handed to the wallet service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeTerms {
    pub funding: OutPoint,
    pub funding_script: Option<String>,
    pub input: Amount,
    pub output: Amount,
    pub trader_script: String,
}

/// One swap built from a funded order and a single unspent output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    pub order_id: String,
    pub status: TradeStatus,
    pub terms: TradeTerms,
}

impl Trade {
    /// Build the trade that consumes `unspent` on behalf of `order`.
    ///
    /// The output side is the order's output scaled by the share of the
    /// required input this output carries.
    pub fn from_funded_order(order: &Order, unspent: &Utxo) -> Self {
        let status = match &unspent.prevout {
            Some(prevout)
                if unspent.value > 0
                    && prevout.value.map_or(true, |v| v == unspent.value)
                    && prevout
                        .asset
                        .as_deref()
                        .map_or(true, |a| a == order.input.asset) =>
            {
                TradeStatus::Funded
            }
            _ => TradeStatus::Unfunded,
        };

        let output_amount = if order.input.amount == 0 {
            0
        } else {
            let share = order.output.amount as u128 * unspent.value as u128
                / order.input.amount as u128;
            u64::try_from(share).unwrap_or(u64::MAX)
        };

        Self {
            order_id: order.id.clone(),
            status,
            terms: TradeTerms {
                funding: unspent.outpoint(),
                funding_script: unspent.prevout.as_ref().map(|p| p.script_pubkey.clone()),
                input: Amount {
                    asset: order.input.asset.clone(),
                    amount: unspent.value,
                },
                output: Amount {
                    asset: order.output.asset.clone(),
                    amount: output_amount,
                },
                trader_script: order.trader_script.clone(),
            },
        }
    }
}

/// Wallet acknowledgement of an executed trade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeReceipt {
    pub txid: String,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Order intake validation failures.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum OrderError {
    #[error("Unknown currency: {0}")]
    UnknownCurrency(String),

    #[error("Input and output currency are both {0}")]
    SameCurrency(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Amount {value} has more than {precision} decimal places")]
    TooPrecise { value: String, precision: u32 },

    #[error("Trader script is not valid hex: {0:?}")]
    InvalidScript(String),

    #[error("Funding address is missing")]
    MissingAddress,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
