//! Core data types for the Backpack client

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::consts::{PERP_SUFFIX, SPOT_SUFFIX};

/// Request parameters as sent in a query string or signed
pub type Params = Map<String, Value>;

/// Logical operation name embedded in the signature string
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Instruction {
    BalanceQuery,
    PositionQuery,
    OrderQueryAll,
    OrderExecute,
    OrderCancel,
    OrderCancelAll,
}

impl Instruction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Instruction::BalanceQuery => "balanceQuery",
            Instruction::PositionQuery => "positionQuery",
            Instruction::OrderQueryAll => "orderQueryAll",
            Instruction::OrderExecute => "orderExecute",
            Instruction::OrderCancel => "orderCancel",
            Instruction::OrderCancelAll => "orderCancelAll",
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order side as named by the exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    /// Buy
    Bid,
    /// Sell
    Ask,
}

impl Side {
    /// Returns the opposite side
    pub fn opposite(&self) -> Self {
        match self {
            Side::Bid => Side::Ask,
            Side::Ask => Side::Bid,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Bid => "Bid",
            Side::Ask => "Ask",
        }
    }

    /// Side of the order that closes a position of the given signed size
    pub fn closing(net_size: f64) -> Self {
        if net_size > 0.0 {
            Side::Ask
        } else {
            Side::Bid
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OrderType {
    #[default]
    Market,
    Limit,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Market => "Market",
            OrderType::Limit => "Limit",
        }
    }
}

/// Spot market symbol for a base asset (e.g. "SOL" -> "SOL_USDC")
pub fn spot_symbol(base: &str) -> String {
    format!("{base}{SPOT_SUFFIX}")
}

/// Perpetual market symbol for a base asset (e.g. "SOL" -> "SOL_USDC_PERP")
pub fn perp_symbol(base: &str) -> String {
    format!("{base}{PERP_SUFFIX}")
}

/// Balance of a single asset
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    #[serde(default, deserialize_with = "lenient_string")]
    pub available: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub locked: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub staked: String,
}

impl Balance {
    pub fn available_amount(&self) -> f64 {
        self.available.parse().unwrap_or(0.0)
    }

    pub fn locked_amount(&self) -> f64 {
        self.locked.parse().unwrap_or(0.0)
    }

    /// True if anything is available or locked
    pub fn is_non_zero(&self) -> bool {
        self.available_amount() > 0.0 || self.locked_amount() > 0.0
    }
}

/// Open position as reported by the exchange
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Position {
    pub symbol: String,
    /// Positive = long, negative = short
    pub net_size: f64,
    pub entry_price: Option<f64>,
    pub unrealized_pnl: f64,
}

impl Position {
    /// Read a position record, defaulting any missing or malformed field
    pub fn from_value(value: &Value) -> Self {
        Self {
            symbol: str_field(value, "symbol").unwrap_or_default(),
            net_size: num_field(value, "netSize").unwrap_or(0.0),
            entry_price: num_field(value, "entryPrice"),
            unrealized_pnl: num_field(value, "unrealizedPnl").unwrap_or(0.0),
        }
    }
}

/// Resting order as reported by the exchange
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OpenOrder {
    pub id: String,
    pub symbol: String,
    pub side: String,
    pub quantity: String,
    /// None for market orders
    pub price: Option<String>,
    pub status: String,
}

impl OpenOrder {
    pub fn from_value(value: &Value) -> Self {
        Self {
            id: str_field(value, "id").unwrap_or_default(),
            symbol: str_field(value, "symbol").unwrap_or_default(),
            side: str_field(value, "side").unwrap_or_default(),
            quantity: str_field(value, "quantity").unwrap_or_default(),
            price: str_field(value, "price"),
            status: str_field(value, "status").unwrap_or_default(),
        }
    }

    /// First eight characters of the order id
    pub fn short_id(&self) -> &str {
        match self.id.char_indices().nth(8) {
            Some((idx, _)) => &self.id[..idx],
            None => &self.id,
        }
    }
}

/// Exchange answer to an order execution
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub symbol: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub side: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub status: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub quantity: String,
}

impl OrderRecord {
    pub fn from_value(value: Value) -> Self {
        serde_json::from_value(value).unwrap_or_default()
    }
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(render_value(&value).unwrap_or_default())
}

/// Render a JSON value the way it appears in query and signature strings.
/// Returns None for null.
pub fn render_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(b.to_string()),
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(render_value)
}

fn num_field(value: &Value, key: &str) -> Option<f64> {
    match value.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
