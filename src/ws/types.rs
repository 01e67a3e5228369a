use crate::core::errors::WsError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Outbound commands
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Op {
    Subscribe,
    Unsubscribe,
    Ping,
    Auth,
    #[serde(rename = "order.create")]
    OrderCreate,
    #[serde(rename = "order.cancel")]
    OrderCancel,
}

/// An outbound `{op, args}` command frame.
#[derive(Debug, Clone, Serialize)]
pub struct Command {
    pub op: Op,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<Value>,
}

impl Command {
    #[must_use]
    pub fn new(op: Op, args: Vec<Value>) -> Self {
        Self { op, args }
    }

    pub fn encode(&self) -> Result<String, WsError> {
        serde_json::to_string(self).map_err(WsError::CommandEncode)
    }
}

// ---------------------------------------------------------------------------
// Inbound envelope
// ---------------------------------------------------------------------------

/// Raw inbound frame: either an acknowledgment (`success`/`ret_msg`) or a
/// topic event (`topic`/`type`/`ts`/`data`).
#[derive(Debug, Deserialize)]
pub(crate) struct InboundFrame {
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub ts: Option<i64>,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub ret_msg: Option<String>,
}

/// Whether an event replaces state or updates it. Passed through to
/// callbacks, never interpreted here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Snapshot,
    Delta,
}

impl EventKind {
    pub(crate) fn parse(raw: Option<&str>) -> Option<Self> {
        match raw {
            Some("snapshot") => Some(Self::Snapshot),
            Some("delta") => Some(Self::Delta),
            _ => None,
        }
    }
}

/// A decoded topic event delivered to a subscription callback.
#[derive(Debug, Clone)]
pub struct WsEvent<T> {
    pub topic: String,
    pub kind: Option<EventKind>,
    pub ts: Option<i64>,
    pub data: T,
}

// ---------------------------------------------------------------------------
// Public stream payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct OrderBookData {
    #[serde(rename = "s")]
    pub symbol: String,
    /// Price levels as `[price, size]` strings, best bid first.
    #[serde(rename = "b")]
    pub bids: Vec<[String; 2]>,
    #[serde(rename = "a")]
    pub asks: Vec<[String; 2]>,
    #[serde(rename = "u")]
    pub update_id: i64,
    #[serde(rename = "seq", default)]
    pub sequence: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KlineEntry {
    pub start: i64,
    pub end: i64,
    pub interval: String,
    pub open: String,
    pub close: String,
    pub high: String,
    pub low: String,
    pub volume: String,
    pub turnover: String,
    /// True once the candle is closed.
    pub confirm: bool,
    pub timestamp: i64,
}

/// Ticker payload. Delta events carry only the changed fields, so everything
/// except the symbol is optional.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickerData {
    pub symbol: String,
    #[serde(default)]
    pub last_price: Option<String>,
    #[serde(default)]
    pub mark_price: Option<String>,
    #[serde(default)]
    pub index_price: Option<String>,
    #[serde(default)]
    pub bid1_price: Option<String>,
    #[serde(default)]
    pub bid1_size: Option<String>,
    #[serde(default)]
    pub ask1_price: Option<String>,
    #[serde(default)]
    pub ask1_size: Option<String>,
    #[serde(default)]
    pub price24h_pcnt: Option<String>,
    #[serde(default)]
    pub high_price24h: Option<String>,
    #[serde(default)]
    pub low_price24h: Option<String>,
    #[serde(default)]
    pub volume24h: Option<String>,
    #[serde(default)]
    pub turnover24h: Option<String>,
    #[serde(default)]
    pub open_interest: Option<String>,
    #[serde(default)]
    pub funding_rate: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TradeEntry {
    #[serde(rename = "T")]
    pub timestamp: i64,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "S")]
    pub side: String,
    #[serde(rename = "v")]
    pub size: String,
    #[serde(rename = "p")]
    pub price: String,
    #[serde(rename = "i")]
    pub trade_id: String,
    #[serde(rename = "BT", default)]
    pub block_trade: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiquidationData {
    pub updated_time: i64,
    pub symbol: String,
    pub side: String,
    pub size: String,
    pub price: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AllLiquidationEntry {
    #[serde(rename = "T")]
    pub updated_time: i64,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "S")]
    pub side: String,
    #[serde(rename = "v")]
    pub size: String,
    #[serde(rename = "p")]
    pub price: String,
}

// ---------------------------------------------------------------------------
// Private stream payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderEntry {
    pub symbol: String,
    pub order_id: String,
    #[serde(default)]
    pub order_link_id: String,
    pub side: String,
    pub order_status: String,
    #[serde(default)]
    pub order_type: String,
    #[serde(default)]
    pub price: String,
    #[serde(default)]
    pub qty: String,
    #[serde(default)]
    pub cum_exec_qty: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub created_time: String,
    #[serde(default)]
    pub updated_time: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionEntry {
    pub symbol: String,
    pub side: String,
    pub size: String,
    #[serde(default)]
    pub position_idx: i32,
    #[serde(default)]
    pub entry_price: String,
    #[serde(default)]
    pub mark_price: String,
    #[serde(default)]
    pub position_value: String,
    #[serde(default)]
    pub unrealised_pnl: String,
    #[serde(default)]
    pub leverage: String,
    #[serde(default)]
    pub updated_time: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletEntry {
    #[serde(default)]
    pub account_type: String,
    #[serde(default)]
    pub total_equity: String,
    #[serde(default)]
    pub total_wallet_balance: String,
    #[serde(default)]
    pub total_available_balance: String,
    #[serde(default)]
    pub coin: Vec<WalletCoin>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletCoin {
    pub coin: String,
    #[serde(default)]
    pub equity: String,
    #[serde(default)]
    pub wallet_balance: String,
    #[serde(default)]
    pub available_to_withdraw: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionEntry {
    pub symbol: String,
    pub side: String,
    pub order_id: String,
    pub exec_id: String,
    #[serde(default)]
    pub order_link_id: String,
    #[serde(default)]
    pub exec_price: String,
    #[serde(default)]
    pub exec_qty: String,
    #[serde(default)]
    pub exec_fee: String,
    #[serde(default)]
    pub exec_type: String,
    #[serde(default)]
    pub exec_time: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub is_maker: bool,
}

// ---------------------------------------------------------------------------
// Trade command bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreateRequest {
    pub category: String,
    pub symbol: String,
    pub side: String,
    pub order_type: String,
    pub qty: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_in_force: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_link_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reduce_only: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCancelRequest {
    pub category: String,
    pub symbol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_link_id: Option<String>,
}
