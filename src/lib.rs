//! Client for Bybit's v5 WebSocket API.
//!
//! One duplex connection carries many independent logical subscriptions —
//! order book depth, klines, tickers, trades, liquidations, and the private
//! order/position/wallet/execution streams. Each inbound frame's topic string
//! is classified into a (family, key) pair and routed to the callback
//! registered for that exact key, while a supervisor keeps the connection
//! alive against intermediaries that drop idle sockets.
//!
//! There is no automatic reconnection: subscriptions are scoped to one
//! connection, and after a fatal read error the caller must dial,
//! authenticate, and subscribe again.

pub mod core;
pub mod ws;

pub use crate::core::config::{BybitConfig, Category, WsConfig};
pub use crate::core::errors::WsError;
pub use crate::ws::{PrivateWebsocket, PublicWebsocket, Subscription, TradeWebsocket};
