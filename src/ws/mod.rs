//! Bybit v5 websocket layer: one duplex socket multiplexing many independent
//! topic subscriptions.

pub mod auth;
pub mod client;
pub mod connection;
pub mod registry;
pub mod router;
mod supervisor;
pub mod topic;
pub mod types;

pub use client::{PrivateWebsocket, PublicWebsocket, Subscription, TradeWebsocket};
pub use connection::{FrameSink, FrameStream, WsReader, WsWriter};
pub use router::TopicRouter;
pub use topic::{KlineKey, OrderBookKey, Topic};
pub use types::{Command, EventKind, Op, WsEvent};
