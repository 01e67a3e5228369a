use crate::core::errors::WsError;
use crate::ws::connection::WsReader;
use crate::ws::registry::Registry;
use crate::ws::topic::{KlineKey, OrderBookKey, Topic};
use crate::ws::types::{
    AllLiquidationEntry, EventKind, ExecutionEntry, InboundFrame, KlineEntry, LiquidationData,
    OrderBookData, OrderEntry, PositionEntry, TickerData, TradeEntry, WalletEntry, WsEvent,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, trace};

/// Routes inbound frames to subscription callbacks.
///
/// Each topic family owns an independent registry because the families carry
/// different discriminator shapes and payload types; the exhaustive match in
/// [`route_text`](Self::route_text) is the only place a family's payload type
/// is decoded.
#[derive(Default)]
pub struct TopicRouter {
    pub(crate) order_book: Registry<OrderBookKey, OrderBookData>,
    pub(crate) kline: Registry<KlineKey, Vec<KlineEntry>>,
    pub(crate) ticker: Registry<String, TickerData>,
    pub(crate) public_trade: Registry<String, Vec<TradeEntry>>,
    pub(crate) liquidation: Registry<String, LiquidationData>,
    pub(crate) all_liquidation: Registry<String, Vec<AllLiquidationEntry>>,
    pub(crate) order: Registry<(), Vec<OrderEntry>>,
    pub(crate) position: Registry<(), Vec<PositionEntry>>,
    pub(crate) wallet: Registry<(), Vec<WalletEntry>>,
    pub(crate) execution: Registry<(), Vec<ExecutionEntry>>,
}

impl TopicRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove the subscription for `topic`, whichever family it belongs to.
    pub(crate) fn unregister(&self, topic: &Topic) {
        match topic {
            Topic::OrderBook(key) => self.order_book.unregister(key),
            Topic::Kline(key) => self.kline.unregister(key),
            Topic::Ticker { symbol } => self.ticker.unregister(symbol),
            Topic::PublicTrade { symbol } => self.public_trade.unregister(symbol),
            Topic::Liquidation { symbol } => self.liquidation.unregister(symbol),
            Topic::AllLiquidation { symbol } => self.all_liquidation.unregister(symbol),
            Topic::Order => self.order.unregister(&()),
            Topic::Position => self.position.unregister(&()),
            Topic::Wallet => self.wallet.unregister(&()),
            Topic::Execution => self.execution.unregister(&()),
        }
    }

    /// Read exactly one frame and route it.
    ///
    /// Meant to be driven repeatedly, once per inbound frame, by an owning
    /// loop. Any failure at the read, classify, decode, lookup, or callback
    /// stage propagates as this call's result and is fatal to the connection.
    pub async fn run_once(&self, reader: &mut WsReader) -> Result<(), WsError> {
        let frame = reader.recv().await?;
        match frame {
            Message::Text(text) => self.route_text(&text),
            // Control and binary frames carry no topic; nothing to route.
            other => {
                trace!(kind = ?other, "skipping non-text frame");
                Ok(())
            }
        }
    }

    fn route_text(&self, text: &str) -> Result<(), WsError> {
        let frame: InboundFrame = serde_json::from_str(text).map_err(|source| WsError::Decode {
            what: "message envelope".to_string(),
            source,
        })?;
        let InboundFrame {
            topic,
            kind,
            ts,
            data,
            success,
            ret_msg,
        } = frame;

        // A rejected command acknowledgment (bad auth signature, malformed
        // subscribe) is fatal to the connection.
        if success == Some(false) {
            return Err(WsError::AuthFailed(ret_msg.unwrap_or_default()));
        }

        let Some(raw_topic) = topic else {
            // Successful acks and application-level pongs carry no topic.
            trace!("skipping topicless frame");
            return Ok(());
        };

        let Some(topic) = Topic::classify(&raw_topic) else {
            debug!(topic = %raw_topic, "skipping unrecognized topic");
            return Ok(());
        };

        let kind = EventKind::parse(kind.as_deref());

        match &topic {
            Topic::OrderBook(key) => {
                let event = decode_event(&raw_topic, kind, ts, data)?;
                self.order_book.dispatch(key, &raw_topic, event)
            }
            Topic::Kline(key) => {
                let event = decode_event(&raw_topic, kind, ts, data)?;
                self.kline.dispatch(key, &raw_topic, event)
            }
            Topic::Ticker { symbol } => {
                let event = decode_event(&raw_topic, kind, ts, data)?;
                self.ticker.dispatch(symbol, &raw_topic, event)
            }
            Topic::PublicTrade { symbol } => {
                let event = decode_event(&raw_topic, kind, ts, data)?;
                self.public_trade.dispatch(symbol, &raw_topic, event)
            }
            Topic::Liquidation { symbol } => {
                let event = decode_event(&raw_topic, kind, ts, data)?;
                self.liquidation.dispatch(symbol, &raw_topic, event)
            }
            Topic::AllLiquidation { symbol } => {
                let event = decode_event(&raw_topic, kind, ts, data)?;
                self.all_liquidation.dispatch(symbol, &raw_topic, event)
            }
            Topic::Order => {
                let event = decode_event(&raw_topic, kind, ts, data)?;
                self.order.dispatch(&(), &raw_topic, event)
            }
            Topic::Position => {
                let event = decode_event(&raw_topic, kind, ts, data)?;
                self.position.dispatch(&(), &raw_topic, event)
            }
            Topic::Wallet => {
                let event = decode_event(&raw_topic, kind, ts, data)?;
                self.wallet.dispatch(&(), &raw_topic, event)
            }
            Topic::Execution => {
                let event = decode_event(&raw_topic, kind, ts, data)?;
                self.execution.dispatch(&(), &raw_topic, event)
            }
        }
    }
}

/// Decode the `data` payload into the family's typed event. A missing `data`
/// field decodes as JSON null and fails with the family type's own error.
fn decode_event<T: DeserializeOwned>(
    topic: &str,
    kind: Option<EventKind>,
    ts: Option<i64>,
    data: Option<Value>,
) -> Result<WsEvent<T>, WsError> {
    let data = serde_json::from_value(data.unwrap_or(Value::Null)).map_err(|source| {
        WsError::Decode {
            what: topic.to_string(),
            source,
        }
    })?;
    Ok(WsEvent {
        topic: topic.to_string(),
        kind,
        ts,
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn router_with_ticker(seen: &Arc<Mutex<Vec<WsEvent<TickerData>>>>) -> TopicRouter {
        let router = TopicRouter::new();
        let sink = Arc::clone(seen);
        router
            .ticker
            .register(
                "BTCUSDT".to_string(),
                "tickers.BTCUSDT",
                Box::new(move |event| {
                    sink.lock().unwrap().push(event);
                    Ok(())
                }),
            )
            .unwrap();
        router
    }

    #[test]
    fn acks_and_pongs_route_to_nothing() {
        let router = TopicRouter::new();
        router
            .route_text(r#"{"success":true,"ret_msg":"","op":"subscribe"}"#)
            .unwrap();
        router
            .route_text(r#"{"op":"pong","success":true,"ret_msg":"pong"}"#)
            .unwrap();
    }

    #[test]
    fn unrecognized_topics_route_to_nothing() {
        let router = TopicRouter::new();
        router
            .route_text(r#"{"topic":"someNewFamily.BTCUSDT","ts":1,"data":{}}"#)
            .unwrap();
    }

    #[test]
    fn rejected_ack_is_auth_failure() {
        let router = TopicRouter::new();
        let err = router
            .route_text(r#"{"success":false,"ret_msg":"bad signature"}"#)
            .unwrap_err();
        assert!(matches!(err, WsError::AuthFailed(msg) if msg == "bad signature"));
    }

    #[test]
    fn ticker_event_reaches_registered_callback() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let router = router_with_ticker(&seen);
        router
            .route_text(
                r#"{"topic":"tickers.BTCUSDT","type":"snapshot","ts":1677322353682,
                    "data":{"symbol":"BTCUSDT","lastPrice":"22975.10"}}"#,
            )
            .unwrap();
        let events = seen.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, Some(EventKind::Snapshot));
        assert_eq!(events[0].data.last_price.as_deref(), Some("22975.10"));
    }

    #[test]
    fn classified_event_without_callback_is_unknown_subscription() {
        let router = TopicRouter::new();
        let err = router
            .route_text(
                r#"{"topic":"tickers.ETHUSDT","type":"delta","ts":1,
                    "data":{"symbol":"ETHUSDT"}}"#,
            )
            .unwrap_err();
        assert!(matches!(err, WsError::UnknownSubscription(topic) if topic == "tickers.ETHUSDT"));
    }

    #[test]
    fn undecodable_payload_is_a_decode_error() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let router = router_with_ticker(&seen);
        let err = router
            .route_text(r#"{"topic":"tickers.BTCUSDT","ts":1,"data":[1,2,3]}"#)
            .unwrap_err();
        assert!(matches!(err, WsError::Decode { what, .. } if what == "tickers.BTCUSDT"));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn malformed_envelope_is_a_decode_error() {
        let router = TopicRouter::new();
        let err = router.route_text("not json").unwrap_err();
        assert!(matches!(err, WsError::Decode { .. }));
    }
}
