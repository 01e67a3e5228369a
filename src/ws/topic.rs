use std::fmt;

/// Discriminators for an order book subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OrderBookKey {
    pub depth: u16,
    pub symbol: String,
}

/// Discriminators for a kline subscription. Intervals are the wire strings
/// ("1", "5", "60", "D", "W", ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KlineKey {
    pub interval: String,
    pub symbol: String,
}

/// A parsed topic: the event family plus its discriminating parameters.
///
/// Equality is structural over every field, so two subscriptions collide
/// exactly when their wire topics are identical.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    OrderBook(OrderBookKey),
    Kline(KlineKey),
    Ticker { symbol: String },
    PublicTrade { symbol: String },
    Liquidation { symbol: String },
    AllLiquidation { symbol: String },
    Order,
    Position,
    Wallet,
    Execution,
}

impl Topic {
    /// The wire topic string for this subscription.
    #[must_use]
    pub fn name(&self) -> String {
        match self {
            Self::OrderBook(key) => format!("orderbook.{}.{}", key.depth, key.symbol),
            Self::Kline(key) => format!("kline.{}.{}", key.interval, key.symbol),
            Self::Ticker { symbol } => format!("tickers.{symbol}"),
            Self::PublicTrade { symbol } => format!("publicTrade.{symbol}"),
            Self::Liquidation { symbol } => format!("liquidation.{symbol}"),
            Self::AllLiquidation { symbol } => format!("allLiquidation.{symbol}"),
            Self::Order => "order".to_string(),
            Self::Position => "position".to_string(),
            Self::Wallet => "wallet".to_string(),
            Self::Execution => "execution".to_string(),
        }
    }

    /// Parse an inbound topic string.
    ///
    /// Returns `None` for anything that is not a known family with
    /// well-formed parameters. That is the normal path for acknowledgment
    /// and pong frames, not an error; the dispatcher simply does not route
    /// such frames.
    #[must_use]
    pub fn classify(raw: &str) -> Option<Self> {
        let mut parts = raw.split('.');
        let family = parts.next()?;
        match family {
            "orderbook" => {
                let depth = parts.next()?.parse().ok()?;
                let symbol = parts.next()?.to_string();
                parts.next().is_none().then(|| {
                    Self::OrderBook(OrderBookKey { depth, symbol })
                })
            }
            "kline" => {
                let interval = parts.next()?.to_string();
                let symbol = parts.next()?.to_string();
                parts
                    .next()
                    .is_none()
                    .then(|| Self::Kline(KlineKey { interval, symbol }))
            }
            "publicTrade" => Self::symbol_family(&mut parts).map(|symbol| Self::PublicTrade { symbol }),
            "liquidation" => Self::symbol_family(&mut parts).map(|symbol| Self::Liquidation { symbol }),
            "allLiquidation" => {
                Self::symbol_family(&mut parts).map(|symbol| Self::AllLiquidation { symbol })
            }
            "order" => parts.next().is_none().then_some(Self::Order),
            "position" => parts.next().is_none().then_some(Self::Position),
            "wallet" => parts.next().is_none().then_some(Self::Wallet),
            "execution" => parts.next().is_none().then_some(Self::Execution),
            // Ticker topics can carry category qualifiers between the family
            // prefix and the symbol; the symbol is always the last segment.
            _ if family.contains("tickers") => {
                let symbol = parts.last()?.to_string();
                Some(Self::Ticker { symbol })
            }
            _ => None,
        }
    }

    fn symbol_family<'a>(parts: &mut impl Iterator<Item = &'a str>) -> Option<String> {
        let symbol = parts.next()?.to_string();
        parts.next().is_none().then_some(symbol)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trips(topic: Topic) {
        assert_eq!(Topic::classify(&topic.name()), Some(topic));
    }

    #[test]
    fn classification_round_trips_every_family() {
        round_trips(Topic::OrderBook(OrderBookKey {
            depth: 50,
            symbol: "BTCUSDT".to_string(),
        }));
        round_trips(Topic::Kline(KlineKey {
            interval: "5".to_string(),
            symbol: "BTCUSDT".to_string(),
        }));
        round_trips(Topic::Ticker {
            symbol: "ETHUSDT".to_string(),
        });
        round_trips(Topic::PublicTrade {
            symbol: "BTCUSDT".to_string(),
        });
        round_trips(Topic::Liquidation {
            symbol: "SOLUSDT".to_string(),
        });
        round_trips(Topic::AllLiquidation {
            symbol: "SOLUSDT".to_string(),
        });
        round_trips(Topic::Order);
        round_trips(Topic::Position);
        round_trips(Topic::Wallet);
        round_trips(Topic::Execution);
    }

    #[test]
    fn wire_names_match_grammar() {
        assert_eq!(
            Topic::OrderBook(OrderBookKey {
                depth: 1,
                symbol: "BTCUSDT".to_string()
            })
            .name(),
            "orderbook.1.BTCUSDT"
        );
        assert_eq!(
            Topic::Kline(KlineKey {
                interval: "D".to_string(),
                symbol: "ETHUSDT".to_string()
            })
            .name(),
            "kline.D.ETHUSDT"
        );
        assert_eq!(Topic::Wallet.name(), "wallet");
    }

    #[test]
    fn qualified_ticker_topics_still_classify() {
        assert_eq!(
            Topic::classify("tickers.linear.BTCUSDT"),
            Some(Topic::Ticker {
                symbol: "BTCUSDT".to_string()
            })
        );
    }

    #[test]
    fn unknown_and_malformed_topics_classify_to_none() {
        assert_eq!(Topic::classify("pong"), None);
        assert_eq!(Topic::classify("orderbook.BTCUSDT"), None);
        assert_eq!(Topic::classify("orderbook.x.BTCUSDT"), None);
        assert_eq!(Topic::classify("orderbook.50.BTCUSDT.extra"), None);
        assert_eq!(Topic::classify("order.extra"), None);
        assert_eq!(Topic::classify("tickers"), None);
        assert_eq!(Topic::classify(""), None);
    }
}
