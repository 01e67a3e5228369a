use crate::core::config::{BybitConfig, Category};
use crate::core::errors::WsError;
use crate::ws::auth;
use crate::ws::connection::{self, FrameSink, FrameStream, WsReader, WsWriter};
use crate::ws::router::TopicRouter;
use crate::ws::supervisor;
use crate::ws::topic::{KlineKey, OrderBookKey, Topic};
use crate::ws::types::{
    AllLiquidationEntry, Command, ExecutionEntry, KlineEntry, LiquidationData, Op, OrderBookData,
    OrderCancelRequest, OrderCreateRequest, OrderEntry, PositionEntry, TickerData, TradeEntry,
    WalletEntry, WsEvent,
};
use secrecy::ExposeSecret;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Handle for one registered subscription: the connection, the topic, nothing
/// captured beyond that.
pub struct Subscription {
    shared: Arc<Shared>,
    topic: Topic,
}

impl std::fmt::Debug for Subscription {
    // Shared holds the transport halves, which carry no Debug; the topic is
    // the only identifying state worth printing.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .finish()
    }
}

impl Subscription {
    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    /// Send the wire `unsubscribe` command and then remove the registry
    /// entry. The wire command goes out first so a frame already in flight
    /// for this key surfaces as `UnknownSubscription` on the next run-loop
    /// pass instead of being misrouted to a reused key.
    pub async fn unsubscribe(self) -> Result<(), WsError> {
        self.shared
            .send_command(Op::Unsubscribe, vec![Value::String(self.topic.name())])
            .await?;
        self.shared.router.unregister(&self.topic);
        Ok(())
    }
}

/// State shared by the client handle, the supervisor, and subscription
/// handles. The read half sits in an async slot until either `run_once`
/// borrows it or `start` takes it for good.
pub(crate) struct Shared {
    writer: WsWriter,
    router: Arc<TopicRouter>,
    reader: Mutex<Option<WsReader>>,
    config: BybitConfig,
}

impl Shared {
    fn new(writer: WsWriter, reader: WsReader, config: BybitConfig) -> Arc<Self> {
        Arc::new(Self {
            writer,
            router: Arc::new(TopicRouter::new()),
            reader: Mutex::new(Some(reader)),
            config,
        })
    }

    fn from_parts(
        sink: Box<dyn FrameSink>,
        stream: Box<dyn FrameStream>,
        config: BybitConfig,
    ) -> Arc<Self> {
        let writer = WsWriter::new(sink, config.ws.write_timeout);
        let reader = WsReader::new(stream);
        Self::new(writer, reader, config)
    }

    async fn dial(url: &str, config: BybitConfig) -> Result<Arc<Self>, WsError> {
        let (writer, reader) = connection::dial(url, &config.ws).await?;
        Ok(Self::new(writer, reader, config))
    }

    async fn send_command(&self, op: Op, args: Vec<Value>) -> Result<(), WsError> {
        let payload = Command::new(op, args).encode()?;
        self.writer.send_text(payload).await
    }

    /// Complete a subscribe after its callback was registered: send the wire
    /// command, rolling the registration back if the send fails so the
    /// caller may retry the same key.
    async fn finish_subscribe(
        self: &Arc<Self>,
        topic: Topic,
        name: String,
    ) -> Result<Subscription, WsError> {
        let args = vec![Value::String(name.clone())];
        if let Err(err) = self.send_command(Op::Subscribe, args).await {
            self.router.unregister(&topic);
            return Err(err);
        }
        debug!(topic = %name, "subscribed");
        Ok(Subscription {
            shared: Arc::clone(self),
            topic,
        })
    }

    async fn run_once(&self) -> Result<(), WsError> {
        let mut slot = self.reader.lock().await;
        let reader = slot.as_mut().ok_or(WsError::NotConnected)?;
        self.router.run_once(reader).await
    }

    async fn start<F>(&self, cancel: CancellationToken, on_error: F) -> Result<(), WsError>
    where
        F: FnMut(bool, WsError) + Send + 'static,
    {
        let reader = self
            .reader
            .lock()
            .await
            .take()
            .ok_or(WsError::NotConnected)?;
        supervisor::run(
            self.writer.clone(),
            Arc::clone(&self.router),
            reader,
            self.config.ws.ping_interval,
            cancel,
            on_error,
        )
        .await
    }

    async fn login(&self) -> Result<(), WsError> {
        if !self.config.has_credentials() {
            return Err(WsError::AuthFailed("missing API credentials".to_string()));
        }
        let expires = auth::timestamp_ms() + self.config.recv_window_ms;
        let args = auth::build_auth_args(
            self.config.api_key.expose_secret(),
            &self.config.secret_key,
            expires,
        )?;
        self.send_command(Op::Auth, args).await
    }

    async fn close(&self) -> Result<(), WsError> {
        self.writer.close().await
    }
}

macro_rules! delegate_lifecycle {
    () => {
        /// Read and dispatch exactly one inbound frame.
        pub async fn run_once(&self) -> Result<(), WsError> {
            self.shared.run_once().await
        }

        /// Run the connection under the lifecycle supervisor until a fatal
        /// error or cancellation. Consumes the read half; `run_once` is
        /// unavailable afterwards.
        ///
        /// `on_error` receives a fatal dispatch/read error exactly once,
        /// flagged with whether it was a clean remote close; `start` itself
        /// returns `Ok(())` in that case. Only a keepalive send failure is
        /// returned as an error.
        pub async fn start<F>(&self, cancel: CancellationToken, on_error: F) -> Result<(), WsError>
        where
            F: FnMut(bool, WsError) + Send + 'static,
        {
            self.shared.start(cancel, on_error).await
        }

        /// Send a normal-closure close frame. Idempotent.
        pub async fn close(&self) -> Result<(), WsError> {
            self.shared.close().await
        }
    };
}

macro_rules! subscribe_with_symbol {
    ($(#[$doc:meta])* $fn_name:ident, $registry:ident, $variant:ident, $payload:ty) => {
        $(#[$doc])*
        pub async fn $fn_name<F>(
            &self,
            symbol: impl Into<String>,
            callback: F,
        ) -> Result<Subscription, WsError>
        where
            F: FnMut(WsEvent<$payload>) -> Result<(), WsError> + Send + 'static,
        {
            let symbol = symbol.into();
            let topic = Topic::$variant {
                symbol: symbol.clone(),
            };
            let name = topic.name();
            self.shared
                .router
                .$registry
                .register(symbol, &name, Box::new(callback))?;
            self.shared.finish_subscribe(topic, name).await
        }
    };
}

macro_rules! subscribe_parameterless {
    ($(#[$doc:meta])* $fn_name:ident, $registry:ident, $variant:ident, $payload:ty) => {
        $(#[$doc])*
        pub async fn $fn_name<F>(&self, callback: F) -> Result<Subscription, WsError>
        where
            F: FnMut(WsEvent<$payload>) -> Result<(), WsError> + Send + 'static,
        {
            let topic = Topic::$variant;
            let name = topic.name();
            self.shared
                .router
                .$registry
                .register((), &name, Box::new(callback))?;
            self.shared.finish_subscribe(topic, name).await
        }
    };
}

/// Client for the public market-data streams of one product category.
pub struct PublicWebsocket {
    shared: Arc<Shared>,
}

impl PublicWebsocket {
    pub async fn connect(config: BybitConfig, category: Category) -> Result<Self, WsError> {
        let url = config.ws_public_url(category);
        Ok(Self {
            shared: Shared::dial(&url, config).await?,
        })
    }

    /// Build a client over caller-supplied transport halves. This is the
    /// injection seam used by the test suite and by custom transports.
    pub fn from_parts(
        sink: Box<dyn FrameSink>,
        stream: Box<dyn FrameStream>,
        config: BybitConfig,
    ) -> Self {
        Self {
            shared: Shared::from_parts(sink, stream, config),
        }
    }

    /// Subscribe to order book updates at the given depth. The callback is
    /// registered before the wire command is sent, so an event arriving
    /// right after the server's ack is already routable.
    pub async fn subscribe_order_book<F>(
        &self,
        depth: u16,
        symbol: impl Into<String>,
        callback: F,
    ) -> Result<Subscription, WsError>
    where
        F: FnMut(WsEvent<OrderBookData>) -> Result<(), WsError> + Send + 'static,
    {
        let key = OrderBookKey {
            depth,
            symbol: symbol.into(),
        };
        let topic = Topic::OrderBook(key.clone());
        let name = topic.name();
        self.shared
            .router
            .order_book
            .register(key, &name, Box::new(callback))?;
        self.shared.finish_subscribe(topic, name).await
    }

    /// Subscribe to klines for the given interval ("1", "5", "60", "D", ...).
    pub async fn subscribe_kline<F>(
        &self,
        interval: impl Into<String>,
        symbol: impl Into<String>,
        callback: F,
    ) -> Result<Subscription, WsError>
    where
        F: FnMut(WsEvent<Vec<KlineEntry>>) -> Result<(), WsError> + Send + 'static,
    {
        let key = KlineKey {
            interval: interval.into(),
            symbol: symbol.into(),
        };
        let topic = Topic::Kline(key.clone());
        let name = topic.name();
        self.shared
            .router
            .kline
            .register(key, &name, Box::new(callback))?;
        self.shared.finish_subscribe(topic, name).await
    }

    subscribe_with_symbol!(
        /// Subscribe to ticker snapshots and deltas.
        subscribe_ticker,
        ticker,
        Ticker,
        TickerData
    );
    subscribe_with_symbol!(
        /// Subscribe to public trades.
        subscribe_trade,
        public_trade,
        PublicTrade,
        Vec<TradeEntry>
    );
    subscribe_with_symbol!(
        subscribe_liquidation,
        liquidation,
        Liquidation,
        LiquidationData
    );
    subscribe_with_symbol!(
        subscribe_all_liquidation,
        all_liquidation,
        AllLiquidation,
        Vec<AllLiquidationEntry>
    );

    delegate_lifecycle!();
}

/// Client for the private order/position/wallet/execution streams.
/// Call [`login`](Self::login) before subscribing.
pub struct PrivateWebsocket {
    shared: Arc<Shared>,
}

impl PrivateWebsocket {
    pub async fn connect(config: BybitConfig) -> Result<Self, WsError> {
        let url = config.ws_private_url();
        Ok(Self {
            shared: Shared::dial(&url, config).await?,
        })
    }

    pub fn from_parts(
        sink: Box<dyn FrameSink>,
        stream: Box<dyn FrameStream>,
        config: BybitConfig,
    ) -> Self {
        Self {
            shared: Shared::from_parts(sink, stream, config),
        }
    }

    /// Send the signed auth command. A rejection arrives as a
    /// `{"success":false}` acknowledgment and surfaces as
    /// [`WsError::AuthFailed`] from the next run-loop pass.
    pub async fn login(&self) -> Result<(), WsError> {
        self.shared.login().await
    }

    subscribe_parameterless!(
        /// Subscribe to order updates across all symbols.
        subscribe_order,
        order,
        Order,
        Vec<OrderEntry>
    );
    subscribe_parameterless!(
        subscribe_position,
        position,
        Position,
        Vec<PositionEntry>
    );
    subscribe_parameterless!(subscribe_wallet, wallet, Wallet, Vec<WalletEntry>);
    subscribe_parameterless!(
        subscribe_execution,
        execution,
        Execution,
        Vec<ExecutionEntry>
    );

    delegate_lifecycle!();
}

/// Client for the order-entry stream. Call [`login`](Self::login) before
/// sending commands.
pub struct TradeWebsocket {
    shared: Arc<Shared>,
}

impl TradeWebsocket {
    pub async fn connect(config: BybitConfig) -> Result<Self, WsError> {
        let url = config.ws_trade_url();
        Ok(Self {
            shared: Shared::dial(&url, config).await?,
        })
    }

    pub fn from_parts(
        sink: Box<dyn FrameSink>,
        stream: Box<dyn FrameStream>,
        config: BybitConfig,
    ) -> Self {
        Self {
            shared: Shared::from_parts(sink, stream, config),
        }
    }

    pub async fn login(&self) -> Result<(), WsError> {
        self.shared.login().await
    }

    pub async fn create_order(&self, request: &OrderCreateRequest) -> Result<(), WsError> {
        let arg = serde_json::to_value(request).map_err(WsError::CommandEncode)?;
        self.shared.send_command(Op::OrderCreate, vec![arg]).await
    }

    pub async fn cancel_order(&self, request: &OrderCancelRequest) -> Result<(), WsError> {
        let arg = serde_json::to_value(request).map_err(WsError::CommandEncode)?;
        self.shared.send_command(Op::OrderCancel, vec![arg]).await
    }

    delegate_lifecycle!();
}
