use crate::core::config::WsConfig;
use crate::core::errors::WsError;
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, instrument};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Write half of a websocket transport.
///
/// The production implementation wraps a tungstenite sink; tests supply
/// channel-backed mocks through [`crate::ws::client`]'s `from_parts`.
#[async_trait]
pub trait FrameSink: Send {
    async fn send_frame(&mut self, frame: Message) -> Result<(), WsError>;
}

/// Read half of a websocket transport.
#[async_trait]
pub trait FrameStream: Send {
    /// Next frame from the peer; `None` means the stream ended.
    async fn next_frame(&mut self) -> Option<Result<Message, WsError>>;
}

pub struct TungsteniteSink(SplitSink<WsStream, Message>);

#[async_trait]
impl FrameSink for TungsteniteSink {
    async fn send_frame(&mut self, frame: Message) -> Result<(), WsError> {
        self.0
            .send(frame)
            .await
            .map_err(|e| WsError::Write(e.to_string()))
    }
}

pub struct TungsteniteStream(SplitStream<WsStream>);

#[async_trait]
impl FrameStream for TungsteniteStream {
    async fn next_frame(&mut self) -> Option<Result<Message, WsError>> {
        self.0
            .next()
            .await
            .map(|r| r.map_err(|e| WsError::Read(e.to_string())))
    }
}

/// Connect to `url` and return the two connection halves.
#[instrument(skip(config))]
pub async fn dial(url: &str, config: &WsConfig) -> Result<(WsWriter, WsReader), WsError> {
    let (stream, _response) = tokio::time::timeout(config.connect_timeout, connect_async(url))
        .await
        .map_err(|_| WsError::ConnectFailed(format!("timed out connecting to {url}")))?
        .map_err(|e| WsError::ConnectFailed(e.to_string()))?;

    debug!(url, "websocket connected");
    let (sink, stream) = stream.split();
    Ok((
        WsWriter::new(Box::new(TungsteniteSink(sink)), config.write_timeout),
        WsReader::new(Box::new(TungsteniteStream(stream))),
    ))
}

/// Shareable write half.
///
/// Keepalive pings, subscribe/unsubscribe commands, and trade commands can
/// originate from independent tasks; every send goes through one mutex so
/// frames never interleave on the wire, and runs under the write deadline.
#[derive(Clone)]
pub struct WsWriter {
    sink: Arc<Mutex<Box<dyn FrameSink>>>,
    write_timeout: Duration,
    close_sent: Arc<AtomicBool>,
}

impl WsWriter {
    pub fn new(sink: Box<dyn FrameSink>, write_timeout: Duration) -> Self {
        Self {
            sink: Arc::new(Mutex::new(sink)),
            write_timeout,
            close_sent: Arc::new(AtomicBool::new(false)),
        }
    }

    pub async fn send(&self, frame: Message) -> Result<(), WsError> {
        let mut sink = self.sink.lock().await;
        Self::send_locked(sink.as_mut(), frame, self.write_timeout).await
    }

    pub async fn send_text(&self, payload: String) -> Result<(), WsError> {
        self.send(Message::Text(payload)).await
    }

    /// Send the low-level ping control frame and the application-level ping
    /// text frame back to back under one lock acquisition. Some intermediary
    /// deployments honor only one of the two.
    pub async fn keepalive(&self, app_ping: String) -> Result<(), WsError> {
        let mut sink = self.sink.lock().await;
        Self::send_locked(sink.as_mut(), Message::Ping(Vec::new()), self.write_timeout).await?;
        Self::send_locked(sink.as_mut(), Message::Text(app_ping), self.write_timeout).await
    }

    /// Send a normal-closure close frame. Idempotent: repeated calls after a
    /// successful send are not an error. A failed send leaves the flag clear
    /// so a later call retries the frame.
    pub async fn close(&self) -> Result<(), WsError> {
        if self.close_sent.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Err(err) = self.send(Message::Close(None)).await {
            self.close_sent.store(false, Ordering::SeqCst);
            return Err(err);
        }
        Ok(())
    }

    async fn send_locked(
        sink: &mut dyn FrameSink,
        frame: Message,
        deadline: Duration,
    ) -> Result<(), WsError> {
        tokio::time::timeout(deadline, sink.send_frame(frame))
            .await
            .map_err(|_| WsError::WriteTimeout(deadline))?
    }
}

/// Exclusive read half, owned by whichever loop drives the dispatcher.
pub struct WsReader {
    stream: Box<dyn FrameStream>,
}

impl WsReader {
    pub fn new(stream: Box<dyn FrameStream>) -> Self {
        Self { stream }
    }

    /// Block until the next frame arrives. A close frame from the peer, or
    /// the stream ending, is reported as [`WsError::RemoteClosed`].
    pub async fn recv(&mut self) -> Result<Message, WsError> {
        match self.stream.next_frame().await {
            Some(Ok(Message::Close(frame))) => Err(WsError::RemoteClosed {
                reason: frame.map(|f| f.reason.into_owned()),
            }),
            Some(Ok(frame)) => Ok(frame),
            Some(Err(e)) => Err(e),
            None => Err(WsError::RemoteClosed { reason: None }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct PendingSink;

    #[async_trait]
    impl FrameSink for PendingSink {
        async fn send_frame(&mut self, _frame: Message) -> Result<(), WsError> {
            std::future::pending::<()>().await;
            unreachable!()
        }
    }

    struct RecordingSink(Vec<Message>);

    #[async_trait]
    impl FrameSink for RecordingSink {
        async fn send_frame(&mut self, frame: Message) -> Result<(), WsError> {
            self.0.push(frame);
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_write_times_out() {
        let writer = WsWriter::new(Box::new(PendingSink), Duration::from_secs(60));
        let err = writer
            .send_text("{\"op\":\"ping\"}".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, WsError::WriteTimeout(_)));
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let writer = WsWriter::new(Box::new(RecordingSink(Vec::new())), Duration::from_secs(1));
        writer.close().await.unwrap();
        writer.close().await.unwrap();
    }

    /// Fails the first send, succeeds afterwards, counting close frames.
    struct FlakySink {
        failures_left: usize,
        closes_sent: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl FrameSink for FlakySink {
        async fn send_frame(&mut self, frame: Message) -> Result<(), WsError> {
            if self.failures_left > 0 {
                self.failures_left -= 1;
                return Err(WsError::Write("flaky transport".to_string()));
            }
            if matches!(frame, Message::Close(_)) {
                self.closes_sent.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn failed_close_is_retried_on_the_next_call() {
        let closes_sent = Arc::new(AtomicUsize::new(0));
        let sink = FlakySink {
            failures_left: 1,
            closes_sent: Arc::clone(&closes_sent),
        };
        let writer = WsWriter::new(Box::new(sink), Duration::from_secs(1));

        let err = writer.close().await.unwrap_err();
        assert!(matches!(err, WsError::Write(_)));
        assert_eq!(closes_sent.load(Ordering::SeqCst), 0);

        writer.close().await.unwrap();
        assert_eq!(closes_sent.load(Ordering::SeqCst), 1);

        // Once a close frame has gone out the flag stays latched.
        writer.close().await.unwrap();
        assert_eq!(closes_sent.load(Ordering::SeqCst), 1);
    }

    struct EmptyStream;

    #[async_trait]
    impl FrameStream for EmptyStream {
        async fn next_frame(&mut self) -> Option<Result<Message, WsError>> {
            None
        }
    }

    #[tokio::test]
    async fn ended_stream_reads_as_remote_close() {
        let mut reader = WsReader::new(Box::new(EmptyStream));
        let err = reader.recv().await.unwrap_err();
        assert!(err.is_normal_close());
    }
}
