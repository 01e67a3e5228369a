use crate::core::errors::WsError;
use crate::ws::connection::{WsReader, WsWriter};
use crate::ws::router::TopicRouter;
use crate::ws::types::{Command, Op};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// How long a cancelled supervisor waits for the read loop to observe the
/// close frame before giving up on it.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

enum Exit {
    Cancelled,
    ReadLoopDone,
    KeepaliveFailed(WsError),
}

/// Drive the connection until it dies or is cancelled.
///
/// Two concurrent units: the read/dispatch loop runs as its own task, and
/// this future supervises it while driving the keepalive timer. A fatal
/// dispatch error (including a clean remote close) is reported through
/// `on_error` exactly once and ends the read loop; the supervisor then
/// returns `Ok(())`. A keepalive send failure is returned directly.
pub(crate) async fn run<F>(
    writer: WsWriter,
    router: Arc<TopicRouter>,
    mut reader: WsReader,
    ping_interval: Duration,
    cancel: CancellationToken,
    mut on_error: F,
) -> Result<(), WsError>
where
    F: FnMut(bool, WsError) + Send + 'static,
{
    let mut read_task = tokio::spawn(async move {
        loop {
            if let Err(err) = router.run_once(&mut reader).await {
                let normal = err.is_normal_close();
                if normal {
                    debug!("read loop ended: {err}");
                } else {
                    warn!("read loop ended: {err}");
                }
                on_error(normal, err);
                break;
            }
        }
    });

    let ping_payload = Command::new(Op::Ping, Vec::new()).encode()?;
    // interval() would tick immediately; the first keepalive belongs one full
    // interval after startup.
    let mut keepalive =
        tokio::time::interval_at(tokio::time::Instant::now() + ping_interval, ping_interval);
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let exit = loop {
        tokio::select! {
            () = cancel.cancelled() => break Exit::Cancelled,
            _ = &mut read_task => break Exit::ReadLoopDone,
            _ = keepalive.tick() => {
                if let Err(err) = writer.keepalive(ping_payload.clone()).await {
                    break Exit::KeepaliveFailed(err);
                }
            }
        }
    };

    match exit {
        Exit::ReadLoopDone => Ok(()),
        Exit::Cancelled => {
            // Best-effort shutdown: send the close frame and give the peer a
            // bounded window to acknowledge before reclaiming the read task.
            let _ = writer.close().await;
            if tokio::time::timeout(SHUTDOWN_GRACE, &mut read_task)
                .await
                .is_err()
            {
                read_task.abort();
            }
            debug!("supervisor cancelled");
            Ok(())
        }
        Exit::KeepaliveFailed(err) => {
            read_task.abort();
            Err(err)
        }
    }
}
