//! TCP transport for the line-delimited JSON protocol.
//!
//! One [`Transport`] owns at most one connection. Writes go through an
//! async mutex so concurrent callers never interleave bytes on the wire.
//! A single background task per connection reads frames with
//! [`JsonLineCodec`] and hands each one, in arrival order, to the
//! [`MessageHandler`] injected at construction.
//!
//! ```text
//!  caller ──send()──► [Mutex<Link>] ──write_all──► socket
//!                                                    │
//!  handler ◄── Incoming ◄── FramedRead<JsonLineCodec> ◄┘  (receive task)
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::BytesMut;
use futures::StreamExt;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::codec::{Encoder, FramedRead};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::codec::{DEFAULT_MAX_LINE_LENGTH, JsonLineCodec};
use crate::error::OfsError;
use crate::message::Incoming;
use crate::network::connection::ConnectionInfo;

// ── MessageHandler ───────────────────────────────────────────────

/// Receives every decoded message and lifecycle event of a transport.
///
/// Called synchronously from the receive task, one message at a time.
pub trait MessageHandler: Send + Sync + 'static {
    fn handle(&self, message: Incoming);
}

impl<F> MessageHandler for F
where
    F: Fn(Incoming) + Send + Sync + 'static,
{
    fn handle(&self, message: Incoming) {
        self(message)
    }
}

// ── TransportConfig ──────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Upper bound on establishing the TCP connection.
    pub connect_timeout: Duration,
    /// Upper bound on writing one request.
    pub write_timeout: Duration,
    /// Longest line the receive task accepts.
    pub max_line_length: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(5),
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }
}

// ── Link ─────────────────────────────────────────────────────────

/// A live connection: the write half plus the handle on its receive task.
struct Link {
    info: ConnectionInfo,
    writer: OwnedWriteHalf,
    alive: Arc<AtomicBool>,
    cancel: CancellationToken,
    reader: Option<JoinHandle<()>>,
}

impl Link {
    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Stop the receive task and close both directions of the socket.
    async fn shutdown(mut self, grace: Duration) {
        self.alive.store(false, Ordering::SeqCst);
        self.cancel.cancel();
        match tokio::time::timeout(grace, self.writer.shutdown()).await {
            Ok(Err(e)) => debug!("shutdown of {} failed: {e}", self.info),
            Err(_) => debug!("shutdown of {} timed out", self.info),
            Ok(Ok(())) => {}
        }
        if let Some(reader) = self.reader.take() {
            let _ = reader.await;
        }
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ── Transport ────────────────────────────────────────────────────

pub struct Transport {
    config: TransportConfig,
    handler: Arc<dyn MessageHandler>,
    link: Mutex<Option<Link>>,
}

impl Transport {
    pub fn new(handler: Arc<dyn MessageHandler>) -> Self {
        Self::with_config(TransportConfig::default(), handler)
    }

    pub fn with_config(config: TransportConfig, handler: Arc<dyn MessageHandler>) -> Self {
        Self {
            config,
            handler,
            link: Mutex::new(None),
        }
    }

    /// Open the connection and start the receive task.
    ///
    /// Calling this while a live connection exists is a no-op. A
    /// connection that the peer already closed is replaced.
    pub async fn connect(&self, info: &ConnectionInfo) -> Result<(), OfsError> {
        info.validate()?;

        let mut slot = self.link.lock().await;
        if let Some(link) = slot.as_ref() {
            if link.is_alive() {
                debug!("already connected to {}", link.info);
                return Ok(());
            }
        }
        if let Some(stale) = slot.take() {
            stale.shutdown(self.config.write_timeout).await;
        }

        let addr = info.to_string();
        let stream = match tokio::time::timeout(
            self.config.connect_timeout,
            TcpStream::connect(addr.as_str()),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => return Err(OfsError::Connection { addr, source }),
            Err(_) => {
                return Err(OfsError::Connection {
                    addr,
                    source: std::io::Error::new(
                        std::io::ErrorKind::TimedOut,
                        "connect timed out",
                    ),
                });
            }
        };
        stream.set_nodelay(true).map_err(|source| OfsError::Connection {
            addr: addr.clone(),
            source,
        })?;

        let (read_half, writer) = stream.into_split();
        let alive = Arc::new(AtomicBool::new(true));
        let cancel = CancellationToken::new();
        let reader = tokio::spawn(receive_loop(
            read_half,
            JsonLineCodec::with_max_length(self.config.max_line_length),
            Arc::clone(&self.handler),
            Arc::clone(&alive),
            cancel.clone(),
        ));

        info!("connected to {addr}");
        *slot = Some(Link {
            info: info.clone(),
            writer,
            alive,
            cancel,
            reader: Some(reader),
        });
        Ok(())
    }

    /// Write one newline-terminated message.
    pub async fn send(&self, text: &str) -> Result<(), OfsError> {
        let mut buf = BytesMut::with_capacity(text.len() + 1);
        JsonLineCodec::new().encode(text.to_owned(), &mut buf)?;

        let mut slot = self.link.lock().await;
        let link = match slot.as_mut() {
            Some(link) if link.is_alive() => link,
            _ => return Err(OfsError::NotConnected),
        };

        let result = match tokio::time::timeout(
            self.config.write_timeout,
            link.writer.write_all(&buf),
        )
        .await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "write timed out",
            )),
        };

        match result {
            Ok(()) => {
                debug!(bytes = buf.len(), "sent to {}", link.info);
                Ok(())
            }
            Err(e) => {
                // A partial write leaves the stream unusable for framing.
                warn!("write to {} failed: {e}", link.info);
                link.alive.store(false, Ordering::SeqCst);
                Err(OfsError::Send(e))
            }
        }
    }

    /// Close the connection, if any. Idempotent.
    ///
    /// Returns once the receive task has stopped; the handler is not
    /// invoked again afterwards.
    pub async fn close(&self) {
        let link = self.link.lock().await.take();
        if let Some(link) = link {
            let info = link.info.clone();
            link.shutdown(self.config.write_timeout).await;
            info!("disconnected from {info}");
        }
    }

    /// Whether a live connection exists.
    pub async fn is_connected(&self) -> bool {
        self.link
            .lock()
            .await
            .as_ref()
            .is_some_and(Link::is_alive)
    }
}

// ── Receive task ─────────────────────────────────────────────────

/// Decode frames from `reader` until EOF, a read error, or cancellation.
///
/// EOF and read errors are reported to the handler as lifecycle events.
/// Cancellation is silent.
pub(crate) async fn receive_loop<R>(
    reader: R,
    codec: JsonLineCodec,
    handler: Arc<dyn MessageHandler>,
    alive: Arc<AtomicBool>,
    cancel: CancellationToken,
) where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut frames = FramedRead::new(reader, codec);
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = frames.next() => next,
        };
        if cancel.is_cancelled() {
            break;
        }
        match next {
            Some(Ok(message)) => handler.handle(message),
            Some(Err(e)) => {
                warn!("receive failed: {e}");
                alive.store(false, Ordering::SeqCst);
                handler.handle(Incoming::Error(e.to_string()));
                break;
            }
            None => {
                info!("peer closed the connection");
                alive.store(false, Ordering::SeqCst);
                handler.handle(Incoming::Closed);
                break;
            }
        }
    }
    alive.store(false, Ordering::SeqCst);
    debug!("receive task stopped");
}
