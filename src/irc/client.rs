//! Duplex connection client.
//!
//! A [`Client`] owns one byte stream and splits it into two flows:
//!
//! - the decode flow ([`Client::consume_messages`]) runs the [`Scanner`] in a
//!   loop and hands every message or decode error to the [`Inbound`] side,
//!   blocking until the consumer has taken it;
//! - the encode flow ([`Client::send`]) writes commands from whichever task
//!   calls it, serialized by a lock on the write half.
//!
//! Lifecycle is `Open -> Closing -> Closed`. Closing starts on [`Client::close`]
//! or when the stream ends; Closed is reached once the decode flow has exited
//! and the stream has been shut down, at which point [`Client::done`] resolves.

use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::commands::Command;
use super::message::Message;
use super::scanner::{ScanError, Scanner};

const CRLF: &[u8] = b"\r\n";

/// How long releasing the stream may wait on the write half to shut down.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

type BoxReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Stream-level failures. These end the connection.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    #[error("connection closed by peer")]
    EndOfStream,
    #[error("read failed: {0}")]
    Read(Arc<io::Error>),
    #[error("write failed: {0}")]
    Write(Arc<io::Error>),
    #[error("client is closed")]
    Closed,
}

impl ClientError {
    fn from_scan(err: ScanError) -> Self {
        match err {
            ScanError::Io(e) => Self::Read(Arc::new(e)),
            _ => Self::EndOfStream,
        }
    }
}

/// Something the decode flow produced.
#[derive(Debug)]
pub enum Event {
    Message(Message),
    /// A line that could not be decoded. Scanning carries on after it.
    Error(ScanError),
}

/// Receiving side of a [`Client`].
pub struct Inbound {
    messages: mpsc::Receiver<Message>,
    errors: mpsc::Receiver<ScanError>,
    done: CancellationToken,
}

impl Inbound {
    /// Next message or decode error, in stream order. `None` once the client
    /// is done; nothing is delivered after that point.
    pub async fn next(&mut self) -> Option<Event> {
        if self.done.is_cancelled() {
            return None;
        }
        tokio::select! {
            biased;
            _ = self.done.cancelled() => None,
            Some(message) = self.messages.recv() => Some(Event::Message(message)),
            Some(err) = self.errors.recv() => Some(Event::Error(err)),
        }
    }
}

impl fmt::Debug for Inbound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Inbound")
            .field("done", &self.done.is_cancelled())
            .finish_non_exhaustive()
    }
}

struct Reader {
    scanner: Scanner<BoxReader>,
    messages: mpsc::Sender<Message>,
    errors: mpsc::Sender<ScanError>,
}

struct Shared {
    reader: Mutex<Option<Reader>>,
    writer: tokio::sync::Mutex<Option<BoxWriter>>,
    cancel: CancellationToken,
    done: CancellationToken,
    last_error: Mutex<Option<ClientError>>,
}

/// Cheap to clone; all clones drive the same connection.
#[derive(Clone)]
pub struct Client {
    shared: Arc<Shared>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("closed", &self.is_closed())
            .field("done", &self.is_done())
            .finish()
    }
}

impl Client {
    /// Wraps `stream`. Cancelling `cancel` (or a parent it was derived from)
    /// closes the client. The decode flow does not run until
    /// [`Client::consume_messages`] or [`Client::spawn`] is called.
    pub fn new<S>(stream: S, cancel: CancellationToken) -> (Self, Inbound)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let (message_tx, message_rx) = mpsc::channel(1);
        let (error_tx, error_rx) = mpsc::channel(1);
        let done = CancellationToken::new();

        let reader = Reader {
            scanner: Scanner::new(Box::new(read_half) as BoxReader),
            messages: message_tx,
            errors: error_tx,
        };

        let client = Self {
            shared: Arc::new(Shared {
                reader: Mutex::new(Some(reader)),
                writer: tokio::sync::Mutex::new(Some(Box::new(write_half) as BoxWriter)),
                cancel,
                done: done.clone(),
                last_error: Mutex::new(None),
            }),
        };
        let inbound = Inbound {
            messages: message_rx,
            errors: error_rx,
            done,
        };
        (client, inbound)
    }

    /// Runs the decode flow on a new task.
    pub fn spawn(&self) -> JoinHandle<()> {
        let client = self.clone();
        tokio::spawn(async move { client.consume_messages().await })
    }

    /// Runs the decode flow until the stream ends or the client is closed,
    /// then releases the stream. Only the first call does anything.
    pub async fn consume_messages(&self) {
        let reader = self.shared.reader.lock().take();
        let Some(reader) = reader else {
            warn!("decode flow already started");
            return;
        };

        self.read_input(reader).await;
        self.release().await;
    }

    /// Writes each command followed by `\r\n`, in order. Stops at the first
    /// failure; a failed write closes the client. A write still pending when
    /// the client closes is abandoned with [`ClientError::Closed`].
    pub async fn send<I>(&self, commands: I) -> Result<(), ClientError>
    where
        I: IntoIterator<Item = Command>,
    {
        if self.is_closed() {
            return Err(ClientError::Closed);
        }
        let mut guard = tokio::select! {
            biased;
            _ = self.shared.cancel.cancelled() => return Err(ClientError::Closed),
            guard = self.shared.writer.lock() => guard,
        };
        let writer = guard.as_mut().ok_or(ClientError::Closed)?;

        for command in commands {
            if command.is_secret() {
                debug!("> PASS oauth:***");
            } else {
                debug!("> {}", command);
            }

            let mut line = command.to_bytes();
            line.extend_from_slice(CRLF);
            let written = tokio::select! {
                biased;
                _ = self.shared.cancel.cancelled() => return Err(ClientError::Closed),
                written = async {
                    writer.write_all(&line).await?;
                    writer.flush().await
                } => written,
            };

            if let Err(e) = written {
                let err = ClientError::Write(Arc::new(e));
                warn!(error = %err, "write failed, closing client");
                self.shared.last_error.lock().get_or_insert(err.clone());
                self.shared.cancel.cancel();
                return Err(err);
            }
        }
        Ok(())
    }

    /// Requests shutdown. Safe to call any number of times.
    pub fn close(&self) {
        if !self.shared.cancel.is_cancelled() {
            debug!("closing client");
        }
        self.shared.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }

    pub fn is_done(&self) -> bool {
        self.shared.done.is_cancelled()
    }

    /// Resolves once the decode flow has exited and the stream is released.
    pub async fn done(&self) {
        self.shared.done.cancelled().await
    }

    /// Why the connection ended, if it was not a deliberate close.
    pub fn err(&self) -> Option<ClientError> {
        self.shared.last_error.lock().clone()
    }

    async fn read_input(&self, reader: Reader) {
        let Reader {
            mut scanner,
            messages,
            errors,
        } = reader;

        loop {
            let scanned = tokio::select! {
                biased;
                _ = self.shared.cancel.cancelled() => break,
                scanned = scanner.scan() => scanned,
            };

            let delivered = match scanned {
                Ok(message) => {
                    trace!(?message, "received");
                    self.publish(&messages, message).await
                }
                Err(ScanError::EmptyMessage) => continue,
                Err(err) if err.is_fatal() => {
                    warn!(error = %err, "input stream ended");
                    self.shared
                        .last_error
                        .lock()
                        .get_or_insert(ClientError::from_scan(err));
                    self.shared.cancel.cancel();
                    break;
                }
                Err(err) => {
                    debug!(error = %err, "skipping undecodable line");
                    self.publish(&errors, err).await
                }
            };

            if !delivered {
                break;
            }
        }
    }

    /// Hands `item` to the consumer and waits until it has been taken.
    /// False if the client was closed meanwhile or the consumer is gone.
    async fn publish<T>(&self, tx: &mpsc::Sender<T>, item: T) -> bool {
        let handoff = async {
            if tx.send(item).await.is_err() {
                return false;
            }
            tx.reserve().await.is_ok()
        };

        let taken = tokio::select! {
            biased;
            _ = self.shared.cancel.cancelled() => return false,
            taken = handoff => taken,
        };
        if !taken {
            info!("inbound consumer dropped, closing client");
            self.shared.cancel.cancel();
        }
        taken
    }

    async fn release(&self) {
        if let Some(mut writer) = self.shared.writer.lock().await.take() {
            match tokio::time::timeout(SHUTDOWN_TIMEOUT, writer.shutdown()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!(error = %e, "stream shutdown failed"),
                Err(_) => debug!("stream shutdown timed out"),
            }
        }
        self.shared.cancel.cancel();
        self.shared.done.cancel();
        info!("client closed");
    }
}
