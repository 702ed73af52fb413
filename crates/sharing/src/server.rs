//! One-shot TCP file server (upload side).
//!
//! Each session gets its own listener on its allocated port. The listener
//! accepts a single peer, hands the connection to a send task, and is
//! dropped; the port never serves a second connection.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::constants::{ACCEPT_TIMEOUT, SESSION_HOST, TRANSFER_BUFFER_SIZE, TRANSFER_TIMEOUT};
use crate::error::{timed_out, ShareError, ShareResult};
use crate::registry::{Offer, SessionState, SessionStore};
use crate::wire::write_header;

/// Ports drawn before giving up when every candidate is taken by another process.
const BIND_ATTEMPTS: usize = 16;

/// How a session's background server finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServeOutcome {
    /// Header and file bytes were written and the connection closed.
    Sent { bytes: u64 },
    /// No peer connected in time. The session stays registered.
    AcceptTimeout,
    /// A peer connected after the session had already been retired.
    Aborted,
    /// Accepting or sending failed.
    Failed,
}

/// Ephemeral one-shot file server.
#[derive(Clone)]
pub struct EphemeralFileServer {
    store: Arc<dyn SessionStore>,
    accept_timeout: Duration,
    send_timeout: Duration,
}

impl EphemeralFileServer {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self {
            store,
            accept_timeout: ACCEPT_TIMEOUT,
            send_timeout: TRANSFER_TIMEOUT,
        }
    }

    pub fn with_timeouts(mut self, accept: Duration, send: Duration) -> Self {
        self.accept_timeout = accept;
        self.send_timeout = send;
        self
    }

    /// Offers a stored file and binds a listener on the allocated port.
    ///
    /// A port that turns out to be held by another process is released and a
    /// new one drawn. On success the session is `Listening`.
    pub async fn listen(
        &self,
        file_path: PathBuf,
        filename: String,
    ) -> ShareResult<(Offer, TcpListener)> {
        let mut last_err = None;

        for _ in 0..BIND_ATTEMPTS {
            let offer = self.store.offer(file_path.clone(), filename.clone());
            match TcpListener::bind((SESSION_HOST, offer.port)).await {
                Ok(listener) => {
                    self.store.set_state(offer.port, SessionState::Listening);
                    info!(port = offer.port, "Serving {} on ephemeral port", filename);
                    return Ok((offer, listener));
                }
                Err(e) => {
                    warn!(port = offer.port, "Port unavailable, drawing another: {}", e);
                    self.store.release(offer.port);
                    last_err = Some(e);
                }
            }
        }

        Err(ShareError::TransferIo(last_err.unwrap_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::AddrInUse, "no bindable port found")
        })))
    }

    /// Spawns the accept-once task for a bound listener.
    ///
    /// The returned handle resolves when the session's transfer is over; it
    /// may be dropped to let the task run detached.
    pub fn serve(&self, port: u16, listener: TcpListener) -> JoinHandle<ServeOutcome> {
        let server = self.clone();
        tokio::spawn(async move { server.accept_once(port, listener).await })
    }

    async fn accept_once(self, port: u16, listener: TcpListener) -> ServeOutcome {
        let stream = match tokio::time::timeout(self.accept_timeout, listener.accept()).await {
            Ok(Ok((stream, addr))) => {
                info!(port, %addr, "Client connection accepted");
                stream
            }
            Ok(Err(e)) => {
                error!(port, "Error accepting on ephemeral port: {}", e);
                return ServeOutcome::Failed;
            }
            Err(_) => {
                info!(port, "No client connected before accept timeout");
                return ServeOutcome::AcceptTimeout;
            }
        };

        // Only one connection per session.
        drop(listener);

        // Claim the session before reading it so a concurrent sweep skips it.
        if !self.store.set_state(port, SessionState::Serving) {
            warn!(port, "Session retired before its peer connected");
            return ServeOutcome::Aborted;
        }
        let Some(session) = self.store.get(port) else {
            warn!(port, "Session retired before its peer connected");
            return ServeOutcome::Aborted;
        };

        let sender = tokio::spawn(send_file(
            stream,
            session.file_path,
            session.filename,
            self.send_timeout,
        ));

        let outcome = match sender.await {
            Ok(Ok(bytes)) => {
                info!(port, bytes, "File sent");
                ServeOutcome::Sent { bytes }
            }
            Ok(Err(e)) => {
                error!(port, "Error sending file to the client: {}", e);
                ServeOutcome::Failed
            }
            Err(e) => {
                error!(port, "Send task did not complete: {}", e);
                ServeOutcome::Failed
            }
        };

        // The port will never serve again. Unless the relay already retired
        // the session, hand it back to the expiry sweep.
        if self.store.set_state(port, SessionState::Completed) {
            debug!(port, ?outcome, "Transfer over, awaiting cleanup");
        }

        outcome
    }
}

/// Writes the header line and the file bytes, then closes the connection.
async fn send_file(
    mut stream: TcpStream,
    file_path: PathBuf,
    filename: String,
    send_timeout: Duration,
) -> std::io::Result<u64> {
    let mut file = tokio::fs::File::open(&file_path).await?;

    with_deadline(send_timeout, write_header(&mut stream, &filename)).await?;

    let mut total: u64 = 0;
    let mut buf = vec![0u8; TRANSFER_BUFFER_SIZE];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        with_deadline(send_timeout, stream.write_all(&buf[..n])).await?;
        total += n as u64;
    }

    with_deadline(send_timeout, stream.shutdown()).await?;
    debug!(path = %file_path.display(), total, "Send task finished");
    Ok(total)
}

async fn with_deadline<T>(
    limit: Duration,
    op: impl Future<Output = std::io::Result<T>>,
) -> std::io::Result<T> {
    tokio::time::timeout(limit, op)
        .await
        .map_err(|_| timed_out("send"))?
}
