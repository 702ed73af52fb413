//! Download-side relay.
//!
//! Resolves a token to its session port, drains the ephemeral endpoint into
//! an anonymous temp file and retires the session once the sender has closed
//! the connection.

use std::io::SeekFrom;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{error, info};

use crate::constants::{SESSION_HOST, TRANSFER_BUFFER_SIZE, TRANSFER_TIMEOUT};
use crate::error::{timed_out, ShareError, ShareResult};
use crate::registry::SessionStore;
use crate::token::is_well_formed_token;
use crate::wire::{parse_header_line, read_header_line};

/// A fully received file, buffered in temporary storage.
///
/// The backing temp file is already unlinked; dropping the `Download` (or the
/// file returned by [`into_file`](Self::into_file)) releases it.
#[derive(Debug)]
pub struct Download {
    filename: String,
    len: u64,
    file: File,
}

impl Download {
    /// Name announced by the sender, or the fallback name
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Number of file bytes received
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The buffered bytes, positioned at the start
    pub fn into_file(self) -> File {
        self.file
    }

    /// Read the whole payload into memory
    pub async fn bytes(self) -> std::io::Result<Vec<u8>> {
        let mut file = self.file;
        let mut buf = Vec::with_capacity(self.len as usize);
        file.read_to_end(&mut buf).await?;
        Ok(buf)
    }
}

/// Client for ephemeral session endpoints.
#[derive(Clone)]
pub struct TransferClient {
    store: Arc<dyn SessionStore>,
    io_timeout: Duration,
}

impl TransferClient {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self {
            store,
            io_timeout: TRANSFER_TIMEOUT,
        }
    }

    /// Bound on the connect and on each read
    pub fn with_timeout(mut self, io_timeout: Duration) -> Self {
        self.io_timeout = io_timeout;
        self
    }

    /// Retrieve the file guarded by `token` and retire its session.
    ///
    /// # Errors
    /// * [`ShareError::InvalidToken`] - token does not resolve to a session
    /// * [`ShareError::TransferIo`] - connecting or reading failed; the
    ///   session is left registered
    pub async fn fetch(&self, token: &str) -> ShareResult<Download> {
        if !is_well_formed_token(token) {
            return Err(ShareError::InvalidToken);
        }
        let port = self
            .store
            .port_for_token(token)
            .ok_or(ShareError::InvalidToken)?;

        let download = self.receive(port).await.map_err(|e| {
            error!(port, "Error downloading file from peer: {}", e);
            ShareError::TransferIo(e)
        })?;

        info!(port, bytes = download.len, "Received {}", download.filename);
        self.store.cleanup(port);
        Ok(download)
    }

    async fn receive(&self, port: u16) -> std::io::Result<Download> {
        let addr = SocketAddr::new(SESSION_HOST, port);
        let stream = tokio::time::timeout(self.io_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| timed_out("connect"))??;
        let mut reader = BufReader::new(stream);

        let header = tokio::time::timeout(self.io_timeout, read_header_line(&mut reader))
            .await
            .map_err(|_| timed_out("header read"))??;
        let filename = parse_header_line(&header);

        let mut file = File::from_std(tempfile::tempfile()?);
        let mut len: u64 = 0;
        let mut buf = vec![0u8; TRANSFER_BUFFER_SIZE];
        loop {
            let n = tokio::time::timeout(self.io_timeout, reader.read(&mut buf))
                .await
                .map_err(|_| timed_out("read"))??;
            if n == 0 {
                break;
            }
            file.write_all(&buf[..n]).await?;
            len += n as u64;
        }

        file.flush().await?;
        file.seek(SeekFrom::Start(0)).await?;

        Ok(Download {
            filename,
            len,
            file,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{SessionRegistry, SessionState};
    use crate::server::{EphemeralFileServer, ServeOutcome};
    use std::path::PathBuf;

    fn setup() -> (Arc<SessionRegistry>, EphemeralFileServer, TransferClient) {
        let registry = Arc::new(SessionRegistry::new());
        let server = EphemeralFileServer::new(registry.clone());
        let client = TransferClient::new(registry.clone());
        (registry, server, client)
    }

    fn stored(dir: &tempfile::TempDir, data: &[u8]) -> PathBuf {
        let path = dir.path().join("stored");
        std::fs::write(&path, data).unwrap();
        path
    }

    #[tokio::test]
    async fn round_trip_retires_session() {
        let dir = tempfile::tempdir().unwrap();
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        let path = stored(&dir, &data);

        let (registry, server, client) = setup();
        let (offer, listener) = server.listen(path.clone(), "photo.png".into()).await.unwrap();
        let handle = server.serve(offer.port, listener);

        let download = client.fetch(&offer.token).await.unwrap();
        assert_eq!(download.filename(), "photo.png");
        assert_eq!(download.len(), data.len() as u64);
        assert_eq!(download.bytes().await.unwrap(), data);

        assert_eq!(
            handle.await.unwrap(),
            ServeOutcome::Sent {
                bytes: data.len() as u64
            }
        );
        assert!(registry.port_for_token(&offer.token).is_none());
        assert!(registry.is_empty());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn token_is_single_use() {
        let dir = tempfile::tempdir().unwrap();
        let (_registry, server, client) = setup();
        let (offer, listener) = server
            .listen(stored(&dir, b"once"), "a.txt".into())
            .await
            .unwrap();
        server.serve(offer.port, listener);

        client.fetch(&offer.token).await.unwrap();
        let second = client.fetch(&offer.token).await;
        assert!(matches!(second, Err(ShareError::InvalidToken)));
    }

    #[tokio::test]
    async fn unknown_token() {
        let (_registry, _server, client) = setup();
        let result = client.fetch("123456").await;
        assert!(matches!(result, Err(ShareError::InvalidToken)));
    }

    #[tokio::test]
    async fn malformed_token() {
        let (_registry, _server, client) = setup();
        for token in ["", "12345", "abcdef", "1234567"] {
            let result = client.fetch(token).await;
            assert!(matches!(result, Err(ShareError::InvalidToken)), "token {token:?}");
        }
    }

    #[tokio::test]
    async fn silent_peer_times_out() {
        let (registry, server, client) = setup();
        let client = client.with_timeout(Duration::from_millis(100));
        let (offer, _listener) = server
            .listen(PathBuf::from("/unused"), "a.txt".into())
            .await
            .unwrap();

        // The connection lands in the backlog but nothing is ever sent.
        let result = client.fetch(&offer.token).await;
        assert!(matches!(result, Err(ShareError::TransferIo(_))));
        assert_eq!(registry.port_for_token(&offer.token), Some(offer.port));
    }

    #[tokio::test]
    async fn nothing_listening_leaves_registry_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, server, client) = setup();
        let (offer, listener) = server
            .listen(stored(&dir, b"data"), "a.txt".into())
            .await
            .unwrap();
        drop(listener);

        let result = client.fetch(&offer.token).await;
        assert!(matches!(result, Err(ShareError::TransferIo(_))));
        assert_eq!(registry.port_for_token(&offer.token), Some(offer.port));
        assert_eq!(registry.get(offer.port).unwrap().state, SessionState::Listening);
    }

    #[tokio::test]
    async fn missing_header_uses_fallback_name() {
        let (registry, server, client) = setup();
        let (offer, listener) = server
            .listen(PathBuf::from("/unused"), "a.txt".into())
            .await
            .unwrap();

        // A peer that speaks no header, just a first line and bytes.
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            stream.write_all(b"not a header\nbody").await.unwrap();
        });

        let download = client.fetch(&offer.token).await.unwrap();
        assert_eq!(download.filename(), "downloaded-file");
        assert_eq!(download.bytes().await.unwrap(), b"body");
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn empty_file_transfers() {
        let dir = tempfile::tempdir().unwrap();
        let (_registry, server, client) = setup();
        let (offer, listener) = server
            .listen(stored(&dir, b""), "empty.txt".into())
            .await
            .unwrap();
        server.serve(offer.port, listener);

        let download = client.fetch(&offer.token).await.unwrap();
        assert_eq!(download.filename(), "empty.txt");
        assert!(download.is_empty());
    }
}
