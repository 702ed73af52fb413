//! Upload and download orchestration
//!
//! Ties the policy, storage, registry, ephemeral server and transfer client
//! together. HTTP handlers talk to this type only.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Duration;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::client::{Download, TransferClient};
use crate::error::{ShareError, ShareResult};
use crate::multipart::UploadedFile;
use crate::registry::{Offer, SessionStore};
use crate::server::{EphemeralFileServer, ServeOutcome};
use crate::validation::UploadPolicy;

/// A file that is now being served
#[derive(Debug)]
pub struct Shared {
    /// Port and token to hand to the uploader
    pub offer: Offer,
    /// Resolves when the session's server task ends; drop to detach
    pub completion: JoinHandle<ServeOutcome>,
}

/// Session engine facade
#[derive(Clone)]
pub struct ShareService {
    store: Arc<dyn SessionStore>,
    server: EphemeralFileServer,
    client: TransferClient,
    policy: UploadPolicy,
    upload_dir: PathBuf,
}

impl ShareService {
    /// Create a service storing uploads under `upload_dir`
    ///
    /// # Arguments
    /// * `store` - Session registry shared by the server and client
    /// * `upload_dir` - Directory for persisted uploads (must exist)
    pub fn new(store: Arc<dyn SessionStore>, upload_dir: PathBuf) -> Self {
        Self {
            server: EphemeralFileServer::new(store.clone()),
            client: TransferClient::new(store.clone()),
            store,
            policy: UploadPolicy::default(),
            upload_dir,
        }
    }

    pub fn with_policy(mut self, policy: UploadPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &UploadPolicy {
        &self.policy
    }

    /// Validate, persist and start serving an extracted upload
    ///
    /// Nothing is written to disk unless the upload passes the policy. The
    /// returned port is already bound when this resolves.
    pub async fn share(&self, file: &UploadedFile<'_>) -> ShareResult<Shared> {
        let filename = self.policy.check(file)?;

        let stored_path = self
            .upload_dir
            .join(format!("{}_{}", Uuid::new_v4(), filename));
        tokio::fs::write(&stored_path, file.bytes)
            .await
            .map_err(ShareError::StorageIo)?;

        let (offer, listener) = match self.server.listen(stored_path.clone(), filename).await {
            Ok(bound) => bound,
            Err(e) => {
                if let Err(rm) = tokio::fs::remove_file(&stored_path).await {
                    tracing::warn!("Failed to remove unserved upload {}: {}", stored_path.display(), rm);
                }
                return Err(e);
            }
        };

        let completion = self.server.serve(offer.port, listener);
        Ok(Shared { offer, completion })
    }

    /// Retrieve and retire the session behind `token`
    pub async fn download(&self, token: &str) -> ShareResult<Download> {
        self.client.fetch(token).await
    }

    /// Retire sessions older than `max_age` that are not mid-transfer
    pub fn reap(&self, max_age: Duration) -> usize {
        let cleaned = self.store.cleanup_expired(max_age);
        if cleaned > 0 {
            tracing::info!("Cleaned up {} expired sessions", cleaned);
        }
        cleaned
    }

    /// Number of active sessions
    pub fn session_count(&self) -> usize {
        self.store.len()
    }
}
