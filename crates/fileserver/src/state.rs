//! Shared state handed to every request handler

use std::sync::Arc;

use sharing::{ShareService, UploadGate};

/// Server state: the session engine plus the upload gate
#[derive(Clone)]
pub struct ServerState {
    service: ShareService,
    gate: Arc<UploadGate>,
}

impl ServerState {
    /// Create new server state
    ///
    /// # Arguments
    /// * `service` - Session engine shared by all handlers
    /// * `gate` - Upload rate limiter keyed by client IP
    pub fn new(service: ShareService, gate: UploadGate) -> Self {
        Self {
            service,
            gate: Arc::new(gate),
        }
    }

    /// Get the session engine
    pub fn service(&self) -> &ShareService {
        &self.service
    }

    /// Get the upload gate
    pub fn gate(&self) -> &UploadGate {
        &self.gate
    }

    /// Get count of active sessions
    pub fn session_count(&self) -> usize {
        self.service.session_count()
    }

    /// Retire expired sessions and forget stale rate-limit windows
    ///
    /// # Returns
    /// * Number of sessions cleaned up
    pub fn sweep(&self, session_ttl: chrono::Duration) -> usize {
        let cleaned = self.service.reap(session_ttl);
        let pruned = self.gate.prune();
        if pruned > 0 {
            tracing::debug!("Pruned {} upload gate records", pruned);
        }
        cleaned
    }
}
