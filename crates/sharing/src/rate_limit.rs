//! Fixed-window upload rate limiting
//!
//! Each client identity gets a window that opens with its first upload. The
//! window does not slide: once it has elapsed, the next upload starts a
//! fresh window with a count of one.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::constants::{RATE_LIMIT_MAX_UPLOADS, RATE_LIMIT_WINDOW};
use crate::error::{ShareError, ShareResult};

/// Upload counter for one client
#[derive(Debug, Clone, Copy)]
struct UploadRecord {
    window_start: Instant,
    count: u32,
}

/// Thread-safe fixed-window limiter keyed by client address
pub struct UploadGate {
    records: Mutex<HashMap<IpAddr, UploadRecord>>,
    window: Duration,
    limit: u32,
}

impl Default for UploadGate {
    fn default() -> Self {
        Self::new()
    }
}

impl UploadGate {
    /// Create a gate allowing 10 uploads per 60 seconds
    pub fn new() -> Self {
        Self::with_limit(RATE_LIMIT_MAX_UPLOADS, RATE_LIMIT_WINDOW)
    }

    pub fn with_limit(limit: u32, window: Duration) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            window,
            limit,
        }
    }

    /// Admit or reject an upload from `client`
    ///
    /// # Errors
    /// [`ShareError::RateLimited`] once the client has exceeded its allowance
    /// for the current window
    pub fn check(&self, client: IpAddr) -> ShareResult<()> {
        self.check_at(client, Instant::now())
    }

    /// Same as [`check`](Self::check) with an explicit arrival time
    pub fn check_at(&self, client: IpAddr, now: Instant) -> ShareResult<()> {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());

        let record = records.entry(client).or_insert(UploadRecord {
            window_start: now,
            count: 0,
        });

        if now.saturating_duration_since(record.window_start) > self.window {
            record.window_start = now;
            record.count = 0;
        }

        record.count = record.count.saturating_add(1);
        if record.count > self.limit {
            tracing::warn!(%client, count = record.count, "Upload rate limit exceeded");
            return Err(ShareError::RateLimited {
                limit: self.limit,
                window_secs: self.window.as_secs(),
            });
        }

        Ok(())
    }

    /// Drop records whose window has elapsed (call periodically)
    ///
    /// Returns the number of records removed.
    pub fn prune(&self) -> usize {
        let now = Instant::now();
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        let before = records.len();
        records.retain(|_, record| now.saturating_duration_since(record.window_start) <= self.window);
        before - records.len()
    }

    /// Number of tracked clients
    pub fn tracked(&self) -> usize {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
