//! HTTP front end for PeerLink
//!
//! Accepts multipart uploads, hands them to the session engine in the
//! `sharing` crate, and relays downloads back to token holders.

mod error;
mod server;
mod state;

pub use error::AppError;
pub use server::{
    FileServerApi, UploadResponse, DEFAULT_MAX_CONCURRENT_REQUESTS, DEFAULT_SESSION_TTL,
    DEFAULT_SWEEP_INTERVAL,
};
pub use state::ServerState;

/// Result type alias for file server operations
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;
