//! One-shot file sharing over ephemeral TCP endpoints
//!
//! An upload is persisted and offered on a random port from the dynamic
//! range, guarded by a 6-digit token. The first peer to present the token
//! gets the file relayed to it exactly once, after which the file, port and
//! token are retired.

pub mod client;
pub mod constants;
pub mod error;
pub mod multipart;
pub mod rate_limit;
pub mod registry;
pub mod server;
pub mod service;
pub mod token;
pub mod validation;
pub mod wire;

pub use client::{Download, TransferClient};
pub use error::{ShareError, ShareResult};
pub use multipart::{extract, parse_boundary, UploadedFile};
pub use rate_limit::UploadGate;
pub use registry::{Offer, Session, SessionRegistry, SessionState, SessionStore};
pub use server::{EphemeralFileServer, ServeOutcome};
pub use service::{ShareService, Shared};
pub use validation::UploadPolicy;
