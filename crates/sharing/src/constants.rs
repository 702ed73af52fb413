//! Constants used throughout the session engine

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

/// First port of the IANA dynamic/private range
pub const EPHEMERAL_PORT_START: u16 = 49152;

/// Last port of the IANA dynamic/private range (inclusive)
pub const EPHEMERAL_PORT_END: u16 = 65535;

/// Smallest 6-digit access token
pub const TOKEN_MIN: u32 = 100_000;

/// Largest 6-digit access token (inclusive)
pub const TOKEN_MAX: u32 = 999_999;

/// Address ephemeral listeners bind to and the relay dials
///
/// Only the local relay may reach a session port; remote peers go through
/// the token-checked download route.
pub const SESSION_HOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// How long an ephemeral listener waits for its single peer
pub const ACCEPT_TIMEOUT: Duration = Duration::from_secs(50);

/// Upper bound on each socket write of the sender and each read of the receiver
pub const TRANSFER_TIMEOUT: Duration = Duration::from_secs(30);

/// Copy buffer used when streaming file bytes over the ephemeral socket
pub const TRANSFER_BUFFER_SIZE: usize = 4096;

/// Longest header line the receiver will accept before giving up
pub const MAX_HEADER_LEN: usize = 4096;

/// Maximum upload size: 500 MiB
pub const MAX_UPLOAD_SIZE: u64 = 500 * 1024 * 1024;

/// Upload gate window length
pub const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);

/// Uploads allowed per identity per window
pub const RATE_LIMIT_MAX_UPLOADS: u32 = 10;

/// Filename used by the receiver when the header line is missing or malformed
pub const DEFAULT_DOWNLOAD_NAME: &str = "downloaded-file";

/// Filename used when the upload carries a blank name
pub const DEFAULT_UPLOAD_NAME: &str = "unnamed-file.txt";

/// Content type assumed when a part declares none, and served on download
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Upload whitelists
pub mod whitelist {
    /// Lower-case filename suffixes accepted for upload
    pub const EXTENSIONS: &[&str] = &[
        ".txt", ".pdf", ".jpg", ".jpeg", ".png", ".gif", ".zip", ".doc", ".docx", ".csv",
    ];

    /// MIME types accepted for upload (matched by containment, case-insensitive)
    pub const MIME_TYPES: &[&str] = &[
        "text/plain",
        "application/pdf",
        "image/jpeg",
        "image/png",
        "image/gif",
        "application/zip",
        "application/x-zip-compressed",
        "application/x-zip",
        "application/octet-stream",
        "application/msword",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "text/csv",
    ];
}
