//! Ephemeral endpoint wire format.
//!
//! ```text
//! SERVER -> CLIENT:
//!   "Filename: <name>\n"     one ASCII header line
//!   [raw file bytes]         until the server closes the connection
//! ```
//!
//! There is no length prefix; end of transfer is the peer closing the socket.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::constants::{DEFAULT_DOWNLOAD_NAME, MAX_HEADER_LEN};

/// Prefix of the single header line.
pub const HEADER_PREFIX: &str = "Filename: ";

/// Builds the header line announcing `filename`.
pub fn header_line(filename: &str) -> String {
    format!("{HEADER_PREFIX}{filename}\n")
}

/// Writes the header line.
pub async fn write_header<W: AsyncWrite + Unpin>(
    writer: &mut W,
    filename: &str,
) -> std::io::Result<()> {
    writer.write_all(header_line(filename).as_bytes()).await
}

/// Reads the header line one byte at a time, up to and excluding `\n`.
///
/// End of stream before a newline yields whatever was read. A line longer
/// than [`MAX_HEADER_LEN`] is rejected as invalid data.
pub async fn read_header_line<R: AsyncRead + Unpin>(reader: &mut R) -> std::io::Result<Vec<u8>> {
    let mut line = Vec::new();
    loop {
        let byte = match reader.read_u8().await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e),
        };
        if byte == b'\n' {
            break;
        }
        if line.len() == MAX_HEADER_LEN {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("header line exceeds {MAX_HEADER_LEN} bytes"),
            ));
        }
        line.push(byte);
    }
    Ok(line)
}

/// Extracts the filename from a header line.
///
/// Falls back to [`DEFAULT_DOWNLOAD_NAME`] when the line does not have the
/// `Filename: <name>` shape or the name is blank.
pub fn parse_header_line(line: &[u8]) -> String {
    let text = String::from_utf8_lossy(line);
    text.trim()
        .strip_prefix(HEADER_PREFIX)
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or(DEFAULT_DOWNLOAD_NAME)
        .to_string()
}
