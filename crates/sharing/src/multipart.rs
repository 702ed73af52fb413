//! Single-file multipart/form-data extraction
//!
//! This is deliberately not a full RFC 2046 parser. It pulls exactly one file
//! part out of a buffered body: the first `filename="` drives extraction and
//! any further parts are ignored. Searches run over raw bytes so arbitrary
//! binary payloads survive untouched.

use crate::constants::OCTET_STREAM;
use crate::error::{ShareError, ShareResult};

const FILENAME_MARKER: &[u8] = b"filename=\"";
const CONTENT_TYPE_MARKER: &[u8] = b"Content-Type: ";
const HEADER_END_MARKER: &[u8] = b"\r\n\r\n";
const LINE_END: &[u8] = b"\r\n";

/// A file part borrowed from the request body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile<'a> {
    /// Filename as declared by the client, unsanitized
    pub filename: String,
    /// Declared content type, or `application/octet-stream`
    pub content_type: String,
    /// File contents
    pub bytes: &'a [u8],
}

/// Extract the boundary from a request `Content-Type` header
///
/// Accepts `multipart/form-data; boundary=XYZ`, with the boundary optionally
/// quoted and followed by further parameters.
pub fn parse_boundary(content_type: &str) -> ShareResult<String> {
    let content_type = content_type.trim();
    let lower = content_type.to_ascii_lowercase();

    if !lower.starts_with("multipart/form-data") {
        return Err(ShareError::MalformedMultipart(
            "Content-Type must be multipart/form-data".to_string(),
        ));
    }

    let start = lower
        .find("boundary=")
        .map(|idx| idx + "boundary=".len())
        .ok_or_else(|| {
            ShareError::MalformedMultipart("boundary missing in Content-Type".to_string())
        })?;

    let boundary = content_type[start..]
        .split(';')
        .next()
        .unwrap_or("")
        .trim();
    let boundary = boundary
        .strip_prefix('"')
        .and_then(|b| b.strip_suffix('"'))
        .unwrap_or(boundary);

    if boundary.is_empty() {
        return Err(ShareError::MalformedMultipart("empty boundary".to_string()));
    }

    Ok(boundary.to_string())
}

/// Extract the single file part from a multipart body
///
/// # Errors
/// [`ShareError::MalformedMultipart`] when there is no `filename="`, no
/// header/body separator, no boundary marker after the body, or the file
/// content is empty.
pub fn extract<'a>(data: &'a [u8], boundary: &str) -> ShareResult<UploadedFile<'a>> {
    let name_start = find(data, FILENAME_MARKER, 0)
        .map(|idx| idx + FILENAME_MARKER.len())
        .ok_or_else(|| malformed("no filename in body"))?;
    let name_end =
        find(data, b"\"", name_start).ok_or_else(|| malformed("unterminated filename"))?;
    let filename = String::from_utf8_lossy(&data[name_start..name_end]).into_owned();

    let content_type = find(data, CONTENT_TYPE_MARKER, name_end)
        .map(|idx| idx + CONTENT_TYPE_MARKER.len())
        .and_then(|start| {
            let end = find(data, LINE_END, start)?;
            (end > start).then(|| String::from_utf8_lossy(&data[start..end]).into_owned())
        })
        .unwrap_or_else(|| OCTET_STREAM.to_string());

    let content_start = find(data, HEADER_END_MARKER, 0)
        .map(|idx| idx + HEADER_END_MARKER.len())
        .ok_or_else(|| malformed("no header/body separator"))?;

    let closing = format!("\r\n--{boundary}--");
    let delimiter = format!("\r\n--{boundary}");
    let content_end = find(data, closing.as_bytes(), content_start)
        .or_else(|| find(data, delimiter.as_bytes(), content_start))
        .ok_or_else(|| malformed("boundary marker not found after content"))?;

    if content_end <= content_start {
        return Err(malformed("empty file content"));
    }

    Ok(UploadedFile {
        filename,
        content_type,
        bytes: &data[content_start..content_end],
    })
}

/// Byte offset of the first `needle` at or after `from`
fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    haystack
        .get(from..)?
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|pos| pos + from)
}

fn malformed(reason: &str) -> ShareError {
    ShareError::MalformedMultipart(reason.to_string())
}
