//! Upload checks run before anything is written to disk

use crate::constants::{whitelist, DEFAULT_UPLOAD_NAME, MAX_UPLOAD_SIZE};
use crate::error::{ShareError, ShareResult};
use crate::multipart::UploadedFile;

/// Limits applied to an upload before anything touches the disk.
#[derive(Debug, Clone, Copy)]
pub struct UploadPolicy {
    pub max_size: u64,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            max_size: MAX_UPLOAD_SIZE,
        }
    }
}

impl UploadPolicy {
    /// Rejects a size above the limit.
    pub fn check_size(&self, len: u64) -> ShareResult<()> {
        if len > self.max_size {
            return Err(ShareError::PayloadTooLarge { max: self.max_size });
        }
        Ok(())
    }

    /// Validates an extracted file and returns the name it will be stored under.
    ///
    /// Checks run in order: size, extension, MIME type.
    pub fn check(&self, file: &UploadedFile<'_>) -> ShareResult<String> {
        self.check_size(file.bytes.len() as u64)?;

        let filename = sanitize_filename(&file.filename);
        if !is_allowed_extension(&filename) {
            return Err(ShareError::UnsupportedType(format!(
                "file type not allowed: {filename}. Allowed extensions: {}",
                whitelist::EXTENSIONS.join(", ")
            )));
        }
        if !is_allowed_mime_type(&file.content_type) {
            return Err(ShareError::UnsupportedType(format!(
                "MIME type not allowed: {}",
                file.content_type
            )));
        }

        Ok(filename)
    }
}

/// Reduces a client-supplied name to a safe final path component.
///
/// Directory parts, control characters and double quotes are dropped, since
/// the name ends up in a file path, the wire header line and a
/// `Content-Disposition` header. A blank result becomes `unnamed-file.txt`.
pub fn sanitize_filename(raw: &str) -> String {
    let last = raw.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or("");
    let cleaned: String = last
        .chars()
        .filter(|c| !c.is_control() && *c != '"')
        .collect();
    let cleaned = cleaned.trim();

    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        DEFAULT_UPLOAD_NAME.to_string()
    } else {
        cleaned.to_string()
    }
}

/// Whether the name ends with a whitelisted extension (case-insensitive).
pub fn is_allowed_extension(filename: &str) -> bool {
    let lower = filename.to_lowercase();
    whitelist::EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Whether the declared type contains a whitelisted MIME type (case-insensitive).
pub fn is_allowed_mime_type(mime_type: &str) -> bool {
    let lower = mime_type.to_lowercase();
    whitelist::MIME_TYPES.iter().any(|allowed| lower.contains(allowed))
}
