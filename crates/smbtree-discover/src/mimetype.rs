//! Printability check for files sent to printer shares.
//!
//! The type is detected from the file's header bytes. Printers behind
//! SMB print queues take PDF, PostScript, images and plain text.

use std::path::Path;

use tokio::io::AsyncReadExt;

use crate::error::{DiscoverError, Result};

const HEADER_LEN: usize = 8192;

/// Detect the mimetype from header bytes. Undetected content that is
/// valid UTF-8 counts as `text/plain`.
pub fn detect_mimetype(header: &[u8]) -> String {
    if header.starts_with(b"%!") {
        return "application/postscript".to_string();
    }
    if let Some(kind) = infer::get(header) {
        return kind.mime_type().to_string();
    }
    match std::str::from_utf8(header) {
        Ok(_) => "text/plain".to_string(),
        // A multi-byte character cut off by the header window is still text.
        Err(e) if e.error_len().is_none() => "text/plain".to_string(),
        Err(_) => "application/octet-stream".to_string(),
    }
}

pub fn is_printable(mimetype: &str) -> bool {
    matches!(mimetype, "application/pdf" | "application/postscript")
        || mimetype.starts_with("image/")
        || mimetype.starts_with("text/")
}

/// Read the file header and return its mimetype if it can be printed.
pub async fn check_printable(path: &Path) -> Result<String> {
    let file = tokio::fs::File::open(path).await?;
    let mut header = Vec::with_capacity(HEADER_LEN);
    file.take(HEADER_LEN as u64).read_to_end(&mut header).await?;

    let mimetype = detect_mimetype(&header);
    if is_printable(&mimetype) {
        Ok(mimetype)
    } else {
        Err(DiscoverError::UnsupportedMimetype { mimetype })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_detect_mimetype() {
        assert_eq!(detect_mimetype(b"%PDF-1.7\n"), "application/pdf");
        assert_eq!(detect_mimetype(b"%!PS-Adobe-3.0\n"), "application/postscript");
        assert_eq!(
            detect_mimetype(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]),
            "image/png"
        );
        assert_eq!(detect_mimetype("hello wörld".as_bytes()), "text/plain");
        assert_eq!(detect_mimetype(&[0x00, 0x9F, 0x92, 0x96]), "application/octet-stream");
    }

    #[test]
    fn test_truncated_utf8_is_text() {
        let bytes = "é".as_bytes();
        assert_eq!(detect_mimetype(&bytes[..1]), "text/plain");
    }

    #[tokio::test]
    async fn test_check_printable_rejects_archives() {
        let mut zip = tempfile::NamedTempFile::new().unwrap();
        zip.write_all(&[0x50, 0x4B, 0x03, 0x04, 0x14, 0x00, 0x00, 0x00])
            .unwrap();
        let err = check_printable(zip.path()).await.unwrap_err();
        assert!(matches!(err, DiscoverError::UnsupportedMimetype { .. }));

        let mut text = tempfile::NamedTempFile::new().unwrap();
        text.write_all(b"quarterly numbers\n").unwrap();
        assert_eq!(check_printable(text.path()).await.unwrap(), "text/plain");
    }
}
