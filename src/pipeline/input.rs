//! Input resolution: turn a user-supplied path or URL into PDF bytes, and
//! write results back atomically.
//!
//! ## Why check the magic bytes here?
//!
//! lopdf reports a non-PDF as a generic parse failure. Checking for `%PDF`
//! first lets callers tell "wrong file" apart from "corrupt PDF".
//!
//! ## Why a named temp file for output?
//!
//! The temp file is created in the destination directory and persisted with
//! a rename, so readers never observe a half-written PDF and a failed run
//! leaves no debris (the temp file is deleted on drop).

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::CompactError;

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Read a local file or download a URL, validating the PDF signature.
pub async fn read_input(input: &str, timeout_secs: u64) -> Result<Vec<u8>, CompactError> {
    let bytes = if is_url(input) {
        download_url(input, timeout_secs).await?
    } else {
        read_local(input).await?
    };
    check_magic(&bytes, input)?;
    Ok(bytes)
}

/// Fail with [`CompactError::NotAPdf`] unless `bytes` start with `%PDF`.
pub fn check_magic(bytes: &[u8], source_name: &str) -> Result<(), CompactError> {
    if bytes.len() >= 4 && &bytes[..4] == b"%PDF" {
        return Ok(());
    }
    let mut magic = [0u8; 4];
    let n = bytes.len().min(4);
    magic[..n].copy_from_slice(&bytes[..n]);
    Err(CompactError::NotAPdf {
        source_name: source_name.to_string(),
        magic,
    })
}

async fn read_local(path_str: &str) -> Result<Vec<u8>, CompactError> {
    if path_str.trim().is_empty() {
        return Err(CompactError::InvalidInput {
            input: path_str.to_string(),
        });
    }
    let path = PathBuf::from(path_str);
    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            debug!("Read local PDF: {} ({} bytes)", path.display(), bytes.len());
            Ok(bytes)
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            Err(CompactError::PermissionDenied { path })
        }
        Err(_) => Err(CompactError::FileNotFound { path }),
    }
}

/// Download a URL into memory.
async fn download_url(url: &str, timeout_secs: u64) -> Result<Vec<u8>, CompactError> {
    info!("Downloading PDF from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| CompactError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            CompactError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            CompactError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(CompactError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| CompactError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    info!("Downloaded {} bytes", bytes.len());
    Ok(bytes.to_vec())
}

/// Write `bytes` to `path` via a temp file in the same directory.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), CompactError> {
    let fail = |source: std::io::Error| CompactError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(fail)?;

    let mut tmp = NamedTempFile::new_in(&dir).map_err(fail)?;
    tmp.write_all(bytes).map_err(fail)?;
    tmp.as_file().sync_all().map_err(fail)?;
    tmp.persist(path).map_err(|e| fail(e.error))?;
    debug!("Wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url("doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn magic_check() {
        assert!(check_magic(b"%PDF-1.7\n...", "a.pdf").is_ok());
        match check_magic(b"PK", "a.zip") {
            Err(CompactError::NotAPdf { magic, .. }) => assert_eq!(magic, *b"PK\0\0"),
            other => panic!("expected NotAPdf, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let err = read_input("/definitely/not/here.pdf", 5).await.unwrap_err();
        assert!(matches!(err, CompactError::FileNotFound { .. }));
    }

    #[test]
    fn atomic_write_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested/out.pdf");
        write_atomic(&target, b"%PDF-1.4 test").unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"%PDF-1.4 test");
        // Only the output remains; the temp file was renamed.
        let entries = std::fs::read_dir(target.parent().unwrap()).unwrap().count();
        assert_eq!(entries, 1);
    }
}
