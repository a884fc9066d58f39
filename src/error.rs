//! Error types for the edgequake-pdfslim library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`CompactError`] — **Fatal**: the operation cannot proceed at all
//!   (unreadable input, corrupt PDF, missing or wrong password). Returned as
//!   `Err(CompactError)` from every top-level entry point.
//!
//! * [`StageError`] — **Non-fatal**: one pipeline stage failed or produced a
//!   candidate that did not survive validation. Stored in the stage's
//!   [`crate::output::StageReport`]; the orchestrator keeps the best result
//!   it already had and carries on.
//!
//! Boundary callers (CLI, HTTP handlers) should match on
//! [`CompactError::kind`] rather than on message text.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::output::SourceStage;

/// All fatal errors returned by the edgequake-pdfslim library.
#[derive(Debug, Error)]
pub enum CompactError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    /// The bytes do not start with the `%PDF` signature.
    #[error("Input is not a PDF: '{source_name}'\nFirst bytes: {magic:?}")]
    NotAPdf { source_name: String, magic: [u8; 4] },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// Header, trailer or xref is corrupt and the document cannot be opened.
    #[error("PDF is corrupt and cannot be parsed: {detail}")]
    Unparseable { detail: String },

    /// The document needs a password before anything can be done with it.
    #[error("PDF is password-protected.\nUnlock it first with: pdfslim unlock <FILE> --password <PASSWORD>")]
    PasswordProtected,

    /// The operation refuses encrypted input; decrypt the document first.
    #[error("PDF is encrypted; '{operation}' requires an unencrypted document.\nUnlock it first.")]
    Encrypted { operation: &'static str },

    /// A password was supplied but it does not open the document.
    #[error("Wrong password for this PDF")]
    WrongPassword,

    /// Unlock was requested on a document that has no encryption.
    #[error("PDF is not encrypted; nothing to unlock")]
    NotEncrypted,

    /// Lock was requested on a document that is already encrypted.
    #[error("PDF is already encrypted; unlock it before setting a new password")]
    AlreadyEncrypted,

    /// The collaborator failed to apply encryption.
    #[error("Failed to encrypt PDF: {detail}")]
    EncryptionFailed { detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output PDF file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Remote conversion ─────────────────────────────────────────────────
    /// The remote job was still pending at the polling ceiling.
    #[error("Remote conversion timed out: {0}")]
    RemoteTimeout(String),

    /// The remote service rejected the request or the job failed.
    #[error("Remote conversion failed: {0}")]
    RemoteFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Stable, serialisable classification of a [`CompactError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InputNotFound,
    InputUnreadable,
    InvalidInput,
    DownloadFailed,
    NotAPdf,
    Unparseable,
    PasswordProtected,
    Encrypted,
    WrongPassword,
    NotEncrypted,
    AlreadyEncrypted,
    EncryptionFailed,
    OutputFailed,
    InvalidConfig,
    RemoteTimeout,
    RemoteFailed,
    Internal,
}

impl CompactError {
    /// Classification for boundary callers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CompactError::FileNotFound { .. } => ErrorKind::InputNotFound,
            CompactError::PermissionDenied { .. } => ErrorKind::InputUnreadable,
            CompactError::InvalidInput { .. } => ErrorKind::InvalidInput,
            CompactError::DownloadFailed { .. } | CompactError::DownloadTimeout { .. } => {
                ErrorKind::DownloadFailed
            }
            CompactError::NotAPdf { .. } => ErrorKind::NotAPdf,
            CompactError::Unparseable { .. } => ErrorKind::Unparseable,
            CompactError::PasswordProtected => ErrorKind::PasswordProtected,
            CompactError::Encrypted { .. } => ErrorKind::Encrypted,
            CompactError::WrongPassword => ErrorKind::WrongPassword,
            CompactError::NotEncrypted => ErrorKind::NotEncrypted,
            CompactError::AlreadyEncrypted => ErrorKind::AlreadyEncrypted,
            CompactError::EncryptionFailed { .. } => ErrorKind::EncryptionFailed,
            CompactError::OutputWriteFailed { .. } => ErrorKind::OutputFailed,
            CompactError::InvalidConfig(_) => ErrorKind::InvalidConfig,
            CompactError::RemoteTimeout(_) => ErrorKind::RemoteTimeout,
            CompactError::RemoteFailed(_) => ErrorKind::RemoteFailed,
            CompactError::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<pdf_remote_jobs::RemoteError> for CompactError {
    fn from(e: pdf_remote_jobs::RemoteError) -> Self {
        match e {
            pdf_remote_jobs::RemoteError::Timeout { .. } => {
                CompactError::RemoteTimeout(e.to_string())
            }
            other => CompactError::RemoteFailed(other.to_string()),
        }
    }
}

/// A non-fatal error for a single pipeline stage.
///
/// The stage's candidate is discarded and the current best is retained.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum StageError {
    /// The transformation itself failed.
    #[error("{stage}: transformation failed: {detail}")]
    Failed { stage: SourceStage, detail: String },

    /// The candidate bytes did not re-open.
    #[error("{stage}: candidate does not parse: {detail}")]
    Invalid { stage: SourceStage, detail: String },

    /// The candidate opened but lost or gained pages.
    #[error("{stage}: page count changed from {expected} to {actual}")]
    PageCountChanged {
        stage: SourceStage,
        expected: usize,
        actual: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_messages_are_distinct() {
        let wrong = CompactError::WrongPassword.to_string();
        let plain = CompactError::NotEncrypted.to_string();
        let corrupt = CompactError::Unparseable {
            detail: "bad xref".into(),
        }
        .to_string();
        assert_ne!(wrong, plain);
        assert_ne!(wrong, corrupt);
        assert!(corrupt.contains("bad xref"), "got: {corrupt}");
    }

    #[test]
    fn kind_serialises_snake_case() {
        let kind = CompactError::PasswordProtected.kind();
        assert_eq!(
            serde_json::to_string(&kind).unwrap(),
            "\"password_protected\""
        );
    }

    #[test]
    fn remote_timeout_maps_to_distinct_kind() {
        let e: CompactError = pdf_remote_jobs::RemoteError::Timeout {
            job: "j1".into(),
            attempts: 30,
            waited_secs: 290,
        }
        .into();
        assert_eq!(e.kind(), ErrorKind::RemoteTimeout);

        let e: CompactError = pdf_remote_jobs::RemoteError::JobFailed {
            job: "j1".into(),
            reason: "boom".into(),
        }
        .into();
        assert_eq!(e.kind(), ErrorKind::RemoteFailed);
    }

    #[test]
    fn stage_error_display_names_stage() {
        let e = StageError::PageCountChanged {
            stage: SourceStage::ContentRewrite,
            expected: 10,
            actual: 9,
        };
        let msg = e.to_string();
        assert!(msg.contains("content_rewrite"), "got: {msg}");
        assert!(msg.contains("10") && msg.contains('9'));
    }
}
