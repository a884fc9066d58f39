//! # edgequake-pdfslim
//!
//! Shrink PDF documents through an adaptive, multi-stage compaction pipeline.
//!
//! ## Why this crate?
//!
//! One-shot optimisers apply a fixed recipe and sometimes hand back a file
//! that is larger, or broken. Here every stage produces a *candidate* which
//! is re-parsed and page-counted before it can compete, and a candidate only
//! wins when it is strictly smaller than the best so far. The result is never
//! worse than the cheapest lossless pass, and expensive lossy stages run only
//! when the profile asks for them and the document can profit.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Parse       load once; encrypted input is rejected
//!  ├─ 2. Structural  prune, drop empty streams, deflate (object streams at high)
//!  ├─ 3. Images      JPEG re-encode + downsample large raster images
//!  ├─ 4. Content     re-emit text-dominant pages as plain text (lossy, high only)
//!  ├─ 5. Metadata    keep Title/Author/Subject, drop XMP and private data
//!  └─ 6. Result      smallest valid candidate + per-stage reports
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdfslim::{compact, CompactConfig, ProfileLevel};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let bytes = std::fs::read("scan.pdf")?;
//!     let result = compact(&bytes, &CompactConfig::for_level(ProfileLevel::High))?;
//!     eprintln!(
//!         "{} → {} bytes via {}",
//!         result.original_size,
//!         result.best.size(),
//!         result.best.source_stage()
//!     );
//!     std::fs::write("scan.min.pdf", result.into_bytes())?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdfslim` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-pdfslim = { version = "0.1", default-features = false }
//! ```
//!
//! ## Choosing a Level
//!
//! | Level    | Stages                               | JPEG quality | Max side |
//! |----------|--------------------------------------|--------------|----------|
//! | `low`    | structural                           | 85           | 4096 px  |
//! | `medium` | + images                             | 70           | 2000 px  |
//! | `high`   | + object streams, content, metadata  | 50           | 1500 px  |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod annotations;
pub mod compact;
pub mod config;
pub mod crypto;
pub mod document;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use annotations::{remove_links, remove_links_batch, Annotation, LinkTarget};
pub use compact::{
    compact, compact_async, compact_file, compact_with_profile, convert_remote, inspect,
    remove_links_from_pdf,
};
pub use config::{
    CompactConfig, CompactConfigBuilder, CompressionProfile, CompressionProfileBuilder,
    ProfileLevel,
};
pub use crypto::{lock, unlock, EncryptionParams};
pub use document::{Page, PdfDocument};
pub use error::{CompactError, ErrorKind, StageError};
pub use output::{
    compaction_ratio, Candidate, DocumentMetadata, LinkRemoval, PipelineResult, SourceStage,
    StageOutcome, StageReport,
};
pub use progress::{CompactionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use stream::{compact_many, compact_stream, CompactStream};
