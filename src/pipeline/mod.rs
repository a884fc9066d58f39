//! Compaction pipeline stages.
//!
//! Each sub-module handles one transformation, so they can be tested and
//! tuned independently:
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | [`input`]      | Resolve a file path or URL to PDF bytes |
//! | [`structural`] | Dead-object removal, stream deflation, serialisation |
//! | [`images`]     | Downsample and re-encode large raster images |
//! | [`content`]    | Replace text-dominant pages with plain positioned text |
//! | [`metadata`]   | Drop everything but title, author and subject |
//! | [`select`]     | Pure gating and best-candidate selection |
//!
//! Every transforming stage takes ownership of a private [`PdfDocument`]
//! copy, mutates it, and hands back serialised bytes. Stages never see each
//! other's intermediate state; the orchestrator in [`crate::compact`] feeds
//! each one the parsed form of the current best candidate.

pub mod content;
pub mod images;
pub mod input;
pub mod metadata;
pub mod select;
pub mod structural;

use crate::config::CompressionProfile;
use crate::document::PdfDocument;
use crate::error::CompactError;
use crate::output::SourceStage;

/// What a stage produced.
#[derive(Debug)]
pub enum StageOutput {
    /// Serialised candidate document.
    Rewritten(Vec<u8>),
    /// Nothing to change; no candidate.
    Unchanged,
}

/// A stage's output plus its unit counters.
#[derive(Debug)]
pub struct StageRun {
    pub output: StageOutput,
    pub units_processed: usize,
    pub units_skipped: usize,
}

impl StageRun {
    pub(crate) fn rewritten(bytes: Vec<u8>, processed: usize, skipped: usize) -> Self {
        Self {
            output: StageOutput::Rewritten(bytes),
            units_processed: processed,
            units_skipped: skipped,
        }
    }

    pub(crate) fn unchanged(processed: usize, skipped: usize) -> Self {
        Self {
            output: StageOutput::Unchanged,
            units_processed: processed,
            units_skipped: skipped,
        }
    }
}

/// Dispatch `stage` on `doc`.
pub fn run_stage(
    stage: SourceStage,
    doc: PdfDocument,
    profile: &CompressionProfile,
) -> Result<StageRun, CompactError> {
    match stage {
        SourceStage::Structural => structural::run(doc, profile.level),
        SourceStage::ImageRecompress => images::run(doc, profile),
        SourceStage::ContentRewrite => content::run(doc, profile),
        SourceStage::MetadataTrim => metadata::run(doc, profile),
        SourceStage::Original => Err(CompactError::Internal(
            "the original document is not a stage".into(),
        )),
    }
}
