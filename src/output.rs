//! Result types returned by the compaction entry points.
//!
//! A [`PipelineResult`] carries the winning [`Candidate`] plus one
//! [`StageReport`] per stage the orchestrator considered, in order. Reports
//! are serialisable so the CLI's `--json` mode and HTTP front-ends can emit
//! them as-is; candidate bytes are never serialised.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::StageError;

/// Which stage produced a candidate.
///
/// `Original` is the fallback used when even the structural stage could not
/// produce a valid candidate: the untouched source bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStage {
    Original,
    Structural,
    ImageRecompress,
    ContentRewrite,
    MetadataTrim,
}

impl SourceStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceStage::Original => "original",
            SourceStage::Structural => "structural",
            SourceStage::ImageRecompress => "image_recompress",
            SourceStage::ContentRewrite => "content_rewrite",
            SourceStage::MetadataTrim => "metadata_trim",
        }
    }
}

impl fmt::Display for SourceStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `(original - candidate) / original`. Negative when the candidate grew.
pub fn compaction_ratio(original_size: u64, candidate_size: u64) -> f64 {
    if original_size == 0 {
        return 0.0;
    }
    (original_size as f64 - candidate_size as f64) / original_size as f64
}

/// One stage's output, measured and validated. Immutable once built.
#[derive(Debug, Clone, Serialize)]
pub struct Candidate {
    #[serde(skip)]
    bytes: Vec<u8>,
    size: u64,
    source_stage: SourceStage,
    valid: bool,
}

impl Candidate {
    pub(crate) fn new(bytes: Vec<u8>, source_stage: SourceStage, valid: bool) -> Self {
        let size = bytes.len() as u64;
        Self {
            bytes,
            size,
            source_stage,
            valid,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn source_stage(&self) -> SourceStage {
        self.source_stage
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// What happened to a stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StageOutcome {
    /// Valid and strictly smaller; now the best.
    Accepted,
    /// Valid but not smaller than the best; discarded.
    NotSmaller,
    /// The stage found nothing to change.
    Unchanged,
    /// Skipped before running; `reason` says which gate closed.
    Skipped { reason: String },
    /// The stage failed or its candidate did not validate.
    Failed { error: StageError },
}

/// Measurements for one stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: SourceStage,
    pub outcome: StageOutcome,
    /// Candidate size, when a candidate was produced.
    pub size: Option<u64>,
    /// Compaction ratio of the candidate against the original source.
    pub ratio: Option<f64>,
    pub accepted: bool,
    /// Pages or images the stage transformed.
    pub units_processed: usize,
    /// Pages or images the stage left alone after a local failure.
    pub units_skipped: usize,
    pub elapsed_ms: u64,
}

impl StageReport {
    pub(crate) fn skipped(stage: SourceStage, reason: impl Into<String>) -> Self {
        Self {
            stage,
            outcome: StageOutcome::Skipped {
                reason: reason.into(),
            },
            size: None,
            ratio: None,
            accepted: false,
            units_processed: 0,
            units_skipped: 0,
            elapsed_ms: 0,
        }
    }

    /// Whether the stage actually ran (anything other than `Skipped`).
    pub fn was_attempted(&self) -> bool {
        !matches!(self.outcome, StageOutcome::Skipped { .. })
    }
}

/// Output of [`crate::compact`].
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    pub best: Candidate,
    /// Every stage considered, in pipeline order.
    pub stages_attempted: Vec<StageReport>,
    pub original_size: u64,
    pub page_count: usize,
    /// True when the deadline stopped the pipeline early.
    pub deadline_reached: bool,
    pub duration_ms: u64,
}

impl PipelineResult {
    /// Compaction ratio of the returned document.
    pub fn ratio(&self) -> f64 {
        compaction_ratio(self.original_size, self.best.size())
    }

    /// Report for `stage`, if the pipeline considered it.
    pub fn stage(&self, stage: SourceStage) -> Option<&StageReport> {
        self.stages_attempted.iter().find(|r| r.stage == stage)
    }

    /// Bytes of the winning candidate.
    pub fn into_bytes(self) -> Vec<u8> {
        self.best.into_bytes()
    }
}

/// Result of stripping hyperlink annotations from a whole document.
#[derive(Debug, Clone)]
pub struct LinkRemoval {
    pub bytes: Vec<u8>,
    /// Link annotations deleted across all pages.
    pub removed: usize,
    /// Pages whose annotation array changed.
    pub pages_touched: usize,
}

/// Summary returned by [`crate::inspect`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub creation_date: Option<String>,
    pub modification_date: Option<String>,
    pub pdf_version: String,
    pub page_count: usize,
    pub is_encrypted: bool,
    pub file_size: u64,
    pub image_count: usize,
    /// Images whose stream exceeds the default size floor.
    pub large_image_count: usize,
    pub annotation_count: usize,
    pub link_count: usize,
}
