//! Compaction entry points and the stage orchestrator.
//!
//! ## Flow
//!
//! ```text
//! source bytes
//!  │
//!  ├─ 1. Parse       once; encrypted input is rejected here
//!  ├─ 2. Structural  always; first valid candidate becomes best
//!  ├─ 3. Images      level ≥ medium and an image above the size floor
//!  ├─ 4. Content     level = high and ratio still under the threshold
//!  ├─ 5. Metadata    level = high
//!  └─ 6. Result      best candidate + one report per stage
//! ```
//!
//! Every optional stage runs on a fresh copy of the *current best* state and
//! its output is re-parsed before it may compete. [`select::select`] picks the
//! winner from the ordered candidate list, so a failing or growing stage can
//! never make the result worse. The deadline is checked between stages only.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::time::{Duration, Instant};

use pdf_remote_jobs::{convert_via_remote, JobClient, Operation, PollPolicy};
use tracing::{debug, info, warn};

use crate::annotations;
use crate::config::{CompactConfig, CompressionProfile, DEFAULT_SIZE_FLOOR_BYTES};
use crate::document::PdfDocument;
use crate::error::{CompactError, StageError};
use crate::output::{
    compaction_ratio, Candidate, DocumentMetadata, LinkRemoval, PipelineResult, SourceStage,
    StageOutcome, StageReport,
};
use crate::pipeline::select::{self, image_gate, metadata_gate, rewrite_gate};
use crate::pipeline::{input, run_stage, StageOutput};
use crate::progress::{CompactionProgressCallback, NoopProgressCallback};

/// Compact `source` with the profile and limits in `config`.
///
/// CPU-bound and synchronous; use [`compact_async`] from async code.
///
/// # Errors
/// Only fatal conditions: unparseable input, password-protected input, or
/// encrypted input that opens without a password (decrypt it first with
/// [`crate::crypto::unlock`]). Stage failures are reported in the result.
pub fn compact(source: &[u8], config: &CompactConfig) -> Result<PipelineResult, CompactError> {
    let started = Instant::now();
    let noop = NoopProgressCallback;
    let callback: &dyn CompactionProgressCallback = match config.progress_callback {
        Some(ref cb) => cb.as_ref(),
        None => &noop,
    };

    // ── Step 1: Parse ────────────────────────────────────────────────────
    let source_doc = open_unencrypted(source, "compact")?;
    let page_count = source_doc.page_count();
    let original_size = source.len() as u64;
    info!(
        "Compacting {} bytes, {} pages, level {}",
        original_size, page_count, config.profile.level
    );
    callback.on_compaction_start(original_size, page_count);

    let mut run = Orchestrator {
        profile: &config.profile,
        callback,
        original_size,
        page_count,
        candidates: Vec::new(),
        reports: Vec::new(),
        best: None,
        best_doc: source_doc,
    };

    // ── Step 2: Structural (mandatory) ───────────────────────────────────
    run.attempt(SourceStage::Structural);
    if run.best.is_none() {
        warn!("Structural stage produced no valid candidate; continuing from the original");
        run.candidates
            .push(Candidate::new(source.to_vec(), SourceStage::Original, true));
        run.best = select::select(&run.candidates);
    }

    // ── Steps 3–5: Optional stages ───────────────────────────────────────
    let deadline = config.deadline.map(|d| started + d);
    let mut deadline_reached = false;
    for stage in [
        SourceStage::ImageRecompress,
        SourceStage::ContentRewrite,
        SourceStage::MetadataTrim,
    ] {
        if deadline_reached || deadline.is_some_and(|d| Instant::now() >= d) {
            if !deadline_reached {
                info!("Deadline reached before {}; returning best so far", stage);
            }
            deadline_reached = true;
            run.skip(stage, "deadline reached".to_string());
            continue;
        }
        let gate = match stage {
            SourceStage::ImageRecompress => image_gate(run.profile, run.largest_image()),
            SourceStage::ContentRewrite => {
                rewrite_gate(run.profile, run.best_ratio(), config.rewrite_ratio_threshold)
            }
            _ => metadata_gate(run.profile),
        };
        match gate {
            Ok(()) => run.attempt(stage),
            Err(reason) => run.skip(stage, reason),
        }
    }

    // ── Step 6: Result ───────────────────────────────────────────────────
    let best_index = run
        .best
        .ok_or_else(|| CompactError::Internal("no candidate survived".into()))?;
    let best = run.candidates.swap_remove(best_index);
    let result = PipelineResult {
        best,
        stages_attempted: run.reports,
        original_size,
        page_count,
        deadline_reached,
        duration_ms: started.elapsed().as_millis() as u64,
    };
    info!(
        "Compaction done: {} → {} bytes ({:.1}%) from {} in {}ms",
        original_size,
        result.best.size(),
        result.ratio() * 100.0,
        result.best.source_stage(),
        result.duration_ms
    );
    callback.on_compaction_complete(&result);
    Ok(result)
}

/// Compact with a profile and default limits.
pub fn compact_with_profile(
    source: &[u8],
    profile: CompressionProfile,
) -> Result<PipelineResult, CompactError> {
    let config = CompactConfig {
        profile,
        ..CompactConfig::default()
    };
    compact(source, &config)
}

/// [`compact`] on Tokio's blocking pool.
pub async fn compact_async(
    bytes: Vec<u8>,
    config: CompactConfig,
) -> Result<PipelineResult, CompactError> {
    tokio::task::spawn_blocking(move || compact(&bytes, &config))
        .await
        .map_err(|e| CompactError::Internal(format!("compaction task failed: {e}")))?
}

/// Compact a local file or URL and write the result to `output_path`.
///
/// Uses an atomic write so `output_path` never holds a partial file.
pub async fn compact_file(
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &CompactConfig,
) -> Result<PipelineResult, CompactError> {
    let bytes = input::read_input(input_str.as_ref(), config.download_timeout_secs).await?;
    let result = compact_async(bytes, config.clone()).await?;
    input::write_atomic(output_path.as_ref(), result.best.bytes())?;
    Ok(result)
}

/// Remove every hyperlink annotation from a PDF.
///
/// Rejects encrypted documents; decrypt first.
pub fn remove_links_from_pdf(bytes: &[u8]) -> Result<LinkRemoval, CompactError> {
    let mut doc = open_unencrypted(bytes, "remove-links").map_err(|e| match e {
        CompactError::PasswordProtected => CompactError::Encrypted {
            operation: "remove-links",
        },
        other => other,
    })?;
    let stats = annotations::strip_links(&mut doc)?;
    info!(
        "Removed {} link annotation(s) from {} page(s)",
        stats.removed, stats.pages_touched
    );
    let bytes = if stats.removed == 0 {
        bytes.to_vec()
    } else {
        doc.save()?
    };
    Ok(LinkRemoval {
        bytes,
        removed: stats.removed,
        pages_touched: stats.pages_touched,
    })
}

/// Document summary without modifying anything.
///
/// Encrypted documents report their page count and `is_encrypted` only.
pub fn inspect(bytes: &[u8]) -> Result<DocumentMetadata, CompactError> {
    let doc = PdfDocument::load(bytes)?;
    let mut meta = DocumentMetadata {
        pdf_version: doc.version().to_string(),
        page_count: doc.page_count(),
        is_encrypted: doc.is_encrypted(),
        file_size: bytes.len() as u64,
        ..DocumentMetadata::default()
    };
    if meta.is_encrypted {
        return Ok(meta);
    }

    meta.title = doc.info_string(b"Title");
    meta.author = doc.info_string(b"Author");
    meta.subject = doc.info_string(b"Subject");
    meta.creator = doc.info_string(b"Creator");
    meta.producer = doc.info_string(b"Producer");
    meta.creation_date = doc.info_string(b"CreationDate");
    meta.modification_date = doc.info_string(b"ModDate");

    let images = doc.all_images();
    meta.image_count = images.len();
    meta.large_image_count = images
        .iter()
        .filter(|r| r.declared_size > DEFAULT_SIZE_FLOOR_BYTES)
        .count();
    for (_, id) in doc.page_ids() {
        if let Some(list) = doc.page_annotations(id) {
            meta.annotation_count += list.len();
            meta.link_count += list.iter().filter(|a| a.is_link()).count();
        }
    }
    Ok(meta)
}

/// Outsource a conversion and wait at most `max_wait` for it.
///
/// Polls every `poll_interval`; once the ceiling derived from `max_wait` is
/// hit the call fails with [`CompactError::RemoteTimeout`] and is not retried.
pub async fn convert_remote<C: JobClient>(
    client: &C,
    bytes: &[u8],
    operation: &Operation,
    max_wait: Duration,
    poll_interval: Duration,
) -> Result<Vec<u8>, CompactError> {
    input::check_magic(bytes, "remote input")?;
    let policy = PollPolicy::from_max_wait(max_wait, poll_interval);
    debug!(
        "Remote {}: polling every {:?}, at most {} times",
        operation.path(),
        policy.interval,
        policy.max_attempts
    );
    Ok(convert_via_remote(client, bytes, operation, policy).await?)
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Parse, rejecting anything encrypted.
fn open_unencrypted(bytes: &[u8], operation: &'static str) -> Result<PdfDocument, CompactError> {
    let doc = PdfDocument::load(bytes)?;
    if !doc.is_encrypted() {
        return Ok(doc);
    }
    let mut doc = doc;
    Err(match doc.decrypt("") {
        Ok(()) => CompactError::Encrypted { operation },
        Err(_) => CompactError::PasswordProtected,
    })
}

struct Orchestrator<'a> {
    profile: &'a CompressionProfile,
    callback: &'a dyn CompactionProgressCallback,
    original_size: u64,
    page_count: usize,
    /// Every candidate produced, in stage order.
    candidates: Vec<Candidate>,
    reports: Vec<StageReport>,
    /// Index of the current best in `candidates`.
    best: Option<usize>,
    /// Parsed form of the current best; input of the next stage.
    best_doc: PdfDocument,
}

impl Orchestrator<'_> {
    fn best_ratio(&self) -> f64 {
        self.best
            .map(|i| compaction_ratio(self.original_size, self.candidates[i].size()))
            .unwrap_or(0.0)
    }

    fn largest_image(&self) -> Option<u64> {
        self.best_doc
            .all_images()
            .iter()
            .map(|r| r.declared_size)
            .max()
    }

    fn skip(&mut self, stage: SourceStage, reason: String) {
        debug!("{} skipped: {}", stage, reason);
        self.callback.on_stage_skipped(stage, &reason);
        self.reports.push(StageReport::skipped(stage, reason));
    }

    fn attempt(&mut self, stage: SourceStage) {
        self.callback.on_stage_start(stage);
        let started = Instant::now();
        let input = self.best_doc.clone();
        let profile = self.profile;

        let outcome = catch_unwind(AssertUnwindSafe(|| run_stage(stage, input, profile)));
        let mut report = StageReport {
            stage,
            outcome: StageOutcome::Unchanged,
            size: None,
            ratio: None,
            accepted: false,
            units_processed: 0,
            units_skipped: 0,
            elapsed_ms: 0,
        };

        match outcome {
            Ok(Ok(run)) => {
                report.units_processed = run.units_processed;
                report.units_skipped = run.units_skipped;
                if let StageOutput::Rewritten(bytes) = run.output {
                    self.consider(stage, bytes, &mut report);
                }
            }
            Ok(Err(e)) => {
                warn!("{} failed: {}", stage, e);
                report.outcome = StageOutcome::Failed {
                    error: StageError::Failed {
                        stage,
                        detail: e.to_string(),
                    },
                };
            }
            Err(_) => {
                warn!("{} panicked; keeping the current best", stage);
                report.outcome = StageOutcome::Failed {
                    error: StageError::Failed {
                        stage,
                        detail: "stage panicked".into(),
                    },
                };
            }
        }

        report.elapsed_ms = started.elapsed().as_millis() as u64;
        debug!(
            "{}: {:?}, size {:?}, ratio {:?}, {}ms",
            stage, report.outcome, report.size, report.ratio, report.elapsed_ms
        );
        self.callback.on_stage_complete(stage, &report);
        self.reports.push(report);
    }

    /// Validate a candidate, record it and promote it if selection says so.
    fn consider(&mut self, stage: SourceStage, bytes: Vec<u8>, report: &mut StageReport) {
        let size = bytes.len() as u64;
        report.size = Some(size);
        report.ratio = Some(compaction_ratio(self.original_size, size));

        let parsed = self.validate(stage, &bytes);
        self.candidates
            .push(Candidate::new(bytes, stage, parsed.is_ok()));
        let index = self.candidates.len() - 1;
        self.best = select::select(&self.candidates);

        match parsed {
            Err(error) => {
                warn!("{}", error);
                report.outcome = StageOutcome::Failed { error };
            }
            Ok(doc) if self.best == Some(index) => {
                self.best_doc = doc;
                report.accepted = true;
                report.outcome = StageOutcome::Accepted;
            }
            Ok(_) => report.outcome = StageOutcome::NotSmaller,
        }
    }

    /// Re-open candidate bytes and check the page count.
    fn validate(&self, stage: SourceStage, bytes: &[u8]) -> Result<PdfDocument, StageError> {
        let doc = PdfDocument::load(bytes).map_err(|e| StageError::Invalid {
            stage,
            detail: e.to_string(),
        })?;
        let actual = doc.page_count();
        if actual != self.page_count {
            return Err(StageError::PageCountChanged {
                stage,
                expected: self.page_count,
                actual,
            });
        }
        Ok(doc)
    }
}
