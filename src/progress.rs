//! Progress-callback trait for per-stage compaction events.
//!
//! Inject an [`Arc<dyn CompactionProgressCallback>`] via
//! [`crate::config::CompactConfigBuilder::progress_callback`] to receive
//! events as the orchestrator moves through its stages.
//!
//! # Why callbacks instead of channels?
//!
//! Callers can forward events to a channel, a WebSocket or a terminal
//! progress bar without the library knowing how the host application
//! communicates. The trait is `Send + Sync` because batch compaction runs
//! several documents at once, each on its own blocking thread.
//!
//! # Example
//!
//! ```rust
//! use edgequake_pdfslim::{CompactConfig, CompactionProgressCallback, SourceStage, StageReport};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct AcceptedCounter(AtomicUsize);
//!
//! impl CompactionProgressCallback for AcceptedCounter {
//!     fn on_stage_complete(&self, _stage: SourceStage, report: &StageReport) {
//!         if report.accepted {
//!             self.0.fetch_add(1, Ordering::SeqCst);
//!         }
//!     }
//! }
//!
//! let config = CompactConfig::builder()
//!     .progress_callback(Arc::new(AcceptedCounter(AtomicUsize::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

use crate::output::{PipelineResult, SourceStage, StageReport};

/// Called by the orchestrator as it runs each stage.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Within one document events arrive in order; across
/// documents of a batch they interleave.
pub trait CompactionProgressCallback: Send + Sync {
    /// Called once after the source parsed, before any stage runs.
    fn on_compaction_start(&self, original_size: u64, page_count: usize) {
        let _ = (original_size, page_count);
    }

    /// Called just before a stage starts transforming.
    fn on_stage_start(&self, stage: SourceStage) {
        let _ = stage;
    }

    /// Called after a stage ran, whatever its outcome.
    fn on_stage_complete(&self, stage: SourceStage, report: &StageReport) {
        let _ = (stage, report);
    }

    /// Called when a gate keeps a stage from running.
    fn on_stage_skipped(&self, stage: SourceStage, reason: &str) {
        let _ = (stage, reason);
    }

    /// Called once with the final result.
    fn on_compaction_complete(&self, result: &PipelineResult) {
        let _ = result;
    }
}

/// A no-op implementation for callers that don't need progress events.
///
/// This is the default when no callback is configured.
pub struct NoopProgressCallback;

impl CompactionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::CompactConfig`].
pub type ProgressCallback = Arc<dyn CompactionProgressCallback>;
