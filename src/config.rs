//! Configuration types for PDF compaction.
//!
//! Two layers:
//!
//! * [`CompressionProfile`] — how hard each stage pushes (JPEG quality,
//!   image dimension cap, which images count as "large"). Derived from a
//!   [`ProfileLevel`] and optionally tuned field by field.
//! * [`CompactConfig`] — everything around the profile: deadline, the ratio
//!   below which the content rewriter kicks in, batch concurrency, download
//!   timeout and the progress callback.
//!
//! # Design choice: builder over constructor
//! Callers set only what they care about and rely on documented defaults for
//! the rest. Out-of-range values are clamped in setters where a sensible
//! clamp exists and rejected in `build()` where it does not.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CompactError;
use crate::progress::{CompactionProgressCallback, ProgressCallback};

/// Images whose stream is at most this many bytes are left alone.
pub const DEFAULT_SIZE_FLOOR_BYTES: u64 = 50_000;

/// Compaction ratio under which the `High` profile tries the content rewriter.
pub const DEFAULT_REWRITE_RATIO_THRESHOLD: f64 = 0.20;

/// Smallest accepted `max_image_dimension`.
pub const MIN_IMAGE_DIMENSION: u32 = 16;

// ── Profile level ────────────────────────────────────────────────────────

/// Aggressiveness of the pipeline.
///
/// | Level | Structural cleanup | Images | Content rewrite | Metadata trim |
/// |-------|--------------------|--------|-----------------|---------------|
/// | Low | minimal | never | never | never |
/// | Medium | unused objects pruned | re-encoded at q70 | never | never |
/// | High | full prune, object streams | re-encoded at q50 | if ratio < 20 % | always |
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileLevel {
    Low,
    #[default]
    Medium,
    High,
}

impl fmt::Display for ProfileLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProfileLevel::Low => "low",
            ProfileLevel::Medium => "medium",
            ProfileLevel::High => "high",
        })
    }
}

impl FromStr for ProfileLevel {
    type Err = CompactError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(ProfileLevel::Low),
            "medium" | "med" => Ok(ProfileLevel::Medium),
            "high" => Ok(ProfileLevel::High),
            other => Err(CompactError::InvalidConfig(format!(
                "unknown compression level '{other}' (expected low, medium or high)"
            ))),
        }
    }
}

// ── Compression profile ──────────────────────────────────────────────────

/// Per-stage tuning knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressionProfile {
    pub level: ProfileLevel,

    /// JPEG quality for re-encoded images, 1–100.
    pub image_quality: u8,

    /// Images wider or taller than this are downsampled, aspect preserved.
    pub max_image_dimension: u32,

    /// Only image streams strictly larger than this are re-encoded.
    pub size_floor_bytes: u64,
}

impl CompressionProfile {
    /// Documented defaults for `level`.
    pub fn for_level(level: ProfileLevel) -> Self {
        let (image_quality, max_image_dimension) = match level {
            ProfileLevel::Low => (85, 4096),
            ProfileLevel::Medium => (70, 2000),
            ProfileLevel::High => (50, 1500),
        };
        Self {
            level,
            image_quality,
            max_image_dimension,
            size_floor_bytes: DEFAULT_SIZE_FLOOR_BYTES,
        }
    }

    /// Start from the defaults of `level` and override individual fields.
    pub fn builder(level: ProfileLevel) -> CompressionProfileBuilder {
        CompressionProfileBuilder {
            profile: Self::for_level(level),
        }
    }
}

impl Default for CompressionProfile {
    fn default() -> Self {
        Self::for_level(ProfileLevel::default())
    }
}

/// Builder for [`CompressionProfile`].
#[derive(Debug)]
pub struct CompressionProfileBuilder {
    profile: CompressionProfile,
}

impl CompressionProfileBuilder {
    pub fn image_quality(mut self, q: u8) -> Self {
        self.profile.image_quality = q.clamp(1, 100);
        self
    }

    pub fn max_image_dimension(mut self, px: u32) -> Self {
        self.profile.max_image_dimension = px;
        self
    }

    pub fn size_floor_bytes(mut self, bytes: u64) -> Self {
        self.profile.size_floor_bytes = bytes;
        self
    }

    /// Build the profile, validating constraints.
    pub fn build(self) -> Result<CompressionProfile, CompactError> {
        let p = &self.profile;
        if p.max_image_dimension < MIN_IMAGE_DIMENSION {
            return Err(CompactError::InvalidConfig(format!(
                "max image dimension must be ≥ {MIN_IMAGE_DIMENSION}, got {}",
                p.max_image_dimension
            )));
        }
        Ok(self.profile)
    }
}

// ── Compact config ───────────────────────────────────────────────────────

/// Configuration for one compaction run (or a batch of them).
///
/// # Example
/// ```rust
/// use edgequake_pdfslim::{CompactConfig, CompressionProfile, ProfileLevel};
/// use std::time::Duration;
///
/// let config = CompactConfig::builder()
///     .profile(CompressionProfile::for_level(ProfileLevel::High))
///     .deadline(Duration::from_secs(30))
///     .build()
///     .unwrap();
/// assert_eq!(config.profile.image_quality, 50);
/// ```
#[derive(Clone)]
pub struct CompactConfig {
    pub profile: CompressionProfile,

    /// Wall-clock budget for one document. Checked between stages only;
    /// when it passes, the best result so far is returned. Default: none.
    pub deadline: Option<Duration>,

    /// The content rewriter runs only while the compaction ratio is below
    /// this value. Default: 0.20.
    pub rewrite_ratio_threshold: f64,

    /// Documents compacted at once by [`crate::stream`]. Default: number of CPUs.
    pub concurrency: usize,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Optional per-stage event sink.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for CompactConfig {
    fn default() -> Self {
        Self {
            profile: CompressionProfile::default(),
            deadline: None,
            rewrite_ratio_threshold: DEFAULT_REWRITE_RATIO_THRESHOLD,
            concurrency: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for CompactConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompactConfig")
            .field("profile", &self.profile)
            .field("deadline", &self.deadline)
            .field("rewrite_ratio_threshold", &self.rewrite_ratio_threshold)
            .field("concurrency", &self.concurrency)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn CompactionProgressCallback>"),
            )
            .finish()
    }
}

impl CompactConfig {
    /// Create a new builder for `CompactConfig`.
    pub fn builder() -> CompactConfigBuilder {
        CompactConfigBuilder {
            config: Self::default(),
        }
    }

    /// Shorthand for a config with the defaults of `level`.
    pub fn for_level(level: ProfileLevel) -> Self {
        Self {
            profile: CompressionProfile::for_level(level),
            ..Self::default()
        }
    }
}

/// Builder for [`CompactConfig`].
#[derive(Debug)]
pub struct CompactConfigBuilder {
    config: CompactConfig,
}

impl CompactConfigBuilder {
    pub fn profile(mut self, profile: CompressionProfile) -> Self {
        self.config.profile = profile;
        self
    }

    pub fn level(mut self, level: ProfileLevel) -> Self {
        self.config.profile = CompressionProfile::for_level(level);
        self
    }

    pub fn deadline(mut self, d: Duration) -> Self {
        self.config.deadline = Some(d);
        self
    }

    pub fn rewrite_ratio_threshold(mut self, t: f64) -> Self {
        self.config.rewrite_ratio_threshold = t;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: Arc<dyn CompactionProgressCallback>) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<CompactConfig, CompactError> {
        let c = &self.config;
        if !(0.0..=1.0).contains(&c.rewrite_ratio_threshold) {
            return Err(CompactError::InvalidConfig(format!(
                "rewrite ratio threshold must be within 0.0–1.0, got {}",
                c.rewrite_ratio_threshold
            )));
        }
        if c.profile.max_image_dimension < MIN_IMAGE_DIMENSION {
            return Err(CompactError::InvalidConfig(format!(
                "max image dimension must be ≥ {MIN_IMAGE_DIMENSION}, got {}",
                c.profile.max_image_dimension
            )));
        }
        if c.concurrency == 0 {
            return Err(CompactError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}
