//! Pure gating and selection rules.
//!
//! Nothing here touches a document. The orchestrator records every candidate
//! in order and asks [`select`] which one is the best; the gates decide
//! whether an optional stage is worth running against the current best.

use crate::config::{CompressionProfile, ProfileLevel};
use crate::output::Candidate;

/// Whether `candidate` replaces `current`: valid and strictly smaller.
/// Ties keep the earlier candidate.
pub fn promotes(current: &Candidate, candidate: &Candidate) -> bool {
    candidate.is_valid() && candidate.size() < current.size()
}

/// Index of the best candidate in stage order.
///
/// The first valid candidate is the seed and is taken whatever its size
/// (the structural stage may grow a tiny file). Every later candidate must
/// [`promotes`] over the current best.
pub fn select(candidates: &[Candidate]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, candidate) in candidates.iter().enumerate() {
        match best {
            None if candidate.is_valid() => best = Some(i),
            Some(b) if promotes(&candidates[b], candidate) => best = Some(i),
            _ => {}
        }
    }
    best
}

/// Image stage gate. `Err(reason)` when it should be skipped.
pub fn image_gate(profile: &CompressionProfile, largest_image: Option<u64>) -> Result<(), String> {
    if profile.level == ProfileLevel::Low {
        return Err("profile level low".into());
    }
    match largest_image {
        Some(size) if size > profile.size_floor_bytes => Ok(()),
        Some(_) => Err(format!(
            "no image above {} bytes",
            profile.size_floor_bytes
        )),
        None => Err("no images".into()),
    }
}

/// Content rewriter gate.
pub fn rewrite_gate(profile: &CompressionProfile, ratio: f64, threshold: f64) -> Result<(), String> {
    if profile.level != ProfileLevel::High {
        return Err(format!("profile level {}", profile.level));
    }
    if ratio >= threshold {
        return Err(format!(
            "ratio {:.1}% already at or above {:.1}%",
            ratio * 100.0,
            threshold * 100.0
        ));
    }
    Ok(())
}

/// Metadata trimmer gate.
pub fn metadata_gate(profile: &CompressionProfile) -> Result<(), String> {
    if profile.level != ProfileLevel::High {
        return Err(format!("profile level {}", profile.level));
    }
    Ok(())
}
