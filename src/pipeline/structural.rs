//! Structural compaction: dead-object elision, stream deflation and
//! serialisation.
//!
//! Aggressiveness follows the profile level:
//!
//! | Level | Object removal | Streams | Writer |
//! |-------|----------------|---------|--------|
//! | Low | zero-length streams only | deflate | classic xref table |
//! | Medium | unreferenced objects | deflate | classic xref table |
//! | High | unreferenced objects and zero-length streams, renumbered | deflate | object streams + xref stream, zlib level 9 |
//!
//! Later stages serialise through [`serialize`] with the same level so they
//! do not undo the writer gains of this stage.

use lopdf::SaveOptions;
use tracing::debug;

use crate::config::ProfileLevel;
use crate::document::PdfDocument;
use crate::error::CompactError;
use crate::pipeline::StageRun;

/// Run the structural stage. Always yields a candidate.
pub fn run(mut doc: PdfDocument, level: ProfileLevel) -> Result<StageRun, CompactError> {
    let inner = doc.as_lopdf_mut();
    let before = inner.objects.len();

    let removed = match level {
        ProfileLevel::Low => inner.delete_zero_length_streams().len(),
        ProfileLevel::Medium => inner.prune_objects().len(),
        ProfileLevel::High => {
            let pruned = inner.prune_objects().len();
            let empty = inner.delete_zero_length_streams().len();
            inner.renumber_objects();
            pruned + empty
        }
    };
    inner.compress();
    debug!(
        "structural ({}): {} of {} objects removed",
        level, removed, before
    );

    let bytes = serialize(&mut doc, level)?;
    Ok(StageRun::rewritten(bytes, removed, 0))
}

/// Write `doc` the way `level` prescribes.
pub fn serialize(doc: &mut PdfDocument, level: ProfileLevel) -> Result<Vec<u8>, CompactError> {
    if level != ProfileLevel::High {
        return doc.save();
    }

    let inner = doc.as_lopdf_mut();
    // Object streams need PDF 1.5.
    if inner.version.as_str() < "1.5" {
        inner.version = "1.5".to_string();
    }
    let options = SaveOptions::builder()
        .use_object_streams(true)
        .use_xref_streams(true)
        .max_objects_per_stream(200)
        .compression_level(9)
        .build();
    let mut buf = Vec::new();
    inner
        .save_with_options(&mut buf, options)
        .map_err(|e| CompactError::Internal(format!("save with object streams failed: {e}")))?;
    Ok(buf)
}
