//! Metadata trimming.
//!
//! Keeps `/Title`, `/Author` and `/Subject` in the Info dictionary and drops
//! every other Info entry. Removes the Info dictionary itself when nothing
//! survives, plus the catalog's XMP `/Metadata` stream and `/PieceInfo`
//! (application private data). A document with nothing to strip yields
//! [`StageOutput::Unchanged`](crate::pipeline::StageOutput::Unchanged), which
//! makes a second run a no-op.

use lopdf::{Dictionary, Document, Object};
use tracing::debug;

use crate::config::CompressionProfile;
use crate::document::PdfDocument;
use crate::error::CompactError;
use crate::pipeline::{structural, StageRun};

/// Info entries that survive trimming.
pub const KEPT_INFO_KEYS: &[&[u8]] = &[b"Title", b"Author", b"Subject"];

/// Catalog entries that are always removed.
const STRIPPED_CATALOG_KEYS: &[&[u8]] = &[b"Metadata", b"PieceInfo"];

/// Run the metadata stage.
pub fn run(mut doc: PdfDocument, profile: &CompressionProfile) -> Result<StageRun, CompactError> {
    let inner = doc.as_lopdf_mut();
    let stripped = trim_info(inner) + trim_catalog(inner);
    if stripped == 0 {
        return Ok(StageRun::unchanged(0, 0));
    }
    debug!("metadata_trim: {} entries removed", stripped);
    inner.prune_objects();
    let bytes = structural::serialize(&mut doc, profile.level)?;
    Ok(StageRun::rewritten(bytes, stripped, 0))
}

fn strip_info_dict(dict: &mut Dictionary) -> usize {
    let doomed: Vec<Vec<u8>> = dict
        .iter()
        .map(|(k, _)| k.clone())
        .filter(|k| !KEPT_INFO_KEYS.contains(&k.as_slice()))
        .collect();
    for key in &doomed {
        dict.remove(key);
    }
    doomed.len()
}

/// Returns the number of entries removed (the dictionary counts as one when
/// it goes away entirely).
fn trim_info(doc: &mut Document) -> usize {
    let Ok(info) = doc.trailer.get(b"Info").cloned() else {
        return 0;
    };
    let (removed, now_empty) = match info {
        Object::Reference(id) => match doc.get_dictionary_mut(id) {
            Ok(dict) => (strip_info_dict(dict), dict.is_empty()),
            Err(_) => (0, true),
        },
        Object::Dictionary(_) => match doc.trailer.get_mut(b"Info") {
            Ok(Object::Dictionary(dict)) => (strip_info_dict(dict), dict.is_empty()),
            _ => (0, true),
        },
        _ => (0, true),
    };
    if now_empty {
        doc.trailer.remove(b"Info");
        return removed + 1;
    }
    removed
}

fn trim_catalog(doc: &mut Document) -> usize {
    let Ok(catalog) = doc.catalog_mut() else {
        return 0;
    };
    STRIPPED_CATALOG_KEYS
        .iter()
        .filter(|key| catalog.remove(key).is_some())
        .count()
}
