//! Content rewriting: re-emit text-dominant pages as plain positioned text.
//!
//! This is the lossy stage. A page qualifies when the collaborator extracts
//! more than [`MIN_TEXT_CHARS`] characters from it and it draws fewer than
//! [`MAX_IMAGES`] images. Its content stream is replaced by one `BT … ET`
//! block of Helvetica at [`FONT_SIZE`] pt, lines wrapped at
//! [`WRAP_COLUMNS`] characters, starting at the top-left margin of the
//! MediaBox. Layout, vector graphics and the original fonts are gone.
//!
//! Non-qualifying pages and pages whose text cannot be extracted are left
//! exactly as they were. Text running past the bottom margin is still
//! emitted; it falls outside the visible area.

use std::collections::BTreeSet;

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Object, ObjectId, StringFormat};
use tracing::{debug, warn};

use crate::config::CompressionProfile;
use crate::document::PdfDocument;
use crate::error::CompactError;
use crate::pipeline::{structural, StageRun};

/// Pages need strictly more extracted characters than this.
pub const MIN_TEXT_CHARS: usize = 100;

/// Pages need strictly fewer images than this.
pub const MAX_IMAGES: usize = 3;

pub const FONT_SIZE: f32 = 8.0;
pub const LEADING: f32 = 9.6;
pub const WRAP_COLUMNS: usize = 100;
const MARGIN: f32 = 36.0;

/// US Letter, used when no MediaBox is found.
const DEFAULT_MEDIA_BOX: [f32; 4] = [0.0, 0.0, 612.0, 792.0];

/// Whether a page is text-dominant.
pub fn qualifies(text_chars: usize, image_count: usize) -> bool {
    text_chars > MIN_TEXT_CHARS && image_count < MAX_IMAGES
}

/// Rewrite every qualifying page.
pub fn run(mut doc: PdfDocument, profile: &CompressionProfile) -> Result<StageRun, CompactError> {
    let mut font_id: Option<ObjectId> = None;
    let mut processed = 0;
    let mut skipped = 0;

    for (number, page_id) in doc.page_ids() {
        let image_count = doc.page_images(page_id, &mut BTreeSet::new()).len();
        let text = match doc.page_text(number) {
            Ok(t) => t,
            Err(e) => {
                warn!("content_rewrite: page {} kept verbatim: {}", number, e);
                skipped += 1;
                continue;
            }
        };
        let chars = text.trim().chars().count();
        if !qualifies(chars, image_count) {
            continue;
        }

        let media_box = media_box(&doc, page_id);
        let stream = match render_text(&text, media_box) {
            Ok(s) => s,
            Err(e) => {
                warn!("content_rewrite: page {} kept verbatim: {}", number, e);
                skipped += 1;
                continue;
            }
        };

        let inner = doc.as_lopdf_mut();
        let font = *font_id.get_or_insert_with(|| {
            inner.add_object(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => "Helvetica",
                "Encoding" => "WinAnsiEncoding",
            })
        });
        let content_id = inner.add_object(lopdf::Stream::new(dictionary! {}, stream));
        let page = inner
            .get_dictionary_mut(page_id)
            .map_err(|e| CompactError::Internal(format!("page {number}: {e}")))?;
        page.set("Contents", content_id);
        page.set(
            "Resources",
            dictionary! { "Font" => dictionary! { "F1" => font } },
        );
        debug!("content_rewrite: page {} re-emitted ({} chars)", number, chars);
        processed += 1;
    }

    if processed == 0 {
        return Ok(StageRun::unchanged(0, skipped));
    }

    let inner = doc.as_lopdf_mut();
    inner.prune_objects();
    inner.compress();
    let bytes = structural::serialize(&mut doc, profile.level)?;
    Ok(StageRun::rewritten(bytes, processed, skipped))
}

/// Minimal content stream drawing `text` from the top-left of `media_box`.
pub fn render_text(text: &str, media_box: [f32; 4]) -> Result<Vec<u8>, CompactError> {
    let [x0, _, _, y1] = media_box;
    let mut operations = vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec!["F1".into(), FONT_SIZE.into()]),
        Operation::new("TL", vec![LEADING.into()]),
        Operation::new(
            "Td",
            vec![(x0 + MARGIN).into(), (y1 - MARGIN - FONT_SIZE).into()],
        ),
    ];
    for (i, line) in layout_lines(text).iter().enumerate() {
        if i > 0 {
            operations.push(Operation::new("T*", vec![]));
        }
        if !line.is_empty() {
            operations.push(Operation::new(
                "Tj",
                vec![Object::String(to_win_ansi(line), StringFormat::Literal)],
            ));
        }
    }
    operations.push(Operation::new("ET", vec![]));
    Content { operations }
        .encode()
        .map_err(|e| CompactError::Internal(format!("content encoding failed: {e}")))
}

/// Split into output lines: trims trailing space, collapses blank runs to
/// one, wraps long lines on word boundaries.
pub fn layout_lines(text: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut last_blank = true;
    for raw in text.lines() {
        let line = raw.trim_end();
        if line.trim().is_empty() {
            if !last_blank {
                lines.push(String::new());
            }
            last_blank = true;
            continue;
        }
        last_blank = false;
        wrap(line, WRAP_COLUMNS, &mut lines);
    }
    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    lines
}

fn wrap(line: &str, width: usize, out: &mut Vec<String>) {
    let mut current = String::new();
    for word in line.split_whitespace() {
        let mut word = word;
        // Words longer than a line are hard-split.
        while word.chars().count() > width {
            if !current.is_empty() {
                out.push(std::mem::take(&mut current));
            }
            let split = word
                .char_indices()
                .nth(width)
                .map_or(word.len(), |(i, _)| i);
            out.push(word[..split].to_string());
            word = &word[split..];
        }
        if word.is_empty() {
            continue;
        }
        let needed = if current.is_empty() {
            word.chars().count()
        } else {
            current.chars().count() + 1 + word.chars().count()
        };
        if needed > width {
            out.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        out.push(current);
    }
}

/// Latin-1 subset of WinAnsi; anything else becomes `?`.
fn to_win_ansi(line: &str) -> Vec<u8> {
    line.chars()
        .map(|c| match c as u32 {
            0x20..=0x7E | 0xA0..=0xFF => c as u32 as u8,
            0x09 => b' ',
            _ => b'?',
        })
        .collect()
}

fn media_box(doc: &PdfDocument, page_id: ObjectId) -> [f32; 4] {
    let Some(items) = doc
        .inherited(page_id, b"MediaBox")
        .and_then(|o| doc.resolve(o))
        .and_then(|o| o.as_array().ok())
    else {
        return DEFAULT_MEDIA_BOX;
    };
    let nums: Vec<f32> = items.iter().filter_map(number).collect();
    match nums.as_slice() {
        [a, b, c, d] => [a.min(*c), b.min(*d), a.max(*c), b.max(*d)],
        _ => DEFAULT_MEDIA_BOX,
    }
}

fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}
