//! Hyperlink annotation classification and removal.
//!
//! The same "this is a link" concept shows up in several encodings: a
//! `/Subtype /Link` annotation, a widget or screen annotation carrying a
//! URI/GoTo action, or a vendor-specific dictionary that only mentions a URL
//! somewhere. Classification is an ordered list of [`Rule`]s evaluated
//! short-circuit:
//!
//! 1. [`Rule::SubtypeLink`] — `/Subtype /Link`.
//! 2. [`Rule::ActionType`] — the `/A` action's `/S` is one of
//!    `URI`, `GoTo`, `Launch`, `Named`, `SubmitForm`, `ResetForm`.
//! 3. [`Rule::SubstringScan`] — the annotation's serialised form contains
//!    `URI`, `GoTo`, `http`, `www.` or `mailto:`. Only consulted when the
//!    structured rules are inconclusive (no dictionary, no subtype, or a
//!    subtype outside the standard set). A `/Text` note that merely quotes a
//!    URL is therefore kept.
//!
//! [`remove_links`] is a pure transform over a [`Page`]; it never touches a
//! document. [`strip_links`] applies it to every page of a [`PdfDocument`]
//! and writes the surviving arrays back.

use std::fmt::Write as _;

use lopdf::{Dictionary, Document, Object};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::document::{resolve, Page, PdfDocument};
use crate::error::CompactError;

static LINK_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"URI|GoTo|http|www\.|mailto:").unwrap());

const LINK_ACTIONS: &[&[u8]] = &[
    b"URI",
    b"GoTo",
    b"Launch",
    b"Named",
    b"SubmitForm",
    b"ResetForm",
];

const STANDARD_SUBTYPES: &[&[u8]] = &[
    b"Text",
    b"Link",
    b"FreeText",
    b"Line",
    b"Square",
    b"Circle",
    b"Polygon",
    b"PolyLine",
    b"Highlight",
    b"Underline",
    b"Squiggly",
    b"StrikeOut",
    b"Stamp",
    b"Caret",
    b"Ink",
    b"Popup",
    b"FileAttachment",
    b"Sound",
    b"Movie",
    b"Widget",
    b"Screen",
    b"PrinterMark",
    b"TrapNet",
    b"Watermark",
    b"3D",
    b"Redact",
    b"Projection",
    b"RichMedia",
];

/// One entry of an `/Annots` array.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationEntry {
    /// The array element exactly as stored (usually a reference).
    pub raw: Object,
    /// Resolved dictionary with its `/A` action inlined; `None` when the
    /// element does not resolve to a dictionary.
    pub dict: Option<Dictionary>,
}

impl AnnotationEntry {
    fn subtype(&self) -> Option<&[u8]> {
        self.dict
            .as_ref()?
            .get(b"Subtype")
            .and_then(Object::as_name)
            .ok()
    }

    fn action(&self) -> Option<&Dictionary> {
        self.dict.as_ref()?.get(b"A").and_then(Object::as_dict).ok()
    }

    fn action_type(&self) -> Option<&[u8]> {
        self.action()?.get(b"S").and_then(Object::as_name).ok()
    }
}

/// Where a link points, as far as the annotation tells.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum LinkTarget {
    Uri(String),
    Destination,
    Launch,
    Named(String),
    Form,
    /// Matched by the substring scan; holds the matched text.
    Pattern(String),
    Unknown,
}

/// A classified annotation.
#[derive(Debug, Clone, PartialEq)]
pub enum Annotation {
    Link {
        target: LinkTarget,
        entry: AnnotationEntry,
    },
    Other(AnnotationEntry),
}

impl Annotation {
    pub fn entry(&self) -> &AnnotationEntry {
        match self {
            Annotation::Link { entry, .. } | Annotation::Other(entry) => entry,
        }
    }

    pub fn is_link(&self) -> bool {
        matches!(self, Annotation::Link { .. })
    }
}

/// Link detection rules, highest priority first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    SubtypeLink,
    ActionType,
    SubstringScan,
}

/// Evaluation order of [`Rule`]s.
pub const RULES: [Rule; 3] = [Rule::SubtypeLink, Rule::ActionType, Rule::SubstringScan];

impl Rule {
    /// `Some(target)` when the rule classifies `entry` as a link.
    pub fn apply(&self, entry: &AnnotationEntry) -> Option<LinkTarget> {
        match self {
            Rule::SubtypeLink => {
                (entry.subtype()? == b"Link").then(|| action_target(entry).unwrap_or_else(|| {
                    let has_dest = entry
                        .dict
                        .as_ref()
                        .is_some_and(|d| d.has(b"Dest"));
                    if has_dest {
                        LinkTarget::Destination
                    } else {
                        LinkTarget::Unknown
                    }
                }))
            }
            Rule::ActionType => {
                let s = entry.action_type()?;
                if LINK_ACTIONS.contains(&s) {
                    action_target(entry)
                } else {
                    None
                }
            }
            Rule::SubstringScan => {
                if !structurally_inconclusive(entry) {
                    return None;
                }
                let text = serialize_entry(entry);
                LINK_PATTERN
                    .find(&text)
                    .map(|m| LinkTarget::Pattern(m.as_str().to_string()))
            }
        }
    }
}

fn action_target(entry: &AnnotationEntry) -> Option<LinkTarget> {
    let action = entry.action()?;
    let target = match action.get(b"S").and_then(Object::as_name).ok()? {
        b"URI" => LinkTarget::Uri(match action.get(b"URI") {
            Ok(Object::String(bytes, _)) => String::from_utf8_lossy(bytes).into_owned(),
            _ => String::new(),
        }),
        b"GoTo" => LinkTarget::Destination,
        b"Launch" => LinkTarget::Launch,
        b"Named" => LinkTarget::Named(
            action
                .get(b"N")
                .and_then(Object::as_name)
                .map(|n| String::from_utf8_lossy(n).into_owned())
                .unwrap_or_default(),
        ),
        b"SubmitForm" | b"ResetForm" => LinkTarget::Form,
        _ => LinkTarget::Unknown,
    };
    Some(target)
}

/// True when neither the subtype nor the action settles the question.
fn structurally_inconclusive(entry: &AnnotationEntry) -> bool {
    match entry.subtype() {
        None => true,
        Some(subtype) => !STANDARD_SUBTYPES.contains(&subtype),
    }
}

/// Which rule, if any, classifies `entry` as a link.
pub fn matching_rule(entry: &AnnotationEntry) -> Option<Rule> {
    RULES.into_iter().find(|r| r.apply(entry).is_some())
}

/// Classify one entry. Deterministic and side-effect free.
pub fn classify(entry: AnnotationEntry) -> Annotation {
    for rule in RULES {
        if let Some(target) = rule.apply(&entry) {
            return Annotation::Link { target, entry };
        }
    }
    Annotation::Other(entry)
}

/// Resolve and classify every element of an `/Annots` array.
pub fn read_annotations(doc: &Document, array: &[Object]) -> Vec<Annotation> {
    array
        .iter()
        .map(|raw| {
            let dict = resolve(doc, raw)
                .and_then(|o| o.as_dict().ok())
                .map(|d| inline_action(doc, d));
            classify(AnnotationEntry {
                raw: raw.clone(),
                dict,
            })
        })
        .collect()
}

fn inline_action(doc: &Document, dict: &Dictionary) -> Dictionary {
    let mut dict = dict.clone();
    if let Ok(Object::Reference(id)) = dict.get(b"A") {
        if let Ok(action) = doc.get_object(*id) {
            let action = action.clone();
            dict.set("A", action);
        }
    }
    dict
}

/// Drop every `Link` annotation from a page.
///
/// `Other` annotations keep their order. When nothing remains the page
/// ends up with no annotation array at all.
pub fn remove_links(page: &Page) -> Page {
    let annotations = page.annotations.as_ref().and_then(|list| {
        let kept: Vec<Annotation> = list.iter().filter(|a| !a.is_link()).cloned().collect();
        (!kept.is_empty()).then_some(kept)
    });
    Page {
        annotations,
        ..page.clone()
    }
}

/// [`remove_links`] over several pages.
pub fn remove_links_batch(pages: &[Page]) -> Vec<Page> {
    pages.iter().map(remove_links).collect()
}

/// Counts from [`strip_links`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    pub removed: usize,
    pub pages_touched: usize,
}

/// Remove link annotations from every page of `doc` in place.
///
/// Pages without links are not rewritten. Orphaned annotation objects are
/// pruned afterwards.
pub fn strip_links(doc: &mut PdfDocument) -> Result<LinkStats, CompactError> {
    let mut stats = LinkStats::default();
    for (number, id) in doc.page_ids() {
        let page = doc.page(number, id);
        let before = page.annotations.as_ref().map_or(0, |a| a.len());
        let cleaned = remove_links(&page);
        let after = cleaned.annotations.as_ref().map_or(0, |a| a.len());
        if before == after {
            continue;
        }
        doc.set_page_annotations(id, cleaned.annotations.as_deref())?;
        debug!("Page {}: removed {} link annotation(s)", number, before - after);
        stats.removed += before - after;
        stats.pages_touched += 1;
    }
    if stats.removed > 0 {
        doc.as_lopdf_mut().prune_objects();
    }
    Ok(stats)
}

/// Deterministic text rendering of an entry for the substring scan.
fn serialize_entry(entry: &AnnotationEntry) -> String {
    let mut out = String::new();
    match entry.dict {
        Some(ref d) => serialize_dict(d, &mut out),
        None => serialize_object(&entry.raw, &mut out),
    }
    out
}

fn serialize_dict(dict: &Dictionary, out: &mut String) {
    out.push_str("<<");
    for (key, value) in dict.iter() {
        // /Parent and /P point back into the page tree.
        if key.as_slice() == b"Parent" || key.as_slice() == b"P" {
            continue;
        }
        out.push('/');
        out.push_str(&String::from_utf8_lossy(key));
        out.push(' ');
        serialize_object(value, out);
        out.push(' ');
    }
    out.push_str(">>");
}

fn serialize_object(obj: &Object, out: &mut String) {
    match obj {
        Object::Null => out.push_str("null"),
        Object::Boolean(b) => {
            let _ = write!(out, "{b}");
        }
        Object::Integer(i) => {
            let _ = write!(out, "{i}");
        }
        Object::Real(r) => {
            let _ = write!(out, "{r}");
        }
        Object::Name(n) => {
            out.push('/');
            out.push_str(&String::from_utf8_lossy(n));
        }
        Object::String(s, _) => {
            out.push('(');
            out.push_str(&String::from_utf8_lossy(s));
            out.push(')');
        }
        Object::Array(items) => {
            out.push('[');
            for item in items {
                serialize_object(item, out);
                out.push(' ');
            }
            out.push(']');
        }
        Object::Dictionary(d) => serialize_dict(d, out),
        Object::Stream(s) => serialize_dict(&s.dict, out),
        Object::Reference((num, gen)) => {
            let _ = write!(out, "{num} {gen} R");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{dictionary, StringFormat};

    fn entry(dict: Dictionary) -> AnnotationEntry {
        AnnotationEntry {
            raw: Object::Dictionary(dict.clone()),
            dict: Some(dict),
        }
    }

    fn uri_action(uri: &str) -> Dictionary {
        dictionary! {
            "S" => "URI",
            "URI" => Object::String(uri.as_bytes().to_vec(), StringFormat::Literal),
        }
    }

    fn page_with(annotations: Option<Vec<Annotation>>) -> Page {
        Page {
            number: 1,
            id: (3, 0),
            content: b"BT ET".to_vec(),
            images: Vec::new(),
            annotations,
        }
    }

    #[test]
    fn subtype_link_wins_first() {
        let e = entry(dictionary! {
            "Subtype" => "Link",
            "A" => uri_action("https://example.com"),
        });
        assert_eq!(matching_rule(&e), Some(Rule::SubtypeLink));
        match classify(e) {
            Annotation::Link { target, .. } => {
                assert_eq!(target, LinkTarget::Uri("https://example.com".into()))
            }
            other => panic!("expected link, got {other:?}"),
        }
    }

    #[test]
    fn widget_with_goto_action_is_link() {
        let e = entry(dictionary! {
            "Subtype" => "Widget",
            "A" => dictionary! { "S" => "GoTo", "D" => vec![Object::Integer(0)] },
        });
        assert_eq!(matching_rule(&e), Some(Rule::ActionType));
    }

    #[test]
    fn javascript_action_is_not_a_link() {
        let e = entry(dictionary! {
            "Subtype" => "Widget",
            "A" => dictionary! { "S" => "JavaScript" },
        });
        assert_eq!(matching_rule(&e), None);
    }

    #[test]
    fn substring_scan_only_when_inconclusive() {
        // No subtype: the scan decides.
        let vendor = entry(dictionary! {
            "Contents" => Object::String(b"see www.example.org".to_vec(), StringFormat::Literal),
        });
        assert_eq!(matching_rule(&vendor), Some(Rule::SubstringScan));

        // A standard note that quotes a URL stays a note.
        let note = entry(dictionary! {
            "Subtype" => "Text",
            "Contents" => Object::String(b"http://example.org".to_vec(), StringFormat::Literal),
        });
        assert_eq!(matching_rule(&note), None);

        // Unknown vendor subtype with a mailto.
        let custom = entry(dictionary! {
            "Subtype" => "VendorHotspot",
            "Target" => Object::String(b"mailto:a@b.c".to_vec(), StringFormat::Literal),
        });
        assert!(matches!(
            classify(custom),
            Annotation::Link { target: LinkTarget::Pattern(ref p), .. } if p == "mailto:"
        ));
    }

    #[test]
    fn unresolvable_entry_scans_raw_form() {
        let e = AnnotationEntry {
            raw: Object::Reference((99, 0)),
            dict: None,
        };
        assert_eq!(matching_rule(&e), None);
    }

    #[test]
    fn link_other_link_keeps_only_other() {
        let a = classify(entry(dictionary! { "Subtype" => "Link", "Dest" => vec![Object::Integer(1)] }));
        let b = classify(entry(dictionary! { "Subtype" => "Highlight" }));
        let c = classify(entry(dictionary! {
            "Subtype" => "Link",
            "A" => uri_action("https://c.example"),
        }));
        assert!(a.is_link() && !b.is_link() && c.is_link());

        let page = page_with(Some(vec![a, b.clone(), c]));
        let cleaned = remove_links(&page);
        assert_eq!(cleaned.annotations, Some(vec![b]));
        // The input page is untouched.
        assert_eq!(page.annotations.as_ref().map(Vec::len), Some(3));
        assert_eq!(cleaned.content, page.content);
    }

    #[test]
    fn all_links_removes_the_array() {
        let link = classify(entry(dictionary! { "Subtype" => "Link" }));
        let cleaned = remove_links(&page_with(Some(vec![link.clone(), link])));
        assert!(cleaned.annotations.is_none());
    }

    #[test]
    fn page_without_annotations_stays_without() {
        let cleaned = remove_links(&page_with(None));
        assert!(cleaned.annotations.is_none());
    }

    #[test]
    fn batch_matches_single_page() {
        let link = classify(entry(dictionary! { "Subtype" => "Link" }));
        let note = classify(entry(dictionary! { "Subtype" => "Text" }));
        let pages = vec![
            page_with(Some(vec![link.clone()])),
            page_with(Some(vec![note.clone(), link])),
            page_with(None),
        ];
        let cleaned = remove_links_batch(&pages);
        assert_eq!(cleaned.len(), 3);
        for (single, batched) in pages.iter().map(remove_links).zip(&cleaned) {
            assert_eq!(single.annotations, batched.annotations);
        }
        assert_eq!(cleaned[1].annotations, Some(vec![note]));
    }

    #[test]
    fn serialisation_is_deterministic() {
        let e = entry(dictionary! {
            "Subtype" => "Custom",
            "Rect" => vec![0.into(), 0.into(), 10.into(), 10.into()],
        });
        assert_eq!(serialize_entry(&e), serialize_entry(&e.clone()));
        assert!(serialize_entry(&e).contains("/Rect [0 0 10 10 ]"));
    }
}
