//! In-memory document model over `lopdf`.
//!
//! [`PdfDocument`] owns exactly one `lopdf::Document`. It is never shared:
//! every pipeline run parses its own copy and every stage works on a clone,
//! so the underlying object graph is only ever touched from one thread.
//!
//! Pages are materialised on demand as [`Page`] values (content bytes, image
//! references, classified annotations). Image payloads are loaded one at a
//! time through [`PdfDocument::load_image`] so at most one page's images are
//! held in memory.

use std::collections::BTreeSet;

use lopdf::{Dictionary, Document, Object, ObjectId};
use once_cell::sync::Lazy;
use regex::bytes::Regex;
use tracing::{debug, warn};

use crate::annotations::{read_annotations, Annotation};
use crate::error::CompactError;

/// Trailer reference to an encryption dictionary, e.g. `/Encrypt 12 0 R`.
static ENCRYPT_REF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/Encrypt\s*(?:\d+\s+\d+\s+R|<<)").unwrap());

static STARTXREF: Lazy<Regex> = Lazy::new(|| Regex::new(r"startxref\s+(\d+)").unwrap());

static XREF_STREAM_TYPE: Lazy<Regex> = Lazy::new(|| Regex::new(r"/Type\s*/XRef\b").unwrap());

/// Upper bound on `/Parent` hops and Form XObject nesting.
const MAX_DEPTH: usize = 32;

/// Reference to an embedded raster image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub id: ObjectId,
    /// Length of the (still encoded) stream in bytes.
    pub declared_size: u64,
    /// Declared `/Width` and `/Height`; `None` until known.
    pub dimensions: Option<(u32, u32)>,
}

/// An image together with its encoded payload.
#[derive(Debug, Clone)]
pub struct Image {
    pub reference: ImageRef,
    pub payload: Vec<u8>,
}

/// One page: content stream, image references and annotation array.
#[derive(Debug, Clone)]
pub struct Page {
    /// 1-indexed page number.
    pub number: u32,
    pub id: ObjectId,
    /// Decoded content stream(s), concatenated.
    pub content: Vec<u8>,
    pub images: Vec<ImageRef>,
    /// `None` when the page has no `/Annots` key at all.
    pub annotations: Option<Vec<Annotation>>,
}

/// Owned, parsed PDF.
#[derive(Debug, Clone)]
pub struct PdfDocument {
    inner: Document,
    encrypted: bool,
}

impl PdfDocument {
    /// Parse `bytes` without decrypting.
    ///
    /// Encrypted documents load as long as their page tree is readable;
    /// [`PdfDocument::is_encrypted`] reports them.
    pub fn load(bytes: &[u8]) -> Result<Self, CompactError> {
        match Document::load_mem(bytes) {
            Ok(inner) => {
                let encrypted = inner.is_encrypted()
                    || inner.trailer.get(b"Encrypt").is_ok()
                    || trailer_declares_encryption(bytes);
                debug!(
                    "Parsed PDF {} ({} objects, encrypted: {})",
                    inner.version,
                    inner.objects.len(),
                    encrypted
                );
                Ok(Self { inner, encrypted })
            }
            Err(_) if trailer_declares_encryption(bytes) => Err(CompactError::PasswordProtected),
            Err(e) => Err(CompactError::Unparseable {
                detail: e.to_string(),
            }),
        }
    }

    /// Parse and, if encrypted, decrypt with `password` (or the empty user
    /// password when `None`).
    pub fn open(bytes: &[u8], password: Option<&str>) -> Result<Self, CompactError> {
        let mut doc = Self::load(bytes)?;
        if doc.encrypted {
            doc.decrypt(password.unwrap_or(""))
                .map_err(|e| match (e, password) {
                    (CompactError::WrongPassword, None) => CompactError::PasswordProtected,
                    (e, _) => e,
                })?;
        }
        Ok(doc)
    }

    /// Decrypt in place. The result saves without encryption.
    pub fn decrypt(&mut self, password: &str) -> Result<(), CompactError> {
        if self.inner.is_encrypted() {
            self.inner
                .decrypt(password)
                .map_err(|_| CompactError::WrongPassword)?;
        }
        self.inner.trailer.remove(b"Encrypt");
        self.encrypted = false;
        Ok(())
    }

    pub fn as_lopdf(&self) -> &Document {
        &self.inner
    }

    pub fn as_lopdf_mut(&mut self) -> &mut Document {
        &mut self.inner
    }

    /// True when the source carried an encryption dictionary and has not
    /// been decrypted.
    pub fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    pub fn version(&self) -> &str {
        &self.inner.version
    }

    pub fn page_count(&self) -> usize {
        self.inner.get_pages().len()
    }

    /// `(page number, object id)` in document order.
    pub fn page_ids(&self) -> Vec<(u32, ObjectId)> {
        self.inner.get_pages().into_iter().collect()
    }

    /// Materialise one page.
    pub fn page(&self, number: u32, id: ObjectId) -> Page {
        let content = self.inner.get_page_content(id).unwrap_or_else(|e| {
            warn!("Page {}: content stream unreadable: {}", number, e);
            Vec::new()
        });
        let mut seen = BTreeSet::new();
        Page {
            number,
            id,
            content,
            images: self.page_images(id, &mut seen),
            annotations: self.page_annotations(id),
        }
    }

    /// All pages, materialised one at a time.
    pub fn pages(&self) -> impl Iterator<Item = Page> + '_ {
        self.page_ids()
            .into_iter()
            .map(move |(number, id)| self.page(number, id))
    }

    /// Image XObjects reachable from a page's resources, including those
    /// nested in Form XObjects. Ids already in `seen` are skipped, so a
    /// shared `seen` across pages yields every image exactly once.
    pub fn page_images(&self, page_id: ObjectId, seen: &mut BTreeSet<ObjectId>) -> Vec<ImageRef> {
        let mut out = Vec::new();
        if let Some(resources) = self
            .inherited(page_id, b"Resources")
            .and_then(|o| self.resolve(o))
            .and_then(|o| o.as_dict().ok())
        {
            self.collect_images(resources, seen, &mut out, 0);
        }
        out
    }

    fn collect_images(
        &self,
        resources: &Dictionary,
        seen: &mut BTreeSet<ObjectId>,
        out: &mut Vec<ImageRef>,
        depth: usize,
    ) {
        let Some(xobjects) = resources
            .get(b"XObject")
            .ok()
            .and_then(|o| self.resolve(o))
            .and_then(|o| o.as_dict().ok())
        else {
            return;
        };

        for (_, value) in xobjects.iter() {
            let Ok(id) = value.as_reference() else {
                continue;
            };
            if !seen.insert(id) {
                continue;
            }
            let Ok(Object::Stream(stream)) = self.inner.get_object(id) else {
                continue;
            };
            match stream.dict.get(b"Subtype").and_then(Object::as_name) {
                Ok(b"Image") => out.push(ImageRef {
                    id,
                    declared_size: stream.content.len() as u64,
                    dimensions: declared_dimensions(&stream.dict),
                }),
                Ok(b"Form") if depth < MAX_DEPTH => {
                    if let Some(nested) = stream
                        .dict
                        .get(b"Resources")
                        .ok()
                        .and_then(|o| self.resolve(o))
                        .and_then(|o| o.as_dict().ok())
                    {
                        self.collect_images(nested, seen, out, depth + 1);
                    }
                }
                _ => {}
            }
        }
    }

    /// Every image in the document, each listed once.
    pub fn all_images(&self) -> Vec<ImageRef> {
        let mut seen = BTreeSet::new();
        self.page_ids()
            .into_iter()
            .flat_map(|(_, id)| self.page_images(id, &mut seen))
            .collect()
    }

    /// Load an image payload. `None` if the object is gone or not a stream.
    pub fn load_image(&self, reference: &ImageRef) -> Option<Image> {
        match self.inner.get_object(reference.id) {
            Ok(Object::Stream(s)) => Some(Image {
                reference: reference.clone(),
                payload: s.content.clone(),
            }),
            _ => None,
        }
    }

    /// Classified annotations of a page; `None` when there is no `/Annots`.
    pub fn page_annotations(&self, page_id: ObjectId) -> Option<Vec<Annotation>> {
        let page = self.inner.get_dictionary(page_id).ok()?;
        let annots = page.get(b"Annots").ok()?;
        let array = self.resolve(annots)?.as_array().ok()?;
        Some(read_annotations(&self.inner, array))
    }

    /// Replace a page's annotation array. `None` removes the key.
    pub fn set_page_annotations(
        &mut self,
        page_id: ObjectId,
        annotations: Option<&[Annotation]>,
    ) -> Result<(), CompactError> {
        let page = self
            .inner
            .get_dictionary_mut(page_id)
            .map_err(|e| CompactError::Internal(format!("page {page_id:?}: {e}")))?;
        match annotations {
            Some(list) => page.set(
                "Annots",
                Object::Array(list.iter().map(|a| a.entry().raw.clone()).collect()),
            ),
            None => {
                page.remove(b"Annots");
            }
        }
        Ok(())
    }

    /// Text the collaborator can extract from one page.
    pub fn page_text(&self, number: u32) -> Result<String, CompactError> {
        self.inner
            .extract_text(&[number])
            .map_err(|e| CompactError::Internal(format!("page {number}: {e}")))
    }

    /// Document information dictionary, if any.
    pub fn info(&self) -> Option<&Dictionary> {
        let info = self.inner.trailer.get(b"Info").ok()?;
        self.resolve(info)?.as_dict().ok()
    }

    /// Text value of an Info entry.
    pub fn info_string(&self, key: &[u8]) -> Option<String> {
        match self.info()?.get(key).ok().and_then(|o| self.resolve(o))? {
            Object::String(bytes, _) => Some(decode_text_string(bytes)),
            Object::Name(name) => Some(String::from_utf8_lossy(name).into_owned()),
            _ => None,
        }
    }

    /// Serialise with the classic cross-reference table.
    pub fn save(&mut self) -> Result<Vec<u8>, CompactError> {
        let mut buf = Vec::new();
        self.inner
            .save_to(&mut buf)
            .map_err(|e| CompactError::Internal(format!("save failed: {e}")))?;
        Ok(buf)
    }

    /// Follow a reference chain to its target object.
    pub(crate) fn resolve<'a>(&'a self, obj: &'a Object) -> Option<&'a Object> {
        resolve(&self.inner, obj)
    }

    /// Look up a page attribute, walking `/Parent` for inheritable keys.
    pub(crate) fn inherited(&self, page_id: ObjectId, key: &[u8]) -> Option<&Object> {
        let mut current = self.inner.get_dictionary(page_id).ok()?;
        for _ in 0..MAX_DEPTH {
            if let Ok(value) = current.get(key) {
                return Some(value);
            }
            let parent = current.get(b"Parent").and_then(Object::as_reference).ok()?;
            current = self.inner.get_dictionary(parent).ok()?;
        }
        None
    }
}

/// Follow references until a direct object is reached.
pub(crate) fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Object> {
    let mut current = obj;
    for _ in 0..MAX_DEPTH {
        match current {
            Object::Reference(id) => current = doc.get_object(*id).ok()?,
            other => return Some(other),
        }
    }
    None
}

/// True when a cross-reference trailer references an encryption dictionary.
///
/// Only the sections a `startxref` offset points at are searched: the
/// `trailer` dictionary after a classic table, or the dictionary of a
/// cross-reference stream. Text in page content never matches.
fn trailer_declares_encryption(bytes: &[u8]) -> bool {
    STARTXREF.captures_iter(bytes).any(|caps| {
        let offset = caps
            .get(1)
            .and_then(|m| std::str::from_utf8(m.as_bytes()).ok())
            .and_then(|s| s.parse::<usize>().ok());
        match offset {
            Some(o) if o < bytes.len() => {
                trailer_at(bytes, o).is_some_and(|section| ENCRYPT_REF.is_match(section))
            }
            _ => false,
        }
    })
}

/// Trailer section for the cross-reference data starting at `offset`.
fn trailer_at(bytes: &[u8], offset: usize) -> Option<&[u8]> {
    let rest = &bytes[offset..];
    let skip = rest.iter().take_while(|b| b.is_ascii_whitespace()).count();
    let rest = &rest[skip..];
    if rest.starts_with(b"xref") {
        let tail = &rest[find(rest, b"trailer")?..];
        let end = find(tail, b"startxref").unwrap_or(tail.len());
        return Some(&tail[..end]);
    }
    let dict = &rest[..find(rest, b"stream").unwrap_or(rest.len())];
    XREF_STREAM_TYPE.is_match(dict).then_some(dict)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn declared_dimensions(dict: &Dictionary) -> Option<(u32, u32)> {
    let w = dict.get(b"Width").and_then(Object::as_i64).ok()?;
    let h = dict.get(b"Height").and_then(Object::as_i64).ok()?;
    Some((u32::try_from(w).ok()?, u32::try_from(h).ok()?))
}

/// Decode a PDF text string: UTF-16BE with BOM, else byte-per-char.
pub(crate) fn decode_text_string(bytes: &[u8]) -> String {
    if let Some(body) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = body
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{dictionary, Stream};

    fn two_page_doc_with_shared_image() -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let image_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => 2,
                "Height" => 1,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
            },
            vec![0u8, 255],
        ));
        let resources_id = doc.add_object(dictionary! {
            "XObject" => dictionary! { "Im1" => image_id },
        });
        let mut kids = Vec::new();
        for _ in 0..2 {
            let content_id = doc.add_object(Stream::new(
                dictionary! {},
                b"q 2 0 0 1 0 0 cm /Im1 Do Q".to_vec(),
            ));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => 2,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        let mut buf = Vec::new();
        doc.save_to(&mut buf).unwrap();
        buf
    }

    #[test]
    fn inherited_resources_expose_images() {
        let doc = PdfDocument::load(&two_page_doc_with_shared_image()).unwrap();
        assert_eq!(doc.page_count(), 2);
        let page = doc.pages().next().unwrap();
        assert_eq!(page.images.len(), 1);
        assert_eq!(page.images[0].dimensions, Some((2, 1)));
        assert_eq!(page.images[0].declared_size, 2);
        assert!(page.annotations.is_none());
        // Shared image is listed once for the whole document.
        assert_eq!(doc.all_images().len(), 1);
    }

    #[test]
    fn garbage_is_unparseable() {
        let err = PdfDocument::load(b"%PDF-1.4\nnot really a pdf").unwrap_err();
        assert!(matches!(err, CompactError::Unparseable { .. }), "got {err:?}");
    }

    #[test]
    fn encryption_is_read_from_trailers_only() {
        let classic = b"%PDF-1.4\nxref\n0 1\n0000000000 65535 f \ntrailer\n<< /Root 1 0 R /Encrypt 9 0 R >>\nstartxref\n9\n%%EOF";
        assert!(trailer_declares_encryption(classic));

        let plain = b"%PDF-1.4\nxref\n0 1\n0000000000 65535 f \ntrailer\n<< /Root 1 0 R >>\nstartxref\n9\n%%EOF";
        assert!(!trailer_declares_encryption(plain));

        let stream = b"%PDF-1.5\n5 0 obj\n<< /Type /XRef /Size 6 /Encrypt 4 0 R >>\nstream\n...";
        assert!(trailer_declares_encryption(
            &[stream.as_slice(), b"\nstartxref\n9\n%%EOF"].concat()
        ));
    }

    #[test]
    fn encrypt_text_in_content_is_not_encryption() {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            b"BT /F1 12 Tf 72 700 Td (The trailer holds /Encrypt 12 0 R here) Tj ET".to_vec(),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
            }),
        );
        let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
        doc.trailer.set("Root", catalog_id);
        let mut buf = Vec::new();
        doc.save_to(&mut buf).unwrap();

        let loaded = PdfDocument::load(&buf).unwrap();
        assert!(!loaded.is_encrypted());
        assert!(!trailer_declares_encryption(&buf));
    }

    #[test]
    fn text_string_decoding() {
        assert_eq!(decode_text_string(b"Report"), "Report");
        assert_eq!(decode_text_string(&[0xFE, 0xFF, 0x00, 0x41, 0x00, 0xE9]), "Aé");
    }
}
