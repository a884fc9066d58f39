//! End-to-end integration tests for edgequake-pdfslim.
//!
//! Every fixture is built in memory with lopdf, so these tests need no
//! files on disk and no network access and always run.
//!
//! Run with:
//!   cargo test --test e2e -- --nocapture
//!
//! To restrict to a specific test:
//!   cargo test --test e2e test_image_heavy -- --nocapture

use edgequake_pdfslim::{
    compact, compact_file, compact_many, inspect, lock, remove_links_from_pdf, unlock,
    CompactConfig, CompactError, CompactionProgressCallback, NoopProgressCallback, PdfDocument,
    PipelineResult, ProfileLevel, SourceStage, StageOutcome, StageReport,
};
use lopdf::{dictionary, Document, Object, ObjectId, Stream, StringFormat};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ── Fixture builders ─────────────────────────────────────────────────────────

/// Deterministic xorshift noise; JPEG shrinks it, deflate does not.
fn noise(len: usize, mut seed: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(len);
    while out.len() < len {
        seed ^= seed << 13;
        seed ^= seed >> 7;
        seed ^= seed << 17;
        out.extend_from_slice(&seed.to_le_bytes());
    }
    out.truncate(len);
    out
}

fn literal(s: &str) -> Object {
    Object::String(s.as_bytes().to_vec(), StringFormat::Literal)
}

struct Fixture {
    doc: Document,
    pages_id: ObjectId,
    font_id: ObjectId,
    kids: Vec<Object>,
}

impl Fixture {
    fn new() -> Self {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });
        Self {
            doc,
            pages_id,
            font_id,
            kids: Vec::new(),
        }
    }

    /// A page showing `lines` text lines and the given image XObjects.
    fn page(&mut self, lines: &[String], images: &[ObjectId], annots: Option<Vec<Object>>) -> ObjectId {
        let mut body = String::from("BT /F1 10 Tf 12 TL 72 720 Td\n");
        for line in lines {
            body.push_str(&format!("({line}) Tj T*\n"));
        }
        body.push_str("ET\n");
        let mut xobjects = lopdf::Dictionary::new();
        for (i, id) in images.iter().enumerate() {
            body.push_str(&format!("q 200 0 0 150 72 {} cm /Im{i} Do Q\n", 100 + i * 160));
            xobjects.set(format!("Im{i}"), *id);
        }
        let content_id = self
            .doc
            .add_object(Stream::new(dictionary! {}, body.into_bytes()));
        let mut page = dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "Contents" => content_id,
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => self.font_id },
                "XObject" => xobjects,
            },
        };
        if let Some(annots) = annots {
            page.set("Annots", annots);
        }
        let id = self.doc.add_object(page);
        self.kids.push(id.into());
        id
    }

    /// A text page followed by vector drawing operators.
    fn drawn_page(&mut self, lines: &[String], drawing: &str) -> ObjectId {
        let mut body = String::from("BT /F1 10 Tf 12 TL 72 720 Td\n");
        for line in lines {
            body.push_str(&format!("({line}) Tj T*\n"));
        }
        body.push_str("ET\n");
        body.push_str(drawing);
        let content_id = self
            .doc
            .add_object(Stream::new(dictionary! {}, body.into_bytes()));
        let id = self.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "Contents" => content_id,
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => self.font_id },
            },
        });
        self.kids.push(id.into());
        id
    }

    fn image(&mut self, width: u32, height: u32, seed: u64) -> ObjectId {
        let data = noise((width * height * 3) as usize, seed);
        self.doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width as i64,
                "Height" => height as i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
            },
            data,
        ))
    }

    fn finish(mut self, info: Option<lopdf::Dictionary>) -> Vec<u8> {
        let count = self.kids.len() as i64;
        self.doc.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => self.kids,
                "Count" => count,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            }),
        );
        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.doc.trailer.set("Root", catalog_id);
        if let Some(info) = info {
            let info_id = self.doc.add_object(info);
            self.doc.trailer.set("Info", info_id);
        }
        let mut buf = Vec::new();
        self.doc.save_to(&mut buf).unwrap();
        buf
    }
}

fn prose(page: usize, n: usize) -> Vec<String> {
    (0..n)
        .map(|i| format!("Page {page} line {i}: the quick brown fox jumps over the lazy dog again"))
        .collect()
}

/// 10 pages, three of them carrying a 640x480 noise image.
fn image_heavy_pdf() -> Vec<u8> {
    let mut f = Fixture::new();
    let images: Vec<ObjectId> = (0..3).map(|i| f.image(640, 480, 0x9E37_79B9 + i)).collect();
    for p in 0..10 {
        let imgs: &[ObjectId] = if p < 3 { &images[p..=p] } else { &[] };
        f.page(&prose(p, 5), imgs, None);
    }
    f.finish(None)
}

fn text_only_pdf(pages: usize) -> Vec<u8> {
    let mut f = Fixture::new();
    for p in 0..pages {
        f.page(&prose(p, 40), &[], None);
    }
    f.finish(Some(dictionary! {
        "Title" => literal("Quarterly notes"),
        "Producer" => literal("Fixture builder"),
    }))
}

fn linked_pdf() -> Vec<u8> {
    let mut f = Fixture::new();
    let link = f.doc.add_object(dictionary! {
        "Type" => "Annot",
        "Subtype" => "Link",
        "Rect" => vec![72.into(), 700.into(), 200.into(), 712.into()],
        "A" => dictionary! { "S" => "URI", "URI" => literal("https://example.com") },
    });
    let note = f.doc.add_object(dictionary! {
        "Type" => "Annot",
        "Subtype" => "Text",
        "Rect" => vec![300.into(), 700.into(), 320.into(), 720.into()],
        "Contents" => literal("reviewer note"),
    });
    f.page(&prose(0, 3), &[], Some(vec![link.into(), note.into()]));
    f.page(&prose(1, 3), &[], None);
    f.finish(None)
}

/// Text pages under thousands of pseudo-random filled rectangles.
fn vector_heavy_pdf(pages: usize) -> Vec<u8> {
    let mut f = Fixture::new();
    for p in 0..pages {
        let coords = noise(4 * 3000, 0xC0FF_EE00 + p as u64);
        let mut drawing = String::new();
        for (i, c) in coords.chunks(4).enumerate() {
            drawing.push_str(&format!(
                "{} {} {} g {} {} {} {} re f\n",
                c[0] as f32 / 255.0,
                c[1] as f32 / 255.0,
                c[2] as f32 / 255.0,
                (i * 7) % 600,
                u32::from(c[3]) * 3,
                1 + c[0] % 9,
                1 + c[1] % 9
            ));
        }
        f.drawn_page(&prose(p, 12), &drawing);
    }
    f.finish(None)
}

/// Plain text that quotes an encryption reference in its content stream.
fn encrypt_mention_pdf() -> Vec<u8> {
    let mut f = Fixture::new();
    f.page(
        &["The trailer holds /Encrypt 12 0 R here".to_string()],
        &[],
        None,
    );
    f.page(&prose(1, 3), &[], None);
    f.finish(None)
}

fn assert_valid(result: &PipelineResult, expected_pages: usize) {
    let doc = PdfDocument::load(result.best.bytes()).expect("best candidate must parse");
    assert_eq!(doc.page_count(), expected_pages);
    assert!(result.best.is_valid());
}

// ── Compaction scenarios ─────────────────────────────────────────────────────

#[test]
fn test_image_heavy_high_picks_image_stage() {
    let src = image_heavy_pdf();
    let result = compact(&src, &CompactConfig::for_level(ProfileLevel::High)).unwrap();

    assert_eq!(result.page_count, 10);
    assert_eq!(result.best.source_stage(), SourceStage::ImageRecompress);
    assert!(result.best.size() < src.len() as u64);
    assert!(result.ratio() > 0.20);
    assert_valid(&result, 10);

    let images = result.stage(SourceStage::ImageRecompress).unwrap();
    assert_eq!(images.outcome, StageOutcome::Accepted);
    assert_eq!(images.units_processed, 3);
    // Ratio is already well above the threshold.
    assert!(!result.stage(SourceStage::ContentRewrite).unwrap().was_attempted());
}

#[test]
fn test_text_only_medium_is_structural() {
    let src = text_only_pdf(20);
    let result = compact(&src, &CompactConfig::for_level(ProfileLevel::Medium)).unwrap();

    assert_eq!(result.best.source_stage(), SourceStage::Structural);
    assert!(result.best.size() <= src.len() as u64);
    assert!(!result.stage(SourceStage::ImageRecompress).unwrap().was_attempted());
    assert_valid(&result, 20);
}

#[test]
fn test_already_compact_input_does_not_grow() {
    let once = compact(&text_only_pdf(5), &CompactConfig::for_level(ProfileLevel::Medium))
        .unwrap()
        .into_bytes();
    let twice = compact(&once, &CompactConfig::for_level(ProfileLevel::Medium)).unwrap();
    assert_eq!(twice.best.source_stage(), SourceStage::Structural);
    assert!(twice.best.size() <= once.len() as u64);
}

#[test]
fn test_every_level_preserves_page_count() {
    for level in [ProfileLevel::Low, ProfileLevel::Medium, ProfileLevel::High] {
        let src = image_heavy_pdf();
        let result = compact(&src, &CompactConfig::for_level(level)).unwrap();
        assert_valid(&result, 10);
        assert_eq!(result.stages_attempted.len(), 4, "level {level}");
    }
}

#[test]
fn test_best_never_grows_after_seed() {
    // A threshold of 1.0 keeps the content rewriter gate open.
    let config = CompactConfig::builder()
        .level(ProfileLevel::High)
        .rewrite_ratio_threshold(1.0)
        .build()
        .unwrap();
    let result = compact(&text_only_pdf(3), &config).unwrap();

    let seed = result.stage(SourceStage::Structural).unwrap().size.unwrap();
    assert!(result.best.size() <= seed);
    for report in &result.stages_attempted {
        if report.accepted {
            assert!(report.size.unwrap() <= seed);
        }
    }
    assert!(result
        .stage(SourceStage::ContentRewrite)
        .unwrap()
        .was_attempted());
    assert!(result.stage(SourceStage::MetadataTrim).unwrap().was_attempted());
    assert_valid(&result, 3);
}

#[test]
fn test_content_rewrite_wins_on_vector_heavy_pages() {
    // Pre-compress so the rewrite competes against an already deflated seed.
    let src = compact(&vector_heavy_pdf(3), &CompactConfig::for_level(ProfileLevel::Low))
        .unwrap()
        .into_bytes();
    let config = CompactConfig::builder()
        .level(ProfileLevel::High)
        .rewrite_ratio_threshold(1.0)
        .build()
        .unwrap();
    let result = compact(&src, &config).unwrap();

    let rewrite = result.stage(SourceStage::ContentRewrite).unwrap();
    assert_eq!(rewrite.outcome, StageOutcome::Accepted);
    assert!(rewrite.accepted);
    assert_eq!(rewrite.units_processed, 3);
    let seed = result.stage(SourceStage::Structural).unwrap().size.unwrap();
    assert!(rewrite.size.unwrap() < seed);
    assert!(matches!(
        result.best.source_stage(),
        SourceStage::ContentRewrite | SourceStage::MetadataTrim
    ));
    assert!(result.best.size() <= rewrite.size.unwrap());
    assert_valid(&result, 3);
}

#[test]
fn test_zero_deadline_stops_after_structural() {
    let config = CompactConfig::builder()
        .level(ProfileLevel::High)
        .deadline(Duration::ZERO)
        .build()
        .unwrap();
    let result = compact(&image_heavy_pdf(), &config).unwrap();
    assert!(result.deadline_reached);
    assert_eq!(result.best.source_stage(), SourceStage::Structural);
    assert_valid(&result, 10);
}

#[test]
fn test_report_serialises_to_json() {
    let result = compact(&text_only_pdf(2), &CompactConfig::default()).unwrap();
    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["best"]["source_stage"], "structural");
    assert_eq!(json["stages_attempted"][0]["outcome"]["status"], "accepted");
    assert!(json["best"].get("bytes").is_none());
}

// ── Fatal errors ─────────────────────────────────────────────────────────────

#[test]
fn test_garbage_is_unparseable() {
    let err = compact(b"%PDF-1.4\nnot really", &CompactConfig::default()).unwrap_err();
    assert!(matches!(err, CompactError::Unparseable { .. }));
}

#[test]
fn test_encrypted_input_is_rejected() {
    let locked = lock(&text_only_pdf(1), "pw").unwrap();
    let err = compact(&locked, &CompactConfig::default()).unwrap_err();
    assert!(matches!(
        err,
        CompactError::PasswordProtected | CompactError::Encrypted { .. }
    ));
    assert!(remove_links_from_pdf(&locked).is_err());
}

#[test]
fn test_encrypt_text_in_content_is_not_encryption() {
    let src = encrypt_mention_pdf();

    let meta = inspect(&src).unwrap();
    assert!(!meta.is_encrypted);
    assert_eq!(meta.page_count, 2);

    let result = compact(&src, &CompactConfig::for_level(ProfileLevel::High)).unwrap();
    assert_valid(&result, 2);

    let out = remove_links_from_pdf(&src).unwrap();
    assert_eq!(out.removed, 0);
}

// ── Links, crypto, inspect ───────────────────────────────────────────────────

#[test]
fn test_remove_links_keeps_other_annotations() {
    let src = linked_pdf();
    let out = remove_links_from_pdf(&src).unwrap();
    assert_eq!(out.removed, 1);
    assert_eq!(out.pages_touched, 1);

    let doc = PdfDocument::load(&out.bytes).unwrap();
    assert_eq!(doc.page_count(), 2);
    let (_, first) = doc.page_ids()[0];
    let remaining = doc.page_annotations(first).unwrap();
    assert_eq!(remaining.len(), 1);
    assert!(!remaining[0].is_link());

    // Idempotent.
    assert_eq!(remove_links_from_pdf(&out.bytes).unwrap().removed, 0);
}

#[test]
fn test_lock_unlock_round_trip() {
    let src = text_only_pdf(2);
    let locked = lock(&src, "open-sesame").unwrap();
    assert!(inspect(&locked).unwrap().is_encrypted);

    let unlocked = unlock(&locked, "open-sesame").unwrap();
    let meta = inspect(&unlocked).unwrap();
    assert!(!meta.is_encrypted);
    assert_eq!(meta.page_count, 2);

    let original = PdfDocument::load(&src).unwrap();
    let restored = PdfDocument::load(&unlocked).unwrap();
    for ((_, a), (_, b)) in original.page_ids().into_iter().zip(restored.page_ids()) {
        assert_eq!(
            original.as_lopdf().get_page_content(a).unwrap(),
            restored.as_lopdf().get_page_content(b).unwrap()
        );
    }
}

#[test]
fn test_inspect_counts() {
    let meta = inspect(&image_heavy_pdf()).unwrap();
    assert_eq!(meta.page_count, 10);
    assert_eq!(meta.image_count, 3);
    assert_eq!(meta.large_image_count, 3);

    let meta = inspect(&linked_pdf()).unwrap();
    assert_eq!(meta.annotation_count, 2);
    assert_eq!(meta.link_count, 1);

    let meta = inspect(&text_only_pdf(1)).unwrap();
    assert_eq!(meta.title.as_deref(), Some("Quarterly notes"));
    assert_eq!(meta.pdf_version, "1.5");
}

// ── Async entry points ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_compact_file_writes_output() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.pdf");
    let output = dir.path().join("out/compact.pdf");
    std::fs::write(&input, text_only_pdf(4)).unwrap();

    let result = compact_file(input.to_str().unwrap(), &output, &CompactConfig::default())
        .await
        .unwrap();
    let written = std::fs::read(&output).unwrap();
    assert_eq!(written.len() as u64, result.best.size());
    assert_eq!(PdfDocument::load(&written).unwrap().page_count(), 4);
}

#[tokio::test]
async fn test_compact_file_rejects_non_pdf() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("notes.txt");
    std::fs::write(&input, b"plain text").unwrap();
    let err = compact_file(input.to_str().unwrap(), dir.path().join("x.pdf"), &CompactConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, CompactError::NotAPdf { .. }));
}

#[tokio::test]
async fn test_compact_many_keeps_input_order() {
    let inputs = vec![text_only_pdf(1), b"junk".to_vec(), text_only_pdf(3)];
    let config = CompactConfig::builder().concurrency(2).build().unwrap();
    let results = compact_many(inputs, &config).await;
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].as_ref().unwrap().page_count, 1);
    assert!(results[1].is_err());
    assert_eq!(results[2].as_ref().unwrap().page_count, 3);
}

// ── Callback API ─────────────────────────────────────────────────────────────

struct Recorder {
    started: AtomicUsize,
    completed: Mutex<Vec<SourceStage>>,
    skipped: Mutex<Vec<SourceStage>>,
    finished: AtomicUsize,
}

impl CompactionProgressCallback for Recorder {
    fn on_compaction_start(&self, _original_size: u64, _page_count: usize) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }
    fn on_stage_complete(&self, stage: SourceStage, _report: &StageReport) {
        self.completed.lock().unwrap().push(stage);
    }
    fn on_stage_skipped(&self, stage: SourceStage, _reason: &str) {
        self.skipped.lock().unwrap().push(stage);
    }
    fn on_compaction_complete(&self, _result: &PipelineResult) {
        self.finished.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_callbacks_fire_per_stage() {
    let recorder = Arc::new(Recorder {
        started: AtomicUsize::new(0),
        completed: Mutex::new(Vec::new()),
        skipped: Mutex::new(Vec::new()),
        finished: AtomicUsize::new(0),
    });
    let config = CompactConfig::builder()
        .level(ProfileLevel::Low)
        .progress_callback(recorder.clone())
        .build()
        .unwrap();
    compact(&text_only_pdf(1), &config).unwrap();

    assert_eq!(recorder.started.load(Ordering::SeqCst), 1);
    assert_eq!(recorder.finished.load(Ordering::SeqCst), 1);
    assert_eq!(*recorder.completed.lock().unwrap(), vec![SourceStage::Structural]);
    assert_eq!(
        *recorder.skipped.lock().unwrap(),
        vec![
            SourceStage::ImageRecompress,
            SourceStage::ContentRewrite,
            SourceStage::MetadataTrim
        ]
    );
}

#[test]
fn test_noop_callback_is_send_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<NoopProgressCallback>();
    assert_send_sync::<CompactConfig>();
}
