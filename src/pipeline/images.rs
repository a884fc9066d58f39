//! Image recompression: downsample and re-encode large raster images.
//!
//! ## Which images are touched
//!
//! Every Image XObject reachable from a page (directly or through Form
//! XObjects) whose encoded stream is larger than
//! [`CompressionProfile::size_floor_bytes`]. Shared images are handled once.
//!
//! ## Decoding
//!
//! | Filter | Colour space | Decoder |
//! |--------|--------------|---------|
//! | `DCTDecode` | Gray / RGB | `image` JPEG decoder |
//! | `FlateDecode` (no predictor) | 8-bit Gray / RGB / ICC N=1,3 | `flate2` zlib + raw pixels |
//! | none | 8-bit Gray / RGB / ICC N=1,3 | raw pixels |
//!
//! Anything else (CMYK, indexed, stencil masks, `Decode` arrays, JBIG2,
//! JPX, predictors) is skipped and counted in `units_skipped`. The stage
//! never aborts because of one image.
//!
//! ## Encoding
//!
//! Images wider or taller than `max_image_dimension` are resized to fit,
//! aspect preserved, with Lanczos3. Smaller images keep their size: the stage
//! never upsamples. The result is JPEG at `image_quality`, and replaces the
//! original only when it is smaller.
//!
//! Pixel buffers live only for the duration of one image.

use std::collections::BTreeSet;
use std::io::Read;

use flate2::read::ZlibDecoder;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};
use lopdf::{Dictionary, Document, Object, Stream};
use tracing::{debug, warn};

use crate::config::CompressionProfile;
use crate::document::{resolve, Image, PdfDocument};
use crate::error::CompactError;
use crate::pipeline::{structural, StageRun};

/// Dictionary keys that describe the old encoding and are rewritten.
const ENCODING_KEYS: &[&str] = &[
    "Filter",
    "DecodeParms",
    "Width",
    "Height",
    "ColorSpace",
    "BitsPerComponent",
    "Length",
];

/// Run the image stage over every page, one page's images at a time.
pub fn run(mut doc: PdfDocument, profile: &CompressionProfile) -> Result<StageRun, CompactError> {
    let mut seen = BTreeSet::new();
    let mut processed = 0;
    let mut skipped = 0;
    let mut saved: u64 = 0;

    for (number, page_id) in doc.page_ids() {
        let refs = doc.page_images(page_id, &mut seen);
        for (index, reference) in refs.iter().enumerate() {
            if reference.declared_size <= profile.size_floor_bytes {
                continue;
            }
            let Some(image) = doc.load_image(reference) else {
                warn!(
                    "image_recompress: page {} image {}: object {:?} vanished",
                    number, index, reference.id
                );
                skipped += 1;
                continue;
            };

            match recompress(doc.as_lopdf(), &image, profile) {
                Ok(Some(stream)) => {
                    saved += image.payload.len() as u64 - stream.content.len() as u64;
                    debug!(
                        "image_recompress: page {} image {}: {} → {} bytes",
                        number,
                        index,
                        image.payload.len(),
                        stream.content.len()
                    );
                    doc.as_lopdf_mut()
                        .objects
                        .insert(reference.id, Object::Stream(stream));
                    processed += 1;
                }
                Ok(None) => {
                    debug!(
                        "image_recompress: page {} image {}: re-encoding not smaller, kept",
                        number, index
                    );
                }
                Err(reason) => {
                    warn!(
                        "image_recompress: page {} image {} skipped: {}",
                        number, index, reason
                    );
                    skipped += 1;
                }
            }
        }
    }

    if processed == 0 {
        return Ok(StageRun::unchanged(0, skipped));
    }
    debug!("image_recompress: {} images, {} bytes saved", processed, saved);
    let bytes = structural::serialize(&mut doc, profile.level)?;
    Ok(StageRun::rewritten(bytes, processed, skipped))
}

/// Re-encode one image. `Ok(None)` when the result would not be smaller.
pub fn recompress(
    doc: &Document,
    image: &Image,
    profile: &CompressionProfile,
) -> Result<Option<Stream>, String> {
    let dict = match doc.get_object(image.reference.id) {
        Ok(Object::Stream(s)) => &s.dict,
        _ => return Err("not a stream".into()),
    };

    let decoded = decode(doc, dict, &image.payload)?;
    let resized = downsample(decoded, profile.max_image_dimension);
    let (width, height) = (resized.width(), resized.height());
    let (jpeg, gray) = encode_jpeg(resized, profile.image_quality)?;

    if jpeg.len() >= image.payload.len() {
        return Ok(None);
    }

    let mut new_dict = dict.clone();
    for key in ENCODING_KEYS {
        new_dict.remove(key.as_bytes());
    }
    new_dict.set("Filter", "DCTDecode");
    new_dict.set("Width", width as i64);
    new_dict.set("Height", height as i64);
    new_dict.set("ColorSpace", if gray { "DeviceGray" } else { "DeviceRGB" });
    new_dict.set("BitsPerComponent", 8);
    Ok(Some(Stream::new(new_dict, jpeg).with_compression(false)))
}

/// Shrink to fit `max_dim` × `max_dim`; never enlarges.
pub fn downsample(img: DynamicImage, max_dim: u32) -> DynamicImage {
    if img.width() <= max_dim && img.height() <= max_dim {
        return img;
    }
    img.resize(max_dim, max_dim, FilterType::Lanczos3)
}

fn encode_jpeg(img: DynamicImage, quality: u8) -> Result<(Vec<u8>, bool), String> {
    let gray = matches!(img, DynamicImage::ImageLuma8(_));
    let img = if gray {
        img
    } else {
        DynamicImage::ImageRgb8(img.to_rgb8())
    };
    let mut buf = Vec::new();
    img.write_with_encoder(JpegEncoder::new_with_quality(&mut buf, quality))
        .map_err(|e| format!("JPEG encoding failed: {e}"))?;
    Ok((buf, gray))
}

/// Number of colour components, for the colour spaces we can decode.
fn components(doc: &Document, dict: &Dictionary) -> Result<u8, String> {
    let cs = dict
        .get(b"ColorSpace")
        .ok()
        .and_then(|o| resolve(doc, o))
        .ok_or("missing colour space")?;
    match cs {
        Object::Name(n) => match n.as_slice() {
            b"DeviceGray" | b"CalGray" | b"G" => Ok(1),
            b"DeviceRGB" | b"CalRGB" | b"RGB" => Ok(3),
            other => Err(format!(
                "unsupported colour space {}",
                String::from_utf8_lossy(other)
            )),
        },
        Object::Array(items) => {
            let family = items
                .first()
                .and_then(|o| o.as_name().ok())
                .ok_or("empty colour space array")?;
            match family {
                b"ICCBased" => {
                    let profile = items
                        .get(1)
                        .and_then(|o| resolve(doc, o))
                        .and_then(|o| o.as_stream().ok())
                        .ok_or("ICC profile missing")?;
                    match profile.dict.get(b"N").and_then(Object::as_i64) {
                        Ok(1) => Ok(1),
                        Ok(3) => Ok(3),
                        Ok(n) => Err(format!("unsupported ICC component count {n}")),
                        Err(_) => Err("ICC profile without /N".into()),
                    }
                }
                b"CalGray" => Ok(1),
                b"CalRGB" => Ok(3),
                other => Err(format!(
                    "unsupported colour space {}",
                    String::from_utf8_lossy(other)
                )),
            }
        }
        _ => Err("malformed colour space".into()),
    }
}

fn single_filter(dict: &Dictionary) -> Result<Option<Vec<u8>>, String> {
    match dict.get(b"Filter") {
        Err(_) => Ok(None),
        Ok(Object::Name(n)) => Ok(Some(n.clone())),
        Ok(Object::Array(items)) if items.is_empty() => Ok(None),
        Ok(Object::Array(items)) if items.len() == 1 => match &items[0] {
            Object::Name(n) => Ok(Some(n.clone())),
            _ => Err("malformed filter".into()),
        },
        Ok(_) => Err("filter chains are not supported".into()),
    }
}

fn decode(doc: &Document, dict: &Dictionary, payload: &[u8]) -> Result<DynamicImage, String> {
    if dict
        .get(b"ImageMask")
        .and_then(Object::as_bool)
        .unwrap_or(false)
    {
        return Err("stencil mask".into());
    }
    if dict.has(b"Decode") {
        return Err("decode array".into());
    }

    let filter = single_filter(dict)?;
    if filter.as_deref() == Some(b"DCTDecode".as_slice()) {
        let n = components(doc, dict)?;
        let img = image::load_from_memory_with_format(payload, ImageFormat::Jpeg)
            .map_err(|e| format!("JPEG decode failed: {e}"))?;
        return Ok(if n == 1 {
            DynamicImage::ImageLuma8(img.to_luma8())
        } else {
            img
        });
    }

    let raw = match filter.as_deref() {
        None => payload.to_vec(),
        Some(b"FlateDecode") => {
            let predictor = dict
                .get(b"DecodeParms")
                .ok()
                .and_then(|o| resolve(doc, o))
                .and_then(|o| o.as_dict().ok())
                .and_then(|p| p.get(b"Predictor").and_then(Object::as_i64).ok())
                .unwrap_or(1);
            if predictor > 1 {
                return Err(format!("predictor {predictor}"));
            }
            let mut out = Vec::new();
            ZlibDecoder::new(payload)
                .read_to_end(&mut out)
                .map_err(|e| format!("inflate failed: {e}"))?;
            out
        }
        Some(other) => {
            return Err(format!(
                "unsupported filter {}",
                String::from_utf8_lossy(other)
            ))
        }
    };

    let bpc = dict
        .get(b"BitsPerComponent")
        .and_then(Object::as_i64)
        .unwrap_or(8);
    if bpc != 8 {
        return Err(format!("{bpc} bits per component"));
    }
    let width = dimension(dict, b"Width")?;
    let height = dimension(dict, b"Height")?;
    let n = components(doc, dict)?;
    let expected = width as usize * height as usize * n as usize;
    if raw.len() < expected {
        return Err(format!("short pixel data ({} < {})", raw.len(), expected));
    }
    let pixels = raw[..expected].to_vec();
    match n {
        1 => GrayImage::from_raw(width, height, pixels)
            .map(DynamicImage::ImageLuma8)
            .ok_or_else(|| "bad gray buffer".to_string()),
        _ => RgbImage::from_raw(width, height, pixels)
            .map(DynamicImage::ImageRgb8)
            .ok_or_else(|| "bad RGB buffer".to_string()),
    }
}

fn dimension(dict: &Dictionary, key: &[u8]) -> Result<u32, String> {
    dict.get(key)
        .and_then(Object::as_i64)
        .ok()
        .and_then(|v| u32::try_from(v).ok())
        .filter(|&v| v > 0)
        .ok_or_else(|| format!("missing /{}", String::from_utf8_lossy(key)))
}
