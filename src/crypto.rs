//! Password protection: add or remove the standard security handler.
//!
//! `lock` writes RC4 128-bit encryption (security handler revision 3) with
//! the same user and owner password and all permissions granted. `unlock`
//! decrypts with the given password and saves a plain document.
//!
//! ```text
//! open(save(open(bytes, pw), Some({pw2, pw2})), Some(pw2))  ≡  open(bytes, pw)
//! ```

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use lopdf::encryption::{EncryptionState, EncryptionVersion, Permissions};
use lopdf::{Document, Object, StringFormat};
use tracing::info;

use crate::document::PdfDocument;
use crate::error::CompactError;

/// Passwords applied by [`save`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionParams {
    pub user_password: String,
    pub owner_password: String,
}

impl EncryptionParams {
    /// Same password for opening and for owner rights.
    pub fn single(password: impl Into<String>) -> Self {
        let password = password.into();
        Self {
            user_password: password.clone(),
            owner_password: password,
        }
    }
}

/// Parse `bytes`, decrypting with `password` when the file is encrypted.
pub fn open(bytes: &[u8], password: Option<&str>) -> Result<PdfDocument, CompactError> {
    PdfDocument::open(bytes, password)
}

/// Serialise `doc`, encrypting it when `params` is given.
pub fn save(mut doc: PdfDocument, params: Option<&EncryptionParams>) -> Result<Vec<u8>, CompactError> {
    if let Some(params) = params {
        encrypt(doc.as_lopdf_mut(), params)?;
    }
    doc.save()
}

/// Encrypt an unencrypted PDF with `password`.
pub fn lock(bytes: &[u8], password: &str) -> Result<Vec<u8>, CompactError> {
    if password.is_empty() {
        return Err(CompactError::InvalidConfig(
            "password must not be empty".into(),
        ));
    }
    let doc = PdfDocument::load(bytes)?;
    if doc.is_encrypted() {
        return Err(CompactError::AlreadyEncrypted);
    }
    let out = save(doc, Some(&EncryptionParams::single(password)))?;
    info!("Encrypted document: {} → {} bytes", bytes.len(), out.len());
    Ok(out)
}

/// Decrypt an encrypted PDF with `password`.
pub fn unlock(bytes: &[u8], password: &str) -> Result<Vec<u8>, CompactError> {
    let mut doc = PdfDocument::load(bytes)?;
    if !doc.is_encrypted() {
        return Err(CompactError::NotEncrypted);
    }
    doc.decrypt(password)?;
    let out = save(doc, None)?;
    info!("Decrypted document: {} → {} bytes", bytes.len(), out.len());
    Ok(out)
}

fn encrypt(doc: &mut Document, params: &EncryptionParams) -> Result<(), CompactError> {
    ensure_file_id(doc);
    let version = EncryptionVersion::V2 {
        document: &*doc,
        owner_password: &params.owner_password,
        user_password: &params.user_password,
        key_length: 128,
        permissions: Permissions::all(),
    };
    let state = EncryptionState::try_from(version).map_err(|e| CompactError::EncryptionFailed {
        detail: e.to_string(),
    })?;
    doc.encrypt(&state)
        .map_err(|e| CompactError::EncryptionFailed {
            detail: e.to_string(),
        })
}

/// The file key is derived from the first `/ID` string; add one if missing.
fn ensure_file_id(doc: &mut Document) {
    if doc.trailer.get(b"ID").is_ok() {
        return;
    }
    let mut id = Vec::with_capacity(16);
    for salt in [0u64, 1] {
        let mut hasher = DefaultHasher::new();
        salt.hash(&mut hasher);
        doc.version.hash(&mut hasher);
        doc.objects.len().hash(&mut hasher);
        doc.max_id.hash(&mut hasher);
        id.extend_from_slice(&hasher.finish().to_be_bytes());
    }
    let id = Object::String(id, StringFormat::Hexadecimal);
    doc.trailer.set("ID", vec![id.clone(), id]);
}
