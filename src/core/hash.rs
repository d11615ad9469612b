//! Content and context hashing for anchor fingerprints.
//!
//! Anchor hashes are computed over Unicode-NFC-normalized text so that two
//! visually identical lines that differ only in combining-character order
//! still fingerprint the same. Whole-source-file hashes, by contrast, hash
//! raw bytes directly: they exist to detect "did anything at all change",
//! not to match content semantically.

use sha2::{Digest, Sha256};
use unicode_normalization::UnicodeNormalization;

use crate::error::{CommentError, Result};

/// Prefix prepended to every hash string produced by this module, so a
/// hash value is self-describing on disk (`sha256:<hex>`).
pub const HASH_PREFIX: &str = "sha256:";

/// Number of lines of context hashed before and after an anchor.
pub const CONTEXT_LINES: usize = 3;

/// Normalize text to Unicode NFC form before hashing or comparing.
pub fn normalize_text(text: &str) -> String {
    text.nfc().collect()
}

/// Hash a single piece of content (e.g. an anchor's line range) after NFC
/// normalization. Returns `sha256:<hex>`.
pub fn content_hash(text: &str) -> String {
    let normalized = normalize_text(text);
    hash_prefixed(normalized.as_bytes())
}

/// Hash a context region (lines before or after an anchor), joined with
/// `\n`, after NFC normalization.
pub fn context_hash(lines: &[String]) -> String {
    let joined = lines.join("\n");
    content_hash(&joined)
}

/// Hash raw source-file bytes directly (no normalization). Used for the
/// optimistic-concurrency `source_hash` recorded in sidecars; chunked so
/// large files don't require a second full-size buffer.
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    const CHUNK: usize = 8192;
    let mut offset = 0;
    while offset < bytes.len() {
        let end = (offset + CHUNK).min(bytes.len());
        hasher.update(&bytes[offset..end]);
        offset = end;
    }
    format!("{HASH_PREFIX}{:x}", hasher.finalize())
}

fn hash_prefixed(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{HASH_PREFIX}{:x}", hasher.finalize())
}

/// Validate that a stored hash string has the expected `sha256:<hex>`
/// shape, returning `InvalidInput` otherwise.
pub fn validate_hash_format(hash: &str) -> Result<()> {
    let Some(hex) = hash.strip_prefix(HASH_PREFIX) else {
        return Err(CommentError::InvalidInput(format!(
            "hash {hash:?} missing {HASH_PREFIX} prefix"
        )));
    };
    if hex.len() != 64 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(CommentError::InvalidInput(format!(
            "hash {hash:?} is not 64 hex characters"
        )));
    }
    Ok(())
}
