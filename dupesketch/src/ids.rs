//! Content-addressed identity primitives (C1).
//!
//! A [`BlobId`] is the SHA1 of a document's raw bytes, hex-lowercase.
//! A [`DocumentKey`] is the stable `repo//path@blob-id` string used as the
//! primary key everywhere downstream. No other source of randomness enters
//! an identifier: given the same bytes, the same key and blob-id always
//! come out.

use sha1::{Digest, Sha1};

/// SHA1 digest of raw bytes, rendered lowercase-hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlobId([u8; 20]);

impl BlobId {
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(bytes);
        let digest = hasher.finalize();
        let mut out = [0u8; 20];
        out.copy_from_slice(&digest);
        BlobId(out)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex_encode(&self.0)
    }

    pub fn from_hex(hex: &str) -> Option<Self> {
        let bytes = hex_decode(hex)?;
        if bytes.len() != 20 {
            return None;
        }
        let mut out = [0u8; 20];
        out.copy_from_slice(&bytes);
        Some(BlobId(out))
    }
}

impl std::fmt::Display for BlobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Build the document-key string `repo//path@blob-id`, or, for function
/// granularity, `repo//path@blob-id:name:line` (see §9 of the design).
pub fn document_key(repo: &str, path: &str, blob_id: &BlobId) -> String {
    format!("{}//{}@{}", repo, path, blob_id.to_hex())
}

pub fn function_document_key(repo: &str, path: &str, blob_id: &BlobId, name: &str, line: u32) -> String {
    format!("{}//{}@{}:{}:{}", repo, path, blob_id.to_hex(), name, line)
}

/// Deterministic strong hash of arbitrary bytes, full 20-byte SHA1 digest.
/// Used by the LSH bander (C4) to collapse one band's sketch rows into a
/// single opaque [`crate::band::BandValue`].
pub fn digest_bytes(bytes: &[u8]) -> [u8; 20] {
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut out = [0u8; 20];
    out.copy_from_slice(&digest);
    out
}

pub(crate) fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut s = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        s.push(HEX[(b >> 4) as usize] as char);
        s.push(HEX[(b & 0xf) as usize] as char);
    }
    s
}

fn hex_decode(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    let mut out = Vec::with_capacity(s.len() / 2);
    let bytes = s.as_bytes();
    for chunk in bytes.chunks(2) {
        let hi = (chunk[0] as char).to_digit(16)?;
        let lo = (chunk[1] as char).to_digit(16)?;
        out.push(((hi << 4) | lo) as u8);
    }
    Some(out)
}
