//! The persisted store (§4.5, §6): three logical tables —
//! `meta`, `hashes`, `hashtables` — behind a small trait so the engine does
//! not care which key-value database backs it. `LmdbStore` ([`lmdb`]) is the
//! production implementation, built on the same `heed`/LMDB stack the
//! teacher's own `Index` uses. `MemoryStore` ([`memory`]) is a plain
//! `HashMap`-backed double used by property tests, where opening a real
//! LMDB environment per test would dominate runtime.
//!
//! A fourth table, `features`, is an ambient addition beyond §4.5's three:
//! it retains each document's raw term frequencies so a later `hash` run
//! can fold new documents into the corpus and rebuild DocFreq over their
//! union, satisfying the vocabulary-monotonicity property (§8, property 6)
//! rather than only ever sketching against a stale, partial vocabulary.

pub mod lmdb;
pub mod memory;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::docfreq::OrderedDocFreq;
use crate::error::Result;
use crate::sketch::SketchConfig;

/// One observed `(repo, commit, path)` triple for a blob. Several meta rows
/// can share a `blob_id` — that is exactly what makes two documents exact
/// duplicates (§3 "Document").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaRow {
    pub blob_id: String,
    pub repo: String,
    pub commit: String,
    pub path: String,
}

/// Composite key for one band bucket: `(band_index, band_value_hex)`.
pub type BandKey = (usize, String);

/// Durable maps keyed by content hash and LSH band value (§1). All writes
/// are idempotent: every row is deterministically keyed by content, so
/// reprocessing a document overwrites equivalent data (§4.5).
pub trait Store: Send + Sync {
    /// The corpus-wide document-frequency table. At most one per store.
    fn put_docfreq(&self, docfreq: &OrderedDocFreq) -> Result<()>;
    fn get_docfreq(&self) -> Result<Option<OrderedDocFreq>>;

    /// The sketch parameters, persisted alongside the DocFreq (§9).
    fn put_params(&self, config: SketchConfig, matrices_bytes: &[u8]) -> Result<()>;
    fn get_params(&self) -> Result<Option<(SketchConfig, Vec<u8>)>>;

    /// `meta(blob-id, repo, commit, path)`, keyed by the full document key.
    fn put_meta(&self, document_key: &str, row: &MetaRow) -> Result<()>;
    fn get_meta(&self, document_key: &str) -> Result<Option<MetaRow>>;
    fn scan_meta(&self) -> Result<Vec<(String, MetaRow)>>;

    /// Secondary index from blob-id to every document key observed with
    /// that content, used to answer "exact duplicates of this blob" in
    /// constant time (§4.6 step 2) without a full `meta` scan.
    fn add_blob_key(&self, blob_id_hex: &str, document_key: &str) -> Result<()>;
    fn get_blob_keys(&self, blob_id_hex: &str) -> Result<Vec<String>>;

    /// `hashes(blob-id, sketch-bytes)`.
    fn put_sketch(&self, blob_id_hex: &str, sketch_bytes: &[u8]) -> Result<()>;
    fn get_sketch(&self, blob_id_hex: &str) -> Result<Option<Vec<u8>>>;
    fn scan_sketches(&self) -> Result<Vec<(String, Vec<u8>)>>;

    /// `hashtables(band-index, band-value, blob-id)`.
    fn add_band_member(&self, band_index: usize, band_value_hex: &str, blob_id_hex: &str) -> Result<()>;
    fn get_band_members(&self, band_index: usize, band_value_hex: &str) -> Result<Vec<String>>;
    fn scan_bands(&self) -> Result<Vec<(BandKey, Vec<String>)>>;

    /// `features(document-key, term-frequencies)`: the raw per-document bag
    /// the corpus's DocFreq was last built from, kept so a later `hash` can
    /// recompute DocFreq over the union of old and new documents.
    fn put_features(&self, document_key: &str, term_frequencies: &BTreeMap<String, u32>) -> Result<()>;
    fn scan_features(&self) -> Result<Vec<(String, BTreeMap<String, u32>)>>;
}

/// Bounded exponential backoff for `StoreConflict` retries (§7: "Writes are
/// retried with bounded backoff against `StoreConflict`; the deterministic
/// primary keys make retries idempotent"). `attempts` includes the first
/// try; `base` is the initial sleep, doubled each retry.
pub fn retry_with_backoff<T>(
    attempts: u32,
    base: std::time::Duration,
    mut op: impl FnMut() -> Result<T>,
) -> Result<T> {
    let mut delay = base;
    for attempt in 0..attempts {
        match op() {
            Ok(value) => return Ok(value),
            Err(crate::error::Error::StoreConflict(_)) if attempt + 1 < attempts => {
                std::thread::sleep(delay);
                delay *= 2;
            }
            Err(err) => return Err(err),
        }
    }
    unreachable!("attempts must be >= 1")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::cell::RefCell;

    #[test]
    fn retry_gives_up_after_configured_attempts() {
        let calls = RefCell::new(0);
        let result: Result<()> = retry_with_backoff(3, std::time::Duration::from_millis(0), || {
            *calls.borrow_mut() += 1;
            Err(Error::StoreConflict("k".into()))
        });
        assert!(result.is_err());
        assert_eq!(*calls.borrow(), 3);
    }

    #[test]
    fn retry_succeeds_once_conflict_clears() {
        let calls = RefCell::new(0);
        let result = retry_with_backoff(5, std::time::Duration::from_millis(0), || {
            *calls.borrow_mut() += 1;
            if *calls.borrow() < 3 {
                Err(Error::StoreConflict("k".into()))
            } else {
                Ok(42)
            }
        });
        assert_eq!(result.unwrap(), 42);
        assert_eq!(*calls.borrow(), 3);
    }
}
