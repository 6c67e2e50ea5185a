//! Query Engine (C6): given one document's bytes, find its exact duplicates
//! and its near-duplicates against an already-built index.
//!
//! Procedure follows §4.6 verbatim: blob-id lookup for exact duplicates,
//! then TF-IDF -> sketch -> band -> band-equal candidate union -> sketch
//! agreement re-scoring -> similarity-floor filter.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::band::band_sketch;
use crate::docfreq::IndexedDocFreq;
use crate::error::{Error, Result};
use crate::ids::BlobId;
use crate::sketch::{sketch_document, ParamSource, Sketch, SketchConfig};
use crate::store::{MetaRow, Store};

/// Default similarity floor below which a band-equal candidate is not
/// reported as *similar* (§4.6 step 7).
pub const DEFAULT_SIMILARITY_FLOOR: f64 = 0.5;

/// A candidate judged similar to the query document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarHit {
    pub meta: MetaRow,
    pub estimated_similarity: f64,
}

/// Result of querying one document against the index.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryReport {
    pub exact_duplicates: Vec<MetaRow>,
    pub similar: Vec<SimilarHit>,
}

/// Query a single document (its raw bytes plus its already-aggregated term
/// frequencies) against the store.
///
/// Fails with [`Error::IndexNotBuilt`] when the store has no DocFreq yet
/// (§4.6 edge cases, §7). An empty term-frequency bag is not an error: it
/// simply yields no similar candidates, only exact duplicates (§4.6, S5).
pub fn query_document(
    store: &dyn Store,
    params: &dyn ParamSource,
    docfreq: &IndexedDocFreq,
    config: &SketchConfig,
    bytes: &[u8],
    term_frequencies: &HashMap<String, u32>,
    similarity_floor: f64,
) -> Result<QueryReport> {
    if store.get_docfreq()?.is_none() {
        return Err(Error::IndexNotBuilt);
    }

    let blob_id = BlobId::of_bytes(bytes);
    let blob_hex = blob_id.to_hex();

    let duplicate_keys: HashSet<String> = store.get_blob_keys(&blob_hex)?.into_iter().collect();
    let mut exact_duplicates = Vec::with_capacity(duplicate_keys.len());
    for key in &duplicate_keys {
        if let Some(meta) = store.get_meta(key)? {
            exact_duplicates.push(meta);
        }
    }

    let query_sketch = match sketch_document(params, docfreq, term_frequencies) {
        Ok(sketch) => sketch,
        Err(Error::SketchEmpty) => {
            return Ok(QueryReport { exact_duplicates, similar: Vec::new() });
        }
        Err(other) => return Err(other),
    };

    let bands = band_sketch(&query_sketch, config);

    let mut candidate_blobs: HashSet<String> = HashSet::new();
    for (band_index, band_value) in bands.iter().enumerate() {
        for blob in store.get_band_members(band_index, &band_value.to_hex())? {
            candidate_blobs.insert(blob);
        }
    }
    candidate_blobs.remove(&blob_hex);

    let mut similar = Vec::new();
    for candidate_blob_hex in candidate_blobs {
        let sketch_bytes = match store.get_sketch(&candidate_blob_hex)? {
            Some(bytes) => bytes,
            None => continue,
        };
        let candidate_sketch = match Sketch::from_bytes(&sketch_bytes) {
            Some(sketch) => sketch,
            None => continue,
        };
        let estimate = query_sketch.agreement(&candidate_sketch);
        if estimate < similarity_floor {
            continue;
        }

        for key in store.get_blob_keys(&candidate_blob_hex)? {
            if duplicate_keys.contains(&key) {
                continue;
            }
            if let Some(meta) = store.get_meta(&key)? {
                similar.push(SimilarHit { meta, estimated_similarity: estimate });
            }
        }
    }

    Ok(QueryReport { exact_duplicates, similar })
}
