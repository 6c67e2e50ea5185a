//! Index Writer (C5): persists a document's meta row, sketch, and `B` band
//! rows into the [`Store`]. Each document is independent end to end — no
//! ordering is required between documents, only within one (§5: "feature
//! aggregation -> TF-IDF -> sketch -> band is a strict happens-before
//! chain"). `index_corpus` fans this out over `rayon`, sharding by
//! document, and stops dispatching once cancelled.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use rayon::prelude::*;

use crate::band::band_sketch;
use crate::cancel::CancellationToken;
use crate::docfreq::IndexedDocFreq;
use crate::error::{Error, Result, SkipCounts};
use crate::ids::BlobId;
use crate::sketch::{sketch_document, ParamSource, SketchConfig};
use crate::store::{MetaRow, Store};

/// One document ready to be indexed: its identity, where it was observed,
/// and its already-aggregated term frequencies (the bag-of-features sum
/// described in §3 "Feature").
pub struct DocumentToIndex {
    pub document_key: String,
    pub blob_id: BlobId,
    pub repo: String,
    pub commit: String,
    pub path: String,
    pub term_frequencies: HashMap<String, u32>,
}

const CONFLICT_RETRY_ATTEMPTS: u32 = 4;
const CONFLICT_RETRY_BASE: Duration = Duration::from_millis(10);

/// Write one document's meta row, and — unless its bag is empty — its
/// sketch and band rows. An empty bag is not an error for the batch: it is
/// persisted in meta but gets no sketch or band rows (§4.3 "Failure modes"),
/// and is recorded in `skips` under `SketchEmpty`.
pub fn write_document(
    store: &dyn Store,
    params: &dyn ParamSource,
    docfreq: &IndexedDocFreq,
    config: &SketchConfig,
    doc: &DocumentToIndex,
    skips: &Mutex<SkipCounts>,
) -> Result<()> {
    let blob_hex = doc.blob_id.to_hex();
    let meta = MetaRow {
        blob_id: blob_hex.clone(),
        repo: doc.repo.clone(),
        commit: doc.commit.clone(),
        path: doc.path.clone(),
    };

    crate::store::retry_with_backoff(CONFLICT_RETRY_ATTEMPTS, CONFLICT_RETRY_BASE, || {
        store.put_meta(&doc.document_key, &meta)
    })?;
    crate::store::retry_with_backoff(CONFLICT_RETRY_ATTEMPTS, CONFLICT_RETRY_BASE, || {
        store.add_blob_key(&blob_hex, &doc.document_key)
    })?;

    let term_frequencies: std::collections::BTreeMap<String, u32> =
        doc.term_frequencies.iter().map(|(k, v)| (k.clone(), *v)).collect();
    crate::store::retry_with_backoff(CONFLICT_RETRY_ATTEMPTS, CONFLICT_RETRY_BASE, || {
        store.put_features(&doc.document_key, &term_frequencies)
    })?;

    let sketch = match sketch_document(params, docfreq, &doc.term_frequencies) {
        Ok(sketch) => sketch,
        Err(Error::SketchEmpty) => {
            skips.lock().unwrap().record("SketchEmpty");
            return Ok(());
        }
        Err(other) => return Err(other),
    };

    crate::store::retry_with_backoff(CONFLICT_RETRY_ATTEMPTS, CONFLICT_RETRY_BASE, || {
        store.put_sketch(&blob_hex, &sketch.to_bytes())
    })?;

    for (band_index, band_value) in band_sketch(&sketch, config).iter().enumerate() {
        let band_value_hex = band_value.to_hex();
        crate::store::retry_with_backoff(CONFLICT_RETRY_ATTEMPTS, CONFLICT_RETRY_BASE, || {
            store.add_band_member(band_index, &band_value_hex, &blob_hex)
        })?;
    }

    Ok(())
}

/// Index a whole corpus, data-parallel over documents via `rayon` (§5:
/// "embarrassingly-parallel data pipeline ... workers are stateless except
/// for the broadcast-immutable (DocFreq, parameter matrices)"). Returns the
/// merged per-reason skip counts; a fatal store error aborts the whole
/// batch, matching "infrastructure errors are fatal to the current verb"
/// (§7).
pub fn index_corpus(
    store: &dyn Store,
    params: &dyn ParamSource,
    docfreq: &IndexedDocFreq,
    config: &SketchConfig,
    documents: &[DocumentToIndex],
    cancellation: &CancellationToken,
) -> Result<SkipCounts> {
    let skips = Mutex::new(SkipCounts::new());

    let outcome: Result<()> = documents
        .par_iter()
        .try_for_each(|doc| -> Result<()> {
            if cancellation.is_cancelled() {
                return Err(Error::Cancelled);
            }
            write_document(store, params, docfreq, config, doc, &skips)
        });

    match outcome {
        Ok(()) => Ok(skips.into_inner().unwrap()),
        Err(Error::Cancelled) => Ok(skips.into_inner().unwrap()),
        Err(other) => Err(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docfreq::{Feature, FeatureRecord, OrderedDocFreq};
    use crate::sketch::{ParamMatrices, DEFAULT_SEED};
    use crate::store::memory::MemoryStore;

    fn sample_docfreq() -> IndexedDocFreq {
        let records = vec![
            FeatureRecord { document_key: "a".into(), features: vec![Feature { token: "foo".into(), weight: 2 }] },
            FeatureRecord { document_key: "b".into(), features: vec![Feature { token: "bar".into(), weight: 1 }] },
        ];
        OrderedDocFreq::build(records).indexed()
    }

    fn sample_doc(bytes: &[u8], token: &str) -> DocumentToIndex {
        let mut tf = HashMap::new();
        tf.insert(token.to_string(), 3);
        DocumentToIndex {
            document_key: format!("R1//p@{}", BlobId::of_bytes(bytes).to_hex()),
            blob_id: BlobId::of_bytes(bytes),
            repo: "R1".into(),
            commit: "c1".into(),
            path: "p".into(),
            term_frequencies: tf,
        }
    }

    #[test]
    fn writes_meta_sketch_and_bands_for_nonempty_bag() {
        let store = MemoryStore::new();
        let docfreq = sample_docfreq();
        let config = SketchConfig::new(4, 2);
        let params = ParamMatrices::generate(DEFAULT_SEED, docfreq.vocabulary_size(), config.k);
        let doc = sample_doc(b"hello", "foo");
        let blob_hex = doc.blob_id.to_hex();

        let skips = Mutex::new(SkipCounts::new());
        write_document(&store, &params, &docfreq, &config, &doc, &skips).unwrap();

        assert!(store.get_meta(&doc.document_key).unwrap().is_some());
        assert!(store.get_sketch(&blob_hex).unwrap().is_some());
        assert_eq!(store.get_blob_keys(&blob_hex).unwrap(), vec![doc.document_key.clone()]);
        assert!(skips.into_inner().unwrap().is_empty());
    }

    #[test]
    fn empty_bag_skips_sketch_but_keeps_meta() {
        let store = MemoryStore::new();
        let docfreq = sample_docfreq();
        let config = SketchConfig::new(4, 2);
        let params = ParamMatrices::generate(DEFAULT_SEED, docfreq.vocabulary_size(), config.k);
        let doc = sample_doc(b"no known tokens here", "never-seen-token");
        let blob_hex = doc.blob_id.to_hex();

        let skips = Mutex::new(SkipCounts::new());
        write_document(&store, &params, &docfreq, &config, &doc, &skips).unwrap();

        assert!(store.get_meta(&doc.document_key).unwrap().is_some());
        assert!(store.get_sketch(&blob_hex).unwrap().is_none());
        assert_eq!(skips.into_inner().unwrap().total(), 1);
    }

    #[test]
    fn reprocessing_same_document_is_idempotent() {
        let store = MemoryStore::new();
        let docfreq = sample_docfreq();
        let config = SketchConfig::new(4, 2);
        let params = ParamMatrices::generate(DEFAULT_SEED, docfreq.vocabulary_size(), config.k);
        let doc = sample_doc(b"hello", "foo");
        let blob_hex = doc.blob_id.to_hex();

        let skips = Mutex::new(SkipCounts::new());
        write_document(&store, &params, &docfreq, &config, &doc, &skips).unwrap();
        write_document(&store, &params, &docfreq, &config, &doc, &skips).unwrap();

        assert_eq!(store.get_blob_keys(&blob_hex).unwrap().len(), 1);
    }

    #[test]
    fn cancellation_stops_without_partial_errors() {
        let store = MemoryStore::new();
        let docfreq = sample_docfreq();
        let config = SketchConfig::new(4, 2);
        let params = ParamMatrices::generate(DEFAULT_SEED, docfreq.vocabulary_size(), config.k);
        let docs = vec![sample_doc(b"hello", "foo"), sample_doc(b"world", "bar")];

        let cancellation = CancellationToken::new();
        cancellation.cancel();
        let result = index_corpus(&store, &params, &docfreq, &config, &docs, &cancellation);
        assert!(result.is_ok());
    }
}
