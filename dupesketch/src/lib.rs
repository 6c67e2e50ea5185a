//! Weighted MinHash + banded LSH engine for duplicate and near-duplicate
//! code detection (§1, §2).
//!
//! The crate is organized leaves-first, the same order the design's
//! component table uses: identity primitives (C1), the document-frequency
//! builder (C2), the sketcher (C3), the LSH bander (C4), the index writer
//! (C5), and the two read paths, query (C6) and report (C7), on top of a
//! storage abstraction ([`store`]) that the index writer and both read
//! paths share.

pub mod band;
pub mod cancel;
pub mod docfreq;
pub mod error;
pub mod heed_codec;
pub mod ids;
pub mod index_writer;
pub mod query;
pub mod report;
pub mod sketch;
pub mod store;

pub use band::BandValue;
pub use cancel::CancellationToken;
pub use docfreq::{Feature, FeatureRecord, IndexedDocFreq, OrderedDocFreq};
pub use error::{Error, Result, SkipCounts};
pub use ids::{document_key, function_document_key, BlobId};
pub use index_writer::{index_corpus, write_document, DocumentToIndex};
pub use query::{query_document, QueryReport, SimilarHit, DEFAULT_SIMILARITY_FLOOR};
pub use report::{build_report, duplicate_clusters, similar_components, DuplicateCluster, Report, SimilarComponent};
pub use sketch::{
    sketch_bag, sketch_document, tf_idf_bag, ParamMatrices, ParamSource, ParamsBlob, Sketch, SketchConfig,
};
pub use store::{lmdb::LmdbStore, memory::MemoryStore, MetaRow, Store};
