//! End-to-end scenarios S1-S6 (§8), exercised against a [`MemoryStore`]
//! through the public `dupesketch` API exactly as a real caller would drive
//! it: build DocFreq, generate parameters, index a corpus, then query or
//! report.

use std::collections::HashMap;
use std::sync::Mutex;

use dupesketch::{
    build_report, document_key, index_corpus, query_document, BlobId, CancellationToken,
    DocumentToIndex, Error, Feature, FeatureRecord, MemoryStore, OrderedDocFreq, ParamMatrices,
    SketchConfig, SkipCounts, DEFAULT_SIMILARITY_FLOOR,
};

fn tf(pairs: &[(&str, u32)]) -> HashMap<String, u32> {
    pairs.iter().map(|(t, w)| (t.to_string(), *w)).collect()
}

fn feature_record(key: &str, pairs: &[(&str, u32)]) -> FeatureRecord {
    FeatureRecord {
        document_key: key.to_string(),
        features: pairs.iter().map(|(t, w)| Feature { token: t.to_string(), weight: *w }).collect(),
    }
}

struct Corpus {
    store: MemoryStore,
    docfreq: dupesketch::IndexedDocFreq,
    params: ParamMatrices,
    config: SketchConfig,
}

fn build_and_index(records: Vec<FeatureRecord>, documents: Vec<DocumentToIndex>) -> Corpus {
    let config = SketchConfig::new(16, 4);
    let ordered = OrderedDocFreq::build(records);
    let params = ParamMatrices::generate(dupesketch::sketch::DEFAULT_SEED, ordered.vocabulary_size(), config.k);
    let store = MemoryStore::new();
    store.put_docfreq(&ordered).unwrap();

    let docfreq = ordered.indexed();
    let cancellation = CancellationToken::new();
    index_corpus(&store, &params, &docfreq, &config, &documents, &cancellation).unwrap();

    Corpus { store, docfreq, params, config }
}

fn doc(repo: &str, path: &str, bytes: &[u8], features: &[(&str, u32)]) -> DocumentToIndex {
    let blob_id = BlobId::of_bytes(bytes);
    DocumentToIndex {
        document_key: document_key(repo, path, &blob_id),
        blob_id,
        repo: repo.to_string(),
        commit: "c1".to_string(),
        path: path.to_string(),
        term_frequencies: tf(features),
    }
}

/// S1 — exact-duplicate file: same bytes in two repos, query returns both
/// as duplicates and nothing as similar.
#[test]
fn s1_exact_duplicate_file() {
    let bytes = b"hello\nworld\n";
    let records =
        vec![feature_record("a", &[("hello", 1), ("world", 1)]), feature_record("b", &[("hello", 1), ("world", 1)])];
    let documents = vec![
        doc("R1", "p1", bytes, &[("hello", 1), ("world", 1)]),
        doc("R2", "p2", bytes, &[("hello", 1), ("world", 1)]),
    ];
    let corpus = build_and_index(records, documents);

    let report = query_document(
        &corpus.store,
        &corpus.params,
        &corpus.docfreq,
        &corpus.config,
        bytes,
        &tf(&[("hello", 1), ("world", 1)]),
        DEFAULT_SIMILARITY_FLOOR,
    )
    .unwrap();

    assert_eq!(report.exact_duplicates.len(), 2);
    let paths: Vec<&str> = report.exact_duplicates.iter().map(|m| m.path.as_str()).collect();
    assert!(paths.contains(&"p1"));
    assert!(paths.contains(&"p2"));
    assert!(report.similar.is_empty());
}

/// S2 — near-duplicate file: a copy with extra comment lines has no exact
/// duplicate but shows up as similar, above the floor.
#[test]
fn s2_near_duplicate_file() {
    let original = b"fn add(a: i32, b: i32) -> i32 { a + b }";
    let modified = b"fn add(a: i32, b: i32) -> i32 { a + b } // comment one // comment two // comment three";

    let shared_features: &[(&str, u32)] = &[("fn", 3), ("add", 3), ("a", 6), ("b", 6), ("i32", 6)];
    let records = vec![feature_record("orig", shared_features), feature_record("copy", shared_features)];
    let documents =
        vec![doc("R1", "orig.rs", original, shared_features), doc("R1", "copy.rs", modified, shared_features)];
    let corpus = build_and_index(records, documents);

    let report = query_document(
        &corpus.store,
        &corpus.params,
        &corpus.docfreq,
        &corpus.config,
        modified,
        &tf(shared_features),
        DEFAULT_SIMILARITY_FLOOR,
    )
    .unwrap();

    assert!(report.exact_duplicates.is_empty());
    assert!(!report.similar.is_empty());
    assert!(report.similar.iter().any(|hit| hit.meta.path == "orig.rs" && hit.estimated_similarity >= 0.5));
}

/// S3 — unrelated files: a C-style source file and an English README share
/// no features; cross-query returns nothing.
#[test]
fn s3_unrelated_files() {
    let c_file = b"int main() { return 0; }";
    let readme = b"This project explains how to install and configure the tool.";

    let records =
        vec![feature_record("c", &[("int", 1), ("main", 1), ("return", 1)]), feature_record("readme", &[("this", 1), ("project", 1), ("install", 1)])];
    let documents = vec![
        doc("R1", "main.c", c_file, &[("int", 1), ("main", 1), ("return", 1)]),
        doc("R1", "README.md", readme, &[("this", 1), ("project", 1), ("install", 1)]),
    ];
    let corpus = build_and_index(records, documents);

    let report = query_document(
        &corpus.store,
        &corpus.params,
        &corpus.docfreq,
        &corpus.config,
        readme,
        &tf(&[("this", 1), ("project", 1), ("install", 1)]),
        DEFAULT_SIMILARITY_FLOOR,
    )
    .unwrap();

    assert!(report.exact_duplicates.is_empty());
    assert!(report.similar.is_empty());
}

/// S4 — two-repo mirror: one byte-for-byte shared file and one
/// near-duplicate pair (function rename) across repos. Expect exactly one
/// duplicate cluster of size 2 and one similar component of size 2.
#[test]
fn s4_report_on_two_repo_mirror() {
    let shared_bytes = b"shared file content, byte for byte";
    let near_a = b"fn process_item(x: i32) -> i32 { x * 2 }";
    let near_b = b"fn handle_item(x: i32) -> i32 { x * 2 }";

    let shared_features: &[(&str, u32)] = &[("shared", 2), ("file", 1), ("content", 1)];
    let near_features: &[(&str, u32)] = &[("fn", 2), ("item", 4), ("x", 6), ("i32", 4)];

    let records = vec![
        feature_record("shared1", shared_features),
        feature_record("shared2", shared_features),
        feature_record("near1", near_features),
        feature_record("near2", near_features),
    ];
    let documents = vec![
        doc("R1", "shared.txt", shared_bytes, shared_features),
        doc("R2", "shared.txt", shared_bytes, shared_features),
        doc("R1", "process.rs", near_a, near_features),
        doc("R2", "handle.rs", near_b, near_features),
    ];
    let corpus = build_and_index(records, documents);

    let report = build_report(&corpus.store, Some(0.5), dupesketch::report::DEFAULT_MAX_BUCKET_MEMBERS).unwrap();

    assert_eq!(report.duplicates.len(), 1);
    assert_eq!(report.duplicates[0].members.len(), 2);
    assert_eq!(report.similar.len(), 1);
    assert_eq!(report.similar[0].members.len(), 2);
}

/// S5 — empty features: a file the extractor returns no features for
/// yields only exact duplicates on query, never similar hits or an error.
#[test]
fn s5_empty_features_yields_only_exact_duplicates() {
    let bytes = b"\x00\x01binary-ish but not flagged by this stand-in";
    let records = vec![feature_record("a", &[("token", 1)])];
    let unrelated_bytes = b"some other file";
    let documents = vec![
        doc("R1", "p1", unrelated_bytes, &[("token", 1)]),
        DocumentToIndex {
            document_key: document_key("R1", "empty.bin", &BlobId::of_bytes(bytes)),
            blob_id: BlobId::of_bytes(bytes),
            repo: "R1".into(),
            commit: "c1".into(),
            path: "empty.bin".into(),
            term_frequencies: HashMap::new(),
        },
        DocumentToIndex {
            document_key: document_key("R2", "empty-copy.bin", &BlobId::of_bytes(bytes)),
            blob_id: BlobId::of_bytes(bytes),
            repo: "R2".into(),
            commit: "c1".into(),
            path: "empty-copy.bin".into(),
            term_frequencies: HashMap::new(),
        },
    ];
    let corpus = build_and_index(records, documents);

    let report = query_document(
        &corpus.store,
        &corpus.params,
        &corpus.docfreq,
        &corpus.config,
        bytes,
        &HashMap::new(),
        DEFAULT_SIMILARITY_FLOOR,
    )
    .unwrap();

    assert_eq!(report.exact_duplicates.len(), 2);
    assert!(report.similar.is_empty());
}

/// S6 — query before hash: a store with no DocFreq fails with
/// `IndexNotBuilt`.
#[test]
fn s6_query_before_hash_fails() {
    let store = MemoryStore::new();
    let empty_docfreq = OrderedDocFreq::build(Vec::new()).indexed();
    let params = ParamMatrices::generate(dupesketch::sketch::DEFAULT_SEED, 0, 8);
    let config = SketchConfig::new(4, 2);

    let result =
        query_document(&store, &params, &empty_docfreq, &config, b"anything", &HashMap::new(), 0.5);
    assert!(matches!(result, Err(Error::IndexNotBuilt)));
}

/// Sanity check that a whole-corpus indexing pass surfaces skip counts
/// without treating them as fatal (§7).
#[test]
fn indexing_accumulates_skip_counts_without_failing() {
    let records = vec![feature_record("a", &[("known", 1)])];
    let documents = vec![
        doc("R1", "p1", b"known content", &[("known", 1)]),
        DocumentToIndex {
            document_key: "R1//p2@deadbeef".into(),
            blob_id: BlobId::of_bytes(b"unrelated"),
            repo: "R1".into(),
            commit: "c1".into(),
            path: "p2".into(),
            term_frequencies: tf(&[("never-seen-token", 5)]),
        },
    ];

    let config = SketchConfig::new(4, 2);
    let ordered = OrderedDocFreq::build(records);
    let params = ParamMatrices::generate(dupesketch::sketch::DEFAULT_SEED, ordered.vocabulary_size(), config.k);
    let store = MemoryStore::new();
    let docfreq = ordered.indexed();
    let cancellation = CancellationToken::new();

    let skips = index_corpus(&store, &params, &docfreq, &config, &documents, &cancellation).unwrap();
    assert_eq!(skips.total(), 1);
    let _: SkipCounts = skips;
}
