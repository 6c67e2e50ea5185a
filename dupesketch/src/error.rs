use std::collections::BTreeMap;

use thiserror::Error;

/// Errors produced by the engine.
///
/// Per-document errors (`ExtractorSkipped`, `SketchEmpty`, an individual
/// `InputUnreadable`) are meant to be accumulated by the caller into a
/// [`SkipCounts`] rather than aborting a batch job; infrastructure errors
/// (`ExtractorUnavailable`, `StoreUnavailable`, `IndexNotBuilt`) are fatal.
#[derive(Debug, Error)]
pub enum Error {
    #[error("could not read input: {0}")]
    InputUnreadable(String),

    #[error("feature extractor is unavailable: {0}")]
    ExtractorUnavailable(String),

    #[error("extractor skipped document: {0}")]
    ExtractorSkipped(String),

    #[error("no document-frequency index has been built for this store; run `hash` first")]
    IndexNotBuilt,

    #[error("store is unavailable: {0}")]
    StoreUnavailable(String),

    #[error("store write conflict on key {0}")]
    StoreConflict(String),

    #[error("document produced no in-vocabulary features; sketch is empty")]
    SketchEmpty,

    #[error("job was cancelled")]
    Cancelled,

    #[error(transparent)]
    Heed(#[from] heed::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Bincode(#[from] Box<bincode::ErrorKind>),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Counted map of per-document skip reasons, merged across worker shards.
///
/// The key is a short reason string (e.g. the `Error` variant name), the
/// value is the number of documents that hit it. Printed by the `hash`
/// verb on exit; never aborts a job on its own.
#[derive(Debug, Default, Clone)]
pub struct SkipCounts(BTreeMap<String, u64>);

impl SkipCounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, reason: impl Into<String>) {
        *self.0.entry(reason.into()).or_insert(0) += 1;
    }

    pub fn merge(&mut self, other: &SkipCounts) {
        for (reason, count) in &other.0 {
            *self.0.entry(reason.clone()).or_insert(0) += count;
        }
    }

    pub fn total(&self) -> u64 {
        self.0.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
