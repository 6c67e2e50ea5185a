//! Document-Frequency Builder (C2).
//!
//! Builds the corpus-wide, immutable vocabulary and per-token document
//! frequency table that every downstream sketch is computed against. Once
//! built for a corpus, an [`OrderedDocFreq`] never changes — broadcasting a
//! read-only `Arc<OrderedDocFreq>` to every sketching worker is the whole
//! point (see §5 of the design: shared, read-only, loaded once per job).

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A single (token, weight) feature emitted by the external extractor for
/// one document. Equal tokens within a document are summed by the caller
/// before being handed to the sketcher (see [`crate::sketch`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feature {
    pub token: String,
    pub weight: u32,
}

/// One document's worth of extractor output: its key and its feature bag.
#[derive(Debug, Clone)]
pub struct FeatureRecord {
    pub document_key: String,
    pub features: Vec<Feature>,
}

/// Ordered vocabulary + per-token corpus document frequency.
///
/// `tokens` is kept in lexicographic order: the position of a token in
/// `tokens` is its stable integer index, used everywhere downstream (the
/// sketcher's parameter matrices are indexed by it). `df` is redundant with
/// `tokens` (its keys are the same set) but both are serialized explicitly
/// per §6, for reader stability of the JSON artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderedDocFreq {
    #[serde(rename = "docs")]
    pub docs: u64,
    #[serde(rename = "tokens")]
    pub tokens: Vec<String>,
    #[serde(rename = "df")]
    pub df: BTreeMap<String, u64>,
}

impl OrderedDocFreq {
    /// Build from a stream of per-document feature records. Duplicates
    /// within one document's feature list count once toward a token's
    /// document frequency, no matter how many times that token repeats.
    pub fn build<I>(records: I) -> Self
    where
        I: IntoIterator<Item = FeatureRecord>,
    {
        let mut df: BTreeMap<String, u64> = BTreeMap::new();
        let mut docs: u64 = 0;

        for record in records {
            docs += 1;
            let mut seen = std::collections::BTreeSet::new();
            for feature in &record.features {
                if seen.insert(feature.token.clone()) {
                    *df.entry(feature.token.clone()).or_insert(0) += 1;
                }
            }
        }

        let tokens = df.keys().cloned().collect();
        OrderedDocFreq { docs, tokens, df }
    }

    /// Stable integer position of `token` in the vocabulary, or `None` if
    /// the token was never observed in the corpus (query-time unknown
    /// tokens are silently dropped, per §4.3).
    pub fn position_of(&self, token: &str) -> Option<usize> {
        // `tokens` is sorted, so this could binary-search; linear scans are
        // avoided by building a lookup once the DocFreq is shared, see
        // `IndexedDocFreq`.
        self.tokens.binary_search(&token.to_string()).ok()
    }

    pub fn vocabulary_size(&self) -> usize {
        self.tokens.len()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    /// Wrap in the position-index lookup used by the sketcher.
    pub fn indexed(self) -> IndexedDocFreq {
        IndexedDocFreq::new(self)
    }
}

/// An [`OrderedDocFreq`] plus an `O(1)` token -> position lookup, shared
/// read-only across the worker pool for the lifetime of a job (the
/// "broadcast DocFreq" pattern described in §9).
pub struct IndexedDocFreq {
    pub inner: OrderedDocFreq,
    position: std::collections::HashMap<String, usize>,
}

impl IndexedDocFreq {
    pub fn new(inner: OrderedDocFreq) -> Self {
        let position = inner
            .tokens
            .iter()
            .enumerate()
            .map(|(i, t)| (t.clone(), i))
            .collect();
        IndexedDocFreq { inner, position }
    }

    pub fn position_of(&self, token: &str) -> Option<usize> {
        self.position.get(token).copied()
    }

    pub fn document_frequency(&self, token: &str) -> Option<u64> {
        self.inner.df.get(token).copied()
    }

    pub fn vocabulary_size(&self) -> usize {
        self.inner.vocabulary_size()
    }

    pub fn docs(&self) -> u64 {
        self.inner.docs
    }

    pub fn as_arc(self) -> Arc<IndexedDocFreq> {
        Arc::new(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feat(token: &str, weight: u32) -> Feature {
        Feature { token: token.to_string(), weight }
    }

    #[test]
    fn document_frequency_counts_distinct_documents() {
        let records = vec![
            FeatureRecord {
                document_key: "a".into(),
                features: vec![feat("foo", 3), feat("bar", 1), feat("foo", 2)],
            },
            FeatureRecord { document_key: "b".into(), features: vec![feat("foo", 1)] },
            FeatureRecord { document_key: "c".into(), features: vec![feat("baz", 1)] },
        ];

        let df = OrderedDocFreq::build(records);
        assert_eq!(df.docs, 3);
        assert_eq!(df.df["foo"], 2);
        assert_eq!(df.df["bar"], 1);
        assert_eq!(df.df["baz"], 1);
        assert_eq!(df.tokens, vec!["bar".to_string(), "baz".to_string(), "foo".to_string()]);
    }

    #[test]
    fn build_is_deterministic() {
        let make = || {
            vec![
                FeatureRecord { document_key: "a".into(), features: vec![feat("z", 1), feat("a", 1)] },
                FeatureRecord { document_key: "b".into(), features: vec![feat("m", 1)] },
            ]
        };
        let df1 = OrderedDocFreq::build(make());
        let df2 = OrderedDocFreq::build(make());
        assert_eq!(df1.to_json().unwrap(), df2.to_json().unwrap());
    }

    #[test]
    fn json_round_trip_has_documented_shape() {
        let records = vec![FeatureRecord { document_key: "a".into(), features: vec![feat("x", 1)] }];
        let df = OrderedDocFreq::build(records);
        let json: serde_json::Value = serde_json::from_str(&df.to_json().unwrap()).unwrap();
        assert!(json.get("docs").is_some());
        assert!(json.get("tokens").is_some());
        assert!(json.get("df").is_some());
    }
}
