//! Weighted MinHash sketcher (C3) — the heart of the system.
//!
//! Computes the TF-IDF bag for a document against a broadcast [`IndexedDocFreq`]
//! and runs Ioffe's weighted MinHash over it to produce a fixed-length
//! [`Sketch`] of `K = B * R` `(position, tag)` pairs. Two documents' sketches
//! agree at row `k` with probability equal to their generalized weighted
//! Jaccard similarity.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use once_cell::sync::Lazy;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Gamma, Uniform};
use serde::{Deserialize, Serialize};

use crate::docfreq::IndexedDocFreq;
use crate::error::{Error, Result};

/// Generated once with this seed and reloaded verbatim for the lifetime of
/// an index; re-seeding invalidates the whole index (§9 of the design).
pub const DEFAULT_SEED: u64 = 0x6d696c6c_69736b65;

/// `K`, `B`, `R` for one index. `K` must equal `B * R`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SketchConfig {
    pub k: usize,
    pub b: usize,
    pub r: usize,
    /// Resident-set ceiling, in bytes, for the parameter matrices held by a
    /// single worker (§5 "Memory"). Only consulted by [`ChunkedParams`]; the
    /// in-memory [`ParamMatrices`] always materializes the full matrix and
    /// is meant for vocabularies that comfortably fit.
    pub memory_ceiling_bytes: usize,
}

impl SketchConfig {
    pub fn new(b: usize, r: usize) -> Self {
        SketchConfig { k: b * r, b, r, memory_ceiling_bytes: 512 * 1024 * 1024 }
    }

    pub fn default_32x4() -> Self {
        Self::new(32, 4)
    }

    pub fn with_memory_ceiling(mut self, bytes: usize) -> Self {
        self.memory_ceiling_bytes = bytes;
        self
    }

    /// Number of vocabulary rows that fit a single chunk under the
    /// configured memory ceiling (three `f64` columns per row per hash).
    pub fn chunk_rows(&self) -> usize {
        let per_row = self.k * 3 * std::mem::size_of::<f64>();
        (self.memory_ceiling_bytes / per_row.max(1)).max(1)
    }
}

/// One `(r, c, beta)` triple for a given `(token position, hash row)` pair.
type ParamRow = (f64, f64, f64);

/// Read-only access to the `r, c, beta` parameter matrices, shape
/// `vocab_size x k`. Implementations may materialize the whole matrix
/// ([`ParamMatrices`]) or keep only a bounded window resident
/// ([`ChunkedParams`]).
pub trait ParamSource: Send + Sync {
    fn vocab_size(&self) -> usize;
    fn k(&self) -> usize;
    fn get(&self, position: usize, hash_row: usize) -> ParamRow;
}

/// Deterministically derive the three draws for row `i`, hash `k`, from a
/// global seed. Each row is independently reseedable: `row_seed(seed, i)`
/// feeds a fresh `ChaCha8Rng` that then draws `k` triples in order
/// `(r_0, c_0, beta_0, r_1, c_1, beta_1, ...)`. This is what lets
/// [`ChunkedParams`] regenerate (or lazily load) any row without ever
/// materializing rows it hasn't been asked for.
fn row_seed(seed: u64, position: usize) -> u64 {
    // SplitMix64-style mixing, enough to decorrelate adjacent rows.
    let mut z = seed ^ (position as u64).wrapping_mul(0x9E3779B97F4A7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

/// `Gamma(2, 1)` is shared process-wide: every row draws from the same
/// distribution object, constructed once rather than once per row.
static GAMMA_2_1: Lazy<Gamma<f64>> = Lazy::new(|| Gamma::new(2.0, 1.0).expect("gamma(2,1) parameters are always valid"));

fn generate_row(seed: u64, position: usize, k: usize) -> Vec<ParamRow> {
    let mut rng = ChaCha8Rng::seed_from_u64(row_seed(seed, position));
    let uniform = Uniform::new(0.0_f64, 1.0);
    (0..k)
        .map(|_| {
            let r = GAMMA_2_1.sample(&mut rng);
            let c = GAMMA_2_1.sample(&mut rng);
            let beta = uniform.sample(&mut rng);
            (r, c, beta)
        })
        .collect()
}

/// Fully in-memory parameter matrices, row-major `vocab_size x k`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamMatrices {
    vocab_size: usize,
    k: usize,
    seed: u64,
    // Flattened row-major; row i occupies [i*k, (i+1)*k).
    r: Vec<f64>,
    c: Vec<f64>,
    beta: Vec<f64>,
}

impl ParamMatrices {
    /// Generate once, deterministically, for `(seed, vocab_size, k)`.
    pub fn generate(seed: u64, vocab_size: usize, k: usize) -> Self {
        let mut r = Vec::with_capacity(vocab_size * k);
        let mut c = Vec::with_capacity(vocab_size * k);
        let mut beta = Vec::with_capacity(vocab_size * k);
        for i in 0..vocab_size {
            for (ri, ci, bi) in generate_row(seed, i, k) {
                r.push(ri);
                c.push(ci);
                beta.push(bi);
            }
        }
        ParamMatrices { vocab_size, k, seed, r, c, beta }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn to_bincode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bincode(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes = self.to_bincode()?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_bincode(&bytes)
    }
}

impl ParamSource for ParamMatrices {
    fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    fn k(&self) -> usize {
        self.k
    }

    fn get(&self, position: usize, hash_row: usize) -> ParamRow {
        let idx = position * self.k + hash_row;
        (self.r[idx], self.c[idx], self.beta[idx])
    }
}

/// What got persisted for one index's parameters: the full matrix when it
/// fits the configured memory ceiling, or just enough to regenerate
/// [`ChunkedParams`] on demand otherwise (§5 "Memory"). Picking between the
/// two is the production counterpart of the `ChunkedParams` unit tests:
/// callers must not unconditionally materialize the full matrix for a
/// vocabulary that doesn't fit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ParamsBlob {
    Full(ParamMatrices),
    Chunked { seed: u64, vocab_size: usize, k: usize },
}

impl ParamsBlob {
    /// Generate parameters for `(seed, vocab_size, k)`, choosing `Full` when
    /// the whole `vocab_size x k` matrix fits under `memory_ceiling_bytes`
    /// and `Chunked` otherwise.
    pub fn generate(seed: u64, vocab_size: usize, k: usize, memory_ceiling_bytes: usize) -> Self {
        let full_matrix_bytes = vocab_size * k * 3 * std::mem::size_of::<f64>();
        if full_matrix_bytes <= memory_ceiling_bytes {
            ParamsBlob::Full(ParamMatrices::generate(seed, vocab_size, k))
        } else {
            ParamsBlob::Chunked { seed, vocab_size, k }
        }
    }

    pub fn to_bincode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bincode(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }

    /// Instantiate the concrete [`ParamSource`] this blob describes, boxed
    /// since `Full` and `Chunked` are different concrete types.
    pub fn into_source(self, memory_ceiling_bytes: usize) -> Box<dyn ParamSource> {
        match self {
            ParamsBlob::Full(matrices) => Box::new(matrices),
            ParamsBlob::Chunked { seed, vocab_size, k } => {
                Box::new(ChunkedParams::new(seed, vocab_size, k, memory_ceiling_bytes))
            }
        }
    }
}

/// A bounded-memory [`ParamSource`] that regenerates rows on demand from
/// the shared seed and caches only the most recently touched rows, so that
/// resident memory never exceeds roughly `memory_ceiling_bytes` regardless
/// of vocabulary size (§5 "Memory": "An implementation must chunk the
/// matrices so per-worker resident set stays within a configured ceiling").
pub struct ChunkedParams {
    vocab_size: usize,
    k: usize,
    seed: u64,
    max_rows_cached: usize,
    cache: Mutex<HashMap<usize, Vec<ParamRow>>>,
}

impl ChunkedParams {
    pub fn new(seed: u64, vocab_size: usize, k: usize, memory_ceiling_bytes: usize) -> Self {
        let per_row = k * 3 * std::mem::size_of::<f64>();
        let max_rows_cached = (memory_ceiling_bytes / per_row.max(1)).max(1);
        ChunkedParams {
            vocab_size,
            k,
            seed,
            max_rows_cached,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn cached_rows(&self) -> usize {
        self.cache.lock().unwrap().len()
    }
}

impl ParamSource for ChunkedParams {
    fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    fn k(&self) -> usize {
        self.k
    }

    fn get(&self, position: usize, hash_row: usize) -> ParamRow {
        let mut cache = self.cache.lock().unwrap();
        if cache.len() >= self.max_rows_cached && !cache.contains_key(&position) {
            // Evict an arbitrary row; a document's support set is visited
            // once per sketch pass so a strict LRU buys little here.
            if let Some(&evict) = cache.keys().next() {
                cache.remove(&evict);
            }
        }
        let row = cache
            .entry(position)
            .or_insert_with(|| generate_row(self.seed, position, self.k));
        row[hash_row]
    }
}

/// One MinHash row: the winning token position and its quantized tag.
pub type SketchRow = (u32, i64);

/// Fixed-length sketch of `K` rows. The sentinel `(0, 0)` at every row
/// marks an empty bag (§4.3 "Failure modes"); the index rejects such a
/// sketch (no band rows are written for it, see [`crate::store`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sketch(pub Vec<SketchRow>);

impl Sketch {
    pub fn is_sentinel(&self) -> bool {
        self.0.iter().all(|&(i, t)| i == 0 && t == 0)
    }

    /// Fraction of rows that agree between two sketches: an unbiased
    /// estimator of their generalized Jaccard similarity (§8, property 3).
    pub fn agreement(&self, other: &Sketch) -> f64 {
        if self.0.is_empty() || self.0.len() != other.0.len() {
            return 0.0;
        }
        let matches = self.0.iter().zip(other.0.iter()).filter(|(a, b)| a == b).count();
        matches as f64 / self.0.len() as f64
    }

    /// Canonical byte serialization of the whole sketch: each row as a
    /// big-endian `u32` (position) followed by a big-endian `i64` (tag).
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.0.len() * 12);
        for &(pos, tag) in &self.0 {
            out.write_u32::<BigEndian>(pos).expect("writing to a Vec<u8> never fails");
            out.write_i64::<BigEndian>(tag).expect("writing to a Vec<u8> never fails");
        }
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Sketch> {
        if bytes.len() % 12 != 0 {
            return None;
        }
        let rows = bytes
            .chunks_exact(12)
            .map(|mut chunk| {
                let pos = chunk.read_u32::<BigEndian>().unwrap();
                let tag = chunk.read_i64::<BigEndian>().unwrap();
                (pos, tag)
            })
            .collect();
        Some(Sketch(rows))
    }
}

/// A document's TF-IDF weighted bag, sparse over vocabulary positions.
/// Tokens absent from the vocabulary, or whose computed weight is `<= 0`,
/// are dropped (§4.3).
pub fn tf_idf_bag(docfreq: &IndexedDocFreq, term_frequencies: &HashMap<String, u32>) -> Vec<(usize, f64)> {
    let n = docfreq.docs() as f64;
    let mut bag = Vec::with_capacity(term_frequencies.len());
    for (token, &tf) in term_frequencies {
        let position = match docfreq.position_of(token) {
            Some(p) => p,
            None => continue,
        };
        let df = match docfreq.document_frequency(token) {
            Some(df) if df > 0 => df as f64,
            _ => continue,
        };
        let weight = (1.0 + tf as f64).ln() * (n / df).ln();
        if weight > 0.0 {
            bag.push((position, weight));
        }
    }
    bag
}

/// Ioffe weighted MinHash over a sparse bag, producing `K` `(position, tag)`
/// pairs. An empty bag yields the sentinel sketch (§4.3 "Failure modes").
pub fn sketch_bag(params: &dyn ParamSource, bag: &[(usize, f64)]) -> Sketch {
    let k = params.k();
    if bag.is_empty() {
        return Sketch(vec![(0, 0); k]);
    }

    let mut rows = Vec::with_capacity(k);
    for hash_row in 0..k {
        let mut best_a = f64::INFINITY;
        let mut best_i: u32 = 0;
        let mut best_t: i64 = 0;

        for &(position, weight) in bag {
            let (r, c, beta) = params.get(position, hash_row);
            let t = (weight.ln() / r + beta).floor();
            let y = (r * (t - beta)).exp();
            let z = y * r.exp();
            let a = c / z;

            if a < best_a || (a == best_a && (position as u32) < best_i) {
                best_a = a;
                best_i = position as u32;
                best_t = t as i64;
            }
        }

        rows.push((best_i, best_t));
    }

    Sketch(rows)
}

/// Compute a document's sketch end to end: TF-IDF then weighted MinHash.
/// Returns `Err(SketchEmpty)` when every feature token is out of
/// vocabulary or produces a non-positive weight.
pub fn sketch_document(
    params: &dyn ParamSource,
    docfreq: &IndexedDocFreq,
    term_frequencies: &HashMap<String, u32>,
) -> Result<Sketch> {
    let bag = tf_idf_bag(docfreq, term_frequencies);
    if bag.is_empty() {
        return Err(Error::SketchEmpty);
    }
    Ok(sketch_bag(params, &bag))
}
