//! LSH Bander (C4).
//!
//! Splits a sketch's `K` rows into `B` contiguous bands of `R` rows each and
//! collapses each band to a single opaque [`BandValue`] so "is this pair
//! similar" becomes an equality lookup. Parameters are tuned so the
//! probability that two documents agree on at least one band is
//! approximately `1 - (1 - J^R)^B`, which is why the default `B = 32, R = 4`
//! targets a similarity floor around 0.5 (see §4.4).

use byteorder::{BigEndian, WriteBytesExt};

use crate::ids::{digest_bytes, hex_encode};
use crate::sketch::{Sketch, SketchConfig};

/// SHA1 digest of one band's serialized sketch rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BandValue([u8; 20]);

impl BandValue {
    pub fn to_hex(&self) -> String {
        hex_encode(&self.0)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl std::fmt::Display for BandValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Serialize one band's `R` sketch rows as `R * (4 + 8)` canonical
/// big-endian bytes and hash them to a [`BandValue`].
fn hash_band(rows: &[(u32, i64)]) -> BandValue {
    let mut buf = Vec::with_capacity(rows.len() * 12);
    for &(position, tag) in rows {
        buf.write_u32::<BigEndian>(position).expect("writing to a Vec<u8> never fails");
        buf.write_i64::<BigEndian>(tag).expect("writing to a Vec<u8> never fails");
    }
    BandValue(digest_bytes(&buf))
}

/// Compute the `B` band-values for a sketch. Returns an empty vector for a
/// sentinel (empty-bag) sketch: such a document gets no band rows written,
/// per §4.3 "Failure modes".
pub fn band_sketch(sketch: &Sketch, config: &SketchConfig) -> Vec<BandValue> {
    if sketch.is_sentinel() {
        return Vec::new();
    }
    debug_assert_eq!(sketch.0.len(), config.k, "sketch length must equal K = B * R");

    (0..config.b)
        .map(|band_index| {
            let start = band_index * config.r;
            let end = start + config.r;
            hash_band(&sketch.0[start..end])
        })
        .collect()
}
