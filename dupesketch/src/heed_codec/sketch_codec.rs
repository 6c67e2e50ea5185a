use std::borrow::Cow;

use heed::{BytesDecode, BytesEncode};

use crate::sketch::Sketch;

/// Encodes a [`Sketch`] directly as its canonical `K * 12`-byte
/// representation, the same bytes used by the LSH bander to hash bands —
/// no intermediate allocation beyond the `Vec<u8>` LMDB needs to store.
pub struct SketchCodec;

impl BytesEncode<'_> for SketchCodec {
    type EItem = Sketch;

    fn bytes_encode(item: &Self::EItem) -> Option<Cow<[u8]>> {
        Some(Cow::Owned(item.to_bytes()))
    }
}

impl<'a> BytesDecode<'a> for SketchCodec {
    type DItem = Sketch;

    fn bytes_decode(bytes: &'a [u8]) -> Option<Self::DItem> {
        Sketch::from_bytes(bytes)
    }
}

unsafe impl Send for SketchCodec {}
unsafe impl Sync for SketchCodec {}
