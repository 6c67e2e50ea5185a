//! Custom `heed` codecs, modeled on the teacher's own `src/heed_codec/`
//! (`ByteSlice`, `CboRoaringBitmapCodec`): small, allocation-conscious
//! `BytesEncode`/`BytesDecode` pairs for types LMDB has no native mapping
//! for.

mod sketch_codec;

pub use sketch_codec::SketchCodec;
