//! LMDB-backed [`Store`], the production implementation — the same
//! `heed` stack, `PolyDatabase`-for-misc / fixed-named-`Database`-per-table
//! layout, and get/put-by-string-key style as the teacher's own `Index`
//! (`src/index.rs`). Every logical table in §4.5 is one named LMDB database;
//! `hashtables` multiplexes its `(band-index, band-value)` composite key
//! into a single string the way the teacher composes tuple keys with
//! codecs like `StrStrU8Codec`.

use std::collections::BTreeMap;
use std::path::Path;

use heed::types::{ByteSlice, SerdeJson, Str};
use heed::{Database, EnvOpenOptions, PolyDatabase};

use crate::docfreq::OrderedDocFreq;
use crate::error::Result;
use crate::heed_codec::SketchCodec;
use crate::sketch::{Sketch, SketchConfig};
use crate::store::{BandKey, MetaRow, Store};

const DOCFREQ_KEY: &str = "docfreq";
const SKETCH_CONFIG_KEY: &str = "sketch-config";
const PARAMS_KEY: &str = "params";

fn band_key(band_index: usize, band_value_hex: &str) -> String {
    format!("{}:{}", band_index, band_value_hex)
}

pub struct LmdbStore {
    env: heed::Env,
    main: PolyDatabase,
    meta: Database<Str, SerdeJson<MetaRow>>,
    blob_index: Database<Str, SerdeJson<Vec<String>>>,
    hashes: Database<Str, SketchCodec>,
    hashtables: Database<Str, SerdeJson<Vec<String>>>,
    features: Database<Str, SerdeJson<BTreeMap<String, u32>>>,
}

impl LmdbStore {
    /// Open (creating if missing) the LMDB environment at `path`, sized to
    /// `map_size_bytes`. Mirrors the teacher's `search`/`cli` binaries:
    /// `EnvOpenOptions::new().map_size(..)`, a fixed `max_dbs`.
    pub fn open<P: AsRef<Path>>(path: P, map_size_bytes: usize) -> Result<LmdbStore> {
        std::fs::create_dir_all(&path)?;

        let mut options = EnvOpenOptions::new();
        options.map_size(map_size_bytes);
        options.max_dbs(6);

        let env = options.open(path)?;
        let main = env.create_poly_database(Some("main"))?;
        let meta = env.create_database(Some("meta"))?;
        let blob_index = env.create_database(Some("blob-index"))?;
        let hashes = env.create_database(Some("hashes"))?;
        let hashtables = env.create_database(Some("hashtables"))?;
        let features = env.create_database(Some("features"))?;

        Ok(LmdbStore { env, main, meta, blob_index, hashes, hashtables, features })
    }

    pub fn path(&self) -> &Path {
        self.env.path()
    }
}

impl Store for LmdbStore {
    fn put_docfreq(&self, docfreq: &OrderedDocFreq) -> Result<()> {
        let mut wtxn = self.env.write_txn()?;
        self.main.put::<_, Str, SerdeJson<OrderedDocFreq>>(&mut wtxn, DOCFREQ_KEY, docfreq)?;
        wtxn.commit()?;
        Ok(())
    }

    fn get_docfreq(&self) -> Result<Option<OrderedDocFreq>> {
        let rtxn = self.env.read_txn()?;
        Ok(self.main.get::<_, Str, SerdeJson<OrderedDocFreq>>(&rtxn, DOCFREQ_KEY)?)
    }

    fn put_params(&self, config: SketchConfig, matrices_bytes: &[u8]) -> Result<()> {
        let mut wtxn = self.env.write_txn()?;
        self.main.put::<_, Str, SerdeJson<SketchConfig>>(&mut wtxn, SKETCH_CONFIG_KEY, &config)?;
        self.main.put::<_, Str, ByteSlice>(&mut wtxn, PARAMS_KEY, matrices_bytes)?;
        wtxn.commit()?;
        Ok(())
    }

    fn get_params(&self) -> Result<Option<(SketchConfig, Vec<u8>)>> {
        let rtxn = self.env.read_txn()?;
        let config = self.main.get::<_, Str, SerdeJson<SketchConfig>>(&rtxn, SKETCH_CONFIG_KEY)?;
        let bytes = self.main.get::<_, Str, ByteSlice>(&rtxn, PARAMS_KEY)?;
        Ok(match (config, bytes) {
            (Some(config), Some(bytes)) => Some((config, bytes.to_vec())),
            _ => None,
        })
    }

    fn put_meta(&self, document_key: &str, row: &MetaRow) -> Result<()> {
        let mut wtxn = self.env.write_txn()?;
        self.meta.put(&mut wtxn, document_key, row)?;
        wtxn.commit()?;
        Ok(())
    }

    fn get_meta(&self, document_key: &str) -> Result<Option<MetaRow>> {
        let rtxn = self.env.read_txn()?;
        Ok(self.meta.get(&rtxn, document_key)?)
    }

    fn scan_meta(&self) -> Result<Vec<(String, MetaRow)>> {
        let rtxn = self.env.read_txn()?;
        let mut out = Vec::new();
        for entry in self.meta.iter(&rtxn)? {
            let (key, row) = entry?;
            out.push((key.to_string(), row));
        }
        Ok(out)
    }

    fn add_blob_key(&self, blob_id_hex: &str, document_key: &str) -> Result<()> {
        let mut wtxn = self.env.write_txn()?;
        let mut keys = self.blob_index.get(&wtxn, blob_id_hex)?.unwrap_or_default();
        if !keys.iter().any(|k| k == document_key) {
            keys.push(document_key.to_string());
        }
        self.blob_index.put(&mut wtxn, blob_id_hex, &keys)?;
        wtxn.commit()?;
        Ok(())
    }

    fn get_blob_keys(&self, blob_id_hex: &str) -> Result<Vec<String>> {
        let rtxn = self.env.read_txn()?;
        Ok(self.blob_index.get(&rtxn, blob_id_hex)?.unwrap_or_default())
    }

    fn put_sketch(&self, blob_id_hex: &str, sketch_bytes: &[u8]) -> Result<()> {
        let sketch = Sketch::from_bytes(sketch_bytes)
            .ok_or_else(|| crate::error::Error::StoreConflict(format!("malformed sketch bytes for {}", blob_id_hex)))?;
        let mut wtxn = self.env.write_txn()?;
        self.hashes.put(&mut wtxn, blob_id_hex, &sketch)?;
        wtxn.commit()?;
        Ok(())
    }

    fn get_sketch(&self, blob_id_hex: &str) -> Result<Option<Vec<u8>>> {
        let rtxn = self.env.read_txn()?;
        Ok(self.hashes.get(&rtxn, blob_id_hex)?.map(|s| s.to_bytes()))
    }

    fn scan_sketches(&self) -> Result<Vec<(String, Vec<u8>)>> {
        let rtxn = self.env.read_txn()?;
        let mut out = Vec::new();
        for entry in self.hashes.iter(&rtxn)? {
            let (key, sketch) = entry?;
            out.push((key.to_string(), sketch.to_bytes()));
        }
        Ok(out)
    }

    fn add_band_member(&self, band_index: usize, band_value_hex: &str, blob_id_hex: &str) -> Result<()> {
        let key = band_key(band_index, band_value_hex);
        let mut wtxn = self.env.write_txn()?;
        let mut members = self.hashtables.get(&wtxn, &key)?.unwrap_or_default();
        if !members.iter().any(|m| m == blob_id_hex) {
            members.push(blob_id_hex.to_string());
        }
        self.hashtables.put(&mut wtxn, &key, &members)?;
        wtxn.commit()?;
        Ok(())
    }

    fn get_band_members(&self, band_index: usize, band_value_hex: &str) -> Result<Vec<String>> {
        let key = band_key(band_index, band_value_hex);
        let rtxn = self.env.read_txn()?;
        Ok(self.hashtables.get(&rtxn, &key)?.unwrap_or_default())
    }

    fn scan_bands(&self) -> Result<Vec<(BandKey, Vec<String>)>> {
        let rtxn = self.env.read_txn()?;
        let mut out = Vec::new();
        for entry in self.hashtables.iter(&rtxn)? {
            let (key, members) = entry?;
            if let Some((idx, value)) = key.split_once(':') {
                if let Ok(band_index) = idx.parse::<usize>() {
                    out.push(((band_index, value.to_string()), members));
                }
            }
        }
        Ok(out)
    }

    fn put_features(&self, document_key: &str, term_frequencies: &BTreeMap<String, u32>) -> Result<()> {
        let mut wtxn = self.env.write_txn()?;
        self.features.put(&mut wtxn, document_key, term_frequencies)?;
        wtxn.commit()?;
        Ok(())
    }

    fn scan_features(&self) -> Result<Vec<(String, BTreeMap<String, u32>)>> {
        let rtxn = self.env.read_txn()?;
        let mut out = Vec::new();
        for entry in self.features.iter(&rtxn)? {
            let (key, tf) = entry?;
            out.push((key.to_string(), tf));
        }
        Ok(out)
    }
}
