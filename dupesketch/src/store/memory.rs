//! In-memory [`Store`] used by property/integration tests. Not a production
//! backend: durability and cross-process sharing are exactly what `LmdbStore`
//! exists for. Kept to the same trait so test suites exercise the real
//! query/report algorithms against a fast double.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use crate::docfreq::OrderedDocFreq;
use crate::error::Result;
use crate::sketch::SketchConfig;
use crate::store::{BandKey, MetaRow, Store};

#[derive(Default)]
struct Tables {
    docfreq: Option<OrderedDocFreq>,
    params: Option<(SketchConfig, Vec<u8>)>,
    meta: HashMap<String, MetaRow>,
    blob_index: HashMap<String, Vec<String>>,
    hashes: HashMap<String, Vec<u8>>,
    hashtables: HashMap<BandKey, Vec<String>>,
    features: HashMap<String, BTreeMap<String, u32>>,
}

pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore { tables: Mutex::new(Tables::default()) }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Store for MemoryStore {
    fn put_docfreq(&self, docfreq: &OrderedDocFreq) -> Result<()> {
        self.tables.lock().unwrap().docfreq = Some(docfreq.clone());
        Ok(())
    }

    fn get_docfreq(&self) -> Result<Option<OrderedDocFreq>> {
        Ok(self.tables.lock().unwrap().docfreq.clone())
    }

    fn put_params(&self, config: SketchConfig, matrices_bytes: &[u8]) -> Result<()> {
        self.tables.lock().unwrap().params = Some((config, matrices_bytes.to_vec()));
        Ok(())
    }

    fn get_params(&self) -> Result<Option<(SketchConfig, Vec<u8>)>> {
        Ok(self.tables.lock().unwrap().params.clone())
    }

    fn put_meta(&self, document_key: &str, row: &MetaRow) -> Result<()> {
        self.tables.lock().unwrap().meta.insert(document_key.to_string(), row.clone());
        Ok(())
    }

    fn get_meta(&self, document_key: &str) -> Result<Option<MetaRow>> {
        Ok(self.tables.lock().unwrap().meta.get(document_key).cloned())
    }

    fn scan_meta(&self) -> Result<Vec<(String, MetaRow)>> {
        Ok(self.tables.lock().unwrap().meta.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }

    fn add_blob_key(&self, blob_id_hex: &str, document_key: &str) -> Result<()> {
        let mut tables = self.tables.lock().unwrap();
        let keys = tables.blob_index.entry(blob_id_hex.to_string()).or_default();
        if !keys.iter().any(|k| k == document_key) {
            keys.push(document_key.to_string());
        }
        Ok(())
    }

    fn get_blob_keys(&self, blob_id_hex: &str) -> Result<Vec<String>> {
        Ok(self.tables.lock().unwrap().blob_index.get(blob_id_hex).cloned().unwrap_or_default())
    }

    fn put_sketch(&self, blob_id_hex: &str, sketch_bytes: &[u8]) -> Result<()> {
        self.tables.lock().unwrap().hashes.insert(blob_id_hex.to_string(), sketch_bytes.to_vec());
        Ok(())
    }

    fn get_sketch(&self, blob_id_hex: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.tables.lock().unwrap().hashes.get(blob_id_hex).cloned())
    }

    fn scan_sketches(&self) -> Result<Vec<(String, Vec<u8>)>> {
        Ok(self.tables.lock().unwrap().hashes.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }

    fn add_band_member(&self, band_index: usize, band_value_hex: &str, blob_id_hex: &str) -> Result<()> {
        let mut tables = self.tables.lock().unwrap();
        let members = tables.hashtables.entry((band_index, band_value_hex.to_string())).or_default();
        if !members.iter().any(|m| m == blob_id_hex) {
            members.push(blob_id_hex.to_string());
        }
        Ok(())
    }

    fn get_band_members(&self, band_index: usize, band_value_hex: &str) -> Result<Vec<String>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.hashtables.get(&(band_index, band_value_hex.to_string())).cloned().unwrap_or_default())
    }

    fn scan_bands(&self) -> Result<Vec<(BandKey, Vec<String>)>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.hashtables.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }

    fn put_features(&self, document_key: &str, term_frequencies: &BTreeMap<String, u32>) -> Result<()> {
        self.tables.lock().unwrap().features.insert(document_key.to_string(), term_frequencies.clone());
        Ok(())
    }

    fn scan_features(&self) -> Result<Vec<(String, BTreeMap<String, u32>)>> {
        Ok(self.tables.lock().unwrap().features.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }
}
