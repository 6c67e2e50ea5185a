//! Report Engine (C7): scans the store to enumerate duplicate clusters and
//! connected components of the "similar" graph over the whole corpus.
//!
//! The similar-document graph is never materialized as an edge list — per
//! §4.7 "Implementation constraint", it is built with union-find over a
//! dense integer remapping of blob-ids, and bucket scans are consumed
//! streaming, one band bucket at a time.

use std::collections::HashMap;

use log::warn;
use serde::Serialize;

use crate::error::Result;
use crate::sketch::Sketch;
use crate::store::{MetaRow, Store};

/// A cluster of documents sharing the same blob-id (§4.7 "Duplicate report").
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateCluster {
    pub blob_id: String,
    pub members: Vec<MetaRow>,
}

/// A connected component of the similar-document graph (§4.7 "Similar report").
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarComponent {
    pub blob_ids: Vec<String>,
    pub members: Vec<MetaRow>,
}

/// Result of a full-corpus report pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Report {
    pub duplicates: Vec<DuplicateCluster>,
    pub similar: Vec<SimilarComponent>,
}

/// Plain union-find over a dense `[0, n)` integer remapping of blob-ids
/// (§4.7 "use union-find over blob-ids keyed by a dense integer remapping").
struct UnionFind {
    parent: Vec<u32>,
    rank: Vec<u8>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        UnionFind { parent: (0..n as u32).collect(), rank: vec![0; n] }
    }

    fn find(&mut self, x: u32) -> u32 {
        if self.parent[x as usize] != x {
            let root = self.find(self.parent[x as usize]);
            self.parent[x as usize] = root;
        }
        self.parent[x as usize]
    }

    fn union(&mut self, a: u32, b: u32) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return;
        }
        match self.rank[ra as usize].cmp(&self.rank[rb as usize]) {
            std::cmp::Ordering::Less => self.parent[ra as usize] = rb,
            std::cmp::Ordering::Greater => self.parent[rb as usize] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb as usize] = ra;
                self.rank[ra as usize] += 1;
            }
        }
    }
}

/// Per-bucket cap on emitted pairs (§9 "Banded bucket fan-out"). A bucket
/// above this member count is down-sampled to its first `N` members rather
/// than emitting `O(members^2)` pairs, and the drop is logged.
pub const DEFAULT_MAX_BUCKET_MEMBERS: usize = 1_000;

/// Group `meta` rows by blob-id, emitting every group of size >= 2
/// (§4.7 "Duplicate report").
pub fn duplicate_clusters(store: &dyn Store) -> Result<Vec<DuplicateCluster>> {
    let meta_rows = store.scan_meta()?;
    let mut by_blob: HashMap<String, Vec<MetaRow>> = HashMap::new();
    for (_, row) in meta_rows {
        by_blob.entry(row.blob_id.clone()).or_default().push(row);
    }

    let mut clusters: Vec<DuplicateCluster> = by_blob
        .into_iter()
        .filter(|(_, members)| members.len() >= 2)
        .map(|(blob_id, members)| DuplicateCluster { blob_id, members })
        .collect();
    clusters.sort_by(|a, b| a.blob_id.cmp(&b.blob_id));
    Ok(clusters)
}

/// Build the similar-document graph from the `hashtables` scan and return
/// its connected components of size >= 2.
///
/// When `similarity_floor` is `Some`, a component survives only if every
/// pairwise agreement among its sketches clears the floor (the strictest
/// reading of §4.7's "whose pairwise estimates exceed the similarity
/// floor" — see DESIGN.md). `max_bucket_members` caps per-bucket pair
/// emission per §9.
pub fn similar_components(
    store: &dyn Store,
    similarity_floor: Option<f64>,
    max_bucket_members: usize,
) -> Result<Vec<SimilarComponent>> {
    let all_blobs = store.scan_sketches()?;
    let mut index_of: HashMap<String, u32> = HashMap::with_capacity(all_blobs.len());
    for (i, (blob_id, _)) in all_blobs.iter().enumerate() {
        index_of.insert(blob_id.clone(), i as u32);
    }

    let mut uf = UnionFind::new(all_blobs.len());

    for (band_key, members) in store.scan_bands()? {
        if members.len() < 2 {
            continue;
        }
        let capped: &[String] = if members.len() > max_bucket_members {
            warn!(
                "band bucket {:?} has {} members, capping to {} (dropping {} pair candidates)",
                band_key,
                members.len(),
                max_bucket_members,
                members.len() - max_bucket_members
            );
            &members[..max_bucket_members]
        } else {
            &members
        };

        for i in 0..capped.len() {
            for j in (i + 1)..capped.len() {
                if let (Some(&ia), Some(&ib)) = (index_of.get(&capped[i]), index_of.get(&capped[j])) {
                    uf.union(ia, ib);
                }
            }
        }
    }

    let mut groups: HashMap<u32, Vec<usize>> = HashMap::new();
    for i in 0..all_blobs.len() {
        let root = uf.find(i as u32);
        groups.entry(root).or_default().push(i);
    }

    let sketches: HashMap<&str, Sketch> = all_blobs
        .iter()
        .filter_map(|(blob_id, bytes)| Sketch::from_bytes(bytes).map(|s| (blob_id.as_str(), s)))
        .collect();

    let mut components = Vec::new();
    for members_idx in groups.values() {
        if members_idx.len() < 2 {
            continue;
        }
        let blob_ids: Vec<String> = members_idx.iter().map(|&i| all_blobs[i].0.clone()).collect();

        if let Some(floor) = similarity_floor {
            if !component_clears_floor(&blob_ids, &sketches, floor) {
                continue;
            }
        }

        let mut members = Vec::new();
        for blob_id in &blob_ids {
            for key in store.get_blob_keys(blob_id)? {
                if let Some(meta) = store.get_meta(&key)? {
                    members.push(meta);
                }
            }
        }

        components.push(SimilarComponent { blob_ids, members });
    }

    components.sort_by(|a, b| a.blob_ids.cmp(&b.blob_ids));
    Ok(components)
}

fn component_clears_floor(blob_ids: &[String], sketches: &HashMap<&str, Sketch>, floor: f64) -> bool {
    for i in 0..blob_ids.len() {
        for j in (i + 1)..blob_ids.len() {
            let (Some(sa), Some(sb)) = (sketches.get(blob_ids[i].as_str()), sketches.get(blob_ids[j].as_str()))
            else {
                return false;
            };
            if sa.agreement(sb) < floor {
                return false;
            }
        }
    }
    true
}

/// Run both passes over the store and assemble a full [`Report`].
pub fn build_report(
    store: &dyn Store,
    similarity_floor: Option<f64>,
    max_bucket_members: usize,
) -> Result<Report> {
    let duplicates = duplicate_clusters(store)?;
    let similar = similar_components(store, similarity_floor, max_bucket_members)?;
    Ok(Report { duplicates, similar })
}
