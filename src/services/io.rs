//! CSV inputs: candidate edges, id translation tables and precomputed hashes.

use crate::core::geo::{CandidateEdge, EdgeAdmission, heading_diff};
use crate::core::hash::PerceptualHash;
use crate::core::image::ImageId;
use crate::core::pipeline::PrecomputedHashes;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// Normalise an id cell: trims whitespace and quotes, and drops the `.0`
/// that numeric ids pick up when a spreadsheet round-trips them as floats.
pub fn clean_id(raw: &str) -> Option<String> {
    let s = raw.trim();
    let s = s.strip_suffix(".0").unwrap_or(s);
    let s = s.trim().trim_matches('"').trim_matches('\'');
    if s.is_empty() { None } else { Some(s.to_string()) }
}

#[derive(Debug, Deserialize)]
struct EdgeRecord {
    #[serde(alias = "uuid")]
    a: String,
    #[serde(alias = "relation_uuid")]
    b: String,
    #[serde(alias = "distance_meters")]
    distance_m: f64,
    #[serde(default)]
    heading_delta_deg: Option<f64>,
    #[serde(default)]
    h_1: Option<f64>,
    #[serde(default)]
    h_2: Option<f64>,
    /// Image ids of the endpoints when `a`/`b` hold record uuids. Thumbnails
    /// and id maps are keyed by these.
    #[serde(default)]
    orig_id: Option<String>,
    #[serde(default)]
    relation_orig_id: Option<String>,
}

impl EdgeRecord {
    fn endpoints(&self) -> (Option<String>, Option<String>) {
        let orig = self.orig_id.as_deref().and_then(clean_id);
        let relation_orig = self.relation_orig_id.as_deref().and_then(clean_id);
        match (orig, relation_orig) {
            (Some(a), Some(b)) => (Some(a), Some(b)),
            _ => (clean_id(&self.a), clean_id(&self.b)),
        }
    }
}

#[derive(Debug, Default)]
pub struct EdgeLoad {
    pub edges: Vec<CandidateEdge>,
    /// Rows dropped by the admission test.
    pub rejected: usize,
}

/// Read a candidate edge CSV. When `admission` is given, rows failing it are
/// counted and dropped. Rows carrying both `orig_id` and `relation_orig_id`
/// use those as endpoints so edges share the id space of the image files.
pub fn load_edges(path: &Path, admission: Option<&EdgeAdmission>) -> Result<EdgeLoad> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open edge list {}", path.display()))?;

    let mut load = EdgeLoad::default();
    for (row, record) in reader.deserialize::<EdgeRecord>().enumerate() {
        let record = record
            .with_context(|| format!("Malformed edge on row {} of {}", row + 1, path.display()))?;

        let heading_delta_deg = match (record.heading_delta_deg, record.h_1, record.h_2) {
            (Some(delta), _, _) => delta,
            (None, Some(h1), Some(h2)) => heading_diff(h1, h2),
            _ => anyhow::bail!(
                "Edge on row {} of {} has neither heading_delta_deg nor h_1/h_2",
                row + 1,
                path.display()
            ),
        };

        let (Some(a), Some(b)) = record.endpoints() else {
            log::warn!("Skipping edge on row {} with an empty id", row + 1);
            load.rejected += 1;
            continue;
        };

        let edge = CandidateEdge::new(a, b, record.distance_m, heading_delta_deg);
        match admission {
            Some(admission) if !admission.admits(&edge) => load.rejected += 1,
            _ => load.edges.push(edge),
        }
    }

    log::info!(
        "loaded {} candidate edges from {} ({} rejected)",
        load.edges.len(),
        path.display(),
        load.rejected
    );
    Ok(load)
}

#[derive(Debug, Deserialize)]
struct IdMapRecord {
    #[serde(alias = "orig_id")]
    internal_id: String,
    #[serde(alias = "uuid")]
    external_id: String,
}

/// Read an `internal_id,external_id` table. The first mapping of an internal
/// id wins.
pub fn load_id_map(path: &Path) -> Result<HashMap<ImageId, String>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open id map {}", path.display()))?;

    let mut map = HashMap::new();
    for (row, record) in reader.deserialize::<IdMapRecord>().enumerate() {
        let record = record
            .with_context(|| format!("Malformed id map row {} of {}", row + 1, path.display()))?;
        let internal = clean_id(&record.internal_id);
        let external = clean_id(&record.external_id);
        if let (Some(internal), Some(external)) = (internal, external) {
            map.entry(ImageId::from(internal)).or_insert(external);
        }
    }
    Ok(map)
}

#[derive(Debug, Deserialize)]
struct HashRecord {
    id: String,
    hash: String,
}

pub fn load_hashes(path: &Path) -> Result<PrecomputedHashes> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open hash file {}", path.display()))?;

    let mut hashes = HashMap::new();
    for (row, record) in reader.deserialize::<HashRecord>().enumerate() {
        let record = record
            .with_context(|| format!("Malformed hash row {} of {}", row + 1, path.display()))?;
        let hash = PerceptualHash::from_hex(&record.hash)
            .with_context(|| format!("Bad hash on row {} of {}", row + 1, path.display()))?;
        if let Some(id) = clean_id(&record.id) {
            hashes.insert(ImageId::from(id), hash);
        }
    }
    Ok(hashes)
}
