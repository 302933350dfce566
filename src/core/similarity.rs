//! Near-duplicate detection over perceptual hashes.
//!
//! Comparing every pair is quadratic, so hashes are first bucketed by a short
//! hex prefix and only pairs inside one bucket are compared. Two similar
//! hashes whose prefixes differ land in different buckets and are never
//! compared: the prefix length trades recall for speed. A prefix length of 0
//! puts everything in one bucket and is exhaustive.

use crate::core::hash::PerceptualHash;
use crate::core::image::ImageId;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Undirected edge, canonicalised so that `a < b`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SimilarityEdge {
    pub a: ImageId,
    pub b: ImageId,
    pub distance: u32,
}

impl SimilarityEdge {
    pub fn new(x: ImageId, y: ImageId, distance: u32) -> Self {
        if x <= y {
            Self { a: x, b: y, distance }
        } else {
            Self { a: y, b: x, distance }
        }
    }

    pub fn is_exact(&self) -> bool {
        self.distance == 0
    }
}

/// Weighted adjacency. Only ids with at least one edge are present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimilarityGraph {
    adjacency: BTreeMap<ImageId, BTreeMap<ImageId, u32>>,
}

impl SimilarityGraph {
    pub fn from_edges(edges: &[SimilarityEdge]) -> Self {
        let mut adjacency: BTreeMap<ImageId, BTreeMap<ImageId, u32>> = BTreeMap::new();
        for edge in edges {
            if edge.a == edge.b {
                continue;
            }
            adjacency
                .entry(edge.a.clone())
                .or_default()
                .insert(edge.b.clone(), edge.distance);
            adjacency
                .entry(edge.b.clone())
                .or_default()
                .insert(edge.a.clone(), edge.distance);
        }
        Self { adjacency }
    }

    pub fn is_empty(&self) -> bool {
        self.adjacency.is_empty()
    }

    pub fn node_count(&self) -> usize {
        self.adjacency.len()
    }

    pub fn edge_count(&self) -> usize {
        self.adjacency.values().map(BTreeMap::len).sum::<usize>() / 2
    }

    pub fn contains(&self, id: &ImageId) -> bool {
        self.adjacency.contains_key(id)
    }

    /// Nodes in ascending id order.
    pub fn nodes(&self) -> impl Iterator<Item = &ImageId> {
        self.adjacency.keys()
    }

    pub fn neighbors<'a>(
        &'a self,
        id: &ImageId,
    ) -> impl Iterator<Item = (&'a ImageId, u32)> + use<'a> {
        self.adjacency
            .get(id)
            .into_iter()
            .flat_map(|n| n.iter().map(|(k, &w)| (k, w)))
    }

    pub fn degree(&self, id: &ImageId) -> usize {
        self.adjacency.get(id).map_or(0, BTreeMap::len)
    }

    pub fn weight_sum(&self, id: &ImageId) -> u64 {
        self.adjacency
            .get(id)
            .map_or(0, |n| n.values().map(|&w| w as u64).sum())
    }
}

pub struct SimilarityGraphBuilder {
    threshold: u32,
    prefix_len: usize,
}

impl SimilarityGraphBuilder {
    pub fn new(threshold: u32, prefix_len: usize) -> Self {
        Self {
            threshold,
            prefix_len,
        }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Similar pairs found within prefix buckets, sorted by
    /// `(distance, a, b)` and free of duplicates.
    pub fn build(&self, hashes: &HashMap<ImageId, PerceptualHash>) -> Vec<SimilarityEdge> {
        let mut buckets: BTreeMap<&str, Vec<(&ImageId, &PerceptualHash)>> = BTreeMap::new();
        for (id, hash) in hashes {
            buckets.entry(hash.prefix(self.prefix_len)).or_default().push((id, hash));
        }

        let largest = buckets.values().map(Vec::len).max().unwrap_or(0);
        log::debug!(
            "similarity: {} hashes in {} buckets (prefix {}, largest bucket {})",
            hashes.len(),
            buckets.len(),
            self.prefix_len,
            largest
        );

        let edges: Vec<SimilarityEdge> = buckets
            .into_par_iter()
            .flat_map_iter(|(_, items)| self.compare_all(items))
            .collect();

        finish(edges)
    }

    /// Full pairwise comparison. Quadratic; meant for validating the
    /// bucketed search on small inputs.
    pub fn brute_force(&self, hashes: &HashMap<ImageId, PerceptualHash>) -> Vec<SimilarityEdge> {
        let items: Vec<(&ImageId, &PerceptualHash)> = hashes.iter().collect();
        finish(self.compare_all(items))
    }

    fn compare_all(&self, items: Vec<(&ImageId, &PerceptualHash)>) -> Vec<SimilarityEdge> {
        let mut edges = Vec::new();
        for i in 0..items.len() {
            let (id_i, hash_i) = items[i];
            for &(id_j, hash_j) in &items[i + 1..] {
                if id_i == id_j {
                    continue;
                }
                let distance = hash_i.distance(hash_j);
                if distance <= self.threshold {
                    edges.push(SimilarityEdge::new(id_i.clone(), id_j.clone(), distance));
                }
            }
        }
        edges
    }
}

fn finish(mut edges: Vec<SimilarityEdge>) -> Vec<SimilarityEdge> {
    edges.sort_by(|x, y| {
        x.distance
            .cmp(&y.distance)
            .then_with(|| x.a.cmp(&y.a))
            .then_with(|| x.b.cmp(&y.b))
    });
    edges.dedup();
    edges
}
