//! Keeper selection for duplicate groups and similarity clusters.

use crate::core::duplicate::ExactDuplicateGroup;
use crate::core::image::{FileMeta, ImageId};
use crate::core::similarity::SimilarityGraph;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

/// Everything the tie-break order looks at for one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateScore {
    pub id: ImageId,
    pub degree: usize,
    pub weight_sum: u64,
    pub size_bytes: u64,
    pub mtime: i64,
}

impl CandidateScore {
    /// `Less` means `self` is the better keeper.
    ///
    /// Order: more neighbours, then smaller total distance to them, then the
    /// larger file, then the newer file, then the smaller id.
    pub fn rank(&self, other: &Self) -> Ordering {
        other
            .degree
            .cmp(&self.degree)
            .then_with(|| self.weight_sum.cmp(&other.weight_sum))
            .then_with(|| other.size_bytes.cmp(&self.size_bytes))
            .then_with(|| other.mtime.cmp(&self.mtime))
            .then_with(|| self.id.cmp(&other.id))
    }
}

pub struct RepresentativeSelector<'a> {
    graph: &'a SimilarityGraph,
    metadata: &'a HashMap<ImageId, FileMeta>,
}

impl<'a> RepresentativeSelector<'a> {
    pub fn new(graph: &'a SimilarityGraph, metadata: &'a HashMap<ImageId, FileMeta>) -> Self {
        Self { graph, metadata }
    }

    pub fn score(&self, id: &ImageId) -> CandidateScore {
        let meta = self.metadata.get(id).copied().unwrap_or_default();
        CandidateScore {
            id: id.clone(),
            degree: self.graph.degree(id),
            weight_sum: self.graph.weight_sum(id),
            size_bytes: meta.size_bytes,
            mtime: meta.mtime,
        }
    }

    /// The single keeper among `candidates`; `None` only when the list is empty.
    pub fn select(&self, candidates: &[ImageId]) -> Option<ImageId> {
        candidates
            .iter()
            .map(|id| self.score(id))
            .min_by(|a, b| a.rank(b))
            .map(|best| best.id)
    }
}

/// Which keep rules contribute to the keep set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeepPolicy {
    pub keep_exact_representatives: bool,
    pub keep_cluster_representatives: bool,
    pub keep_singletons: bool,
}

impl Default for KeepPolicy {
    fn default() -> Self {
        Self {
            keep_exact_representatives: true,
            keep_cluster_representatives: true,
            keep_singletons: true,
        }
    }
}

/// Keep decisions for one scope, broken down by the rule that produced them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeepResolution {
    pub keep: BTreeSet<ImageId>,
    pub exact_keepers: Vec<ImageId>,
    pub cluster_keepers: Vec<ImageId>,
    pub singletons: Vec<ImageId>,
}

impl KeepPolicy {
    /// Union of every enabled rule. A node picked by more than one rule is
    /// simply kept once.
    pub fn resolve(
        &self,
        population: &BTreeSet<ImageId>,
        exact_groups: &[ExactDuplicateGroup],
        clusters: &[Vec<ImageId>],
        selector: &RepresentativeSelector<'_>,
        graph: &SimilarityGraph,
    ) -> KeepResolution {
        let mut resolution = KeepResolution::default();

        if self.keep_exact_representatives {
            for group in exact_groups {
                if let Some(keeper) = selector.select(&group.members) {
                    resolution.exact_keepers.push(keeper);
                }
            }
        }

        if self.keep_cluster_representatives {
            for cluster in clusters {
                if let Some(keeper) = selector.select(cluster) {
                    resolution.cluster_keepers.push(keeper);
                }
            }
        }

        if self.keep_singletons {
            resolution.singletons = population
                .iter()
                .filter(|id| !graph.contains(id))
                .cloned()
                .collect();
        }

        resolution.keep = resolution
            .exact_keepers
            .iter()
            .chain(&resolution.cluster_keepers)
            .chain(&resolution.singletons)
            .filter(|id| population.contains(*id))
            .cloned()
            .collect();

        resolution
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::components::connected_components;
    use crate::core::duplicate::ExactDuplicateGrouper;
    use crate::core::hash::PerceptualHash;
    use crate::core::similarity::{SimilarityEdge, SimilarityGraphBuilder};

    fn ids(names: &[&str]) -> Vec<ImageId> {
        names.iter().map(|n| ImageId::from(*n)).collect()
    }

    fn graph(edges: &[(&str, &str, u32)]) -> SimilarityGraph {
        let edges: Vec<SimilarityEdge> = edges
            .iter()
            .map(|(a, b, d)| SimilarityEdge::new((*a).into(), (*b).into(), *d))
            .collect();
        SimilarityGraph::from_edges(&edges)
    }

    #[test]
    fn test_prefers_highest_degree() {
        let g = graph(&[("hub", "a", 4), ("hub", "b", 4), ("a", "c", 0)]);
        let meta = HashMap::new();
        let selector = RepresentativeSelector::new(&g, &meta);
        assert_eq!(selector.select(&ids(&["a", "b", "c", "hub"])), Some("a".into()));

        let g = graph(&[("hub", "a", 4), ("hub", "b", 4), ("hub", "c", 4)]);
        let selector = RepresentativeSelector::new(&g, &meta);
        assert_eq!(selector.select(&ids(&["a", "b", "c", "hub"])), Some("hub".into()));
    }

    #[test]
    fn test_lower_weight_sum_breaks_degree_tie() {
        let g = graph(&[("a", "b", 1), ("b", "c", 1), ("c", "a", 3)]);
        let meta = HashMap::new();
        let selector = RepresentativeSelector::new(&g, &meta);
        assert_eq!(selector.select(&ids(&["a", "c", "b"])), Some("b".into()));
    }

    #[test]
    fn test_file_size_then_mtime_then_id() {
        let g = graph(&[("a", "b", 2)]);
        let mut meta = HashMap::new();
        meta.insert(ImageId::from("a"), FileMeta { size_bytes: 100, mtime: 10 });
        meta.insert(ImageId::from("b"), FileMeta { size_bytes: 200, mtime: 5 });
        let selector = RepresentativeSelector::new(&g, &meta);
        assert_eq!(selector.select(&ids(&["a", "b"])), Some("b".into()));

        meta.insert(ImageId::from("b"), FileMeta { size_bytes: 100, mtime: 5 });
        let selector = RepresentativeSelector::new(&g, &meta);
        assert_eq!(selector.select(&ids(&["a", "b"])), Some("a".into()));

        meta.insert(ImageId::from("b"), FileMeta { size_bytes: 100, mtime: 10 });
        let selector = RepresentativeSelector::new(&g, &meta);
        assert_eq!(selector.select(&ids(&["b", "a"])), Some("a".into()));
    }

    #[test]
    fn test_missing_metadata_is_neutral() {
        let g = SimilarityGraph::default();
        let mut meta = HashMap::new();
        meta.insert(ImageId::from("z"), FileMeta { size_bytes: 1, mtime: 0 });
        let selector = RepresentativeSelector::new(&g, &meta);
        assert_eq!(selector.select(&ids(&["a", "z"])), Some("z".into()));
        assert_eq!(selector.select(&ids(&["b", "a"])), Some("a".into()));
        assert_eq!(selector.select(&[]), None);
    }

    #[test]
    fn test_selection_is_deterministic() {
        let g = graph(&[("p", "q", 2), ("q", "r", 2), ("r", "p", 2)]);
        let meta = HashMap::new();
        let selector = RepresentativeSelector::new(&g, &meta);
        let first = selector.select(&ids(&["r", "q", "p"]));
        for _ in 0..5 {
            assert_eq!(selector.select(&ids(&["r", "q", "p"])), first);
            assert_eq!(selector.select(&ids(&["p", "r", "q"])), first);
        }
        assert_eq!(first, Some("p".into()));
    }

    #[test]
    fn test_exact_and_similar_scenario() {
        let hashes: HashMap<ImageId, PerceptualHash> = [("X", "ff00"), ("Y", "ff00"), ("Z", "ff01")]
            .iter()
            .map(|(id, hex)| (ImageId::from(*id), PerceptualHash::from_hex(hex).unwrap()))
            .collect();

        let exact = ExactDuplicateGrouper::new().group(&hashes);
        let edges = SimilarityGraphBuilder::new(1, 3).build(&hashes);
        let g = SimilarityGraph::from_edges(&edges);
        let clusters = connected_components(&g);
        assert_eq!(clusters, vec![ids(&["X", "Y", "Z"])]);

        let meta = HashMap::new();
        let selector = RepresentativeSelector::new(&g, &meta);
        // X and Y tie on degree and weight sum; the id decides.
        assert_eq!(selector.select(&clusters[0]), Some("X".into()));
        assert_eq!(selector.select(&exact[0].members), Some("X".into()));

        let population: BTreeSet<ImageId> = hashes.keys().cloned().collect();
        let resolution =
            KeepPolicy::default().resolve(&population, &exact, &clusters, &selector, &g);
        assert_eq!(resolution.keep, BTreeSet::from([ImageId::from("X")]));
        assert!(resolution.singletons.is_empty());
    }

    #[test]
    fn test_policy_toggles() {
        let g = graph(&[("a", "b", 1)]);
        let meta = HashMap::new();
        let selector = RepresentativeSelector::new(&g, &meta);
        let population: BTreeSet<ImageId> = ids(&["a", "b", "c"]).into_iter().collect();
        let clusters = connected_components(&g);

        let all = KeepPolicy::default().resolve(&population, &[], &clusters, &selector, &g);
        assert_eq!(all.keep, ids(&["a", "c"]).into_iter().collect());

        let no_singletons = KeepPolicy {
            keep_singletons: false,
            ..KeepPolicy::default()
        }
        .resolve(&population, &[], &clusters, &selector, &g);
        assert_eq!(no_singletons.keep, ids(&["a"]).into_iter().collect());

        let nothing = KeepPolicy {
            keep_exact_representatives: false,
            keep_cluster_representatives: false,
            keep_singletons: false,
        }
        .resolve(&population, &[], &clusters, &selector, &g);
        assert!(nothing.keep.is_empty());
    }
}
