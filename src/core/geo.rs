//! Geographic clustering: candidate pairs from the spatial query are merged
//! into connected components ("geo-groups").

use crate::core::disjoint_set::DisjointSet;
use crate::core::image::ImageId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One candidate pair produced by the upstream proximity query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateEdge {
    pub a: ImageId,
    pub b: ImageId,
    pub distance_m: f64,
    pub heading_delta_deg: f64,
}

impl CandidateEdge {
    pub fn new(
        a: impl Into<ImageId>,
        b: impl Into<ImageId>,
        distance_m: f64,
        heading_delta_deg: f64,
    ) -> Self {
        Self {
            a: a.into(),
            b: b.into(),
            distance_m,
            heading_delta_deg,
        }
    }
}

/// Smallest angle between two compass headings, in `[0, 180]`.
pub fn heading_diff(h1: f64, h2: f64) -> f64 {
    let d = (h1 - h2).abs().rem_euclid(360.0);
    d.min(360.0 - d)
}

/// Distance/heading admission test. This runs upstream of clustering;
/// `GeoClusterBuilder` trusts whatever edges it is handed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EdgeAdmission {
    pub max_distance_m: f64,
    pub max_heading_delta_deg: f64,
}

impl Default for EdgeAdmission {
    fn default() -> Self {
        Self {
            max_distance_m: 3.0,
            max_heading_delta_deg: 20.0,
        }
    }
}

impl EdgeAdmission {
    pub fn admits(&self, edge: &CandidateEdge) -> bool {
        if edge.a == edge.b {
            return false;
        }
        // Deltas may arrive as raw signed differences; fold them first.
        let heading = heading_diff(edge.heading_delta_deg, 0.0);
        edge.distance_m <= self.max_distance_m && heading <= self.max_heading_delta_deg
    }

    pub fn filter(&self, edges: impl IntoIterator<Item = CandidateEdge>) -> Vec<CandidateEdge> {
        edges.into_iter().filter(|e| self.admits(e)).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSummary {
    pub group_id: usize,
    pub n_nodes: usize,
    pub n_edges: usize,
}

/// Partition of every id seen in the edge list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeoGroups {
    /// Members per group id, in first-appearance order.
    pub groups: Vec<Vec<ImageId>>,
    pub assignment: HashMap<ImageId, usize>,
    /// Group id of every input edge, in input order.
    pub edge_groups: Vec<usize>,
}

impl GeoGroups {
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn group_of(&self, id: &ImageId) -> Option<usize> {
        self.assignment.get(id).copied()
    }

    pub fn node_count(&self) -> usize {
        self.assignment.len()
    }

    pub fn summary(&self) -> Vec<GroupSummary> {
        let mut edges_per_group = vec![0usize; self.groups.len()];
        for &g in &self.edge_groups {
            edges_per_group[g] += 1;
        }

        self.groups
            .iter()
            .enumerate()
            .map(|(group_id, members)| GroupSummary {
                group_id,
                n_nodes: members.len(),
                n_edges: edges_per_group[group_id],
            })
            .collect()
    }

    /// Summaries ordered by node count, largest first.
    pub fn largest(&self, limit: usize) -> Vec<GroupSummary> {
        let mut summary = self.summary();
        summary.sort_by(|x, y| y.n_nodes.cmp(&x.n_nodes).then(x.group_id.cmp(&y.group_id)));
        summary.truncate(limit);
        summary
    }
}

pub struct GeoClusterBuilder;

impl GeoClusterBuilder {
    pub fn new() -> Self {
        Self
    }

    pub fn build(&self, edges: &[CandidateEdge]) -> GeoGroups {
        if edges.is_empty() {
            return GeoGroups::default();
        }

        let mut ds = DisjointSet::new();
        for edge in edges {
            ds.union(&edge.a, &edge.b);
        }

        // Relabel roots to 0.. in the order their first member shows up.
        let nodes: Vec<ImageId> = ds.elements().to_vec();
        let mut root_to_group: HashMap<ImageId, usize> = HashMap::new();
        let mut groups: Vec<Vec<ImageId>> = Vec::new();
        let mut assignment = HashMap::with_capacity(nodes.len());

        for node in nodes {
            let root = ds.find(&node);
            let group_id = *root_to_group.entry(root).or_insert_with(|| {
                groups.push(Vec::new());
                groups.len() - 1
            });
            groups[group_id].push(node.clone());
            assignment.insert(node, group_id);
        }

        let edge_groups = edges.iter().map(|e| assignment[&e.a]).collect();

        log::debug!(
            "geo clustering: {} edges, {} nodes, {} groups",
            edges.len(),
            assignment.len(),
            groups.len()
        );

        GeoGroups {
            groups,
            assignment,
            edge_groups,
        }
    }
}

impl Default for GeoClusterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeSet, HashSet};

    fn edge(a: &str, b: &str) -> CandidateEdge {
        CandidateEdge::new(a, b, 1.0, 5.0)
    }

    fn partition(groups: &GeoGroups) -> BTreeSet<BTreeSet<String>> {
        groups
            .groups
            .iter()
            .map(|g| g.iter().map(|id| id.0.clone()).collect())
            .collect()
    }

    #[test]
    fn test_heading_diff_wraps_around() {
        assert_eq!(heading_diff(350.0, 10.0), 20.0);
        assert_eq!(heading_diff(10.0, 350.0), 20.0);
        assert_eq!(heading_diff(0.0, 180.0), 180.0);
        assert_eq!(heading_diff(90.0, 90.0), 0.0);
        assert_eq!(heading_diff(-30.0, 0.0), 30.0);
    }

    #[test]
    fn test_admission_thresholds() {
        let admission = EdgeAdmission::default();
        assert!(admission.admits(&CandidateEdge::new("a", "b", 3.0, 20.0)));
        assert!(!admission.admits(&CandidateEdge::new("a", "b", 3.1, 5.0)));
        assert!(!admission.admits(&CandidateEdge::new("a", "b", 1.0, 25.0)));
        assert!(admission.admits(&CandidateEdge::new("a", "b", 1.0, 345.0)));
        assert!(!admission.admits(&CandidateEdge::new("a", "a", 0.0, 0.0)));
    }

    #[test]
    fn test_chain_forms_single_group() {
        let edges = vec![
            CandidateEdge::new("A", "B", 1.0, 5.0),
            CandidateEdge::new("B", "C", 1.5, 10.0),
        ];
        let admission = EdgeAdmission {
            max_distance_m: 3.0,
            max_heading_delta_deg: 20.0,
        };
        let admitted = admission.filter(edges);
        assert_eq!(admitted.len(), 2);

        let groups = GeoClusterBuilder::new().build(&admitted);
        assert_eq!(groups.len(), 1);
        assert_eq!(
            groups.groups[0],
            vec![ImageId::from("A"), ImageId::from("B"), ImageId::from("C")]
        );
        assert_eq!(groups.edge_groups, vec![0, 0]);
    }

    #[test]
    fn test_empty_edges_yield_empty_groups() {
        let groups = GeoClusterBuilder::new().build(&[]);
        assert!(groups.is_empty());
        assert!(groups.assignment.is_empty());
        assert!(groups.summary().is_empty());
    }

    #[test]
    fn test_groups_partition_all_edge_ids() {
        let edges =
            vec![edge("a", "b"), edge("c", "d"), edge("e", "a"), edge("f", "g"), edge("g", "d")];
        let groups = GeoClusterBuilder::new().build(&edges);

        let expected: HashSet<ImageId> =
            edges.iter().flat_map(|e| [e.a.clone(), e.b.clone()]).collect();
        let mut seen = HashSet::new();
        for group in &groups.groups {
            for id in group {
                assert!(seen.insert(id.clone()), "{id} appears in two groups");
            }
        }
        assert_eq!(seen, expected);
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn test_labels_follow_first_seen_order() {
        let edges = vec![edge("x", "y"), edge("p", "q"), edge("y", "z")];
        let groups = GeoClusterBuilder::new().build(&edges);
        assert_eq!(groups.group_of(&"x".into()), Some(0));
        assert_eq!(groups.group_of(&"z".into()), Some(0));
        assert_eq!(groups.group_of(&"p".into()), Some(1));
        assert_eq!(groups.group_of(&"missing".into()), None);
        assert_eq!(groups.edge_groups, vec![0, 1, 0]);
    }

    #[test]
    fn test_membership_is_independent_of_edge_order() {
        let edges = vec![
            edge("a", "b"),
            edge("c", "d"),
            edge("b", "c"),
            edge("e", "f"),
            edge("g", "h"),
            edge("h", "e"),
        ];
        let forward = GeoClusterBuilder::new().build(&edges);

        let mut reversed = edges.clone();
        reversed.reverse();
        let backward = GeoClusterBuilder::new().build(&reversed);

        let mut rotated = edges.clone();
        rotated.rotate_left(2);
        let rotated = GeoClusterBuilder::new().build(&rotated);

        assert_eq!(partition(&forward), partition(&backward));
        assert_eq!(partition(&forward), partition(&rotated));
    }

    #[test]
    fn test_summary_counts_nodes_and_edges() {
        let edges = vec![edge("a", "b"), edge("b", "c"), edge("a", "c"), edge("x", "y")];
        let groups = GeoClusterBuilder::new().build(&edges);
        let summary = groups.summary();
        assert_eq!(
            summary,
            vec![
                GroupSummary { group_id: 0, n_nodes: 3, n_edges: 3 },
                GroupSummary { group_id: 1, n_nodes: 2, n_edges: 1 },
            ]
        );
        assert_eq!(groups.largest(1)[0].group_id, 0);
    }
}
