use crate::core::image::ImageId;
use crate::core::similarity::SimilarityGraph;
use std::collections::{HashSet, VecDeque};

/// Connected components of `graph` by breadth-first search.
///
/// Traversal starts from unvisited nodes in ascending id order, so component
/// order is stable; members of each component are sorted. Isolated images
/// are never graph nodes and therefore never appear here.
pub fn connected_components(graph: &SimilarityGraph) -> Vec<Vec<ImageId>> {
    let mut visited: HashSet<&ImageId> = HashSet::with_capacity(graph.node_count());
    let mut components = Vec::new();

    for start in graph.nodes() {
        if !visited.insert(start) {
            continue;
        }

        let mut component = vec![start.clone()];
        let mut queue = VecDeque::from([start]);
        while let Some(current) = queue.pop_front() {
            for (neighbor, _) in graph.neighbors(current) {
                if visited.insert(neighbor) {
                    component.push(neighbor.clone());
                    queue.push_back(neighbor);
                }
            }
        }

        component.sort();
        components.push(component);
    }

    components
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::similarity::SimilarityEdge;

    fn graph(edges: &[(&str, &str, u32)]) -> SimilarityGraph {
        let edges: Vec<SimilarityEdge> = edges
            .iter()
            .map(|(a, b, d)| SimilarityEdge::new((*a).into(), (*b).into(), *d))
            .collect();
        SimilarityGraph::from_edges(&edges)
    }

    fn ids(names: &[&str]) -> Vec<ImageId> {
        names.iter().map(|n| ImageId::from(*n)).collect()
    }

    #[test]
    fn test_single_component() {
        let g = graph(&[("X", "Y", 0), ("X", "Z", 1), ("Y", "Z", 1)]);
        assert_eq!(connected_components(&g), vec![ids(&["X", "Y", "Z"])]);
    }

    #[test]
    fn test_disjoint_components_cover_every_node_once() {
        let g = graph(&[("d", "e", 2), ("a", "b", 1), ("b", "c", 4), ("x", "y", 0)]);
        let components = connected_components(&g);
        assert_eq!(
            components,
            vec![ids(&["a", "b", "c"]), ids(&["d", "e"]), ids(&["x", "y"])]
        );

        let total: usize = components.iter().map(Vec::len).sum();
        assert_eq!(total, g.node_count());
    }

    #[test]
    fn test_long_chain_is_one_component() {
        let g = graph(&[("e", "d", 1), ("c", "d", 1), ("a", "b", 1), ("b", "c", 1)]);
        assert_eq!(connected_components(&g), vec![ids(&["a", "b", "c", "d", "e"])]);
    }

    #[test]
    fn test_empty_graph() {
        assert!(connected_components(&SimilarityGraph::default()).is_empty());
    }
}
