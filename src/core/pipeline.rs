//! The two-stage duplicate resolution run: geo-groups first, then visual
//! clustering inside each scope, then keep/delete resolution.

use crate::config::{ClusterScope, PipelineConfig};
use crate::core::components::connected_components;
use crate::core::deletion::{DeletionOutcome, DeletionSetResolver, IdTranslator};
use crate::core::duplicate::{ExactDuplicateGroup, ExactDuplicateGrouper};
use crate::core::geo::{CandidateEdge, GeoClusterBuilder, GeoGroups};
use crate::core::hash::{HashOutcome, PerceptualHash, PerceptualHasher};
use crate::core::image::{FileMeta, ImageId, ImageSource};
use crate::core::quality::{QualityDecision, QualityPruner, QualityScores};
use crate::core::selector::{KeepResolution, RepresentativeSelector};
use crate::core::similarity::{SimilarityEdge, SimilarityGraph, SimilarityGraphBuilder};
use chrono::Utc;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineCounts {
    pub candidate_edges: usize,
    pub geo_groups: usize,
    pub unique_ids: usize,
    pub hashed: usize,
    pub unscored: usize,
    pub exact_groups: usize,
    pub exact_images: usize,
    pub similar_pairs: usize,
    pub clusters: usize,
    pub kept: usize,
    pub deleted: usize,
    pub untranslatable: usize,
}

/// Visual clustering results for one scope (one geo-group, or everything).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScopeResult {
    pub geo_group: Option<usize>,
    pub exact_groups: Vec<ExactDuplicateGroup>,
    pub similarity_edges: Vec<SimilarityEdge>,
    pub clusters: Vec<Vec<ImageId>>,
    pub keep: KeepResolution,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    pub generated_at: String,
    pub config: PipelineConfig,
    pub geo_groups: GeoGroups,
    /// Hashes of the scored population; not serialized into the JSON report.
    #[serde(skip)]
    pub hashes: BTreeMap<ImageId, PerceptualHash>,
    pub scopes: Vec<ScopeResult>,
    pub outcome: DeletionOutcome,
    pub counts: PipelineCounts,
}

impl PipelineReport {
    pub fn exact_groups(&self) -> impl Iterator<Item = &ExactDuplicateGroup> {
        self.scopes.iter().flat_map(|s| s.exact_groups.iter())
    }

    pub fn similarity_edges(&self) -> impl Iterator<Item = &SimilarityEdge> {
        self.scopes.iter().flat_map(|s| s.similarity_edges.iter())
    }

    pub fn clusters(&self) -> impl Iterator<Item = &Vec<ImageId>> {
        self.scopes.iter().flat_map(|s| s.clusters.iter())
    }
}

/// Hashes supplied from an earlier `hash` run instead of decoding images.
pub type PrecomputedHashes = HashMap<ImageId, PerceptualHash>;

pub struct DedupePipeline {
    config: PipelineConfig,
    show_progress: bool,
}

impl DedupePipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn hasher(&self) -> PerceptualHasher {
        PerceptualHasher::new(self.config.hash_method, self.config.hash_size)
            .with_progress(self.show_progress)
    }

    /// Full run over an edge list. The edges are assumed to have passed
    /// admission already.
    pub fn run<S: ImageSource + ?Sized>(
        &self,
        edges: &[CandidateEdge],
        source: &S,
        translator: &dyn IdTranslator,
        precomputed: Option<&PrecomputedHashes>,
    ) -> PipelineReport {
        let geo_groups = GeoClusterBuilder::new().build(edges);
        let population: Vec<ImageId> = {
            let mut ids: Vec<ImageId> = geo_groups.assignment.keys().cloned().collect();
            ids.sort();
            ids
        };

        let hashed = self.hash_population(source, &population, precomputed);

        let scopes: Vec<(Option<usize>, Vec<ImageId>)> = match self.config.scope {
            ClusterScope::Global => vec![(None, population)],
            ClusterScope::GeoGroup => geo_groups
                .groups
                .iter()
                .enumerate()
                .map(|(group_id, members)| (Some(group_id), members.clone()))
                .collect(),
        };

        let mut report = self.resolve(source, hashed, scopes, translator, geo_groups);
        report.counts.candidate_edges = edges.len();
        report
    }

    /// Visual-only run over an explicit population, compared globally.
    pub fn run_population<S: ImageSource + ?Sized>(
        &self,
        ids: &[ImageId],
        source: &S,
        translator: &dyn IdTranslator,
        precomputed: Option<&PrecomputedHashes>,
    ) -> PipelineReport {
        let mut population = ids.to_vec();
        population.sort();
        population.dedup();

        let hashed = self.hash_population(source, &population, precomputed);
        self.resolve(source, hashed, vec![(None, population)], translator, GeoGroups::default())
    }

    fn hash_population<S: ImageSource + ?Sized>(
        &self,
        source: &S,
        population: &[ImageId],
        precomputed: Option<&PrecomputedHashes>,
    ) -> HashOutcome {
        match precomputed {
            Some(known) => {
                let mut outcome = HashOutcome::default();
                for id in population {
                    match known.get(id) {
                        Some(hash) => {
                            outcome.hashes.insert(id.clone(), hash.clone());
                        }
                        None => outcome.failed.push(id.clone()),
                    }
                }
                if !outcome.failed.is_empty() {
                    log::warn!("{} ids have no precomputed hash", outcome.failed.len());
                }
                outcome
            }
            None => self.hasher().hash_source(source, population),
        }
    }

    fn resolve<S: ImageSource + ?Sized>(
        &self,
        source: &S,
        hashed: HashOutcome,
        scopes: Vec<(Option<usize>, Vec<ImageId>)>,
        translator: &dyn IdTranslator,
        geo_groups: GeoGroups,
    ) -> PipelineReport {
        let metadata: HashMap<ImageId, FileMeta> = hashed
            .hashes
            .par_iter()
            .filter_map(|(id, _)| source.metadata(id).map(|meta| (id.clone(), meta)))
            .collect();

        let scope_results: Vec<ScopeResult> = scopes
            .into_par_iter()
            .map(|(geo_group, members)| {
                self.cluster_scope(geo_group, &members, &hashed.hashes, &metadata)
            })
            .collect();

        let keep: BTreeSet<ImageId> = scope_results
            .iter()
            .flat_map(|s| s.keep.keep.iter().cloned())
            .collect();
        let scored: BTreeSet<ImageId> = hashed.hashes.keys().cloned().collect();
        let unscored: BTreeSet<ImageId> = hashed.failed.iter().cloned().collect();

        let outcome = DeletionSetResolver::new(translator).resolve(&scored, &unscored, &keep);

        let exact_groups: Vec<&ExactDuplicateGroup> =
            scope_results.iter().flat_map(|s| &s.exact_groups).collect();
        let counts = PipelineCounts {
            candidate_edges: 0,
            geo_groups: geo_groups.len(),
            unique_ids: scored.len() + outcome.unscored.len(),
            hashed: scored.len(),
            unscored: outcome.unscored_count(),
            exact_groups: exact_groups.len(),
            exact_images: exact_groups.iter().map(|g| g.len()).sum(),
            similar_pairs: scope_results.iter().map(|s| s.similarity_edges.len()).sum(),
            clusters: scope_results.iter().map(|s| s.clusters.len()).sum(),
            kept: outcome.keep.len(),
            deleted: outcome.delete.len(),
            untranslatable: outcome.untranslatable_count(),
        };

        log::info!(
            "resolved {} scored images: keep {}, delete {}, unscored {}",
            counts.hashed,
            counts.kept,
            counts.deleted,
            counts.unscored
        );

        PipelineReport {
            generated_at: Utc::now().to_rfc3339(),
            config: self.config.clone(),
            geo_groups,
            hashes: hashed.hashes.into_iter().collect(),
            scopes: scope_results,
            outcome,
            counts,
        }
    }

    fn cluster_scope(
        &self,
        geo_group: Option<usize>,
        members: &[ImageId],
        hashes: &HashMap<ImageId, PerceptualHash>,
        metadata: &HashMap<ImageId, FileMeta>,
    ) -> ScopeResult {
        let scoped: HashMap<ImageId, PerceptualHash> = members
            .iter()
            .filter_map(|id| hashes.get(id).map(|h| (id.clone(), h.clone())))
            .collect();
        if scoped.is_empty() {
            return ScopeResult {
                geo_group,
                ..ScopeResult::default()
            };
        }

        let exact_groups = ExactDuplicateGrouper::new().group(&scoped);
        let config = &self.config;
        let builder =
            SimilarityGraphBuilder::new(config.similar_threshold, config.bucket_prefix_len);
        let similarity_edges = builder.build(&scoped);
        let graph = SimilarityGraph::from_edges(&similarity_edges);
        let clusters = connected_components(&graph);

        let selector = RepresentativeSelector::new(&graph, metadata);
        let population: BTreeSet<ImageId> = scoped.keys().cloned().collect();
        let keep = self
            .config
            .keep
            .resolve(&population, &exact_groups, &clusters, &selector, &graph);

        ScopeResult {
            geo_group,
            exact_groups,
            similarity_edges,
            clusters,
            keep,
        }
    }
}

/// Result of the sharpness strategy, shaped like the dedupe result so both
/// share the deletion-list writer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityReport {
    pub generated_at: String,
    pub scores: QualityScores,
    pub decision: QualityDecision,
    pub outcome: DeletionOutcome,
}

pub fn run_quality<S: ImageSource + ?Sized>(
    pruner: &QualityPruner,
    ids: &[ImageId],
    source: &S,
    translator: &dyn IdTranslator,
) -> QualityReport {
    let scores = pruner.score_source(source, ids);
    let decision = pruner.decide(&scores);

    let scored: BTreeSet<ImageId> = scores.scores.keys().cloned().collect();
    let outcome =
        DeletionSetResolver::new(translator).resolve(&scored, &scores.unscored, &decision.keep);

    QualityReport {
        generated_at: Utc::now().to_rfc3339(),
        scores,
        decision,
        outcome,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::deletion::IdentityTranslator;
    use crate::core::image::MemorySource;
    use crate::core::selector::KeepPolicy;

    fn precomputed(pairs: &[(&str, &str)]) -> PrecomputedHashes {
        pairs
            .iter()
            .map(|(id, hex)| (ImageId::from(*id), PerceptualHash::from_hex(hex).unwrap()))
            .collect()
    }

    fn set(names: &[&str]) -> BTreeSet<ImageId> {
        names.iter().map(|n| ImageId::from(*n)).collect()
    }

    #[test]
    fn test_population_scenario_with_unhashable_member() {
        // A and B are near duplicates, C stands alone, D cannot be hashed.
        let edges = vec![
            CandidateEdge::new("A", "B", 1.0, 2.0),
            CandidateEdge::new("B", "C", 1.0, 2.0),
            CandidateEdge::new("C", "D", 1.0, 2.0),
        ];
        let hashes = precomputed(&[
            ("A", "00000000000000ff"),
            ("B", "00000000000000fe"),
            ("C", "ffffffffffff0000"),
        ]);
        let source = MemorySource::new();

        let pipeline = DedupePipeline::new(PipelineConfig::default());
        let report = pipeline.run(&edges, &source, &IdentityTranslator, Some(&hashes));

        let outcome = &report.outcome;
        assert!(outcome.keep.contains(&ImageId::from("C")));
        assert_eq!(outcome.keep.intersection(&set(&["A", "B"])).count(), 1);
        assert_eq!(outcome.unscored, set(&["D"]));
        assert!(!outcome.keep.contains(&ImageId::from("D")));
        assert!(!outcome.delete.contains(&ImageId::from("D")));

        let all: BTreeSet<ImageId> = outcome
            .keep
            .iter()
            .chain(&outcome.delete)
            .chain(&outcome.unscored)
            .cloned()
            .collect();
        assert_eq!(all, set(&["A", "B", "C", "D"]));

        assert_eq!(report.counts.geo_groups, 1);
        assert_eq!(report.counts.candidate_edges, 3);
        assert_eq!(report.counts.unique_ids, 4);
        assert_eq!(report.counts.similar_pairs, 1);
        assert_eq!(report.counts.clusters, 1);
    }

    #[test]
    fn test_geo_group_scope_does_not_compare_across_groups() {
        let edges = vec![
            CandidateEdge::new("a1", "a2", 1.0, 1.0),
            CandidateEdge::new("b1", "b2", 1.0, 1.0),
        ];
        // a1 and b1 are identical, but in different geo-groups.
        let hashes = precomputed(&[
            ("a1", "1111111111111111"),
            ("a2", "eeeeeeeeeeeeeeee"),
            ("b1", "1111111111111111"),
            ("b2", "0f0f0f0f0f0f0f0f"),
        ]);
        let source = MemorySource::new();

        let pipeline = DedupePipeline::new(PipelineConfig::default());
        let per_group = pipeline.run(&edges, &source, &IdentityTranslator, Some(&hashes));
        assert_eq!(per_group.counts.exact_groups, 0);
        assert_eq!(per_group.outcome.keep.len(), 4);
        assert_eq!(per_group.scopes.len(), 2);

        let global = DedupePipeline::new(PipelineConfig {
            scope: ClusterScope::Global,
            ..PipelineConfig::default()
        })
        .run(&edges, &source, &IdentityTranslator, Some(&hashes));
        assert_eq!(global.counts.exact_groups, 1);
        assert_eq!(global.outcome.delete, set(&["b1"]));
    }

    #[test]
    fn test_empty_edges_produce_empty_report() {
        let source = MemorySource::new();
        let pipeline = DedupePipeline::new(PipelineConfig::default());
        let report = pipeline.run(&[], &source, &IdentityTranslator, None);
        assert!(report.geo_groups.is_empty());
        assert!(report.outcome.keep.is_empty());
        assert!(report.outcome.delete.is_empty());
        assert_eq!(report.counts, PipelineCounts::default());
    }

    #[test]
    fn test_disabled_policies_delete_everything_scored() {
        let hashes = precomputed(&[("x", "ff00"), ("y", "ff00"), ("z", "0000")]);
        let ids: Vec<ImageId> = hashes.keys().cloned().collect();
        let config = PipelineConfig {
            keep: KeepPolicy {
                keep_exact_representatives: false,
                keep_cluster_representatives: false,
                keep_singletons: false,
            },
            ..PipelineConfig::default()
        };
        let pipeline = DedupePipeline::new(config);
        let report =
            pipeline.run_population(&ids, &MemorySource::new(), &IdentityTranslator, Some(&hashes));
        assert!(report.outcome.keep.is_empty());
        assert_eq!(report.outcome.delete, set(&["x", "y", "z"]));
    }

    #[test]
    fn test_translation_applies_to_deleted_ids() {
        let hashes = precomputed(&[("x", "ff00"), ("y", "ff00"), ("w", "ff00")]);
        let ids: Vec<ImageId> = hashes.keys().cloned().collect();
        let mut table: HashMap<ImageId, String> = HashMap::new();
        table.insert("y".into(), "uuid-y".to_string());

        let pipeline = DedupePipeline::new(PipelineConfig::default());
        let report = pipeline.run_population(&ids, &MemorySource::new(), &table, Some(&hashes));
        assert_eq!(report.outcome.keep, set(&["w"]));
        assert_eq!(report.outcome.delete_external, vec!["uuid-y".to_string()]);
        assert_eq!(report.counts.untranslatable, 1);
    }
}
