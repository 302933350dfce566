pub mod components;
pub mod deletion;
pub mod disjoint_set;
pub mod duplicate;
pub mod geo;
pub mod hash;
pub mod image;
pub mod pipeline;
pub mod quality;
pub mod selector;
pub mod similarity;

pub use deletion::{DeletionOutcome, DeletionSetResolver, IdTranslator, IdentityTranslator};
pub use geo::{CandidateEdge, EdgeAdmission, GeoClusterBuilder, GeoGroups};
pub use hash::{HashMethod, PerceptualHash, PerceptualHasher};
pub use self::image::{FileMeta, ImageId, ImageSource, SourceError};
pub use pipeline::{DedupePipeline, PipelineReport, QualityReport};
pub use quality::QualityPruner;
