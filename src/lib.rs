//! Geotagged street-level image deduplication: geo-groups from candidate
//! edges, perceptual-hash clustering inside them, and a deterministic
//! keep/delete decision.

pub mod config;
pub mod core;
pub mod services;

pub use config::{ClusterScope, ConfigError, PipelineConfig};
