use crate::core::geo::EdgeAdmission;
use crate::core::hash::HashMethod;
use crate::core::quality::{QualitySettings, SharpnessCutoff};
use crate::core::selector::KeepPolicy;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid value for {field}: {message}")]
    Invalid { field: &'static str, message: String },
}

/// Which images visual clustering compares against each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ClusterScope {
    /// Every hashed image is compared with every other one.
    Global,
    /// Only images of the same geo-group are compared.
    GeoGroup,
}

/// Every tunable of a run. Components get the pieces they need passed in;
/// nothing reads configuration from ambient state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub max_distance_m: f64,
    pub max_heading_delta_deg: f64,
    pub hash_method: HashMethod,
    /// Side length of the hash grid. Most methods give `hash_size²` bits;
    /// see `hash_bits` for the exact count.
    pub hash_size: u32,
    /// Largest Hamming distance still considered a near duplicate.
    pub similar_threshold: u32,
    /// Hex characters of the hash used as comparison bucket; 0 compares all pairs.
    pub bucket_prefix_len: usize,
    pub scope: ClusterScope,
    pub keep: KeepPolicy,
    pub quality: QualitySettings,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let admission = EdgeAdmission::default();
        Self {
            max_distance_m: admission.max_distance_m,
            max_heading_delta_deg: admission.max_heading_delta_deg,
            hash_method: HashMethod::Phash,
            hash_size: 8,
            similar_threshold: 5,
            bucket_prefix_len: 3,
            scope: ClusterScope::GeoGroup,
            keep: KeepPolicy::default(),
            quality: QualitySettings::default(),
        }
    }
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn admission(&self) -> EdgeAdmission {
        EdgeAdmission {
            max_distance_m: self.max_distance_m,
            max_heading_delta_deg: self.max_heading_delta_deg,
        }
    }

    /// Bits per hash for the configured method and size.
    pub fn hash_bits(&self) -> u32 {
        self.hash_method.bit_len(self.hash_size)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.max_distance_m.is_finite() || self.max_distance_m < 0.0 {
            return Err(invalid(
                "max_distance_m",
                format!("{} is not a non-negative distance", self.max_distance_m),
            ));
        }
        let heading = self.max_heading_delta_deg;
        if !heading.is_finite() || !(0.0..=180.0).contains(&heading) {
            return Err(invalid(
                "max_heading_delta_deg",
                format!("{} is outside 0..=180", self.max_heading_delta_deg),
            ));
        }
        if !(2..=64).contains(&self.hash_size) {
            return Err(invalid("hash_size", format!("{} is outside 2..=64", self.hash_size)));
        }
        let bits = self.hash_bits();
        if self.similar_threshold > bits {
            return Err(invalid(
                "similar_threshold",
                format!("{} exceeds the {} hash bits", self.similar_threshold, bits),
            ));
        }
        let hex_len = (bits as usize).div_ceil(8) * 2;
        if self.bucket_prefix_len > hex_len {
            return Err(invalid(
                "bucket_prefix_len",
                format!(
                    "{} is longer than the {} hex characters of a hash",
                    self.bucket_prefix_len, hex_len
                ),
            ));
        }
        match self.quality.cutoff {
            SharpnessCutoff::Percentile { percentile } if !(0.0..=100.0).contains(&percentile) => {
                return Err(invalid(
                    "quality.cutoff.percentile",
                    format!("{percentile} is outside 0..=100"),
                ));
            }
            SharpnessCutoff::Absolute { min_sharpness } if !min_sharpness.is_finite() => {
                return Err(invalid(
                    "quality.cutoff.min_sharpness",
                    format!("{min_sharpness} is not finite"),
                ));
            }
            _ => {}
        }
        Ok(())
    }
}

fn invalid(field: &'static str, message: String) -> ConfigError {
    ConfigError::Invalid { field, message }
}
