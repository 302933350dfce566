use crate::core::image::{ImageId, ImageSource};
use clap::ValueEnum;
use image::DynamicImage;
use image_hasher::{HashAlg, Hasher, HasherConfig};
use indicatif::{ParallelProgressIterator, ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HashError {
    #[error("Invalid hash hex {hex:?}: {message}")]
    InvalidHex { hex: String, message: String },

    #[error("Unknown hash method: {0}")]
    UnknownMethod(String),
}

/// Perceptual hash algorithms exposed to configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum HashMethod {
    /// Mean of a downscaled grayscale image
    Ahash,
    /// Mean hash over DCT coefficients
    Phash,
    /// Horizontal gradient
    Dhash,
    /// Vertical gradient
    Vdhash,
    /// Horizontal and vertical gradient
    DoubleGradient,
    /// Median of a downscaled grayscale image
    Median,
    /// Blockhash.io
    Blockhash,
}

impl HashMethod {
    pub fn name(&self) -> &'static str {
        match self {
            HashMethod::Ahash => "ahash",
            HashMethod::Phash => "phash",
            HashMethod::Dhash => "dhash",
            HashMethod::Vdhash => "vdhash",
            HashMethod::DoubleGradient => "double-gradient",
            HashMethod::Median => "median",
            HashMethod::Blockhash => "blockhash",
        }
    }
}

impl HashMethod {
    /// Bits produced at `hash_size`. Not always `hash_size²`: double
    /// gradient and blockhash round their grids differently, so the length
    /// is measured on a blank image.
    pub fn bit_len(&self, hash_size: u32) -> u32 {
        let sample = DynamicImage::new_luma8(16, 16);
        PerceptualHasher::new(*self, hash_size).hash_image(&sample).bit_len() as u32
    }
}

impl fmt::Display for HashMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HashMethod {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <HashMethod as ValueEnum>::from_str(s.trim(), true)
            .map_err(|_| HashError::UnknownMethod(s.to_string()))
    }
}

/// Fixed-length fingerprint, kept both as raw bytes and lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PerceptualHash {
    bytes: Vec<u8>,
    hex: String,
}

impl PerceptualHash {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            bytes: bytes.to_vec(),
            hex: hex::encode(bytes),
        }
    }

    pub fn from_hex(hex_str: &str) -> Result<Self, HashError> {
        let trimmed = hex_str.trim();
        let bytes = hex::decode(trimmed).map_err(|e| HashError::InvalidHex {
            hex: hex_str.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self::from_bytes(&bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn to_hex(&self) -> &str {
        &self.hex
    }

    pub fn bit_len(&self) -> usize {
        self.bytes.len() * 8
    }

    /// First `len` hex characters, or the whole hex when shorter.
    pub fn prefix(&self, len: usize) -> &str {
        &self.hex[..len.min(self.hex.len())]
    }

    /// Number of differing bits. Bytes present in only one of the two
    /// hashes count as fully different.
    pub fn distance(&self, other: &PerceptualHash) -> u32 {
        let common: u32 = self
            .bytes
            .iter()
            .zip(other.bytes.iter())
            .map(|(a, b)| (a ^ b).count_ones())
            .sum();
        let extra = self.bytes.len().abs_diff(other.bytes.len()) as u32 * 8;
        common + extra
    }
}

impl TryFrom<String> for PerceptualHash {
    type Error = HashError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl From<PerceptualHash> for String {
    fn from(hash: PerceptualHash) -> Self {
        hash.hex
    }
}

impl fmt::Display for PerceptualHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hex)
    }
}

/// Result of hashing a population: successes plus the ids that could not be read.
#[derive(Debug, Default)]
pub struct HashOutcome {
    pub hashes: HashMap<ImageId, PerceptualHash>,
    /// Sorted.
    pub failed: Vec<ImageId>,
}

pub struct PerceptualHasher {
    method: HashMethod,
    hash_size: u32,
    hasher: Hasher,
    show_progress: bool,
}

impl PerceptualHasher {
    pub fn new(method: HashMethod, hash_size: u32) -> Self {
        let config = HasherConfig::new().hash_size(hash_size, hash_size);
        let config = match method {
            HashMethod::Ahash => config.hash_alg(HashAlg::Mean),
            HashMethod::Phash => config.hash_alg(HashAlg::Mean).preproc_dct(),
            HashMethod::Dhash => config.hash_alg(HashAlg::Gradient),
            HashMethod::Vdhash => config.hash_alg(HashAlg::VertGradient),
            HashMethod::DoubleGradient => config.hash_alg(HashAlg::DoubleGradient),
            HashMethod::Median => config.hash_alg(HashAlg::Median),
            HashMethod::Blockhash => config.hash_alg(HashAlg::Blockhash),
        };

        Self {
            method,
            hash_size,
            hasher: config.to_hasher(),
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn method(&self) -> HashMethod {
        self.method
    }

    pub fn hash_size(&self) -> u32 {
        self.hash_size
    }

    pub fn hash_image(&self, image: &DynamicImage) -> PerceptualHash {
        PerceptualHash::from_bytes(self.hasher.hash_image(image).as_bytes())
    }

    /// Hash every id in parallel. Unreadable images are logged and reported
    /// in `failed`; they never abort the batch.
    pub fn hash_source<S: ImageSource + ?Sized>(&self, source: &S, ids: &[ImageId]) -> HashOutcome {
        let bar = if self.show_progress {
            let bar = ProgressBar::new(ids.len() as u64);
            let template = "{spinner:.green} Hashing [{bar:40.cyan/blue}] {pos}/{len} ({eta})";
            if let Ok(style) = ProgressStyle::with_template(template) {
                bar.set_style(style.progress_chars("=>-"));
            }
            bar
        } else {
            ProgressBar::hidden()
        };

        let results: Vec<(ImageId, Option<PerceptualHash>)> = ids
            .par_iter()
            .progress_with(bar.clone())
            .map(|id| match source.load(id) {
                Ok(image) => (id.clone(), Some(self.hash_image(&image))),
                Err(e) => {
                    log::warn!("Skipping unreadable image {}: {}", id, e);
                    (id.clone(), None)
                }
            })
            .collect();
        bar.finish_and_clear();

        let mut outcome = HashOutcome::default();
        for (id, hash) in results {
            match hash {
                Some(hash) => {
                    outcome.hashes.insert(id, hash);
                }
                None => outcome.failed.push(id),
            }
        }
        outcome.failed.sort();
        outcome.failed.dedup();

        log::info!(
            "hashed {} images with {} ({} bits), {} unreadable",
            outcome.hashes.len(),
            self.method,
            self.hash_size * self.hash_size,
            outcome.failed.len()
        );
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::image::MemorySource;
    use image::{ImageBuffer, Luma};

    fn gradient_image(width: u32, height: u32, invert: bool) -> DynamicImage {
        let img = ImageBuffer::from_fn(width, height, |x, _y| {
            let v = ((x * 255) / width.max(1)) as u8;
            Luma([if invert { 255 - v } else { v }])
        });
        DynamicImage::ImageLuma8(img)
    }

    #[test]
    fn test_hex_roundtrip_and_distance() {
        let a = PerceptualHash::from_hex("ff00").unwrap();
        let b = PerceptualHash::from_hex("FF01").unwrap();
        assert_eq!(a.to_hex(), "ff00");
        assert_eq!(b.to_hex(), "ff01");
        assert_eq!(a.distance(&a), 0);
        assert_eq!(a.distance(&b), 1);
        assert_eq!(a.bit_len(), 16);
        assert_eq!(a.prefix(3), "ff0");
        assert_eq!(a.prefix(10), "ff00");
    }

    #[test]
    fn test_distance_counts_missing_bytes() {
        let short = PerceptualHash::from_hex("ff").unwrap();
        let long = PerceptualHash::from_hex("ff00").unwrap();
        assert_eq!(short.distance(&long), 8);
        assert_eq!(long.distance(&short), 8);
    }

    #[test]
    fn test_invalid_hex_is_rejected() {
        assert!(matches!(
            PerceptualHash::from_hex("xyz"),
            Err(HashError::InvalidHex { .. })
        ));
    }

    #[test]
    fn test_hash_serializes_as_hex() {
        let hash = PerceptualHash::from_hex("0a0b").unwrap();
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, "\"0a0b\"");
        let back: PerceptualHash = serde_json::from_str(&json).unwrap();
        assert_eq!(back, hash);
    }

    #[test]
    fn test_method_parsing() {
        assert_eq!("phash".parse::<HashMethod>().unwrap(), HashMethod::Phash);
        assert_eq!("DHASH".parse::<HashMethod>().unwrap(), HashMethod::Dhash);
        assert_eq!(
            "double-gradient".parse::<HashMethod>().unwrap(),
            HashMethod::DoubleGradient
        );
        assert!(matches!(
            "whash-db4".parse::<HashMethod>(),
            Err(HashError::UnknownMethod(_))
        ));
    }

    #[test]
    fn test_bit_len_is_measured_per_method() {
        assert_eq!(HashMethod::Phash.bit_len(8), 64);
        assert_eq!(HashMethod::Dhash.bit_len(8), 64);
        assert_eq!(HashMethod::DoubleGradient.bit_len(8), 40);
        assert_eq!(HashMethod::Blockhash.bit_len(6), 64);
    }

    #[test]
    fn test_hash_is_deterministic_with_expected_length() {
        let hasher = PerceptualHasher::new(HashMethod::Dhash, 8);
        let img = gradient_image(64, 64, false);
        let h1 = hasher.hash_image(&img);
        let h2 = hasher.hash_image(&img);
        assert_eq!(h1, h2);
        assert_eq!(h1.bit_len(), 64);
        assert_eq!(h1.to_hex().len(), 16);
    }

    #[test]
    fn test_resized_copy_stays_close() {
        let hasher = PerceptualHasher::new(HashMethod::Ahash, 8);
        let small = hasher.hash_image(&gradient_image(64, 64, false));
        let large = hasher.hash_image(&gradient_image(256, 256, false));
        let inverted = hasher.hash_image(&gradient_image(64, 64, true));
        assert!(small.distance(&large) <= 4);
        assert!(small.distance(&inverted) > small.distance(&large));
    }

    #[test]
    fn test_hash_source_skips_unavailable_ids() {
        let mut source = MemorySource::new();
        source.insert("a", gradient_image(32, 32, false));
        source.insert("b", gradient_image(32, 32, true));

        let ids = vec![ImageId::from("a"), ImageId::from("b"), ImageId::from("gone")];
        let outcome = PerceptualHasher::new(HashMethod::Phash, 8).hash_source(&source, &ids);

        assert_eq!(outcome.hashes.len(), 2);
        assert_eq!(outcome.failed, vec![ImageId::from("gone")]);
    }
}
