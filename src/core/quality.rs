//! Quality pruning: an alternative to visual clustering that drops the
//! blurriest images of the population by Laplacian-variance sharpness.

use crate::core::image::{ImageId, ImageSource};
use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage};
use indicatif::{ParallelProgressIterator, ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// How the global sharpness threshold is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum SharpnessCutoff {
    /// Drop everything below the given percentile of the scored population.
    Percentile { percentile: f64 },
    /// Drop everything below a fixed score.
    Absolute { min_sharpness: f64 },
}

impl Default for SharpnessCutoff {
    fn default() -> Self {
        SharpnessCutoff::Percentile { percentile: 20.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualitySettings {
    pub cutoff: SharpnessCutoff,
    /// Images are resized so their long edge has this length; 0 disables.
    pub target_long_edge: u32,
    /// Pixels dropped from each side to ignore frames and watermarks.
    pub trim_border: u32,
}

impl Default for QualitySettings {
    fn default() -> Self {
        Self {
            cutoff: SharpnessCutoff::default(),
            target_long_edge: 256,
            trim_border: 6,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QualityScores {
    pub scores: BTreeMap<ImageId, f64>,
    pub unscored: BTreeSet<ImageId>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QualityDecision {
    /// `None` when nothing could be scored.
    pub threshold: Option<f64>,
    pub keep: BTreeSet<ImageId>,
    pub below_threshold: BTreeSet<ImageId>,
}

pub struct QualityPruner {
    settings: QualitySettings,
    show_progress: bool,
}

impl QualityPruner {
    pub fn new(settings: QualitySettings) -> Self {
        Self {
            settings,
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn settings(&self) -> &QualitySettings {
        &self.settings
    }

    pub fn sharpness(&self, image: &DynamicImage) -> f64 {
        let gray = self.prepare(image);
        laplacian_variance(&gray)
    }

    fn prepare(&self, image: &DynamicImage) -> GrayImage {
        let mut gray = image.to_luma8();
        let (width, height) = gray.dimensions();

        let target = self.settings.target_long_edge;
        let long_edge = width.max(height);
        if target > 0 && long_edge > 0 && long_edge != target {
            let scale = target as f64 / long_edge as f64;
            let new_width = ((width as f64 * scale).round() as u32).max(1);
            let new_height = ((height as f64 * scale).round() as u32).max(1);
            gray = imageops::resize(&gray, new_width, new_height, FilterType::Triangle);
        }

        let trim = self.settings.trim_border;
        let (width, height) = gray.dimensions();
        if trim > 0 && width.min(height) > 2 * trim {
            gray = imageops::crop_imm(&gray, trim, trim, width - 2 * trim, height - 2 * trim)
                .to_image();
        }

        gray
    }

    pub fn score_source<S: ImageSource + ?Sized>(
        &self,
        source: &S,
        ids: &[ImageId],
    ) -> QualityScores {
        let bar = if self.show_progress {
            let bar = ProgressBar::new(ids.len() as u64);
            let template = "{spinner:.green} Scoring [{bar:40.cyan/blue}] {pos}/{len} ({eta})";
            if let Ok(style) = ProgressStyle::with_template(template) {
                bar.set_style(style.progress_chars("=>-"));
            }
            bar
        } else {
            ProgressBar::hidden()
        };

        let results: Vec<(ImageId, Option<f64>)> = ids
            .par_iter()
            .progress_with(bar.clone())
            .map(|id| match source.load(id) {
                Ok(image) => {
                    let score = self.sharpness(&image);
                    (id.clone(), score.is_finite().then_some(score))
                }
                Err(e) => {
                    log::warn!("Skipping unreadable image {}: {}", id, e);
                    (id.clone(), None)
                }
            })
            .collect();
        bar.finish_and_clear();

        let mut out = QualityScores::default();
        for (id, score) in results {
            match score {
                Some(score) => {
                    out.scores.insert(id, score);
                }
                None => {
                    out.unscored.insert(id);
                }
            }
        }
        out
    }

    /// Keep every image scoring at or above the threshold.
    pub fn decide(&self, scores: &QualityScores) -> QualityDecision {
        let values: Vec<f64> = scores.scores.values().copied().collect();
        let threshold = match self.settings.cutoff {
            SharpnessCutoff::Percentile { percentile: p } => percentile(&values, p),
            SharpnessCutoff::Absolute { min_sharpness } => {
                (!values.is_empty()).then_some(min_sharpness)
            }
        };

        let Some(threshold) = threshold else {
            return QualityDecision::default();
        };

        let (keep, below): (Vec<_>, Vec<_>) = scores
            .scores
            .iter()
            .partition(|(_, score)| **score >= threshold);

        QualityDecision {
            threshold: Some(threshold),
            keep: keep.into_iter().map(|(id, _)| id.clone()).collect(),
            below_threshold: below.into_iter().map(|(id, _)| id.clone()).collect(),
        }
    }
}

/// Variance of the 3x3 Laplacian response over every pixel. Uses the
/// aperture-3 kernel `[2 0 2; 0 -8 0; 2 0 2]`; neighbours outside the image
/// are mirrored without repeating the edge pixel (`dcb|abcd|cba`).
pub fn laplacian_variance(image: &GrayImage) -> f64 {
    let (width, height) = image.dimensions();
    if width < 3 || height < 3 {
        return f64::NAN;
    }

    let kernel: [[f64; 3]; 3] = [[2.0, 0.0, 2.0], [0.0, -8.0, 0.0], [2.0, 0.0, 2.0]];

    let mut sum = 0.0;
    let mut sum_sq = 0.0;

    for y in 0..height {
        for x in 0..width {
            let mut response = 0.0;
            for (ky, row) in kernel.iter().enumerate() {
                for (kx, weight) in row.iter().enumerate() {
                    let sx = reflect(x as i64 + kx as i64 - 1, width);
                    let sy = reflect(y as i64 + ky as i64 - 1, height);
                    response += image.get_pixel(sx, sy)[0] as f64 * weight;
                }
            }
            sum += response;
            sum_sq += response * response;
        }
    }

    let count = (width as u64 * height as u64) as f64;
    let mean = sum / count;
    (sum_sq / count - mean * mean).max(0.0)
}

/// Mirror an index one step outside `0..len` back inside, skipping the edge.
fn reflect(i: i64, len: u32) -> u32 {
    let last = len as i64 - 1;
    let i = if i < 0 { -i } else if i > last { 2 * last - i } else { i };
    i as u32
}

/// `p`-th percentile with linear interpolation between closest ranks.
pub fn percentile(values: &[f64], p: f64) -> Option<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);

    let rank = (p.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}
