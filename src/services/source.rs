use crate::core::image::{FileMeta, ImageId, ImageSource, SourceError};
use anyhow::{Context, Result};
use image::{DynamicImage, ImageReader};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use walkdir::WalkDir;

const ALLOWED_EXTS: [&str; 8] = ["png", "jpg", "jpeg", "bmp", "gif", "webp", "tiff", "tif"];

pub fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|ext| ALLOWED_EXTS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Locally cached images keyed by file stem (`<dir>/<id>.jpg` and friends).
#[derive(Debug, Clone, Default)]
pub struct ImageDirectory {
    paths: BTreeMap<ImageId, PathBuf>,
}

impl ImageDirectory {
    pub fn from_paths(paths: impl IntoIterator<Item = (ImageId, PathBuf)>) -> Self {
        Self {
            paths: paths.into_iter().collect(),
        }
    }

    /// Walk `dir` (only its top level unless `recursive`) and index every
    /// image by file stem. When two files share a stem the first path in
    /// sorted order wins.
    pub fn scan(dir: &Path, recursive: bool) -> Result<Self> {
        if !dir.is_dir() {
            anyhow::bail!("Directory not found: {}", dir.display());
        }

        let spinner = ProgressBar::new_spinner();
        spinner.set_style(ProgressStyle::with_template("{spinner:.green} {msg}")?);
        spinner.set_message("Scanning for images…");
        spinner.enable_steady_tick(Duration::from_millis(100));

        let max_depth = if recursive { usize::MAX } else { 1 };
        let mut found: Vec<PathBuf> = Vec::new();
        for entry in WalkDir::new(dir).max_depth(max_depth) {
            let entry = entry.with_context(|| format!("Failed to read {}", dir.display()))?;
            let path = entry.path();
            if path.is_file() && is_image(path) {
                found.push(path.to_path_buf());
            }
            spinner.tick();
        }
        spinner.finish_and_clear();
        found.sort();

        let mut paths: BTreeMap<ImageId, PathBuf> = BTreeMap::new();
        for path in found {
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                log::warn!("Skipping file with non UTF-8 name: {}", path.display());
                continue;
            };
            let id = ImageId::from(stem);
            if let Some(existing) = paths.get(&id) {
                log::warn!(
                    "Ignoring {}: id {} already taken by {}",
                    path.display(),
                    id,
                    existing.display()
                );
                continue;
            }
            paths.insert(id, path);
        }

        log::info!("found {} images in {}", paths.len(), dir.display());
        Ok(Self { paths })
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn path(&self, id: &ImageId) -> Option<&Path> {
        self.paths.get(id).map(PathBuf::as_path)
    }
}

impl ImageSource for ImageDirectory {
    fn ids(&self) -> Vec<ImageId> {
        self.paths.keys().cloned().collect()
    }

    fn load(&self, id: &ImageId) -> Result<DynamicImage, SourceError> {
        let path = self
            .paths
            .get(id)
            .ok_or_else(|| SourceError::Unavailable { id: id.clone() })?;
        Ok(ImageReader::open(path)?.decode()?)
    }

    fn metadata(&self, id: &ImageId) -> Option<FileMeta> {
        self.paths.get(id).and_then(|p| FileMeta::from_path(p))
    }
}
