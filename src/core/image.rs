use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::UNIX_EPOCH;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("No image available for {id}")]
    Unavailable { id: ImageId },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image decoding error: {0}")]
    Image(#[from] image::ImageError),
}

/// Where pixel data and file facts for an id come from. Implementations must
/// be shareable across the rayon pool.
pub trait ImageSource: Sync {
    /// Every id this source can attempt to load, sorted.
    fn ids(&self) -> Vec<ImageId>;

    fn load(&self, id: &ImageId) -> Result<DynamicImage, SourceError>;

    /// `None` when nothing is known; callers fall back to `FileMeta::default()`.
    fn metadata(&self, id: &ImageId) -> Option<FileMeta>;
}

/// Images already decoded in memory. Mostly useful for tests and for
/// callers that fetch pixels themselves.
#[derive(Default)]
pub struct MemorySource {
    images: HashMap<ImageId, DynamicImage>,
    metadata: HashMap<ImageId, FileMeta>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<ImageId>, image: DynamicImage) {
        self.images.insert(id.into(), image);
    }

    pub fn insert_with_meta(
        &mut self,
        id: impl Into<ImageId>,
        image: DynamicImage,
        meta: FileMeta,
    ) {
        let id = id.into();
        self.metadata.insert(id.clone(), meta);
        self.images.insert(id, image);
    }
}

impl ImageSource for MemorySource {
    fn ids(&self) -> Vec<ImageId> {
        let mut ids: Vec<ImageId> = self.images.keys().cloned().collect();
        ids.sort();
        ids
    }

    fn load(&self, id: &ImageId) -> Result<DynamicImage, SourceError> {
        self.images
            .get(id)
            .cloned()
            .ok_or_else(|| SourceError::Unavailable { id: id.clone() })
    }

    fn metadata(&self, id: &ImageId) -> Option<FileMeta> {
        self.metadata.get(id).copied()
    }
}

/// Stable identifier of one image. Ordering is lexicographic on the string,
/// which is what every deterministic tie-break in the crate relies on.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageId(pub String);

impl ImageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ImageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ImageId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// File facts used only for keeper tie-breaks. `Default` is the neutral
/// value used when nothing is known about a file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMeta {
    pub size_bytes: u64,
    /// Seconds since the Unix epoch.
    pub mtime: i64,
}

impl FileMeta {
    pub fn from_path(path: &Path) -> Option<Self> {
        let metadata = fs::metadata(path).ok()?;
        let mtime = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        Some(Self {
            size_bytes: metadata.len(),
            mtime,
        })
    }
}
