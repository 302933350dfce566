// Exact duplicate detection: images whose perceptual hashes are bit-identical.

use crate::core::hash::PerceptualHash;
use crate::core::image::ImageId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExactDuplicateGroup {
    pub hash: PerceptualHash,
    /// Sorted, always at least two ids.
    pub members: Vec<ImageId>,
}

impl ExactDuplicateGroup {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

pub struct ExactDuplicateGrouper;

impl ExactDuplicateGrouper {
    pub fn new() -> Self {
        Self
    }

    /// Groups ordered by hash hex. Hash values held by a single image are
    /// not groups and are dropped.
    pub fn group(&self, hashes: &HashMap<ImageId, PerceptualHash>) -> Vec<ExactDuplicateGroup> {
        let mut by_hex: BTreeMap<&str, (&PerceptualHash, Vec<ImageId>)> = BTreeMap::new();
        for (id, hash) in hashes {
            by_hex
                .entry(hash.to_hex())
                .or_insert_with(|| (hash, Vec::new()))
                .1
                .push(id.clone());
        }

        by_hex
            .into_values()
            .filter(|(_, members)| members.len() > 1)
            .map(|(hash, mut members)| {
                members.sort();
                ExactDuplicateGroup {
                    hash: hash.clone(),
                    members,
                }
            })
            .collect()
    }
}

impl Default for ExactDuplicateGrouper {
    fn default() -> Self {
        Self::new()
    }
}
