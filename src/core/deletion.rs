//! Turning keep decisions into the final deletion list.

use crate::core::image::ImageId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Maps an internal id to the identifier the outside world deletes by.
pub trait IdTranslator {
    fn translate(&self, id: &ImageId) -> Option<String>;
}

/// Internal and external ids are the same.
pub struct IdentityTranslator;

impl IdTranslator for IdentityTranslator {
    fn translate(&self, id: &ImageId) -> Option<String> {
        Some(id.0.clone())
    }
}

impl IdTranslator for HashMap<ImageId, String> {
    fn translate(&self, id: &ImageId) -> Option<String> {
        self.get(id).cloned()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionOutcome {
    pub keep: BTreeSet<ImageId>,
    pub delete: BTreeSet<ImageId>,
    /// Ids that were expected but never scored; in neither `keep` nor `delete`.
    pub unscored: BTreeSet<ImageId>,
    /// Sorted external ids of `delete`, minus the untranslatable ones.
    pub delete_external: Vec<String>,
    pub untranslatable: Vec<ImageId>,
}

impl DeletionOutcome {
    pub fn unscored_count(&self) -> usize {
        self.unscored.len()
    }

    pub fn untranslatable_count(&self) -> usize {
        self.untranslatable.len()
    }
}

pub struct DeletionSetResolver<'a> {
    translator: &'a dyn IdTranslator,
}

impl<'a> DeletionSetResolver<'a> {
    pub fn new(translator: &'a dyn IdTranslator) -> Self {
        Self { translator }
    }

    /// `scored` is the population (every id that was successfully hashed or
    /// scored), `unscored` the ids that failed. Keepers outside the scored
    /// population are ignored.
    pub fn resolve(
        &self,
        scored: &BTreeSet<ImageId>,
        unscored: &BTreeSet<ImageId>,
        keep: &BTreeSet<ImageId>,
    ) -> DeletionOutcome {
        let keep: BTreeSet<ImageId> = keep.intersection(scored).cloned().collect();
        let delete: BTreeSet<ImageId> = scored.difference(&keep).cloned().collect();
        let unscored: BTreeSet<ImageId> = unscored.difference(scored).cloned().collect();

        let mut delete_external = Vec::with_capacity(delete.len());
        let mut untranslatable = Vec::new();
        for id in &delete {
            match self.translator.translate(id) {
                Some(external) => delete_external.push(external),
                None => untranslatable.push(id.clone()),
            }
        }
        delete_external.sort();
        delete_external.dedup();

        if !untranslatable.is_empty() {
            log::warn!(
                "{} deleted ids have no external id and were left out of the deletion list",
                untranslatable.len()
            );
        }

        DeletionOutcome {
            keep,
            delete,
            unscored,
            delete_external,
            untranslatable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(names: &[&str]) -> BTreeSet<ImageId> {
        names.iter().map(|n| ImageId::from(*n)).collect()
    }

    #[test]
    fn test_delete_is_population_minus_keep() {
        let resolver = DeletionSetResolver::new(&IdentityTranslator);
        let outcome = resolver.resolve(&set(&["a", "b", "c"]), &set(&["d"]), &set(&["a", "c"]));

        assert_eq!(outcome.keep, set(&["a", "c"]));
        assert_eq!(outcome.delete, set(&["b"]));
        assert_eq!(outcome.unscored, set(&["d"]));
        assert_eq!(outcome.delete_external, vec!["b".to_string()]);
        assert_eq!(outcome.untranslatable_count(), 0);
    }

    #[test]
    fn test_sets_partition_population() {
        let scored = set(&["a", "b", "c", "e"]);
        let unscored = set(&["d", "f"]);
        let resolver = DeletionSetResolver::new(&IdentityTranslator);
        let outcome = resolver.resolve(&scored, &unscored, &set(&["c", "zz"]));

        let union: BTreeSet<ImageId> = outcome
            .keep
            .iter()
            .chain(&outcome.delete)
            .chain(&outcome.unscored)
            .cloned()
            .collect();
        assert_eq!(union, set(&["a", "b", "c", "d", "e", "f"]));
        assert!(outcome.keep.is_disjoint(&outcome.delete));
        assert!(outcome.keep.is_disjoint(&outcome.unscored));
        assert!(outcome.delete.is_disjoint(&outcome.unscored));
    }

    #[test]
    fn test_untranslatable_ids_are_counted_not_invented() {
        let mut table: HashMap<ImageId, String> = HashMap::new();
        table.insert("b".into(), "uuid-b".to_string());
        let resolver = DeletionSetResolver::new(&table);

        let outcome = resolver.resolve(&set(&["a", "b", "c"]), &BTreeSet::new(), &set(&["a"]));
        assert_eq!(outcome.delete, set(&["b", "c"]));
        assert_eq!(outcome.delete_external, vec!["uuid-b".to_string()]);
        assert_eq!(outcome.untranslatable, vec![ImageId::from("c")]);
    }

    #[test]
    fn test_empty_population() {
        let resolver = DeletionSetResolver::new(&IdentityTranslator);
        let outcome = resolver.resolve(&BTreeSet::new(), &BTreeSet::new(), &BTreeSet::new());
        assert_eq!(outcome, DeletionOutcome::default());
    }
}
