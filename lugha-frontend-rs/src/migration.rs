//! Splits the pre-category `{language}-learnedWords` list into per-category sets.

use std::collections::{BTreeMap, BTreeSet};

use language_utils::{CategoryId, CategoryKey, ContentPack, ItemId};
use serde::{Deserialize, Serialize};
use stash::{KeyValueStore, read_json};

use crate::keys::StoredKey;
use crate::progress::{ProgressStore, SaveError};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, tsify::Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MigrationOutcome {
    AlreadyDone,
    NothingToMigrate,
    #[serde(rename_all = "camelCase")]
    Migrated {
        categories: usize,
        words: usize,
        /// Words no category of the current content contains. They are dropped.
        orphaned: Vec<ItemId>,
    },
}

/// Which categories each legacy word belongs to. A word shared by several
/// categories counts as learned in all of them.
pub fn plan_migration(
    pack: &ContentPack,
    legacy: &[ItemId],
) -> (BTreeMap<CategoryId, Vec<ItemId>>, Vec<ItemId>) {
    let mut plan: BTreeMap<CategoryId, Vec<ItemId>> = BTreeMap::new();
    let mut orphaned = Vec::new();
    let unique: BTreeSet<&ItemId> = legacy.iter().collect();
    for id in unique {
        let homes = pack.categories_containing(id);
        if homes.is_empty() {
            orphaned.push(id.clone());
        }
        for category in homes {
            plan.entry(category).or_default().push(id.clone());
        }
    }
    (plan, orphaned)
}

impl<S: KeyValueStore> ProgressStore<S> {
    pub fn migration_done(&self, pack: &ContentPack) -> bool {
        read_json(
            self.store(),
            &StoredKey::MigrationMarker(pack.language).render(),
        )
        .unwrap_or(false)
    }

    /// Runs at most once per language: the marker is only written after every
    /// category set has been saved, so a failed run is retried next launch.
    pub async fn migrate_to_categories(
        &self,
        pack: &ContentPack,
    ) -> Result<MigrationOutcome, SaveError> {
        let language = pack.language;
        if self.migration_done(pack) {
            return Ok(MigrationOutcome::AlreadyDone);
        }

        let legacy_key = StoredKey::LegacyLearnedWords(language);
        let legacy: Vec<ItemId> = read_json(self.store(), &legacy_key.render()).unwrap_or_default();
        if legacy.is_empty() {
            self.write_once(&StoredKey::MigrationMarker(language), &true)?;
            return Ok(MigrationOutcome::NothingToMigrate);
        }

        let (plan, orphaned) = plan_migration(pack, &legacy);
        for (category, ids) in &plan {
            self.save_mastered_set(&CategoryKey::new(language, category.clone()), ids)
                .await
                .inspect_err(|e| log::error!("Migration of {language} stopped: {e}"))?;
        }
        if !orphaned.is_empty() {
            log::warn!(
                "{} legacy {language} word(s) are in no category: {orphaned:?}",
                orphaned.len()
            );
        }

        self.write_once(&StoredKey::MigrationMarker(language), &true)?;
        if let Err(e) = self.remove_once(&legacy_key) {
            log::warn!("{e}");
        }

        let words = plan.values().map(Vec::len).sum();
        log::info!(
            "Migrated {words} {language} word(s) into {} categories",
            plan.len()
        );
        Ok(MigrationOutcome::Migrated {
            categories: plan.len(),
            words,
            orphaned,
        })
    }
}
