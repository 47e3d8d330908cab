use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use language_utils::{CategoryId, ItemId, Language, VocabularyItem};
use serde::{Deserialize, Serialize};
use stash::{KeyValueStore, StoreError, WriteError, read_json, try_read_json, write_json};

use crate::keys::StoredKey;
use crate::progress::{ProgressStore, SaveError};

/// An item the learner keeps getting wrong.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DifficultWordRecord {
    pub word: ItemId,
    pub category: CategoryId,
    #[serde(default)]
    pub subcategory: Option<String>,
    pub failure_count: u32,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_failure: DateTime<Utc>,
    pub translation: String,
    /// Fields written by other versions of the app, kept as-is.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl DifficultWordRecord {
    pub fn from_failure(item: &VocabularyItem, now: DateTime<Utc>) -> Self {
        Self {
            word: item.id.clone(),
            category: item.category.clone(),
            subcategory: item.subcategory.clone(),
            failure_count: 1,
            last_failure: now,
            translation: item.translation.clone(),
            extra: serde_json::Map::new(),
        }
    }

    /// Fallback item for when the content no longer has this word.
    pub fn to_item(&self, language: Language) -> VocabularyItem {
        VocabularyItem {
            id: self.word.clone(),
            word: self.word.to_string(),
            translation: self.translation.clone(),
            explanation: None,
            example: None,
            audio: None,
            category: self.category.clone(),
            subcategory: self.subcategory.clone(),
            language,
        }
    }

    fn is_recent(&self, now: DateTime<Utc>, window: chrono::Duration) -> bool {
        now.signed_duration_since(self.last_failure) < window
    }
}

/// Records failed within `window` of `now`, most-failed first (most recent
/// first among ties), at most `cap` of them.
pub fn eligible_difficult_words(
    mut records: Vec<DifficultWordRecord>,
    now: DateTime<Utc>,
    window: chrono::Duration,
    cap: usize,
) -> Vec<DifficultWordRecord> {
    records.retain(|record| record.is_recent(now, window));
    records.sort_by(|a, b| {
        b.failure_count
            .cmp(&a.failure_count)
            .then_with(|| b.last_failure.cmp(&a.last_failure))
    });
    records.truncate(cap);
    records
}

impl<S: KeyValueStore> ProgressStore<S> {
    fn read_difficult_words(&self, language: Language) -> Vec<DifficultWordRecord> {
        read_json(
            self.store(),
            &StoredKey::DifficultWords(language).render(),
        )
        .unwrap_or_default()
    }

    /// For read-modify-write: a store failure is an error, never an empty list.
    fn try_read_difficult_words(
        &self,
        language: Language,
    ) -> Result<Vec<DifficultWordRecord>, StoreError> {
        Ok(try_read_json(self.store(), &StoredKey::DifficultWords(language).render())?
            .unwrap_or_default())
    }

    /// The drillable difficult words. Pruning happens here, lazily, and is
    /// written back when it changed anything.
    pub fn load_difficult_words(
        &self,
        language: Language,
        now: DateTime<Utc>,
    ) -> Vec<DifficultWordRecord> {
        let stored = self.read_difficult_words(language);
        let stored_len = stored.len();
        let eligible = eligible_difficult_words(
            stored,
            now,
            self.settings().difficult_words_window(),
            self.settings().difficult_words_cap,
        );
        if eligible.len() != stored_len {
            log::info!(
                "Pruned difficult words for {language}: {stored_len} -> {}",
                eligible.len()
            );
            if let Err(e) = self.write_once(&StoredKey::DifficultWords(language), &eligible) {
                log::warn!("{e}");
            }
        }
        eligible
    }

    /// Count one more failure for `item`. Single attempt: losing a failure
    /// count only makes the list slightly less accurate.
    pub fn record_failure(
        &self,
        item: &VocabularyItem,
        now: DateTime<Utc>,
    ) -> Result<(), SaveError> {
        let window = self.settings().difficult_words_window();
        let key = StoredKey::DifficultWords(item.language);
        let stored = self
            .try_read_difficult_words(item.language)
            .map_err(|e| SaveError {
                key: key.render(),
                source: WriteError::Store(e),
            })?;
        let mut records: Vec<DifficultWordRecord> = stored
            .into_iter()
            .filter(|record| record.is_recent(now, window))
            .collect();

        match records
            .iter_mut()
            .find(|record| record.word == item.id && record.category == item.category)
        {
            Some(record) => {
                record.failure_count += 1;
                record.last_failure = now;
            }
            None => records.push(DifficultWordRecord::from_failure(item, now)),
        }
        self.write_once(&key, &records)
    }

    /// Drop words the learner has now mastered. Retried with backoff.
    pub async fn resolve_difficult_words(
        &self,
        language: Language,
        mastered: &[ItemId],
    ) -> Result<usize, SaveError> {
        if mastered.is_empty() {
            return Ok(0);
        }
        let mastered: BTreeSet<&ItemId> = mastered.iter().collect();
        let key = StoredKey::DifficultWords(language).render();
        stash::retry(
            self.retry_policy(),
            self.pause(),
            &format!("resolve {key}"),
            || {
                let mut records = self.try_read_difficult_words(language)?;
                let before = records.len();
                records.retain(|record| !mastered.contains(&record.word));
                write_json(self.store(), &key, &records).map(|()| before - records.len())
            },
        )
        .await
        .map_err(|source| SaveError {
            key: key.clone(),
            source,
        })
    }
}
