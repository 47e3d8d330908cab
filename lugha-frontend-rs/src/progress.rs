//! Durable learner progress on top of a [`KeyValueStore`].
//!
//! Reads never fail: absent or malformed values come back as the empty/default
//! state. Writes report a [`SaveError`] so the caller can warn the learner.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use language_utils::{CategoryId, CategoryKey, ItemId, Language, VocabularyItem};
use serde::{Deserialize, Serialize};
use stash::{
    Immediate, KeyValueStore, Pause, RetryPolicy, WriteError, read_json, try_read_json, write_json,
};

use crate::config::{DrillMode, Settings};
use crate::keys::StoredKey;
use crate::tracker::SessionScore;

#[derive(Debug, thiserror::Error)]
#[error("Could not save progress to {key}: {source}")]
pub struct SaveError {
    pub key: String,
    #[source]
    pub source: WriteError,
}

#[derive(Copy, Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum CheckpointPhase {
    #[default]
    Preview,
    Test,
}

/// `{language}-{category}-inProgress`: enough to pick an interrupted session back up.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResumableSession {
    pub items: Vec<VocabularyItem>,
    pub scores: SessionScore,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    pub mode: DrillMode,
    /// Preview position while previewing, questions answered while testing.
    pub queue_position: usize,
    #[serde(default)]
    pub phase: CheckpointPhase,
}

impl ResumableSession {
    pub fn is_fresh(&self, now: DateTime<Utc>, window: chrono::Duration) -> bool {
        now.signed_duration_since(self.timestamp) < window
    }
}

pub struct ProgressStore<S> {
    store: S,
    settings: Settings,
    pause: Box<dyn Pause>,
}

impl<S> std::fmt::Debug for ProgressStore<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressStore")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl<S: KeyValueStore> ProgressStore<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            settings: Settings::default(),
            pause: Box::new(Immediate),
        }
    }

    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_pause(mut self, pause: impl Pause + 'static) -> Self {
        self.pause = Box::new(pause);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub(crate) fn retry_policy(&self) -> &RetryPolicy {
        &self.settings.retry
    }

    pub(crate) fn pause(&self) -> &dyn Pause {
        self.pause.as_ref()
    }

    /// One write attempt, no retries. For data whose loss is recoverable.
    pub(crate) fn write_once<T: Serialize + ?Sized>(
        &self,
        key: &StoredKey,
        value: &T,
    ) -> Result<(), SaveError> {
        let key = key.render();
        write_json(&self.store, &key, value).map_err(|source| SaveError { key, source })
    }

    pub(crate) fn remove_once(&self, key: &StoredKey) -> Result<(), SaveError> {
        let key = key.render();
        self.store.remove(&key).map_err(|e| SaveError {
            key,
            source: WriteError::Store(e),
        })
    }

    pub fn load_mastered_set(&self, key: &CategoryKey) -> BTreeSet<ItemId> {
        read_json(&self.store, &StoredKey::LearnedWords(key.clone()).render()).unwrap_or_default()
    }

    /// Union `ids` into the stored set. Idempotent; retried with backoff.
    /// Returns the set as stored.
    pub async fn save_mastered_set(
        &self,
        key: &CategoryKey,
        ids: &[ItemId],
    ) -> Result<BTreeSet<ItemId>, SaveError> {
        let storage_key = StoredKey::LearnedWords(key.clone()).render();
        stash::retry(
            &self.settings.retry,
            self.pause.as_ref(),
            &format!("save {storage_key}"),
            || {
                // re-read on every attempt so a concurrent session's additions survive;
                // an unreadable store fails the attempt rather than merging into nothing
                let mut merged: BTreeSet<ItemId> =
                    try_read_json(&self.store, &storage_key)?.unwrap_or_default();
                merged.extend(ids.iter().cloned());
                write_json(&self.store, &storage_key, &merged).map(|()| merged)
            },
        )
        .await
        .map_err(|source| SaveError {
            key: storage_key.clone(),
            source,
        })
    }

    /// Returns the checkpoint if it is within the freshness window. A stale one
    /// is removed and reported as absent.
    pub fn load_resumable_session(
        &self,
        key: &CategoryKey,
        now: DateTime<Utc>,
    ) -> Option<ResumableSession> {
        let stored_key = StoredKey::InProgress(key.clone());
        let session: ResumableSession = read_json(&self.store, &stored_key.render())?;
        if session.is_fresh(now, self.settings.resume_window()) {
            return Some(session);
        }
        log::info!(
            "Discarding expired session for {key} from {}",
            session.timestamp
        );
        if let Err(e) = self.remove_once(&stored_key) {
            log::warn!("{e}");
        }
        None
    }

    pub fn save_resumable_session(
        &self,
        key: &CategoryKey,
        session: &ResumableSession,
    ) -> Result<(), SaveError> {
        self.write_once(&StoredKey::InProgress(key.clone()), session)
    }

    pub fn clear_resumable_session(&self, key: &CategoryKey) -> Result<(), SaveError> {
        self.remove_once(&StoredKey::InProgress(key.clone()))
    }

    pub fn is_completed(&self, key: &CategoryKey) -> bool {
        read_json(&self.store, &StoredKey::Completed(key.clone()).render()).unwrap_or(false)
    }

    pub fn mark_completed(&self, key: &CategoryKey) -> Result<(), SaveError> {
        self.write_once(&StoredKey::Completed(key.clone()), &true)
    }

    /// Forget everything learned in a category. The only way items leave the
    /// mastered set.
    pub fn reset_category(&self, key: &CategoryKey) -> Result<(), SaveError> {
        self.remove_once(&StoredKey::LearnedWords(key.clone()))?;
        self.remove_once(&StoredKey::Completed(key.clone()))?;
        self.remove_once(&StoredKey::InProgress(key.clone()))
    }

    /// Categories of `language` that have a stored learned set.
    pub fn tracked_categories(&self, language: Language) -> Vec<CategoryId> {
        let keys = match self.store.keys() {
            Ok(keys) => keys,
            Err(e) => {
                log::error!("Failed to list stored keys: {e}");
                return Vec::new();
            }
        };
        keys.iter()
            .filter_map(|raw| match StoredKey::parse(raw)? {
                StoredKey::LearnedWords(key) if key.language == language => Some(key.category),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use stash::MemoryStore;

    fn key() -> CategoryKey {
        CategoryKey::new(Language::Swahili, CategoryId::new("food"))
    }

    fn ids(words: &[&str]) -> Vec<ItemId> {
        words.iter().map(|w| ItemId::from_surface(w)).collect()
    }

    #[test]
    fn save_is_a_union() {
        let progress = ProgressStore::new(MemoryStore::new());
        block_on(progress.save_mastered_set(&key(), &ids(&["chai", "maji"]))).unwrap();
        let stored = block_on(progress.save_mastered_set(&key(), &ids(&["maji", "wali"]))).unwrap();
        assert_eq!(stored, ids(&["chai", "maji", "wali"]).into_iter().collect::<BTreeSet<_>>());
        assert_eq!(progress.load_mastered_set(&key()), stored);
    }

    #[test]
    fn save_is_idempotent() {
        let progress = ProgressStore::new(MemoryStore::new());
        block_on(progress.save_mastered_set(&key(), &ids(&["chai"]))).unwrap();
        let once = progress.store().snapshot();
        block_on(progress.save_mastered_set(&key(), &ids(&["chai"]))).unwrap();
        assert_eq!(progress.store().snapshot(), once);
    }

    #[test]
    fn malformed_mastered_set_reads_as_empty() {
        let store = MemoryStore::new();
        store.set("sw-food-learnedWords", "{\"oops\":").unwrap();
        let progress = ProgressStore::new(store);
        assert!(progress.load_mastered_set(&key()).is_empty());

        // and a save over it starts from scratch instead of failing
        block_on(progress.save_mastered_set(&key(), &ids(&["chai"]))).unwrap();
        assert_eq!(progress.load_mastered_set(&key()), ids(&["chai"]).into_iter().collect::<BTreeSet<_>>());
    }

    #[test]
    fn save_retries_then_reports() {
        let progress = ProgressStore::new(MemoryStore::new());
        progress.store().fail_writes(2);
        assert!(block_on(progress.save_mastered_set(&key(), &ids(&["chai"]))).is_ok());

        progress.store().fail_writes(3);
        let err = block_on(progress.save_mastered_set(&key(), &ids(&["maji"]))).unwrap_err();
        assert_eq!(err.key, "sw-food-learnedWords");
        assert_eq!(progress.load_mastered_set(&key()), ids(&["chai"]).into_iter().collect::<BTreeSet<_>>());
    }

    #[test]
    fn unreadable_store_never_shrinks_the_mastered_set() {
        let progress = ProgressStore::new(MemoryStore::new());
        block_on(progress.save_mastered_set(&key(), &ids(&["chai", "maji"]))).unwrap();

        progress.store().fail_reads(1);
        let stored = block_on(progress.save_mastered_set(&key(), &ids(&["wali"]))).unwrap();
        assert_eq!(stored, ids(&["chai", "maji", "wali"]).into_iter().collect::<BTreeSet<_>>());

        progress.store().fail_reads(10);
        let err = block_on(progress.save_mastered_set(&key(), &ids(&["ndizi"]))).unwrap_err();
        assert!(matches!(err.source, WriteError::Store(_)));
        progress.store().fail_reads(0);
        assert_eq!(progress.load_mastered_set(&key()), stored);
    }

    #[test]
    fn resumable_session_respects_freshness_window() {
        let progress = ProgressStore::new(MemoryStore::new());
        let now = Utc::now();
        let session = ResumableSession {
            items: Vec::new(),
            scores: [(ItemId::from_surface("chai"), 2)].into_iter().collect(),
            timestamp: now - chrono::Duration::hours(25),
            mode: DrillMode::Learn,
            queue_position: 4,
            phase: CheckpointPhase::Test,
        };
        progress.save_resumable_session(&key(), &session).unwrap();
        assert_eq!(progress.load_resumable_session(&key(), now), None);
        assert_eq!(progress.store().get("sw-food-inProgress").unwrap(), None);

        let fresh = ResumableSession {
            timestamp: now - chrono::Duration::hours(23),
            ..session
        };
        progress.save_resumable_session(&key(), &fresh).unwrap();
        let loaded = progress.load_resumable_session(&key(), now).unwrap();
        assert_eq!(loaded.scores, fresh.scores);
        assert_eq!(loaded.queue_position, 4);

        progress.clear_resumable_session(&key()).unwrap();
        assert_eq!(progress.load_resumable_session(&key(), now), None);
    }

    #[test]
    fn checkpoint_uses_legacy_field_names() {
        let progress = ProgressStore::new(MemoryStore::new());
        let session = ResumableSession {
            items: Vec::new(),
            scores: SessionScore::new(),
            timestamp: DateTime::from_timestamp_millis(1_700_000_000_000).unwrap(),
            mode: DrillMode::Grammar,
            queue_position: 1,
            phase: CheckpointPhase::Preview,
        };
        progress.save_resumable_session(&key(), &session).unwrap();
        let raw: serde_json::Value = serde_json::from_str(
            &progress.store().get("sw-food-inProgress").unwrap().unwrap(),
        )
        .unwrap();
        assert_eq!(raw["timestamp"], 1_700_000_000_000i64);
        assert_eq!(raw["mode"], "grammar");
        assert_eq!(raw["queuePosition"], 1);
    }

    #[test]
    fn reset_clears_category_state() {
        let progress = ProgressStore::new(MemoryStore::new());
        block_on(progress.save_mastered_set(&key(), &ids(&["chai"]))).unwrap();
        progress.mark_completed(&key()).unwrap();
        assert!(progress.is_completed(&key()));

        progress.reset_category(&key()).unwrap();
        assert!(progress.load_mastered_set(&key()).is_empty());
        assert!(!progress.is_completed(&key()));
    }

    #[test]
    fn lists_tracked_categories_per_language() {
        let progress = ProgressStore::new(MemoryStore::new());
        block_on(progress.save_mastered_set(&key(), &ids(&["chai"]))).unwrap();
        let zulu = CategoryKey::new(Language::Zulu, CategoryId::new("food"));
        block_on(progress.save_mastered_set(&zulu, &ids(&["amanzi"]))).unwrap();
        progress.mark_completed(&key()).unwrap();

        assert_eq!(
            progress.tracked_categories(Language::Swahili),
            vec![CategoryId::new("food")]
        );
    }
}
