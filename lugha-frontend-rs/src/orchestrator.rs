use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use chrono::{DateTime, Utc};
use language_utils::{
    CategoryId, CategoryKey, CategoryKind, ContentPack, ItemId, Language, VocabularyItem,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use stash::{KeyValueStore, ListenerKey, Listeners};

use crate::audio::{AudioPlayer, Silent, play_clip};
use crate::config::{DrillConfig, DrillMode};
use crate::events::ProgressEvent;
use crate::keys::StoredKey;
use crate::migration::MigrationOutcome;
use crate::progress::{CheckpointPhase, ProgressStore, ResumableSession, SaveError};
use crate::session::{DrillSession, SessionError, SessionScope, SessionView};
use crate::tracker::{AnswerOutcome, SessionScore, SessionSummary};

#[derive(Debug, thiserror::Error)]
pub enum LessonError {
    #[error("Content unavailable: {0}")]
    ContentUnavailable(String),

    #[error("Category {0} cannot be stored: its keys collide with another progress record")]
    UnaddressableCategory(CategoryKey),

    #[error("Every item in {0} is already mastered")]
    CategoryComplete(CategoryKey),

    #[error("{0:?} sessions cannot be started from a category")]
    UnsupportedMode(DrillMode),

    #[error("No difficult words to review in {0}")]
    NoDifficultWords(Language),

    #[error("No interrupted session to resume in {0}")]
    NothingToResume(CategoryKey),

    #[error("No session is running")]
    NoActiveSession,

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Save(#[from] SaveError),
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, tsify::Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "camelCase")]
pub struct CategoryProgress {
    pub category: CategoryId,
    pub name: String,
    pub kind: CategoryKind,
    pub total: usize,
    pub mastered: usize,
    pub completed: bool,
    pub resumable: bool,
}

/// Side effects a successful completion had beyond saving the mastered set.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CompletionEffects {
    pub category_completed: bool,
    pub difficult_words_resolved: usize,
}

#[derive(Debug)]
pub struct CompletionReport {
    pub scope: SessionScope,
    pub mode: DrillMode,
    pub summary: SessionSummary,
    pub outcome: Result<CompletionEffects, SaveError>,
}

/// A finished session's results, detached from the orchestrator so they can
/// be written without holding any borrow of it.
pub struct PendingCompletion<S> {
    progress: Rc<ProgressStore<S>>,
    scope: SessionScope,
    mode: DrillMode,
    summary: SessionSummary,
    category_items: Vec<ItemId>,
}

impl<S: KeyValueStore> PendingCompletion<S> {
    pub async fn persist(self) -> CompletionReport {
        let outcome = match &self.scope {
            SessionScope::Category(key) => self.persist_category(key).await,
            SessionScope::DifficultWords(language) => self
                .progress
                .resolve_difficult_words(*language, &self.summary.mastered)
                .await
                .map(|resolved| CompletionEffects {
                    category_completed: false,
                    difficult_words_resolved: resolved,
                }),
        };
        CompletionReport {
            scope: self.scope,
            mode: self.mode,
            summary: self.summary,
            outcome,
        }
    }

    async fn persist_category(&self, key: &CategoryKey) -> Result<CompletionEffects, SaveError> {
        let stored = self
            .progress
            .save_mastered_set(key, &self.summary.mastered)
            .await?;
        if let Err(e) = self.progress.clear_resumable_session(key) {
            log::warn!("{e}");
        }

        let everything_mastered = !self.category_items.is_empty()
            && self.category_items.iter().all(|id| stored.contains(id));
        let category_completed = everything_mastered && !self.progress.is_completed(key);
        if category_completed {
            self.progress.mark_completed(key)?;
            log::info!("Completed {key}");
        }
        Ok(CompletionEffects {
            category_completed,
            difficult_words_resolved: 0,
        })
    }
}

/// Owns the current [`DrillSession`] and everything it needs from outside:
/// content, durable progress, randomness, listeners and audio.
pub struct SessionOrchestrator<S> {
    progress: Rc<ProgressStore<S>>,
    packs: BTreeMap<Language, Rc<ContentPack>>,
    configs: BTreeMap<DrillMode, DrillConfig>,
    rng: ChaCha8Rng,
    session: Option<DrillSession>,
    listeners: Listeners<ProgressEvent>,
    audio: Box<dyn AudioPlayer>,
}

impl<S: KeyValueStore> SessionOrchestrator<S> {
    pub fn new(progress: ProgressStore<S>) -> Self {
        Self::with_rng(progress, ChaCha8Rng::from_entropy())
    }

    /// Deterministic shuffles, for tests and reproducible bug reports.
    pub fn with_seed(progress: ProgressStore<S>, seed: u64) -> Self {
        Self::with_rng(progress, ChaCha8Rng::seed_from_u64(seed))
    }

    fn with_rng(progress: ProgressStore<S>, rng: ChaCha8Rng) -> Self {
        Self {
            progress: Rc::new(progress),
            packs: BTreeMap::new(),
            configs: BTreeMap::new(),
            rng,
            session: None,
            listeners: Listeners::default(),
            audio: Box::new(Silent),
        }
    }

    pub fn progress(&self) -> &ProgressStore<S> {
        &self.progress
    }

    /// Register the content for a language, replacing any earlier pack. A pack
    /// with a category whose progress could not be stored apart from the
    /// language's other records is rejected.
    pub fn add_content_pack(&mut self, pack: ContentPack) -> Result<(), LessonError> {
        if let Some(category) = pack
            .categories
            .iter()
            .map(|category| CategoryKey::new(pack.language, category.id.clone()))
            .find(|key| !StoredKey::is_addressable(key))
        {
            return Err(LessonError::UnaddressableCategory(category));
        }
        log::info!(
            "Loaded {} content: {} categories",
            pack.language,
            pack.categories.len()
        );
        self.packs.insert(pack.language, Rc::new(pack));
        Ok(())
    }

    pub fn content_pack(&self, language: Language) -> Result<Rc<ContentPack>, LessonError> {
        self.packs
            .get(&language)
            .cloned()
            .ok_or_else(|| LessonError::ContentUnavailable(format!("no content for {language}")))
    }

    pub fn config(&self, mode: DrillMode) -> DrillConfig {
        self.configs
            .get(&mode)
            .cloned()
            .unwrap_or_else(|| DrillConfig::for_mode(mode))
    }

    pub fn set_config(&mut self, config: DrillConfig) {
        self.configs.insert(config.mode, config);
    }

    pub fn set_audio_player(&mut self, player: impl AudioPlayer + 'static) {
        self.audio = Box::new(player);
    }

    pub fn subscribe(&mut self, listener: impl Fn(&ProgressEvent) + 'static) -> ListenerKey {
        self.listeners.register(listener)
    }

    pub fn unsubscribe(&mut self, key: ListenerKey) {
        self.listeners.unregister(key);
    }

    /// Call the returned notifications after releasing any borrow of `self`.
    pub fn drain_notifications(&mut self) -> Vec<Box<dyn FnOnce()>> {
        self.listeners.drain_due_notifications()
    }

    pub fn session(&self) -> Option<&DrillSession> {
        self.session.as_ref()
    }

    pub fn view(&self, now: DateTime<Utc>) -> Option<SessionView> {
        self.session.as_ref().map(|session| session.view(now))
    }

    // =======
    // starting sessions
    // =======

    /// Up to `lesson_size` items of the category the learner has not
    /// mastered yet, in content order.
    pub fn start_lesson(
        &mut self,
        mode: DrillMode,
        language: Language,
        category: &CategoryId,
        subcategory: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<&DrillSession, LessonError> {
        if mode == DrillMode::DifficultWords {
            return Err(LessonError::UnsupportedMode(mode));
        }
        let pack = self.content_pack(language)?;
        let items = pack
            .items(category, subcategory)
            .map_err(|e| LessonError::ContentUnavailable(e.to_string()))?;
        let key = CategoryKey::new(language, category.clone());
        if items.is_empty() {
            return Err(LessonError::ContentUnavailable(format!("{key} has no items")));
        }

        let mastered = self.progress.load_mastered_set(&key);
        let config = self.config(mode);
        let working_set: Vec<VocabularyItem> = items
            .into_iter()
            .filter(|item| !mastered.contains(&item.id))
            .take(config.lesson_size)
            .collect();
        if working_set.is_empty() {
            return Err(LessonError::CategoryComplete(key));
        }

        log::info!(
            "Starting {mode:?} session in {key} with {} item(s)",
            working_set.len()
        );
        let session = DrillSession::new(
            SessionScope::Category(key),
            config,
            working_set,
            SessionScore::new(),
        );
        Ok(self.install(session, now))
    }

    /// Review the words failed most in the last day.
    pub fn start_difficult_words(
        &mut self,
        language: Language,
        now: DateTime<Utc>,
    ) -> Result<&DrillSession, LessonError> {
        let records = self.progress.load_difficult_words(language, now);
        if records.is_empty() {
            return Err(LessonError::NoDifficultWords(language));
        }
        let pack = self.packs.get(&language).cloned();
        let config = self.config(DrillMode::DifficultWords);
        // the same word failed in two categories is still one item to drill;
        // records come most-failed first, so the first one wins
        let mut seen = BTreeSet::new();
        let items: Vec<VocabularyItem> = records
            .iter()
            .filter(|record| seen.insert(record.word.clone()))
            .take(config.lesson_size)
            .map(|record| {
                pack.as_ref()
                    .and_then(|pack| pack.find_item(&record.category, &record.word))
                    .unwrap_or_else(|| record.to_item(language))
            })
            .collect();

        log::info!(
            "Starting difficult-words review in {language} with {} item(s)",
            items.len()
        );
        let session = DrillSession::new(
            SessionScope::DifficultWords(language),
            config,
            items,
            SessionScore::new(),
        );
        Ok(self.install(session, now))
    }

    /// The interrupted session of a category, if there is a fresh one.
    pub fn pending_resume(
        &self,
        language: Language,
        category: &CategoryId,
        now: DateTime<Utc>,
    ) -> Option<ResumableSession> {
        self.progress
            .load_resumable_session(&CategoryKey::new(language, category.clone()), now)
    }

    pub fn resume_lesson(
        &mut self,
        language: Language,
        category: &CategoryId,
        now: DateTime<Utc>,
    ) -> Result<&DrillSession, LessonError> {
        let key = CategoryKey::new(language, category.clone());
        let checkpoint = self
            .progress
            .load_resumable_session(&key, now)
            .ok_or_else(|| LessonError::NothingToResume(key.clone()))?;
        log::info!(
            "Resuming {:?} session in {key} at {:?} {}",
            checkpoint.mode,
            checkpoint.phase,
            checkpoint.queue_position
        );

        let in_test = checkpoint.phase == CheckpointPhase::Test;
        let config = self.config(checkpoint.mode);
        self.session = Some(DrillSession::from_checkpoint(key, config, checkpoint));
        if in_test {
            self.begin_test(now)?;
        }
        self.session.as_ref().ok_or(LessonError::NoActiveSession)
    }

    fn install(&mut self, session: DrillSession, now: DateTime<Utc>) -> &DrillSession {
        if let Some(previous) = &self.session
            && previous.summary().is_none()
        {
            log::info!("Replacing an unfinished {:?} session", previous.mode());
        }
        save_checkpoint(&self.progress, &session, now);
        self.session.insert(session)
    }

    // =======
    // driving the current session
    // =======

    pub fn advance_preview(&mut self, now: DateTime<Utc>) -> Result<bool, LessonError> {
        let session = self.session.as_mut().ok_or(LessonError::NoActiveSession)?;
        let more = session.advance_preview()?;
        save_checkpoint(&self.progress, session, now);
        Ok(more)
    }

    pub fn begin_test(&mut self, now: DateTime<Utc>) -> Result<&DrillSession, LessonError> {
        let session = self.session.as_mut().ok_or(LessonError::NoActiveSession)?;
        let pack = self.packs.get(&session.scope().language()).cloned();
        let siblings: Vec<String> = session
            .items()
            .iter()
            .map(|item| item.translation.clone())
            .collect();
        let pool_for = |item: &VocabularyItem| {
            let mut pool: Vec<String> = pack
                .as_ref()
                .map(|pack| {
                    pack.translation_pool(&item.category)
                        .into_iter()
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            pool.extend(siblings.iter().cloned());
            pool
        };

        session.begin_test(pool_for, &mut self.rng, now)?;
        save_checkpoint(&self.progress, session, now);
        Ok(session)
    }

    pub fn submit_answer(
        &mut self,
        item: &ItemId,
        answer: &str,
        now: DateTime<Utc>,
    ) -> Result<AnswerOutcome, LessonError> {
        let session = self.session.as_mut().ok_or(LessonError::NoActiveSession)?;
        let outcome = session.submit_answer(item, answer, now)?;
        self.after_answer(&outcome, now);
        Ok(outcome)
    }

    /// For the host's timer: the current question ran out of time.
    pub fn expire_question(&mut self, now: DateTime<Utc>) -> Result<AnswerOutcome, LessonError> {
        let session = self.session.as_mut().ok_or(LessonError::NoActiveSession)?;
        let outcome = session.expire_question(now)?;
        self.after_answer(&outcome, now);
        Ok(outcome)
    }

    fn after_answer(&mut self, outcome: &AnswerOutcome, now: DateTime<Utc>) {
        let Some(session) = &self.session else {
            return;
        };
        if !outcome.is_correct
            && session.config().records_failures
            && let Some(item) = session.item(&outcome.item)
        {
            match self.progress.record_failure(item, now) {
                Ok(()) => self.listeners.queue(ProgressEvent::DifficultWordsChanged {
                    language: item.language,
                }),
                Err(e) => log::warn!("{e}"),
            }
        }
        save_checkpoint(&self.progress, session, now);
    }

    /// Play the clip for whatever is on screen. Never fails.
    pub fn play_audio(&self) -> bool {
        let Some(session) = &self.session else {
            return false;
        };
        let source = match session.current_prompt() {
            Some(prompt) => prompt.audio.as_deref(),
            None => session.preview_item().and_then(|item| item.audio.as_deref()),
        };
        play_clip(self.audio.as_ref(), source)
    }

    /// Leave the session without saving results. Only the in-progress marker
    /// is touched.
    pub fn abandon(&mut self) -> Result<(), LessonError> {
        let session = self.session.take().ok_or(LessonError::NoActiveSession)?;
        log::info!("Abandoning {:?} session", session.mode());
        if let Some(key) = session.scope().category() {
            self.progress.clear_resumable_session(key)?;
        }
        Ok(())
    }

    // =======
    // completion
    // =======

    /// Claim the current session's results for persistence. `None` if the
    /// session is not finished or its results were already claimed, which
    /// makes repeated calls (e.g. from re-renders) harmless.
    pub fn take_completion(&mut self) -> Option<PendingCompletion<S>> {
        let session = self.session.as_mut()?;
        if !session.claim_persistence() {
            return None;
        }
        let summary = session.summary()?.clone();
        let category_items = match session.scope() {
            SessionScope::Category(key) => self
                .packs
                .get(&key.language)
                .and_then(|pack| pack.items(&key.category, None).ok())
                .map(|items| items.into_iter().map(|item| item.id).collect())
                .unwrap_or_default(),
            SessionScope::DifficultWords(_) => Vec::new(),
        };
        Some(PendingCompletion {
            progress: Rc::clone(&self.progress),
            scope: session.scope().clone(),
            mode: session.mode(),
            summary,
            category_items,
        })
    }

    /// Publish what a completion did. A failed save gives the claim back so
    /// the learner can retry.
    pub fn settle(&mut self, report: &CompletionReport) {
        match &report.outcome {
            Ok(effects) => {
                self.listeners.queue(ProgressEvent::SessionCompleted {
                    language: report.scope.language(),
                    category: report.scope.category().map(|key| key.category.to_string()),
                    mode: report.mode,
                    summary: report.summary.clone(),
                });
                if effects.category_completed
                    && let Some(key) = report.scope.category()
                {
                    self.listeners.queue(ProgressEvent::category_completed(key));
                }
                if effects.difficult_words_resolved > 0 {
                    self.listeners.queue(ProgressEvent::DifficultWordsChanged {
                        language: report.scope.language(),
                    });
                }
            }
            Err(e) => {
                log::error!("Session results were not saved: {e}");
                self.listeners.queue(ProgressEvent::save_failed(e));
                if let Some(session) = &mut self.session
                    && session.is_persisted()
                    && session.scope() == &report.scope
                {
                    session.release_persistence();
                }
            }
        }
    }

    /// Persist the finished session exactly once. Never holds a borrow of
    /// `this` across the save.
    pub async fn complete_session(this: &RefCell<Self>) -> Option<CompletionReport> {
        let pending = this.borrow_mut().take_completion()?;
        let report = pending.persist().await;
        let notifications = {
            let mut orchestrator = this.borrow_mut();
            orchestrator.settle(&report);
            orchestrator.drain_notifications()
        };
        for notification in notifications {
            notification();
        }
        Some(report)
    }

    // =======
    // durable progress
    // =======

    pub async fn migrate(
        this: &RefCell<Self>,
        language: Language,
    ) -> Result<MigrationOutcome, LessonError> {
        let (progress, pack) = {
            let orchestrator = this.borrow();
            (
                Rc::clone(&orchestrator.progress),
                orchestrator.content_pack(language)?,
            )
        };
        let result = progress.migrate_to_categories(&pack).await;
        let notifications = {
            let mut orchestrator = this.borrow_mut();
            if let Err(e) = &result {
                orchestrator.listeners.queue(ProgressEvent::save_failed(e));
            }
            orchestrator.drain_notifications()
        };
        for notification in notifications {
            notification();
        }
        Ok(result?)
    }

    pub fn category_progress(
        &self,
        language: Language,
        category: &CategoryId,
        now: DateTime<Utc>,
    ) -> Result<CategoryProgress, LessonError> {
        let pack = self.content_pack(language)?;
        let found = pack
            .category(category)
            .ok_or_else(|| LessonError::ContentUnavailable(format!("no category {category}")))?;
        let key = CategoryKey::new(language, category.clone());
        let mastered = self.progress.load_mastered_set(&key);
        let items = pack
            .items(category, None)
            .map_err(|e| LessonError::ContentUnavailable(e.to_string()))?;
        Ok(CategoryProgress {
            category: category.clone(),
            name: found.name.clone(),
            kind: found.kind,
            total: items.len(),
            mastered: items.iter().filter(|item| mastered.contains(&item.id)).count(),
            completed: self.progress.is_completed(&key),
            resumable: self.progress.load_resumable_session(&key, now).is_some(),
        })
    }

    pub fn course_progress(
        &self,
        language: Language,
        now: DateTime<Utc>,
    ) -> Result<Vec<CategoryProgress>, LessonError> {
        let pack = self.content_pack(language)?;
        pack.categories
            .iter()
            .map(|category| self.category_progress(language, &category.id, now))
            .collect()
    }

    pub fn reset_category(
        &mut self,
        language: Language,
        category: &CategoryId,
    ) -> Result<(), LessonError> {
        let key = CategoryKey::new(language, category.clone());
        log::info!("Resetting {key}");
        self.progress.reset_category(&key)?;
        Ok(())
    }
}

fn save_checkpoint<S: KeyValueStore>(
    progress: &ProgressStore<S>,
    session: &DrillSession,
    now: DateTime<Utc>,
) {
    let (Some(key), Some(checkpoint)) = (session.scope().category(), session.checkpoint(now))
    else {
        return;
    };
    if let Err(e) = progress.save_resumable_session(key, &checkpoint) {
        log::warn!("Checkpoint not saved: {e}");
    }
}
