//! One drill, from preview to summary.
//!
//! ```text
//! Preview ──begin_test──▶ Test ──queue empty──▶ Summary
//! ```
//!
//! Strictly linear; the only way back is starting a new session. Nothing in
//! here touches storage: the orchestrator reads [`DrillSession::checkpoint`]
//! and [`DrillSession::summary`] and persists them.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use language_utils::{CategoryKey, ItemId, Language, VocabularyItem};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::{DrillConfig, DrillMode};
use crate::progress::{CheckpointPhase, ResumableSession};
use crate::prompt::{Prompt, PromptError, build_prompt};
use crate::tracker::{
    AnswerOutcome, MasteryTracker, SessionScore, SessionSummary, TrackerError,
    required_repetitions,
};

/// Where a session's items come from, and so where its results go.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionScope {
    Category(CategoryKey),
    DifficultWords(Language),
}

impl SessionScope {
    pub fn language(&self) -> Language {
        match self {
            SessionScope::Category(key) => key.language,
            SessionScope::DifficultWords(language) => *language,
        }
    }

    pub fn category(&self) -> Option<&CategoryKey> {
        match self {
            SessionScope::Category(key) => Some(key),
            SessionScope::DifficultWords(_) => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Phase {
    Preview { position: usize },
    Test,
    Summary(SessionSummary),
}

#[derive(Copy, Clone, Debug, Serialize, Deserialize, PartialEq, Eq, tsify::Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "camelCase")]
pub enum PhaseKind {
    Preview,
    Test,
    Summary,
}

impl Phase {
    pub fn kind(&self) -> PhaseKind {
        match self {
            Phase::Preview { .. } => PhaseKind::Preview,
            Phase::Test => PhaseKind::Test,
            Phase::Summary(_) => PhaseKind::Summary,
        }
    }
}

/// When the current question was put in front of the learner.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct QuestionClock {
    presented_at: DateTime<Utc>,
    limit: chrono::Duration,
}

impl QuestionClock {
    pub fn start(now: DateTime<Utc>, limit: chrono::Duration) -> Self {
        Self {
            presented_at: now,
            limit,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.presented_at) >= self.limit
    }

    pub fn time_left(&self, now: DateTime<Utc>) -> chrono::Duration {
        (self.limit - now.signed_duration_since(self.presented_at)).max(chrono::Duration::zero())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Prompt(#[from] PromptError),

    #[error(transparent)]
    Tracker(#[from] TrackerError),

    #[error("Nothing to test: the session has no items")]
    NothingToTest,

    #[error("Cannot {action} during {phase:?}")]
    WrongPhase {
        action: &'static str,
        phase: PhaseKind,
    },

    #[error("The current question has not run out of time")]
    QuestionNotExpired,
}

/// What the presentation layer renders.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, tsify::Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub mode: DrillMode,
    pub phase: PhaseKind,
    pub items: Vec<VocabularyItem>,
    pub preview_position: Option<usize>,
    pub prompt: Option<Prompt>,
    pub answered: usize,
    pub remaining: usize,
    pub time_left_ms: Option<i64>,
    pub summary: Option<SessionSummary>,
}

#[derive(Clone, Debug)]
pub struct DrillSession {
    scope: SessionScope,
    config: DrillConfig,
    items: Vec<VocabularyItem>,
    prior_scores: SessionScore,
    prompts: BTreeMap<ItemId, Prompt>,
    tracker: Option<MasteryTracker>,
    phase: Phase,
    clock: Option<QuestionClock>,
    persisted: bool,
}

impl DrillSession {
    pub fn new(
        scope: SessionScope,
        config: DrillConfig,
        items: Vec<VocabularyItem>,
        prior_scores: SessionScore,
    ) -> Self {
        Self {
            scope,
            config,
            items,
            prior_scores,
            prompts: BTreeMap::new(),
            tracker: None,
            phase: Phase::Preview { position: 0 },
            clock: None,
            persisted: false,
        }
    }

    /// Back in preview at the saved position. A checkpoint taken during the
    /// test still needs [`DrillSession::begin_test`] to rebuild its queue.
    pub fn from_checkpoint(
        key: CategoryKey,
        config: DrillConfig,
        checkpoint: ResumableSession,
    ) -> Self {
        let position = match checkpoint.phase {
            CheckpointPhase::Preview => checkpoint.queue_position.min(checkpoint.items.len()),
            CheckpointPhase::Test => checkpoint.items.len(),
        };
        Self {
            phase: Phase::Preview { position },
            ..Self::new(
                SessionScope::Category(key),
                config,
                checkpoint.items,
                checkpoint.scores,
            )
        }
    }

    pub fn scope(&self) -> &SessionScope {
        &self.scope
    }

    pub fn config(&self) -> &DrillConfig {
        &self.config
    }

    pub fn mode(&self) -> DrillMode {
        self.config.mode
    }

    pub fn items(&self) -> &[VocabularyItem] {
        &self.items
    }

    pub fn item(&self, id: &ItemId) -> Option<&VocabularyItem> {
        self.items.iter().find(|item| &item.id == id)
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn preview_item(&self) -> Option<&VocabularyItem> {
        match self.phase {
            Phase::Preview { position } => self.items.get(position),
            _ => None,
        }
    }

    /// Move to the next item to preview. Returns whether there is one.
    pub fn advance_preview(&mut self) -> Result<bool, SessionError> {
        let len = self.items.len();
        match &mut self.phase {
            Phase::Preview { position } => {
                *position = (*position + 1).min(len);
                Ok(*position < len)
            }
            phase => Err(SessionError::WrongPhase {
                action: "advance the preview",
                phase: phase.kind(),
            }),
        }
    }

    /// Build every prompt and the question queue. Any prompt failure leaves
    /// the session in preview. An already-finished queue goes straight to
    /// the summary.
    pub fn begin_test(
        &mut self,
        pool_for: impl Fn(&VocabularyItem) -> Vec<String>,
        rng: &mut impl Rng,
        now: DateTime<Utc>,
    ) -> Result<&Phase, SessionError> {
        if !matches!(self.phase, Phase::Preview { .. }) {
            return Err(self.wrong_phase("begin the test"));
        }
        if self.items.is_empty() {
            return Err(SessionError::NothingToTest);
        }

        let mut prompts = BTreeMap::new();
        for item in &self.items {
            let prior = self.prior_scores.get(&item.id).copied().unwrap_or(0);
            if required_repetitions(prior, self.config.tests_per_word) == 0 {
                continue;
            }
            let pool = pool_for(item);
            let pool: Vec<&str> = pool.iter().map(String::as_str).collect();
            let prompt = build_prompt(item, &pool, self.config.options_count, rng)
                .inspect_err(|e| log::error!("Cannot start the test: {e}"))?;
            prompts.insert(item.id.clone(), prompt);
        }

        let tracker = MasteryTracker::new(
            &self.items,
            &self.prior_scores,
            self.config.tests_per_word,
            rng,
        );
        self.prompts = prompts;
        if tracker.is_finished() {
            self.phase = Phase::Summary(tracker.finalize(self.config.xp_per_item));
        } else {
            self.phase = Phase::Test;
            self.clock = self.start_clock(now);
        }
        self.tracker = Some(tracker);
        Ok(&self.phase)
    }

    pub fn current_prompt(&self) -> Option<&Prompt> {
        if self.phase != Phase::Test {
            return None;
        }
        self.prompts.get(self.tracker.as_ref()?.head()?)
    }

    /// Grade an answer to the current question. Past the question's deadline
    /// the answer is ignored and graded as wrong.
    pub fn submit_answer(
        &mut self,
        item: &ItemId,
        answer: &str,
        now: DateTime<Utc>,
    ) -> Result<AnswerOutcome, SessionError> {
        let timed_out = self.clock.is_some_and(|clock| clock.is_expired(now));
        self.grade(item, (!timed_out).then_some(answer), now)
    }

    /// Submit the automatic wrong answer for a question whose time ran out.
    pub fn expire_question(&mut self, now: DateTime<Utc>) -> Result<AnswerOutcome, SessionError> {
        if self.phase != Phase::Test {
            return Err(self.wrong_phase("expire a question"));
        }
        if !self.clock.is_some_and(|clock| clock.is_expired(now)) {
            return Err(SessionError::QuestionNotExpired);
        }
        let head = self
            .tracker
            .as_ref()
            .and_then(MasteryTracker::head)
            .cloned()
            .ok_or(TrackerError::QueueEmpty)?;
        self.grade(&head, None, now)
    }

    fn grade(
        &mut self,
        item: &ItemId,
        answer: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<AnswerOutcome, SessionError> {
        if self.phase != Phase::Test {
            return Err(self.wrong_phase("answer"));
        }
        let tracker = self.tracker.as_mut().ok_or(TrackerError::QueueEmpty)?;
        // only queued items have prompts; anything else fails the head check
        let correct = self
            .prompts
            .get(item)
            .map(|prompt| prompt.answer.as_str())
            .unwrap_or_default();

        let outcome = match answer {
            Some(answer) => tracker.record_answer(item, answer, correct)?,
            None => {
                // a prompt's answer is never empty, so this is always wrong
                let outcome = tracker.record_answer(item, "", correct)?;
                AnswerOutcome {
                    timed_out: true,
                    ..outcome
                }
            }
        };

        if tracker.is_finished() {
            self.phase = Phase::Summary(tracker.finalize(self.config.xp_per_item));
            self.clock = None;
        } else {
            self.clock = self.start_clock(now);
        }
        Ok(outcome)
    }

    fn start_clock(&self, now: DateTime<Utc>) -> Option<QuestionClock> {
        self.config
            .question_time_limit()
            .map(|limit| QuestionClock::start(now, limit))
    }

    pub fn time_left(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.clock.map(|clock| clock.time_left(now))
    }

    pub fn summary(&self) -> Option<&SessionSummary> {
        match &self.phase {
            Phase::Summary(summary) => Some(summary),
            _ => None,
        }
    }

    pub fn scores(&self) -> &SessionScore {
        self.tracker
            .as_ref()
            .map(MasteryTracker::scores)
            .unwrap_or(&self.prior_scores)
    }

    /// What to write to `inProgress`, if this session leaves one.
    pub fn checkpoint(&self, now: DateTime<Utc>) -> Option<ResumableSession> {
        if !self.config.resumable {
            return None;
        }
        self.scope.category()?;
        let (phase, queue_position) = match (&self.phase, &self.tracker) {
            (Phase::Preview { position }, _) => (CheckpointPhase::Preview, *position),
            (Phase::Test, Some(tracker)) => (CheckpointPhase::Test, tracker.answered()),
            _ => return None,
        };
        Some(ResumableSession {
            items: self.items.clone(),
            scores: self.scores().clone(),
            timestamp: now,
            mode: self.config.mode,
            queue_position,
            phase,
        })
    }

    pub fn is_persisted(&self) -> bool {
        self.persisted
    }

    /// Claim the one persistence of this session's summary. Returns `false`
    /// if it was already claimed or there is no summary yet.
    pub fn claim_persistence(&mut self) -> bool {
        if self.persisted || self.summary().is_none() {
            return false;
        }
        self.persisted = true;
        true
    }

    /// Give the claim back after a failed save so it can be retried.
    pub fn release_persistence(&mut self) {
        self.persisted = false;
    }

    pub fn view(&self, now: DateTime<Utc>) -> SessionView {
        SessionView {
            mode: self.config.mode,
            phase: self.phase.kind(),
            items: self.items.clone(),
            preview_position: match self.phase {
                Phase::Preview { position } => Some(position),
                _ => None,
            },
            prompt: self.current_prompt().cloned(),
            answered: self.tracker.as_ref().map_or(0, MasteryTracker::answered),
            remaining: self.tracker.as_ref().map_or(0, MasteryTracker::remaining),
            time_left_ms: self.time_left(now).map(|left| left.num_milliseconds()),
            summary: self.summary().cloned(),
        }
    }

    fn wrong_phase(&self, action: &'static str) -> SessionError {
        SessionError::WrongPhase {
            action,
            phase: self.phase.kind(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use language_utils::CategoryId;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    const TRANSLATIONS: [&str; 6] = ["one", "two", "three", "four", "five", "six"];

    fn items(count: usize) -> Vec<VocabularyItem> {
        ["moja", "mbili", "tatu", "nne", "tano", "sita"]
            .iter()
            .zip(TRANSLATIONS)
            .take(count)
            .map(|(word, translation)| VocabularyItem {
                id: ItemId::from_surface(word),
                word: word.to_string(),
                translation: translation.to_string(),
                explanation: None,
                example: None,
                audio: None,
                category: CategoryId::new("numbers"),
                subcategory: None,
                language: Language::Swahili,
            })
            .collect()
    }

    fn pool(_: &VocabularyItem) -> Vec<String> {
        TRANSLATIONS.iter().map(|t| t.to_string()).collect()
    }

    fn session(mode: DrillMode, count: usize) -> DrillSession {
        DrillSession::new(
            SessionScope::Category(CategoryKey::new(
                Language::Swahili,
                CategoryId::new("numbers"),
            )),
            DrillConfig::for_mode(mode),
            items(count),
            SessionScore::new(),
        )
    }

    fn answer_current(session: &mut DrillSession, correctly: bool, now: DateTime<Utc>) -> AnswerOutcome {
        let prompt = session.current_prompt().cloned().unwrap();
        let answer = if correctly {
            prompt.answer.clone()
        } else {
            prompt.options.iter().find(|o| **o != prompt.answer).cloned().unwrap()
        };
        session.submit_answer(&prompt.item, &answer, now).unwrap()
    }

    #[test]
    fn perfect_lesson_walks_every_phase() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let now = Utc::now();
        let mut session = session(DrillMode::Learn, 5);

        let mut previewed = 1;
        while session.advance_preview().unwrap() {
            previewed += 1;
        }
        assert_eq!(previewed, 5);

        session.begin_test(pool, &mut rng, now).unwrap();
        assert_eq!(session.view(now).remaining, 15);

        for _ in 0..15 {
            assert!(answer_current(&mut session, true, now).is_correct);
        }
        let summary = session.summary().unwrap();
        assert_eq!(summary.mastered.len(), 5);
        assert!(summary.not_mastered.is_empty());
        assert_eq!(summary.xp_awarded, 50);
        assert!(session.scores().values().all(|score| *score == 3));
    }

    #[test]
    fn wrong_answers_leave_items_unmastered() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let now = Utc::now();
        let mut session = session(DrillMode::Learn, 2);
        session.begin_test(pool, &mut rng, now).unwrap();

        let first = answer_current(&mut session, false, now);
        assert!(!first.is_correct);
        while session.summary().is_none() {
            answer_current(&mut session, true, now);
        }
        let summary = session.summary().unwrap();
        assert_eq!(summary.not_mastered, vec![first.item]);
        assert_eq!(summary.xp_awarded, 10);
    }

    #[test]
    fn transitions_are_one_way() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let now = Utc::now();
        let mut session = session(DrillMode::Grammar, 1);
        assert!(matches!(
            session.submit_answer(&ItemId::from_surface("moja"), "one", now),
            Err(SessionError::WrongPhase { .. })
        ));
        session.begin_test(pool, &mut rng, now).unwrap();
        assert!(matches!(
            session.advance_preview(),
            Err(SessionError::WrongPhase { .. })
        ));
        assert!(matches!(
            session.begin_test(pool, &mut rng, now),
            Err(SessionError::WrongPhase { .. })
        ));
    }

    #[test]
    fn prompt_failure_blocks_the_test() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let now = Utc::now();
        let mut session = session(DrillMode::Learn, 1);
        let result = session.begin_test(|item| vec![item.translation.clone()], &mut rng, now);
        assert!(matches!(
            result,
            Err(SessionError::Prompt(PromptError::InsufficientDistractors { .. }))
        ));
        assert_eq!(session.phase().kind(), PhaseKind::Preview);
    }

    #[test]
    fn empty_session_cannot_be_tested() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let mut session = session(DrillMode::Learn, 0);
        assert_eq!(
            session.begin_test(pool, &mut rng, Utc::now()).unwrap_err(),
            SessionError::NothingToTest
        );
    }

    #[test]
    fn quiz_answers_after_the_deadline_count_as_wrong() {
        let mut rng = ChaCha8Rng::seed_from_u64(6);
        let start = Utc::now();
        let mut session = session(DrillMode::Quiz, 2);
        session.begin_test(pool, &mut rng, start).unwrap();
        assert_eq!(session.view(start).time_left_ms, Some(10_000));

        let prompt = session.current_prompt().cloned().unwrap();
        let late = start + chrono::Duration::seconds(11);
        let outcome = session.submit_answer(&prompt.item, &prompt.answer, late).unwrap();
        assert!(outcome.timed_out);
        assert!(!outcome.is_correct);
        assert_eq!(outcome.new_score, 0);

        // the clock restarts for the next question
        assert_eq!(
            session.expire_question(late + chrono::Duration::seconds(3)),
            Err(SessionError::QuestionNotExpired)
        );
        let expired = session
            .expire_question(late + chrono::Duration::seconds(10))
            .unwrap();
        assert!(expired.timed_out);
        assert!(!expired.is_correct);
    }

    #[test]
    fn untimed_modes_never_expire() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let now = Utc::now();
        let mut session = session(DrillMode::Learn, 1);
        session.begin_test(pool, &mut rng, now).unwrap();
        let prompt = session.current_prompt().cloned().unwrap();
        let much_later = now + chrono::Duration::hours(1);
        assert!(session.submit_answer(&prompt.item, &prompt.answer, much_later).unwrap().is_correct);
        assert_eq!(session.view(much_later).time_left_ms, None);
    }

    #[test]
    fn checkpoint_follows_progress() {
        let mut rng = ChaCha8Rng::seed_from_u64(8);
        let now = Utc::now();
        let mut session = session(DrillMode::Learn, 3);
        session.advance_preview().unwrap();
        let preview = session.checkpoint(now).unwrap();
        assert_eq!(preview.phase, CheckpointPhase::Preview);
        assert_eq!(preview.queue_position, 1);

        session.begin_test(pool, &mut rng, now).unwrap();
        answer_current(&mut session, true, now);
        answer_current(&mut session, true, now);
        let test = session.checkpoint(now).unwrap();
        assert_eq!(test.phase, CheckpointPhase::Test);
        assert_eq!(test.queue_position, 2);
        assert_eq!(test.scores.values().sum::<u32>(), 2);
    }

    #[test]
    fn quiz_and_difficult_words_leave_no_checkpoint() {
        assert_eq!(session(DrillMode::Quiz, 2).checkpoint(Utc::now()), None);
        let difficult = DrillSession::new(
            SessionScope::DifficultWords(Language::Swahili),
            DrillConfig::for_mode(DrillMode::DifficultWords),
            items(2),
            SessionScore::new(),
        );
        assert_eq!(difficult.checkpoint(Utc::now()), None);
    }

    #[test]
    fn resumed_test_only_asks_what_is_left() {
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let now = Utc::now();
        let key = CategoryKey::new(Language::Swahili, CategoryId::new("numbers"));
        let checkpoint = ResumableSession {
            items: items(2),
            scores: [(ItemId::from_surface("moja"), 3), (ItemId::from_surface("mbili"), 1)]
                .into_iter()
                .collect(),
            timestamp: now,
            mode: DrillMode::Learn,
            queue_position: 4,
            phase: CheckpointPhase::Test,
        };
        let mut session =
            DrillSession::from_checkpoint(key, DrillConfig::for_mode(DrillMode::Learn), checkpoint);
        session.begin_test(pool, &mut rng, now).unwrap();
        assert_eq!(session.view(now).remaining, 2);
        assert_eq!(session.current_prompt().unwrap().item, ItemId::from_surface("mbili"));
    }

    #[test]
    fn persistence_is_claimed_once() {
        let mut rng = ChaCha8Rng::seed_from_u64(10);
        let now = Utc::now();
        let mut session = session(DrillMode::Learn, 1);
        assert!(!session.claim_persistence());
        session.begin_test(pool, &mut rng, now).unwrap();
        for _ in 0..3 {
            answer_current(&mut session, true, now);
        }
        assert!(session.claim_persistence());
        assert!(!session.claim_persistence());
        session.release_persistence();
        assert!(session.claim_persistence());
    }
}
