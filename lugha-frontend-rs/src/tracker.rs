use std::collections::{BTreeMap, VecDeque};

use language_utils::{ItemId, VocabularyItem};
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

/// Correct answers per item within one session.
pub type SessionScore = BTreeMap<ItemId, u32>;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, tsify::Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "camelCase")]
pub struct AnswerOutcome {
    pub item: ItemId,
    pub is_correct: bool,
    pub new_score: u32,
    /// Set when the answer was forced because the question ran out of time.
    pub timed_out: bool,
    pub remaining: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, tsify::Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub mastered: Vec<ItemId>,
    pub not_mastered: Vec<ItemId>,
    pub xp_awarded: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TrackerError {
    #[error("No questions remain in this session")]
    QueueEmpty,

    #[error("Answered {answered} but the current question is {expected}")]
    NotAtHead { expected: ItemId, answered: ItemId },
}

pub fn is_mastered(score: u32, tests_per_word: u32) -> bool {
    score >= tests_per_word
}

pub fn required_repetitions(prior: u32, tests_per_word: u32) -> u32 {
    tests_per_word.saturating_sub(prior)
}

/// Every item repeated by its outstanding repetitions, shuffled.
pub fn build_queue(
    items: &[VocabularyItem],
    prior_scores: &SessionScore,
    tests_per_word: u32,
    rng: &mut impl Rng,
) -> VecDeque<ItemId> {
    let mut queue: Vec<ItemId> = items
        .iter()
        .flat_map(|item| {
            let prior = prior_scores.get(&item.id).copied().unwrap_or(0);
            let repetitions = required_repetitions(prior, tests_per_word) as usize;
            std::iter::repeat_n(item.id.clone(), repetitions)
        })
        .collect();
    queue.shuffle(rng);
    queue.into()
}

/// Partition a final score map. Pure: the same map always gives the same summary.
pub fn finalize_session(
    scores: &SessionScore,
    tests_per_word: u32,
    xp_per_item: u32,
) -> SessionSummary {
    let (mastered, not_mastered): (Vec<_>, Vec<_>) = scores
        .iter()
        .partition(|(_, score)| is_mastered(**score, tests_per_word));
    let mastered: Vec<ItemId> = mastered.into_iter().map(|(id, _)| id.clone()).collect();
    let not_mastered = not_mastered.into_iter().map(|(id, _)| id.clone()).collect();
    SessionSummary {
        xp_awarded: xp_per_item.saturating_mul(mastered.len() as u32),
        mastered,
        not_mastered,
    }
}

/// Session-scoped scores plus the FIFO queue of remaining questions.
#[derive(Clone, Debug)]
pub struct MasteryTracker {
    tests_per_word: u32,
    queue: VecDeque<ItemId>,
    scores: SessionScore,
    answered: usize,
}

impl MasteryTracker {
    pub fn new(
        items: &[VocabularyItem],
        prior_scores: &SessionScore,
        tests_per_word: u32,
        rng: &mut impl Rng,
    ) -> Self {
        let scores = items
            .iter()
            .map(|item| {
                let prior = prior_scores.get(&item.id).copied().unwrap_or(0);
                (item.id.clone(), prior.min(tests_per_word))
            })
            .collect();
        Self {
            tests_per_word,
            queue: build_queue(items, prior_scores, tests_per_word, rng),
            scores,
            answered: 0,
        }
    }

    pub fn head(&self) -> Option<&ItemId> {
        self.queue.front()
    }

    pub fn remaining(&self) -> usize {
        self.queue.len()
    }

    pub fn answered(&self) -> usize {
        self.answered
    }

    pub fn is_finished(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn scores(&self) -> &SessionScore {
        &self.scores
    }

    pub fn score(&self, item: &ItemId) -> u32 {
        self.scores.get(item).copied().unwrap_or(0)
    }

    /// Grade the answer to the question at the head of the queue and dequeue it.
    pub fn record_answer(
        &mut self,
        item: &ItemId,
        submitted: &str,
        correct: &str,
    ) -> Result<AnswerOutcome, TrackerError> {
        let head = self.queue.front().ok_or(TrackerError::QueueEmpty)?;
        if head != item {
            return Err(TrackerError::NotAtHead {
                expected: head.clone(),
                answered: item.clone(),
            });
        }
        self.queue.pop_front();
        self.answered += 1;

        let is_correct = submitted == correct;
        let score = self.scores.entry(item.clone()).or_insert(0);
        if is_correct {
            *score += 1;
        }
        Ok(AnswerOutcome {
            item: item.clone(),
            is_correct,
            new_score: *score,
            timed_out: false,
            remaining: self.queue.len(),
        })
    }

    pub fn finalize(&self, xp_per_item: u32) -> SessionSummary {
        finalize_session(&self.scores, self.tests_per_word, xp_per_item)
    }
}
