use std::collections::BTreeSet;

use language_utils::{ItemId, VocabularyItem};
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

/// A multiple-choice question for one item.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, tsify::Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "camelCase")]
pub struct Prompt {
    pub item: ItemId,
    pub question: String,
    pub options: Vec<String>,
    pub answer: String,
    #[serde(default)]
    pub audio: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PromptError {
    #[error("No distractors available for {item}")]
    InsufficientDistractors { item: ItemId },

    #[error("{item} has no answer to ask for")]
    EmptyAnswer { item: ItemId },
}

/// Pick up to `options_count - 1` distinct, non-empty distractors from `pool`
/// and shuffle them in with `correct`.
///
/// When the pool is short the option list shrinks instead of failing; only a
/// pool with no usable distractor at all is an error.
pub fn build_options(
    item: &ItemId,
    correct: &str,
    pool: &[&str],
    options_count: usize,
    rng: &mut impl Rng,
) -> Result<Vec<String>, PromptError> {
    if correct.trim().is_empty() {
        return Err(PromptError::EmptyAnswer { item: item.clone() });
    }

    let candidates: Vec<&str> = pool
        .iter()
        .copied()
        .filter(|candidate| !candidate.trim().is_empty() && *candidate != correct)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    if candidates.is_empty() {
        return Err(PromptError::InsufficientDistractors { item: item.clone() });
    }

    let wanted = options_count.saturating_sub(1).max(1);
    if candidates.len() < wanted {
        log::warn!(
            "Only {} distractor(s) for {item}, wanted {wanted}; showing fewer options",
            candidates.len()
        );
    }

    let mut options: Vec<String> = candidates
        .choose_multiple(rng, wanted)
        .map(|candidate| candidate.to_string())
        .collect();
    options.push(correct.to_string());
    options.shuffle(rng);
    Ok(options)
}

pub fn build_prompt(
    item: &VocabularyItem,
    pool: &[&str],
    options_count: usize,
    rng: &mut impl Rng,
) -> Result<Prompt, PromptError> {
    let options = build_options(&item.id, &item.translation, pool, options_count, rng)?;
    Ok(Prompt {
        item: item.id.clone(),
        question: item.word.clone(),
        options,
        answer: item.translation.clone(),
        audio: item.audio.clone(),
    })
}
