use serde::{Deserialize, Serialize};
use stash::RetryPolicy;

/// Correct answers needed before an item counts as mastered for a session.
pub const TESTS_PER_WORD: u32 = 3;
pub const LESSON_SIZE: usize = 5;
pub const OPTIONS_COUNT: usize = 4;
pub const QUIZ_QUESTION_LIMIT_MS: i64 = 10_000;
pub const RESUME_WINDOW_HOURS: i64 = 24;
pub const DIFFICULT_WORDS_WINDOW_HOURS: i64 = 24;
pub const DIFFICULT_WORDS_CAP: usize = 10;

pub const XP_PER_LESSON_ITEM: u32 = 10;
pub const XP_PER_DIFFICULT_WORD: u32 = 15;
pub const XP_PER_GRAMMAR_RULE: u32 = 10;
pub const XP_PER_QUIZ_ITEM: u32 = 10;

#[derive(
    Copy,
    Clone,
    Debug,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Ord,
    PartialOrd,
    Hash,
    tsify::Tsify,
)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "camelCase")]
pub enum DrillMode {
    Learn,
    Grammar,
    DifficultWords,
    /// Arcade-style: same flow as `Learn`, but every question has a deadline.
    Quiz,
}

pub const DRILL_MODES: [DrillMode; 4] = [
    DrillMode::Learn,
    DrillMode::Grammar,
    DrillMode::DifficultWords,
    DrillMode::Quiz,
];

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, tsify::Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "camelCase")]
pub struct DrillConfig {
    pub mode: DrillMode,
    pub tests_per_word: u32,
    pub lesson_size: usize,
    pub options_count: usize,
    pub xp_per_item: u32,
    pub question_time_limit_ms: Option<i64>,
    /// Whether an interrupted session leaves a checkpoint behind.
    pub resumable: bool,
    /// Whether wrong answers feed the difficult-words list.
    pub records_failures: bool,
}

impl DrillConfig {
    pub fn for_mode(mode: DrillMode) -> Self {
        let base = Self {
            mode,
            tests_per_word: TESTS_PER_WORD,
            lesson_size: LESSON_SIZE,
            options_count: OPTIONS_COUNT,
            xp_per_item: XP_PER_LESSON_ITEM,
            question_time_limit_ms: None,
            resumable: true,
            records_failures: true,
        };
        match mode {
            DrillMode::Learn => base,
            DrillMode::Grammar => Self {
                xp_per_item: XP_PER_GRAMMAR_RULE,
                ..base
            },
            DrillMode::DifficultWords => Self {
                xp_per_item: XP_PER_DIFFICULT_WORD,
                resumable: false,
                records_failures: false,
                ..base
            },
            DrillMode::Quiz => Self {
                xp_per_item: XP_PER_QUIZ_ITEM,
                question_time_limit_ms: Some(QUIZ_QUESTION_LIMIT_MS),
                resumable: false,
                ..base
            },
        }
    }

    pub fn question_time_limit(&self) -> Option<chrono::Duration> {
        self.question_time_limit_ms
            .map(chrono::Duration::milliseconds)
    }
}

/// Knobs that are not tied to a drill mode. Every field falls back to its
/// default when missing from the host's JSON.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    pub retry: RetryPolicy,
    pub resume_window_hours: i64,
    pub difficult_words_window_hours: i64,
    pub difficult_words_cap: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            resume_window_hours: RESUME_WINDOW_HOURS,
            difficult_words_window_hours: DIFFICULT_WORDS_WINDOW_HOURS,
            difficult_words_cap: DIFFICULT_WORDS_CAP,
        }
    }
}

impl Settings {
    pub fn resume_window(&self) -> chrono::Duration {
        chrono::Duration::hours(self.resume_window_hours)
    }

    pub fn difficult_words_window(&self) -> chrono::Duration {
        chrono::Duration::hours(self.difficult_words_window_hours)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xp_differs_by_mode() {
        assert_eq!(DrillConfig::for_mode(DrillMode::Learn).xp_per_item, 10);
        assert_eq!(DrillConfig::for_mode(DrillMode::DifficultWords).xp_per_item, 15);
        assert_eq!(DrillConfig::for_mode(DrillMode::Grammar).xp_per_item, 10);
    }

    #[test]
    fn only_quiz_is_timed() {
        for mode in DRILL_MODES {
            let limit = DrillConfig::for_mode(mode).question_time_limit();
            if mode == DrillMode::Quiz {
                assert_eq!(limit, Some(chrono::Duration::seconds(10)));
            } else {
                assert_eq!(limit, None);
            }
        }
    }

    #[test]
    fn settings_fill_missing_fields_with_defaults() {
        let settings: Settings = serde_json::from_str(r#"{ "resumeWindowHours": 12 }"#).unwrap();
        assert_eq!(settings.resume_window_hours, 12);
        assert_eq!(settings.difficult_words_cap, DIFFICULT_WORDS_CAP);
        assert_eq!(settings.retry, RetryPolicy::default());
    }

    #[test]
    fn mode_serializes_camel_case() {
        assert_eq!(
            serde_json::to_string(&DrillMode::DifficultWords).unwrap(),
            "\"difficultWords\""
        );
    }
}
