use language_utils::{CategoryKey, Language};
use serde::{Deserialize, Serialize};

use crate::config::DrillMode;
use crate::tracker::SessionSummary;

/// What the presentation layer gets told about, outside the call that caused it.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, tsify::Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ProgressEvent {
    #[serde(rename_all = "camelCase")]
    SessionCompleted {
        language: Language,
        category: Option<String>,
        mode: DrillMode,
        summary: SessionSummary,
    },
    /// Progress could not be written even after retrying.
    #[serde(rename_all = "camelCase")]
    SaveFailed { key: String, message: String },
    #[serde(rename_all = "camelCase")]
    CategoryCompleted { language: Language, category: String },
    #[serde(rename_all = "camelCase")]
    DifficultWordsChanged { language: Language },
}

impl ProgressEvent {
    pub fn category_completed(key: &CategoryKey) -> Self {
        ProgressEvent::CategoryCompleted {
            language: key.language,
            category: key.category.to_string(),
        }
    }

    pub fn save_failed(error: &crate::progress::SaveError) -> Self {
        ProgressEvent::SaveFailed {
            key: error.key.clone(),
            message: error.to_string(),
        }
    }
}
