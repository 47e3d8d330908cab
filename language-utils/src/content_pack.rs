use std::collections::BTreeSet;

use crate::{CategoryId, ItemId, Language, VocabularyItem};

#[derive(
    Copy,
    Clone,
    Debug,
    Default,
    serde::Serialize,
    serde::Deserialize,
    PartialEq,
    Eq,
    Hash,
    tsify::Tsify,
    parse_display::Display,
    parse_display::FromStr,
)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "lowercase")]
#[display(style = "lowercase")]
pub enum CategoryKind {
    #[default]
    Vocabulary,
    /// Each entry is a rule; `translation` holds the answer the learner picks.
    Grammar,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ContentEntry {
    pub word: String,
    pub translation: String,
    #[serde(default)]
    pub explanation: Option<String>,
    #[serde(default)]
    pub example: Option<String>,
    #[serde(default)]
    pub audio: Option<String>,
    #[serde(default)]
    pub subcategory: Option<String>,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    #[serde(default)]
    pub kind: CategoryKind,
    pub entries: Vec<ContentEntry>,
}

/// Read-only dictionary for one language, grouped into categories in
/// presentation order.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct ContentPack {
    pub language: Language,
    pub categories: Vec<Category>,
}

#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    #[error("Malformed content pack: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown category: {0}")]
    UnknownCategory(CategoryId),

    #[error("Duplicate item {id} in category {category}")]
    DuplicateItem { category: CategoryId, id: ItemId },

    #[error("Entry {word:?} in category {category} has no identifier once annotations are removed")]
    EmptyItemId { category: CategoryId, word: String },
}

impl ContentPack {
    pub fn from_json(json: &str) -> Result<Self, ContentError> {
        let pack: ContentPack = serde_json::from_str(json)?;
        pack.validate()?;
        Ok(pack)
    }

    fn validate(&self) -> Result<(), ContentError> {
        for category in &self.categories {
            let mut seen = BTreeSet::new();
            for entry in &category.entries {
                let id = ItemId::from_surface(&entry.word);
                if id.as_str().is_empty() {
                    return Err(ContentError::EmptyItemId {
                        category: category.id.clone(),
                        word: entry.word.clone(),
                    });
                }
                if !seen.insert(id.clone()) {
                    return Err(ContentError::DuplicateItem {
                        category: category.id.clone(),
                        id,
                    });
                }
            }
        }
        Ok(())
    }

    pub fn category(&self, id: &CategoryId) -> Option<&Category> {
        self.categories.iter().find(|category| &category.id == id)
    }

    fn item(&self, category: &Category, entry: &ContentEntry) -> VocabularyItem {
        VocabularyItem {
            id: ItemId::from_surface(&entry.word),
            word: entry.word.clone(),
            translation: entry.translation.clone(),
            explanation: entry.explanation.clone(),
            example: entry.example.clone(),
            audio: entry.audio.clone(),
            category: category.id.clone(),
            subcategory: entry.subcategory.clone(),
            language: self.language,
        }
    }

    /// Items of a category in content order, optionally narrowed to one subcategory.
    pub fn items(
        &self,
        category: &CategoryId,
        subcategory: Option<&str>,
    ) -> Result<Vec<VocabularyItem>, ContentError> {
        let found = self
            .category(category)
            .ok_or_else(|| ContentError::UnknownCategory(category.clone()))?;
        Ok(found
            .entries
            .iter()
            .filter(|entry| subcategory.is_none() || entry.subcategory.as_deref() == subcategory)
            .map(|entry| self.item(found, entry))
            .collect())
    }

    pub fn find_item(&self, category: &CategoryId, id: &ItemId) -> Option<VocabularyItem> {
        let found = self.category(category)?;
        found
            .entries
            .iter()
            .find(|entry| &ItemId::from_surface(&entry.word) == id)
            .map(|entry| self.item(found, entry))
    }

    /// Every translation in a category; the candidate pool for distractors.
    pub fn translation_pool(&self, category: &CategoryId) -> Vec<&str> {
        self.category(category)
            .map(|found| {
                found
                    .entries
                    .iter()
                    .map(|entry| entry.translation.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn categories_containing(&self, id: &ItemId) -> Vec<CategoryId> {
        self.categories
            .iter()
            .filter(|category| {
                category
                    .entries
                    .iter()
                    .any(|entry| &ItemId::from_surface(&entry.word) == id)
            })
            .map(|category| category.id.clone())
            .collect()
    }
}
