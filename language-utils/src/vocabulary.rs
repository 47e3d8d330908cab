use std::fmt;

use crate::Language;

/// The identity of a drilled item: its source-language surface form with any
/// parenthetical annotations removed, e.g. `"jina (name)"` becomes `"jina"`.
#[derive(
    Clone,
    Debug,
    serde::Serialize,
    serde::Deserialize,
    Hash,
    PartialEq,
    Eq,
    Ord,
    PartialOrd,
    tsify::Tsify,
)]
#[tsify(into_wasm_abi, from_wasm_abi)]
pub struct ItemId(String);

impl ItemId {
    pub fn from_surface(surface: &str) -> Self {
        let mut stripped = String::with_capacity(surface.len());
        let mut depth = 0usize;
        for c in surface.chars() {
            match c {
                '(' => depth += 1,
                ')' if depth > 0 => depth -= 1,
                _ if depth == 0 => stripped.push(c),
                _ => {}
            }
        }
        Self(stripped.split_whitespace().collect::<Vec<_>>().join(" "))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(surface: &str) -> Self {
        Self::from_surface(surface)
    }
}

#[derive(
    Clone,
    Debug,
    serde::Serialize,
    serde::Deserialize,
    Hash,
    PartialEq,
    Eq,
    Ord,
    PartialOrd,
    tsify::Tsify,
)]
#[tsify(into_wasm_abi, from_wasm_abi)]
pub struct CategoryId(String);

impl CategoryId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CategoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Scope of all durable mastery state. Two categories that happen to share a
/// surface word never share progress, because every stored key is derived from
/// this pair rather than assembled by hand.
#[derive(
    Clone,
    Debug,
    serde::Serialize,
    serde::Deserialize,
    Hash,
    PartialEq,
    Eq,
    Ord,
    PartialOrd,
    tsify::Tsify,
)]
#[tsify(into_wasm_abi, from_wasm_abi)]
pub struct CategoryKey {
    pub language: Language,
    pub category: CategoryId,
}

impl CategoryKey {
    pub fn new(language: Language, category: CategoryId) -> Self {
        Self { language, category }
    }
}

impl fmt::Display for CategoryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.language.iso_639_1(), self.category)
    }
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize, PartialEq, Eq, tsify::Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "camelCase")]
pub struct VocabularyItem {
    pub id: ItemId,
    /// The surface form as written in the content, annotations included.
    pub word: String,
    pub translation: String,
    #[serde(default)]
    pub explanation: Option<String>,
    #[serde(default)]
    pub example: Option<String>,
    #[serde(default)]
    pub audio: Option<String>,
    pub category: CategoryId,
    #[serde(default)]
    pub subcategory: Option<String>,
    pub language: Language,
}

impl VocabularyItem {
    pub fn category_key(&self) -> CategoryKey {
        CategoryKey::new(self.language, self.category.clone())
    }
}
