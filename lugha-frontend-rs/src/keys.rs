//! The one place storage keys are spelled out.

use language_utils::{CategoryId, CategoryKey, Language};

const LEARNED_WORDS: &str = "learnedWords";
const IN_PROGRESS: &str = "inProgress";
const COMPLETED: &str = "completed";
const DIFFICULT_WORDS: &str = "difficultWords";
const MIGRATION_MARKER: &str = "migration-to-categories-completed";

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum StoredKey {
    LearnedWords(CategoryKey),
    InProgress(CategoryKey),
    Completed(CategoryKey),
    DifficultWords(Language),
    MigrationMarker(Language),
    /// Pre-category layout: one flat list per language.
    LegacyLearnedWords(Language),
}

impl StoredKey {
    pub fn render(&self) -> String {
        match self {
            StoredKey::LearnedWords(key) => category_scoped(key, LEARNED_WORDS),
            StoredKey::InProgress(key) => category_scoped(key, IN_PROGRESS),
            StoredKey::Completed(key) => category_scoped(key, COMPLETED),
            StoredKey::DifficultWords(language) => {
                format!("{}-{DIFFICULT_WORDS}", language.iso_639_1())
            }
            StoredKey::MigrationMarker(language) => {
                format!("{}-{MIGRATION_MARKER}", language.iso_639_1())
            }
            StoredKey::LegacyLearnedWords(language) => {
                format!("{}-{LEARNED_WORDS}", language.iso_639_1())
            }
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let (code, rest) = raw.split_once('-')?;
        let language = Language::from_iso_639_1(code)?;

        // Exact per-language keys first: the migration marker also ends in `-completed`.
        match rest {
            DIFFICULT_WORDS => return Some(StoredKey::DifficultWords(language)),
            MIGRATION_MARKER => return Some(StoredKey::MigrationMarker(language)),
            LEARNED_WORDS => return Some(StoredKey::LegacyLearnedWords(language)),
            _ => {}
        }

        let (category, suffix) = rest.rsplit_once('-')?;
        if category.is_empty() {
            return None;
        }
        let key = CategoryKey::new(language, CategoryId::new(category));
        match suffix {
            LEARNED_WORDS => Some(StoredKey::LearnedWords(key)),
            IN_PROGRESS => Some(StoredKey::InProgress(key)),
            COMPLETED => Some(StoredKey::Completed(key)),
            _ => None,
        }
    }

    /// Whether every key scoped to `key` parses back to itself. A category
    /// named `migration-to-categories` would share its `completed` key with
    /// the language's migration marker, so it is not addressable.
    pub fn is_addressable(key: &CategoryKey) -> bool {
        [
            StoredKey::LearnedWords(key.clone()),
            StoredKey::InProgress(key.clone()),
            StoredKey::Completed(key.clone()),
        ]
        .into_iter()
        .all(|stored| StoredKey::parse(&stored.render()).as_ref() == Some(&stored))
    }
}

fn category_scoped(key: &CategoryKey, suffix: &str) -> String {
    format!("{}-{}-{suffix}", key.language.iso_639_1(), key.category)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn greetings() -> CategoryKey {
        CategoryKey::new(Language::Swahili, CategoryId::new("greetings"))
    }

    #[test]
    fn renders_the_legacy_layout() {
        assert_eq!(
            StoredKey::LearnedWords(greetings()).render(),
            "sw-greetings-learnedWords"
        );
        assert_eq!(StoredKey::InProgress(greetings()).render(), "sw-greetings-inProgress");
        assert_eq!(StoredKey::Completed(greetings()).render(), "sw-greetings-completed");
        assert_eq!(
            StoredKey::DifficultWords(Language::Zulu).render(),
            "zu-difficultWords"
        );
        assert_eq!(
            StoredKey::MigrationMarker(Language::Hausa).render(),
            "ha-migration-to-categories-completed"
        );
        assert_eq!(
            StoredKey::LegacyLearnedWords(Language::Igbo).render(),
            "ig-learnedWords"
        );
    }

    #[test]
    fn parses_what_it_renders() {
        let keys = [
            StoredKey::LearnedWords(greetings()),
            StoredKey::InProgress(CategoryKey::new(
                Language::Amharic,
                CategoryId::new("noun-classes"),
            )),
            StoredKey::Completed(greetings()),
            StoredKey::DifficultWords(Language::Twi),
            StoredKey::MigrationMarker(Language::Swahili),
            StoredKey::LegacyLearnedWords(Language::Shona),
        ];
        for key in keys {
            assert_eq!(StoredKey::parse(&key.render()), Some(key));
        }
    }

    #[test]
    fn category_ids_shadowing_language_keys_are_not_addressable() {
        assert!(StoredKey::is_addressable(&greetings()));
        assert!(StoredKey::is_addressable(&CategoryKey::new(
            Language::Amharic,
            CategoryId::new("noun-classes"),
        )));
        for id in ["migration-to-categories", ""] {
            assert!(
                !StoredKey::is_addressable(&CategoryKey::new(Language::Swahili, CategoryId::new(id))),
                "{id:?}"
            );
        }
    }

    #[test]
    fn ignores_foreign_keys() {
        assert_eq!(StoredKey::parse("theme"), None);
        assert_eq!(StoredKey::parse("fr-greetings-learnedWords"), None);
        assert_eq!(StoredKey::parse("sw-greetings-somethingElse"), None);
        assert_eq!(StoredKey::parse("sw--learnedWords"), None);
    }
}
