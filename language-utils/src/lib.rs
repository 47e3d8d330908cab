pub mod content_pack;
pub mod vocabulary;

pub use content_pack::{Category, CategoryKind, ContentEntry, ContentError, ContentPack};
pub use vocabulary::{CategoryId, CategoryKey, ItemId, VocabularyItem};

#[derive(
    Copy,
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
pub enum Language {
    Swahili,
    Yoruba,
    Zulu,
    Xhosa,
    Amharic,
    Hausa,
    Igbo,
    Twi,
    Shona,
}

pub const LANGUAGES: &[Language] = &[
    Language::Swahili,
    Language::Yoruba,
    Language::Zulu,
    Language::Xhosa,
    Language::Amharic,
    Language::Hausa,
    Language::Igbo,
    Language::Twi,
    Language::Shona,
];

impl Language {
    /// The short code used to namespace stored progress.
    pub fn iso_639_1(&self) -> &'static str {
        match self {
            Language::Swahili => "sw",
            Language::Yoruba => "yo",
            Language::Zulu => "zu",
            Language::Xhosa => "xh",
            Language::Amharic => "am",
            Language::Hausa => "ha",
            Language::Igbo => "ig",
            Language::Twi => "tw",
            Language::Shona => "sn",
        }
    }

    pub fn from_iso_639_1(code: &str) -> Option<Self> {
        LANGUAGES
            .iter()
            .copied()
            .find(|language| language.iso_639_1() == code)
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Language::Swahili => write!(f, "Swahili"),
            Language::Yoruba => write!(f, "Yoruba"),
            Language::Zulu => write!(f, "Zulu"),
            Language::Xhosa => write!(f, "Xhosa"),
            Language::Amharic => write!(f, "Amharic"),
            Language::Hausa => write!(f, "Hausa"),
            Language::Igbo => write!(f, "Igbo"),
            Language::Twi => write!(f, "Twi"),
            Language::Shona => write!(f, "Shona"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iso_codes_round_trip() {
        for language in LANGUAGES {
            assert_eq!(
                Language::from_iso_639_1(language.iso_639_1()),
                Some(*language)
            );
        }
        assert_eq!(Language::from_iso_639_1("fr"), None);
    }

    #[test]
    fn codes_are_unique() {
        let codes: std::collections::BTreeSet<_> =
            LANGUAGES.iter().map(|l| l.iso_639_1()).collect();
        assert_eq!(codes.len(), LANGUAGES.len());
    }
}
