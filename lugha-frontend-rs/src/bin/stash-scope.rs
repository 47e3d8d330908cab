use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use language_utils::{CategoryId, ItemId, Language};
use lugha_frontend_rs::{DifficultWordRecord, ResumableSession, Settings, StoredKey};
use stash::{KeyValueStore, MemoryStore, read_json};

#[derive(Default)]
struct CategoryReport {
    learned: Option<usize>,
    completed: bool,
    in_progress: Option<String>,
}

#[derive(Default)]
struct Survey {
    languages: BTreeMap<Language, LanguageReport>,
    malformed: Vec<String>,
    foreign: Vec<String>,
}

#[derive(Default)]
struct LanguageReport {
    categories: BTreeMap<CategoryId, CategoryReport>,
    difficult_words: Option<(usize, usize)>,
    migrated: bool,
    legacy_words: Option<usize>,
}

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() != 2 {
        eprintln!("Usage: {} <path-to-storage-export.json>", args[0]);
        eprintln!("\nThe export is a JSON object of key -> stored string, e.g. the output of");
        eprintln!("  JSON.stringify(Object.fromEntries(Object.entries(localStorage)))");
        std::process::exit(1);
    }

    let file_path = PathBuf::from(&args[1]);

    let mut file = match File::open(&file_path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Error opening file '{}': {}", file_path.display(), e);
            std::process::exit(1);
        }
    };

    let mut text = String::new();
    if let Err(e) = file.read_to_string(&mut text) {
        eprintln!("Error reading file '{}': {}", file_path.display(), e);
        std::process::exit(1);
    }

    let entries: BTreeMap<String, String> = match serde_json::from_str(&text) {
        Ok(entries) => entries,
        Err(e) => {
            eprintln!("File is not a key -> string JSON object: {e}");
            std::process::exit(1);
        }
    };

    let store = MemoryStore::from_snapshot(entries);
    let keys = match store.keys() {
        Ok(keys) => keys,
        Err(e) => {
            eprintln!("Could not list keys: {e}");
            std::process::exit(1);
        }
    };

    println!("StashScope - learner progress analyzer");
    println!("======================================");
    println!("File: {}", file_path.display());
    println!("Keys: {}", keys.len());
    println!();

    let survey = survey(&store, &keys, Utc::now(), &Settings::default());

    for (language, report) in &survey.languages {
        println!("[{language}]");
        println!(
            "  migrated to categories: {}",
            if report.migrated { "yes" } else { "no" }
        );
        if let Some(words) = report.legacy_words {
            println!("  legacy learned words: {words}");
        }
        if let Some((total, fresh)) = report.difficult_words {
            println!("  difficult words: {total} stored, {fresh} from the last day");
        }
        for (category, category_report) in &report.categories {
            let learned = category_report
                .learned
                .map_or_else(|| "-".to_string(), |n| n.to_string());
            println!(
                "  {category}: {learned} learned{}",
                if category_report.completed {
                    ", completed"
                } else {
                    ""
                }
            );
            if let Some(in_progress) = &category_report.in_progress {
                println!("    in progress: {in_progress}");
            }
        }
        println!();
    }

    if !survey.foreign.is_empty() {
        println!(
            "{} key(s) not written by the drill engine:",
            survey.foreign.len()
        );
        for key in &survey.foreign {
            println!("  {key}");
        }
        println!();
    }

    if !survey.malformed.is_empty() {
        println!(
            "{} value(s) would be treated as empty on load:",
            survey.malformed.len()
        );
        for key in &survey.malformed {
            println!("  {key}");
        }
    }
}

/// Classify every stored key by language and category.
fn survey(
    store: &impl KeyValueStore,
    keys: &[String],
    now: DateTime<Utc>,
    settings: &Settings,
) -> Survey {
    let mut survey = Survey::default();

    for raw in keys {
        let Some(key) = StoredKey::parse(raw) else {
            survey.foreign.push(raw.clone());
            continue;
        };
        match key {
            StoredKey::LearnedWords(key) => {
                let learned = read_json::<BTreeSet<ItemId>>(store, raw).map(|set| set.len());
                if learned.is_none() {
                    survey.malformed.push(raw.clone());
                }
                survey
                    .languages
                    .entry(key.language)
                    .or_default()
                    .categories
                    .entry(key.category)
                    .or_default()
                    .learned = learned;
            }
            StoredKey::Completed(key) => {
                survey
                    .languages
                    .entry(key.language)
                    .or_default()
                    .categories
                    .entry(key.category)
                    .or_default()
                    .completed = read_json(store, raw).unwrap_or(false);
            }
            StoredKey::InProgress(key) => {
                let description = match read_json::<ResumableSession>(store, raw) {
                    Some(session) => format!(
                        "{:?} {:?} at {}, saved {} ({})",
                        session.mode,
                        session.phase,
                        session.queue_position,
                        session.timestamp,
                        if session.is_fresh(now, settings.resume_window()) {
                            "resumable"
                        } else {
                            "expired"
                        }
                    ),
                    None => {
                        survey.malformed.push(raw.clone());
                        "MALFORMED".to_string()
                    }
                };
                survey
                    .languages
                    .entry(key.language)
                    .or_default()
                    .categories
                    .entry(key.category)
                    .or_default()
                    .in_progress = Some(description);
            }
            StoredKey::DifficultWords(language) => {
                match read_json::<Vec<DifficultWordRecord>>(store, raw) {
                    Some(records) => {
                        let window = settings.difficult_words_window();
                        let fresh = records
                            .iter()
                            .filter(|record| now.signed_duration_since(record.last_failure) < window)
                            .count();
                        survey.languages.entry(language).or_default().difficult_words =
                            Some((records.len(), fresh));
                    }
                    None => survey.malformed.push(raw.clone()),
                }
            }
            StoredKey::MigrationMarker(language) => {
                survey.languages.entry(language).or_default().migrated =
                    read_json(store, raw).unwrap_or(false);
            }
            StoredKey::LegacyLearnedWords(language) => {
                let words = read_json::<Vec<ItemId>>(store, raw).map(|words| words.len());
                if words.is_none() {
                    survey.malformed.push(raw.clone());
                }
                survey.languages.entry(language).or_default().legacy_words = words;
            }
        }
    }
    survey
}
