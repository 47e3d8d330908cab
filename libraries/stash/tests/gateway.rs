use std::collections::BTreeSet;

use stash::{Immediate, KeyValueStore, MemoryStore, RetryPolicy, WriteError, read_json, retry, write_json};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn retried_write_survives_transient_failures() {
    init_logger();
    let store = MemoryStore::new();
    store.fail_writes(2);

    let ids: BTreeSet<&str> = ["moja", "mbili"].into_iter().collect();
    let result = futures::executor::block_on(retry(
        &RetryPolicy::default(),
        &Immediate,
        "save numbers",
        || write_json(&store, "sw-numbers-learnedWords", &ids),
    ));

    assert!(result.is_ok());
    assert_eq!(
        read_json::<BTreeSet<String>>(&store, "sw-numbers-learnedWords"),
        Some(["mbili".to_string(), "moja".to_string()].into_iter().collect())
    );
}

#[test]
fn exhausted_retries_leave_prior_value_and_report() {
    init_logger();
    let store = MemoryStore::new();
    write_json(&store, "flag", &false).unwrap();
    store.fail_writes(10);

    let result = futures::executor::block_on(retry(
        &RetryPolicy::default(),
        &Immediate,
        "save flag",
        || write_json(&store, "flag", &true),
    ));

    assert!(matches!(result, Err(WriteError::Store(_))));
    assert_eq!(store.get("flag").unwrap().as_deref(), Some("false"));
}
