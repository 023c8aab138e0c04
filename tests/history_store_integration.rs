//! Integration tests for the on-disk revision history

use examsnap::config::HistoryConfig;
use examsnap::history::{AnalyzedProblem, HistoryStore, KeyValueStore, SledStore, HISTORY_KEY};
use examsnap::DataUri;
use std::sync::Arc;
use tempfile::TempDir;

mod common;

fn problem(advice: &str, timestamp: i64) -> AnalyzedProblem {
    AnalyzedProblem {
        id: format!("problem-{}", timestamp),
        problem_image_uri: DataUri::from_bytes("image/png", &common::tiny_png()).unwrap(),
        advice: advice.to_string(),
        concepts: "Fractions\nCommon denominators".to_string(),
        timestamp,
    }
}

fn config_in(dir: &TempDir) -> HistoryConfig {
    HistoryConfig {
        path: Some(
            dir.path()
                .join("nested")
                .join("history.sled")
                .to_string_lossy()
                .to_string(),
        ),
        enabled: true,
    }
}

#[test]
fn test_history_survives_reopen_newest_first() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);

    {
        let store = HistoryStore::open(&config).unwrap();
        assert!(store.read_all().is_empty());
        store.append(&problem("first", 1_700_000_000_000));
        let updated = store.append(&problem("second", 1_700_000_100_000));
        assert_eq!(updated.len(), 2);
    }

    let reopened = HistoryStore::open(&config).unwrap();
    let problems = reopened.read_all();
    assert_eq!(problems.len(), 2);
    assert_eq!(problems[0].advice, "second");
    assert_eq!(problems[1].advice, "first");
    assert_eq!(problems[1], problem("first", 1_700_000_000_000));
}

#[test]
fn test_clear_all_empties_history_on_disk() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);

    {
        let store = HistoryStore::open(&config).unwrap();
        store.append(&problem("kept briefly", 1));
        store.clear_all().unwrap();
        assert!(store.read_all().is_empty());
        // Clearing twice is fine.
        store.clear_all().unwrap();
    }

    let reopened = HistoryStore::open(&config).unwrap();
    assert!(reopened.read_all().is_empty());
}

#[test]
fn test_corrupt_blob_reads_as_empty_and_is_replaced() {
    let dir = TempDir::new().unwrap();
    let sled = Arc::new(SledStore::open(dir.path().join("db")).unwrap());
    sled.set(HISTORY_KEY, br#"{"not": "a list"}"#).unwrap();

    let store = HistoryStore::new(sled.clone());
    assert!(store.read_all().is_empty());

    let updated = store.append(&problem("fresh start", 5));
    assert_eq!(updated.len(), 1);

    let raw = sled.get(HISTORY_KEY).unwrap().unwrap();
    let parsed: serde_json::Value = serde_json::from_slice(&raw).unwrap();
    assert!(parsed.is_array());
    assert_eq!(parsed[0]["advice"], "fresh start");
    assert!(parsed[0]["problemImageUri"]
        .as_str()
        .unwrap()
        .starts_with("data:image/png;base64,"));
}

#[test]
fn test_disabled_history_keeps_nothing() {
    let dir = TempDir::new().unwrap();
    let config = HistoryConfig {
        enabled: false,
        ..config_in(&dir)
    };

    let store = HistoryStore::open(&config).unwrap();
    store.append(&problem("ephemeral", 9));
    assert!(store.read_all().is_empty());
    assert!(!dir.path().join("nested").exists());
}

#[test]
fn test_find_by_unique_prefix() {
    let dir = TempDir::new().unwrap();
    let store = HistoryStore::open(&config_in(&dir)).unwrap();
    store.append(&problem("a", 100));
    store.append(&problem("b", 200));

    assert_eq!(store.find("problem-100").unwrap().advice, "a");
    assert_eq!(store.find("problem-2").unwrap().advice, "b");
    assert!(store.find("problem-").is_none());
    assert!(store.find("missing").is_none());
}
