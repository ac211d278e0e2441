use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rentscope_core::models::{
    CoreErrorKind, HistoryEntryId, NewSavedSearch, NewSearchHistoryEntry, Operation,
    SavedSearchId,
};
use rentscope_core::persistence::{QueryStateStore, SavedSearchStore, SearchHistoryStore};
use rentscope_core::sqlite::SqliteStore;

fn test_db_path(test_name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_nanos();
    std::env::temp_dir().join(format!("rentscope-{test_name}-{nanos}.sqlite3"))
}

fn migrated_store(test_name: &str) -> (SqliteStore, PathBuf) {
    let path = test_db_path(test_name);
    let store = SqliteStore::new(&path);
    store.migrate_to_latest().unwrap();
    (store, path)
}

fn at(seconds: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(seconds)
}

fn new_search(name: &str, created_at: SystemTime) -> NewSavedSearch {
    NewSavedSearch {
        name: name.to_string(),
        snapshot: "city=Boston&amenities=Parking%2CWiFi&page=1".to_string(),
        email_alerts: false,
        created_at,
    }
}

#[test]
fn saved_search_round_trips_through_sqlite() {
    let (store, path) = migrated_store("saved-round-trip");

    let created = store
        .create_saved_search(&new_search("Boston", at(1_700_000_000)))
        .unwrap();
    let loaded = store.saved_search(&created.id).unwrap().unwrap();
    assert_eq!(loaded, created);
    assert_eq!(loaded.query().city.as_deref(), Some("Boston"));

    let _ = std::fs::remove_file(path);
}

#[test]
fn saved_searches_list_newest_first() {
    let (store, path) = migrated_store("saved-order");

    store
        .create_saved_search(&new_search("older", at(1_700_000_000)))
        .unwrap();
    store
        .create_saved_search(&new_search("newer", at(1_700_000_100)))
        .unwrap();

    let names: Vec<_> = store
        .list_saved_searches()
        .unwrap()
        .into_iter()
        .map(|saved| saved.name)
        .collect();
    assert_eq!(names, vec!["newer", "older"]);

    let _ = std::fs::remove_file(path);
}

#[test]
fn email_alerts_toggle_and_delete_report_missing_ids() {
    let (store, path) = migrated_store("saved-alerts");

    let created = store
        .create_saved_search(&new_search("alerts", at(1_700_000_000)))
        .unwrap();
    store.set_email_alerts(&created.id, true).unwrap();
    assert!(store.saved_search(&created.id).unwrap().unwrap().email_alerts);

    store.delete_saved_search(&created.id).unwrap();
    assert!(store.saved_search(&created.id).unwrap().is_none());

    let error = store.delete_saved_search(&created.id).unwrap_err();
    assert_eq!(error.kind, CoreErrorKind::NotFound);
    assert_eq!(error.operation, Some(Operation::DeleteSavedSearch));

    let error = store
        .set_email_alerts(&SavedSearchId("not-a-row".to_string()), true)
        .unwrap_err();
    assert_eq!(error.kind, CoreErrorKind::NotFound);

    let _ = std::fs::remove_file(path);
}

#[test]
fn history_is_limited_deletable_and_clearable() {
    let (store, path) = migrated_store("history");

    for index in 0..5u64 {
        store
            .append_history(&NewSearchHistoryEntry {
                text: Some(format!("term {index}")),
                filters: "page=1".to_string(),
                results_count: index * 10,
                created_at: at(1_700_000_000 + index),
            })
            .unwrap();
    }

    let recent = store.list_history(3).unwrap();
    assert_eq!(recent.len(), 3);
    assert_eq!(recent[0].text.as_deref(), Some("term 4"));
    assert_eq!(recent[0].results_count, 40);
    assert!(store.list_history(0).unwrap().is_empty());

    store.delete_history_entry(&recent[0].id).unwrap();
    assert_eq!(store.list_history(10).unwrap().len(), 4);

    let error = store
        .delete_history_entry(&HistoryEntryId("999".to_string()))
        .unwrap_err();
    assert_eq!(error.kind, CoreErrorKind::NotFound);

    store.clear_history().unwrap();
    assert!(store.list_history(10).unwrap().is_empty());

    let _ = std::fs::remove_file(path);
}

#[test]
fn history_prune_keeps_newest_entries() {
    let (store, path) = migrated_store("history-prune");

    for index in 0..6u64 {
        store
            .append_history(&NewSearchHistoryEntry {
                text: Some(format!("term {index}")),
                filters: "page=1".to_string(),
                results_count: index,
                created_at: at(1_700_000_000 + index / 2),
            })
            .unwrap();
    }

    assert_eq!(store.prune_history(3).unwrap(), 3);
    assert_eq!(store.prune_history(3).unwrap(), 0);
    let kept: Vec<Option<String>> = store
        .list_history(10)
        .unwrap()
        .into_iter()
        .map(|entry| entry.text)
        .collect();
    assert_eq!(
        kept,
        vec![
            Some("term 5".to_string()),
            Some("term 4".to_string()),
            Some("term 3".to_string()),
        ]
    );

    let _ = std::fs::remove_file(path);
}

#[test]
fn last_query_is_upserted() {
    let (store, path) = migrated_store("last-query");

    assert_eq!(store.last_query().unwrap(), None);
    store.store_last_query("city=Boston&page=1").unwrap();
    store.store_last_query("city=Austin&page=2").unwrap();
    assert_eq!(
        store.last_query().unwrap().as_deref(),
        Some("city=Austin&page=2")
    );

    let _ = std::fs::remove_file(path);
}
