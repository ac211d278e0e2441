use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use rentscope_core::models::CoreErrorKind;
use rentscope_core::persistence::{MigrationStore, QueryStateStore};
use rentscope_core::sqlite::{SqliteStore, current_schema_version, migration, migrations};

fn test_db_path(test_name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_nanos();
    std::env::temp_dir().join(format!("rentscope-{test_name}-{nanos}.sqlite3"))
}

#[test]
fn migration_versions_are_strictly_increasing() {
    let entries = migrations();
    assert!(!entries.is_empty());

    let mut previous = 0;
    for entry in entries {
        assert!(entry.version > previous);
        previous = entry.version;
    }
}

#[test]
fn migration_lookup_and_schema_version_are_consistent() {
    let latest = current_schema_version();
    let latest_entry = migration(latest).expect("latest migration must exist");
    assert_eq!(latest_entry.version, latest);
}

#[test]
fn migration_sql_is_defined_for_up_and_down_paths() {
    for entry in migrations() {
        assert!(!entry.up_sql.trim().is_empty(), "up sql must not be empty");
        assert!(
            !entry.down_sql.trim().is_empty(),
            "down sql must not be empty"
        );
    }
}

#[test]
fn planned_migrations_start_after_requested_version() {
    let store = SqliteStore::new(test_db_path("planned"));
    let planned = store.planned_migrations(0);
    assert_eq!(planned[0].version, 1);
    assert!(store.planned_migrations(current_schema_version()).is_empty());
}

#[test]
fn migrations_apply_up_and_down() {
    let path = test_db_path("up-down");
    let store = SqliteStore::new(&path);
    assert_eq!(store.current_version().unwrap(), 0);

    store.migrate_to_latest().unwrap();
    assert_eq!(store.current_version().unwrap(), current_schema_version());

    // Re-applying the latest version is idempotent.
    store.migrate_to_latest().unwrap();

    store.apply_migration(1).unwrap();
    assert_eq!(store.current_version().unwrap(), 1);
    let error = store.last_query().unwrap_err();
    assert_eq!(error.kind, CoreErrorKind::StorageFailure);

    store.apply_migration(0).unwrap();
    assert_eq!(store.current_version().unwrap(), 0);

    let _ = std::fs::remove_file(path);
}

#[test]
fn undefined_target_version_is_a_storage_failure() {
    let path = test_db_path("undefined-target");
    let store = SqliteStore::new(&path);
    let error = store
        .apply_migration(current_schema_version() + 1)
        .unwrap_err();
    assert_eq!(error.kind, CoreErrorKind::StorageFailure);

    let _ = std::fs::remove_file(path);
}

#[test]
fn operations_before_migration_fail() {
    let path = test_db_path("uninitialized");
    let store = SqliteStore::new(&path);
    let error = store.store_last_query("page=1").unwrap_err();
    assert_eq!(error.kind, CoreErrorKind::StorageFailure);
    assert!(error.message.contains("not initialized"));

    let _ = std::fs::remove_file(path);
}
