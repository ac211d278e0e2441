use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::models::{
    CoreError, CoreErrorKind, HistoryEntryId, NewSavedSearch, NewSearchHistoryEntry, Operation,
    SavedSearch, SavedSearchId, SearchHistoryEntry,
};
use crate::persistence::{
    MigrationStore, PersistenceResult, QueryStateStore, SavedSearchStore, SearchHistoryStore,
};
use crate::sqlite::migrations::{SqliteMigration, current_schema_version, migration, migrations};

const MIGRATIONS_TABLE: &str = "rentscope_schema_migrations";
const LAST_QUERY_KEY: &str = "last_query";

pub struct SqliteStore {
    database_path: PathBuf,
}

impl SqliteStore {
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: database_path.into(),
        }
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    pub fn planned_migrations(&self, from_version: i64) -> Vec<&'static SqliteMigration> {
        migrations()
            .iter()
            .filter(|entry| entry.version > from_version)
            .collect()
    }

    pub fn migrate_to_latest(&self) -> PersistenceResult<()> {
        self.apply_migration(current_schema_version())
    }

    fn with_connection<T>(
        &self,
        operation_name: &str,
        operation: impl FnOnce(&mut Connection) -> rusqlite::Result<T>,
    ) -> PersistenceResult<T> {
        let mut connection = open_connection(&self.database_path)
            .map_err(|error| storage_error(operation_name, error))?;
        operation(&mut connection).map_err(|error| storage_error(operation_name, error))
    }
}

impl MigrationStore for SqliteStore {
    fn current_version(&self) -> PersistenceResult<i64> {
        self.with_connection("current_version", |connection| {
            ensure_migrations_table(connection)?;
            read_current_version(connection)
        })
    }

    fn apply_migration(&self, target_version: i64) -> PersistenceResult<()> {
        if target_version < 0 || target_version > current_schema_version() {
            return Err(storage_error_text(
                "apply_migration",
                format!("invalid migration target version '{target_version}'"),
            ));
        }

        self.with_connection("apply_migration", |connection| {
            ensure_migrations_table(connection)?;
            let current_version = read_current_version(connection)?;

            if target_version == current_version {
                // Recorded versions with missing tables: re-run the
                // idempotent DDL.
                for version in 1..=target_version {
                    connection.execute_batch(defined_migration(version)?.up_sql)?;
                }
                return Ok(());
            }

            if target_version > current_version {
                for version in (current_version + 1)..=target_version {
                    apply_up_migration(connection, defined_migration(version)?)?;
                }
            } else {
                for version in ((target_version + 1)..=current_version).rev() {
                    apply_down_migration(connection, defined_migration(version)?)?;
                }
            }

            Ok(())
        })
    }
}

impl SavedSearchStore for SqliteStore {
    fn create_saved_search(&self, search: &NewSavedSearch) -> PersistenceResult<SavedSearch> {
        self.with_connection("create_saved_search", |connection| {
            ensure_schema_ready(connection)?;
            connection.execute(
                "
INSERT INTO saved_searches (name, snapshot, email_alerts, created_at_unix)
VALUES (?1, ?2, ?3, ?4)
",
                params![
                    search.name.as_str(),
                    search.snapshot.as_str(),
                    bool_to_sqlite(search.email_alerts),
                    to_unix_seconds(search.created_at)?,
                ],
            )?;

            Ok(SavedSearch {
                id: SavedSearchId(connection.last_insert_rowid().to_string()),
                name: search.name.clone(),
                snapshot: search.snapshot.clone(),
                email_alerts: search.email_alerts,
                created_at: truncate_to_seconds(search.created_at)?,
            })
        })
    }

    fn saved_search(&self, id: &SavedSearchId) -> PersistenceResult<Option<SavedSearch>> {
        let Some(row_id) = parse_row_id(&id.0) else {
            return Ok(None);
        };

        self.with_connection("saved_search", |connection| {
            ensure_schema_ready(connection)?;
            connection
                .query_row(
                    "
SELECT search_id, name, snapshot, email_alerts, created_at_unix
FROM saved_searches
WHERE search_id = ?1
",
                    params![row_id],
                    saved_search_from_row,
                )
                .optional()
        })
    }

    fn list_saved_searches(&self) -> PersistenceResult<Vec<SavedSearch>> {
        self.with_connection("list_saved_searches", |connection| {
            ensure_schema_ready(connection)?;
            let mut statement = connection.prepare(
                "
SELECT search_id, name, snapshot, email_alerts, created_at_unix
FROM saved_searches
ORDER BY created_at_unix DESC, search_id DESC
",
            )?;
            let rows = statement.query_map([], saved_search_from_row)?;
            rows.collect()
        })
    }

    fn set_email_alerts(&self, id: &SavedSearchId, enabled: bool) -> PersistenceResult<()> {
        let updated = match parse_row_id(&id.0) {
            Some(row_id) => self.with_connection("set_email_alerts", |connection| {
                ensure_schema_ready(connection)?;
                connection.execute(
                    "UPDATE saved_searches SET email_alerts = ?2 WHERE search_id = ?1",
                    params![row_id, bool_to_sqlite(enabled)],
                )
            })?,
            None => 0,
        };

        if updated == 0 {
            return Err(missing_saved_search(Operation::ToggleEmailAlerts, id));
        }
        Ok(())
    }

    fn delete_saved_search(&self, id: &SavedSearchId) -> PersistenceResult<()> {
        let deleted = match parse_row_id(&id.0) {
            Some(row_id) => self.with_connection("delete_saved_search", |connection| {
                ensure_schema_ready(connection)?;
                connection.execute(
                    "DELETE FROM saved_searches WHERE search_id = ?1",
                    params![row_id],
                )
            })?,
            None => 0,
        };

        if deleted == 0 {
            return Err(missing_saved_search(Operation::DeleteSavedSearch, id));
        }
        Ok(())
    }
}

impl SearchHistoryStore for SqliteStore {
    fn append_history(
        &self,
        entry: &NewSearchHistoryEntry,
    ) -> PersistenceResult<SearchHistoryEntry> {
        self.with_connection("append_history", |connection| {
            ensure_schema_ready(connection)?;
            connection.execute(
                "
INSERT INTO search_history (search_text, filters, results_count, created_at_unix)
VALUES (?1, ?2, ?3, ?4)
",
                params![
                    entry.text.as_deref(),
                    entry.filters.as_str(),
                    u64_to_i64(entry.results_count)?,
                    to_unix_seconds(entry.created_at)?,
                ],
            )?;

            Ok(SearchHistoryEntry {
                id: HistoryEntryId(connection.last_insert_rowid().to_string()),
                text: entry.text.clone(),
                filters: entry.filters.clone(),
                results_count: entry.results_count,
                created_at: truncate_to_seconds(entry.created_at)?,
            })
        })
    }

    fn list_history(&self, limit: usize) -> PersistenceResult<Vec<SearchHistoryEntry>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        self.with_connection("list_history", |connection| {
            ensure_schema_ready(connection)?;
            let mut statement = connection.prepare(
                "
SELECT entry_id, search_text, filters, results_count, created_at_unix
FROM search_history
ORDER BY created_at_unix DESC, entry_id DESC
LIMIT ?1
",
            )?;
            let rows = statement.query_map(params![to_i64(limit)?], |row| {
                let entry_id: i64 = row.get(0)?;
                let results_count: i64 = row.get(3)?;
                let created_at_unix: i64 = row.get(4)?;

                Ok(SearchHistoryEntry {
                    id: HistoryEntryId(entry_id.to_string()),
                    text: row.get(1)?,
                    filters: row.get(2)?,
                    results_count: i64_to_u64(results_count)?,
                    created_at: from_unix_seconds(created_at_unix)?,
                })
            })?;
            rows.collect()
        })
    }

    fn prune_history(&self, keep: usize) -> PersistenceResult<usize> {
        self.with_connection("prune_history", |connection| {
            ensure_schema_ready(connection)?;
            connection.execute(
                "
DELETE FROM search_history
WHERE entry_id NOT IN (
    SELECT entry_id
    FROM search_history
    ORDER BY created_at_unix DESC, entry_id DESC
    LIMIT ?1
)
",
                params![to_i64(keep)?],
            )
        })
    }

    fn delete_history_entry(&self, id: &HistoryEntryId) -> PersistenceResult<()> {
        let deleted = match parse_row_id(&id.0) {
            Some(row_id) => self.with_connection("delete_history_entry", |connection| {
                ensure_schema_ready(connection)?;
                connection.execute(
                    "DELETE FROM search_history WHERE entry_id = ?1",
                    params![row_id],
                )
            })?,
            None => 0,
        };

        if deleted == 0 {
            return Err(CoreError::not_found(
                Operation::DeleteHistoryEntry,
                format!("history entry '{}' does not exist", id.0),
            ));
        }
        Ok(())
    }

    fn clear_history(&self) -> PersistenceResult<()> {
        self.with_connection("clear_history", |connection| {
            ensure_schema_ready(connection)?;
            connection.execute("DELETE FROM search_history", [])?;
            Ok(())
        })
    }
}

impl QueryStateStore for SqliteStore {
    fn store_last_query(&self, encoded: &str) -> PersistenceResult<()> {
        self.with_connection("store_last_query", |connection| {
            ensure_schema_ready(connection)?;
            connection.execute(
                "
INSERT INTO app_state (state_key, state_value, updated_at_unix)
VALUES (?1, ?2, strftime('%s', 'now'))
ON CONFLICT(state_key) DO UPDATE SET
    state_value = excluded.state_value,
    updated_at_unix = excluded.updated_at_unix
",
                params![LAST_QUERY_KEY, encoded],
            )?;
            Ok(())
        })
    }

    fn last_query(&self) -> PersistenceResult<Option<String>> {
        self.with_connection("last_query", |connection| {
            ensure_schema_ready(connection)?;
            connection
                .query_row(
                    "SELECT state_value FROM app_state WHERE state_key = ?1",
                    params![LAST_QUERY_KEY],
                    |row| row.get(0),
                )
                .optional()
        })
    }
}

fn saved_search_from_row(row: &Row<'_>) -> rusqlite::Result<SavedSearch> {
    let search_id: i64 = row.get(0)?;
    let email_alerts: i64 = row.get(3)?;
    let created_at_unix: i64 = row.get(4)?;

    Ok(SavedSearch {
        id: SavedSearchId(search_id.to_string()),
        name: row.get(1)?,
        snapshot: row.get(2)?,
        email_alerts: sqlite_to_bool(email_alerts),
        created_at: from_unix_seconds(created_at_unix)?,
    })
}

fn open_connection(database_path: &Path) -> rusqlite::Result<Connection> {
    if let Some(parent) = database_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|error| rusqlite::Error::ToSqlConversionFailure(Box::new(error)))?;
    }
    Connection::open(database_path)
}

fn ensure_migrations_table(connection: &Connection) -> rusqlite::Result<()> {
    connection.execute_batch(&format!(
        "
CREATE TABLE IF NOT EXISTS {MIGRATIONS_TABLE} (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at_unix INTEGER NOT NULL
);
"
    ))
}

fn ensure_schema_ready(connection: &Connection) -> rusqlite::Result<()> {
    ensure_migrations_table(connection)?;
    let version = read_current_version(connection)?;
    if version <= 0 {
        return Err(storage_error_sqlite(
            "database schema is not initialized; apply migrations before library operations",
        ));
    }
    Ok(())
}

fn read_current_version(connection: &Connection) -> rusqlite::Result<i64> {
    connection.query_row(
        &format!("SELECT COALESCE(MAX(version), 0) FROM {MIGRATIONS_TABLE}"),
        [],
        |row| row.get(0),
    )
}

fn defined_migration(version: i64) -> rusqlite::Result<&'static SqliteMigration> {
    migration(version).ok_or_else(|| {
        storage_error_sqlite(&format!("migration version '{version}' is not defined"))
    })
}

fn apply_up_migration(
    connection: &mut Connection,
    migration: &SqliteMigration,
) -> rusqlite::Result<()> {
    let transaction = connection.transaction()?;
    transaction.execute_batch(migration.up_sql)?;
    transaction.execute(
        &format!(
            "INSERT INTO {MIGRATIONS_TABLE} (version, name, applied_at_unix)
             VALUES (?1, ?2, strftime('%s', 'now'))"
        ),
        (migration.version, migration.name),
    )?;
    transaction.commit()
}

fn apply_down_migration(
    connection: &mut Connection,
    migration: &SqliteMigration,
) -> rusqlite::Result<()> {
    let transaction = connection.transaction()?;
    transaction.execute_batch(migration.down_sql)?;
    transaction.execute(
        &format!("DELETE FROM {MIGRATIONS_TABLE} WHERE version = ?1"),
        [migration.version],
    )?;
    transaction.commit()
}

fn missing_saved_search(operation: Operation, id: &SavedSearchId) -> CoreError {
    CoreError::not_found(operation, format!("saved search '{}' does not exist", id.0))
}

/// Ids are opaque to callers; anything that is not one of our row ids
/// simply does not exist.
fn parse_row_id(raw: &str) -> Option<i64> {
    raw.trim().parse::<i64>().ok().filter(|id| *id > 0)
}

fn storage_error(operation: &str, error: rusqlite::Error) -> CoreError {
    storage_error_text(operation, error.to_string())
}

fn storage_error_sqlite(message: &str) -> rusqlite::Error {
    rusqlite::Error::ToSqlConversionFailure(Box::new(std::io::Error::other(message.to_string())))
}

fn bool_to_sqlite(value: bool) -> i64 {
    if value { 1 } else { 0 }
}

fn sqlite_to_bool(value: i64) -> bool {
    value != 0
}

fn to_unix_seconds(value: SystemTime) -> rusqlite::Result<i64> {
    let duration = value.duration_since(UNIX_EPOCH).map_err(|error| {
        storage_error_sqlite(&format!("time before unix epoch is not supported: {error}"))
    })?;
    let seconds = i64::try_from(duration.as_secs())
        .map_err(|_| storage_error_sqlite("unix timestamp seconds exceed i64 range"))?;
    Ok(seconds)
}

fn from_unix_seconds(value: i64) -> rusqlite::Result<SystemTime> {
    if value < 0 {
        return Err(storage_error_sqlite(
            "negative unix timestamps are not supported",
        ));
    }
    let seconds = u64::try_from(value)
        .map_err(|_| storage_error_sqlite("failed to convert unix timestamp to u64"))?;
    Ok(UNIX_EPOCH + Duration::from_secs(seconds))
}

/// Returned records match what a later read yields.
fn truncate_to_seconds(value: SystemTime) -> rusqlite::Result<SystemTime> {
    from_unix_seconds(to_unix_seconds(value)?)
}

fn i64_to_u64(value: i64) -> rusqlite::Result<u64> {
    u64::try_from(value).map_err(|_| storage_error_sqlite("negative count in sqlite record"))
}

fn u64_to_i64(value: u64) -> rusqlite::Result<i64> {
    i64::try_from(value).map_err(|_| storage_error_sqlite("value exceeds i64 range"))
}

fn to_i64(value: usize) -> rusqlite::Result<i64> {
    i64::try_from(value).map_err(|_| storage_error_sqlite("value exceeds i64 range"))
}

fn storage_error_text(operation: &str, message: impl AsRef<str>) -> CoreError {
    CoreError::new(
        CoreErrorKind::StorageFailure,
        format!("sqlite store '{operation}' failed: {}", message.as_ref()),
    )
}
