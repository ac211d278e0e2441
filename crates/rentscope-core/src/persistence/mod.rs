pub mod in_memory;

pub use in_memory::InMemoryStore;

use crate::models::{
    CoreError, HistoryEntryId, NewSavedSearch, NewSearchHistoryEntry, SavedSearch, SavedSearchId,
    SearchHistoryEntry,
};

pub type PersistenceResult<T> = Result<T, CoreError>;

pub trait MigrationStore: Send + Sync {
    fn current_version(&self) -> PersistenceResult<i64>;

    fn apply_migration(&self, target_version: i64) -> PersistenceResult<()>;
}

/// Saved searches are immutable apart from the email alert flag.
pub trait SavedSearchStore: Send + Sync {
    fn create_saved_search(&self, search: &NewSavedSearch) -> PersistenceResult<SavedSearch>;

    fn saved_search(&self, id: &SavedSearchId) -> PersistenceResult<Option<SavedSearch>>;

    /// Newest first.
    fn list_saved_searches(&self) -> PersistenceResult<Vec<SavedSearch>>;

    /// Fails with `NotFound` for unknown ids.
    fn set_email_alerts(&self, id: &SavedSearchId, enabled: bool) -> PersistenceResult<()>;

    /// Fails with `NotFound` for unknown ids.
    fn delete_saved_search(&self, id: &SavedSearchId) -> PersistenceResult<()>;
}

pub trait SearchHistoryStore: Send + Sync {
    fn append_history(&self, entry: &NewSearchHistoryEntry)
    -> PersistenceResult<SearchHistoryEntry>;

    /// Newest first, at most `limit` entries.
    fn list_history(&self, limit: usize) -> PersistenceResult<Vec<SearchHistoryEntry>>;

    /// Drops everything but the newest `keep` entries and returns how many
    /// were removed.
    fn prune_history(&self, keep: usize) -> PersistenceResult<usize>;

    fn delete_history_entry(&self, id: &HistoryEntryId) -> PersistenceResult<()>;

    fn clear_history(&self) -> PersistenceResult<()>;
}

/// Remembers the last canonical query across restarts.
pub trait QueryStateStore: Send + Sync {
    fn store_last_query(&self, encoded: &str) -> PersistenceResult<()>;

    fn last_query(&self) -> PersistenceResult<Option<String>>;
}
