use std::sync::Arc;
use std::time::SystemTime;

use crate::codec;
use crate::models::{
    CoreError, CoreErrorKind, HistoryEntryId, NewSavedSearch, NewSearchHistoryEntry, Operation,
    SavedSearch, SavedSearchId, SearchHistoryEntry, SearchQuery,
};
use crate::persistence::{PersistenceResult, SavedSearchStore, SearchHistoryStore};

/// History entries kept by a library built without an explicit retention.
pub const DEFAULT_HISTORY_RETENTION: usize = 500;

/// Saved searches and search history. Store calls run on the blocking pool
/// and are never retried.
pub struct SearchLibrary {
    saved: Arc<dyn SavedSearchStore>,
    history: Arc<dyn SearchHistoryStore>,
    history_retention: usize,
}

impl SearchLibrary {
    pub fn new(saved: Arc<dyn SavedSearchStore>, history: Arc<dyn SearchHistoryStore>) -> Self {
        Self {
            saved,
            history,
            history_retention: DEFAULT_HISTORY_RETENTION,
        }
    }

    /// Caps stored history at the newest `keep` entries (at least one).
    pub fn with_history_retention(mut self, keep: usize) -> Self {
        self.history_retention = keep.max(1);
        self
    }

    /// Snapshots `query` under `name`.
    pub async fn save(
        &self,
        name: &str,
        query: &SearchQuery,
        email_alerts: bool,
    ) -> PersistenceResult<SavedSearch> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CoreError::invalid_input(
                Operation::SaveSearch,
                "saved search name must not be empty",
            ));
        }

        let search = NewSavedSearch {
            name: name.to_string(),
            snapshot: codec::encode_string(&query.clone().first_page()),
            email_alerts,
            created_at: SystemTime::now(),
        };
        let saved = run_store(Operation::SaveSearch, Arc::clone(&self.saved), move |store| {
            store.create_saved_search(&search)
        })
        .await?;
        tracing::debug!(id = %saved.id.0, snapshot = %saved.snapshot, "saved search");
        Ok(saved)
    }

    /// The stored snapshot as a fresh query on page 1.
    pub async fn apply(&self, id: &SavedSearchId) -> PersistenceResult<SearchQuery> {
        let saved = self.find(Operation::ApplySavedSearch, id).await?;
        let query = saved.query();
        if query == SearchQuery::new() && codec::QueryParams::parse(&saved.snapshot).len() > 1 {
            tracing::warn!(
                id = %id.0,
                "saved search snapshot did not decode; applying empty query"
            );
        }
        Ok(query.first_page())
    }

    /// Flips the email alert flag and returns the new value.
    pub async fn toggle_email_alerts(&self, id: &SavedSearchId) -> PersistenceResult<bool> {
        let saved = self.find(Operation::ToggleEmailAlerts, id).await?;
        let enabled = !saved.email_alerts;
        let target = id.clone();
        run_store(
            Operation::ToggleEmailAlerts,
            Arc::clone(&self.saved),
            move |store| store.set_email_alerts(&target, enabled),
        )
        .await?;
        Ok(enabled)
    }

    pub async fn delete(&self, id: &SavedSearchId) -> PersistenceResult<()> {
        let target = id.clone();
        run_store(
            Operation::DeleteSavedSearch,
            Arc::clone(&self.saved),
            move |store| store.delete_saved_search(&target),
        )
        .await
    }

    pub async fn list_saved(&self) -> PersistenceResult<Vec<SavedSearch>> {
        run_store(
            Operation::ListSavedSearches,
            Arc::clone(&self.saved),
            |store| store.list_saved_searches(),
        )
        .await
    }

    /// Appends one history entry for an executed search, then prunes the
    /// store down to the retention cap. The free-text term is kept apart
    /// from the remaining filters.
    pub async fn record_search(
        &self,
        query: &SearchQuery,
        results_count: u64,
    ) -> PersistenceResult<SearchHistoryEntry> {
        let filters = SearchQuery {
            text: None,
            ..query.clone()
        }
        .first_page();
        let entry = NewSearchHistoryEntry {
            text: query.text.clone(),
            filters: codec::encode_string(&filters),
            results_count,
            created_at: SystemTime::now(),
        };
        let keep = self.history_retention;
        run_store(Operation::RecordHistory, Arc::clone(&self.history), move |store| {
            let stored = store.append_history(&entry)?;
            let pruned = store.prune_history(keep)?;
            if pruned > 0 {
                tracing::debug!(pruned, keep, "pruned search history");
            }
            Ok(stored)
        })
        .await
    }

    pub async fn history(&self, limit: usize) -> PersistenceResult<Vec<SearchHistoryEntry>> {
        run_store(Operation::ListHistory, Arc::clone(&self.history), move |store| {
            store.list_history(limit)
        })
        .await
    }

    pub async fn delete_history_entry(&self, id: &HistoryEntryId) -> PersistenceResult<()> {
        let target = id.clone();
        run_store(
            Operation::DeleteHistoryEntry,
            Arc::clone(&self.history),
            move |store| store.delete_history_entry(&target),
        )
        .await
    }

    pub async fn clear_history(&self) -> PersistenceResult<()> {
        run_store(Operation::ClearHistory, Arc::clone(&self.history), |store| {
            store.clear_history()
        })
        .await
    }

    async fn find(
        &self,
        operation: Operation,
        id: &SavedSearchId,
    ) -> PersistenceResult<SavedSearch> {
        let target = id.clone();
        run_store(operation, Arc::clone(&self.saved), move |store| {
            store.saved_search(&target)
        })
        .await?
        .ok_or_else(|| {
            CoreError::not_found(operation, format!("saved search '{}' does not exist", id.0))
        })
    }
}

async fn run_store<S, T, F>(operation: Operation, store: Arc<S>, call: F) -> PersistenceResult<T>
where
    S: ?Sized + Send + Sync + 'static,
    T: Send + 'static,
    F: FnOnce(&S) -> PersistenceResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(move || call(store.as_ref()))
        .await
        .map_err(|join_error| {
            CoreError::new(
                CoreErrorKind::Internal,
                format!("store call join failure: {join_error}"),
            )
            .during(operation)
        })?
        .map_err(|error| error.during(operation))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::InMemoryStore;

    fn library() -> SearchLibrary {
        let store = Arc::new(InMemoryStore::new());
        SearchLibrary::new(store.clone(), store)
    }

    #[tokio::test]
    async fn blank_name_is_rejected_before_storage() {
        let library = library();
        let error = library
            .save("   ", &SearchQuery::new(), false)
            .await
            .unwrap_err();
        assert_eq!(error.kind, CoreErrorKind::InvalidInput);
        assert!(library.list_saved().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn history_keeps_text_apart_from_filters() {
        let library = library();
        let query = SearchQuery {
            text: Some("loft".to_string()),
            city: Some("Boston".to_string()),
            page: 3,
            ..SearchQuery::new()
        };
        let entry = library.record_search(&query, 12).await.unwrap();
        assert_eq!(entry.text.as_deref(), Some("loft"));
        assert_eq!(entry.filters, "city=Boston&page=1");
        assert_eq!(entry.query(), query.first_page());
    }

    #[tokio::test]
    async fn recording_prunes_history_to_retention() {
        let store = Arc::new(InMemoryStore::new());
        let library = SearchLibrary::new(store.clone(), store.clone()).with_history_retention(2);

        for count in 0..4 {
            library
                .record_search(&SearchQuery::new(), count)
                .await
                .unwrap();
        }

        let counts: Vec<u64> = store
            .list_history(10)
            .unwrap()
            .iter()
            .map(|entry| entry.results_count)
            .collect();
        assert_eq!(counts, vec![3, 2]);
    }
}
