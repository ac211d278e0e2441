use std::sync::{Mutex, MutexGuard};

use crate::models::{
    CoreError, CoreErrorKind, HistoryEntryId, NewSavedSearch, NewSearchHistoryEntry, Operation,
    SavedSearch, SavedSearchId, SearchHistoryEntry,
};
use crate::persistence::{
    PersistenceResult, QueryStateStore, SavedSearchStore, SearchHistoryStore,
};

/// Volatile store used by tests and by hosts without durable storage.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<StoreState>,
}

#[derive(Default)]
struct StoreState {
    next_id: u64,
    // Insertion order; listings are served newest first.
    saved_searches: Vec<SavedSearch>,
    history: Vec<SearchHistoryEntry>,
    last_query: Option<String>,
}

impl StoreState {
    fn allocate_id(&mut self, prefix: &str) -> String {
        self.next_id = self.next_id.saturating_add(1);
        format!("{prefix}-{}", self.next_id)
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_state(&self) -> PersistenceResult<MutexGuard<'_, StoreState>> {
        self.state.lock().map_err(|_| {
            CoreError::new(CoreErrorKind::Internal, "in-memory store mutex poisoned")
        })
    }
}

impl SavedSearchStore for InMemoryStore {
    fn create_saved_search(&self, search: &NewSavedSearch) -> PersistenceResult<SavedSearch> {
        let mut state = self.lock_state()?;
        let saved = SavedSearch {
            id: SavedSearchId(state.allocate_id("saved")),
            name: search.name.clone(),
            snapshot: search.snapshot.clone(),
            email_alerts: search.email_alerts,
            created_at: search.created_at,
        };
        state.saved_searches.push(saved.clone());
        Ok(saved)
    }

    fn saved_search(&self, id: &SavedSearchId) -> PersistenceResult<Option<SavedSearch>> {
        let state = self.lock_state()?;
        Ok(state
            .saved_searches
            .iter()
            .find(|saved| &saved.id == id)
            .cloned())
    }

    fn list_saved_searches(&self) -> PersistenceResult<Vec<SavedSearch>> {
        let state = self.lock_state()?;
        Ok(state.saved_searches.iter().rev().cloned().collect())
    }

    fn set_email_alerts(&self, id: &SavedSearchId, enabled: bool) -> PersistenceResult<()> {
        let mut state = self.lock_state()?;
        let saved = state
            .saved_searches
            .iter_mut()
            .find(|saved| &saved.id == id)
            .ok_or_else(|| missing_saved_search(Operation::ToggleEmailAlerts, id))?;
        saved.email_alerts = enabled;
        Ok(())
    }

    fn delete_saved_search(&self, id: &SavedSearchId) -> PersistenceResult<()> {
        let mut state = self.lock_state()?;
        let before = state.saved_searches.len();
        state.saved_searches.retain(|saved| &saved.id != id);
        if state.saved_searches.len() == before {
            return Err(missing_saved_search(Operation::DeleteSavedSearch, id));
        }
        Ok(())
    }
}

impl SearchHistoryStore for InMemoryStore {
    fn append_history(
        &self,
        entry: &NewSearchHistoryEntry,
    ) -> PersistenceResult<SearchHistoryEntry> {
        let mut state = self.lock_state()?;
        let stored = SearchHistoryEntry {
            id: HistoryEntryId(state.allocate_id("history")),
            text: entry.text.clone(),
            filters: entry.filters.clone(),
            results_count: entry.results_count,
            created_at: entry.created_at,
        };
        state.history.push(stored.clone());
        Ok(stored)
    }

    fn list_history(&self, limit: usize) -> PersistenceResult<Vec<SearchHistoryEntry>> {
        let state = self.lock_state()?;
        Ok(state.history.iter().rev().take(limit).cloned().collect())
    }

    fn prune_history(&self, keep: usize) -> PersistenceResult<usize> {
        let mut state = self.lock_state()?;
        let excess = state.history.len().saturating_sub(keep);
        state.history.drain(..excess);
        Ok(excess)
    }

    fn delete_history_entry(&self, id: &HistoryEntryId) -> PersistenceResult<()> {
        let mut state = self.lock_state()?;
        let before = state.history.len();
        state.history.retain(|entry| &entry.id != id);
        if state.history.len() == before {
            return Err(CoreError::not_found(
                Operation::DeleteHistoryEntry,
                format!("history entry '{}' does not exist", id.0),
            ));
        }
        Ok(())
    }

    fn clear_history(&self) -> PersistenceResult<()> {
        self.lock_state()?.history.clear();
        Ok(())
    }
}

impl QueryStateStore for InMemoryStore {
    fn store_last_query(&self, encoded: &str) -> PersistenceResult<()> {
        self.lock_state()?.last_query = Some(encoded.to_string());
        Ok(())
    }

    fn last_query(&self) -> PersistenceResult<Option<String>> {
        Ok(self.lock_state()?.last_query.clone())
    }
}

fn missing_saved_search(operation: Operation, id: &SavedSearchId) -> CoreError {
    CoreError::not_found(operation, format!("saved search '{}' does not exist", id.0))
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use super::*;

    fn new_search(name: &str) -> NewSavedSearch {
        NewSavedSearch {
            name: name.to_string(),
            snapshot: "city=Boston&page=1".to_string(),
            email_alerts: false,
            created_at: SystemTime::now(),
        }
    }

    #[test]
    fn lists_saved_searches_newest_first() {
        let store = InMemoryStore::new();
        store.create_saved_search(&new_search("first")).unwrap();
        store.create_saved_search(&new_search("second")).unwrap();

        let names: Vec<_> = store
            .list_saved_searches()
            .unwrap()
            .into_iter()
            .map(|saved| saved.name)
            .collect();
        assert_eq!(names, vec!["second", "first"]);
    }

    #[test]
    fn unknown_ids_are_not_found() {
        let store = InMemoryStore::new();
        let id = SavedSearchId("saved-404".to_string());
        let error = store.set_email_alerts(&id, true).unwrap_err();
        assert_eq!(error.kind, CoreErrorKind::NotFound);
        assert_eq!(error.operation, Some(Operation::ToggleEmailAlerts));

        let error = store.delete_saved_search(&id).unwrap_err();
        assert_eq!(error.operation, Some(Operation::DeleteSavedSearch));
    }

    #[test]
    fn history_respects_limit() {
        let store = InMemoryStore::new();
        for count in 0..5 {
            store
                .append_history(&NewSearchHistoryEntry {
                    text: None,
                    filters: "page=1".to_string(),
                    results_count: count,
                    created_at: SystemTime::now(),
                })
                .unwrap();
        }
        let entries = store.list_history(2).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].results_count, 4);
    }

    #[test]
    fn pruning_keeps_only_the_newest_entries() {
        let store = InMemoryStore::new();
        for count in 0..5 {
            store
                .append_history(&NewSearchHistoryEntry {
                    text: None,
                    filters: "page=1".to_string(),
                    results_count: count,
                    created_at: SystemTime::now(),
                })
                .unwrap();
        }

        assert_eq!(store.prune_history(3).unwrap(), 2);
        assert_eq!(store.prune_history(3).unwrap(), 0);
        let counts: Vec<u64> = store
            .list_history(10)
            .unwrap()
            .iter()
            .map(|entry| entry.results_count)
            .collect();
        assert_eq!(counts, vec![4, 3, 2]);
    }
}
