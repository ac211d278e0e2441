use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;

use crate::chips;
use crate::config::EngineConfig;
use crate::fetch::{FetchOutcome, FetchPolicy, ResultFetcher};
use crate::geo::{MapCommand, MapViewController, ViewMode};
use crate::models::{
    CoreError, CoreErrorKind, FilterChip, LatLng, Operation, SavedSearch, SavedSearchId,
    SearchHistoryEntry, SearchQuery,
};
use crate::persistence::{QueryStateStore, SavedSearchStore, SearchHistoryStore};
use crate::saved_searches::SearchLibrary;
use crate::session::{QueryTransition, SearchSession};
use crate::sources::ListingSource;
use crate::suggestions::SuggestionEngine;

/// Storage the engine is wired to.
pub struct EngineStores {
    pub saved_searches: Arc<dyn SavedSearchStore>,
    pub history: Arc<dyn SearchHistoryStore>,
    pub query_state: Option<Arc<dyn QueryStateStore>>,
}

/// Result of routing one event through the session.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct QueryUpdate {
    pub query: SearchQuery,
    pub changed: bool,
    /// What the map widget should do, if anything.
    pub map_command: Option<MapCommand>,
}

/// Wires the session, fetcher, suggestions, map controller and library
/// together. Every query change goes through [`SearchEngine::apply`].
pub struct SearchEngine {
    config: EngineConfig,
    session: SearchSession,
    fetcher: ResultFetcher,
    suggestions: SuggestionEngine,
    library: SearchLibrary,
    map: Mutex<MapViewController>,
    /// Held across the session swap and the map sync of one apply.
    apply_gate: tokio::sync::Mutex<()>,
}

impl SearchEngine {
    pub async fn new(
        config: EngineConfig,
        source: Arc<dyn ListingSource>,
        stores: EngineStores,
    ) -> Self {
        let session = match stores.query_state {
            Some(store) => SearchSession::restore(store).await,
            None => SearchSession::default(),
        };

        let mut map = MapViewController::new(config.default_center, config.default_radius_miles);
        map.sync_from_query(&session.current());

        Self {
            fetcher: ResultFetcher::new(Arc::clone(&source)),
            suggestions: SuggestionEngine::new(
                source,
                config.suggestion_debounce(),
                config.suggestion_min_chars,
                config.max_suggestions,
            ),
            library: SearchLibrary::new(stores.saved_searches, stores.history)
                .with_history_retention(config.history_limit),
            map: Mutex::new(map),
            apply_gate: tokio::sync::Mutex::new(()),
            session,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn session(&self) -> &SearchSession {
        &self.session
    }

    pub fn fetcher(&self) -> &ResultFetcher {
        &self.fetcher
    }

    pub fn suggestions(&self) -> &SuggestionEngine {
        &self.suggestions
    }

    pub fn library(&self) -> &SearchLibrary {
        &self.library
    }

    pub fn current_query(&self) -> SearchQuery {
        self.session.current()
    }

    pub fn chips(&self) -> Vec<FilterChip> {
        chips::derive_chips(&self.session.current())
    }

    pub fn view_mode(&self) -> Result<ViewMode, CoreError> {
        Ok(self.lock_map()?.mode())
    }

    /// Routes `transition` through the session and brings the map controller
    /// in line with the result. Concurrent applies are serialized so the map
    /// always ends on the newest query.
    pub async fn apply(&self, transition: QueryTransition) -> Result<QueryUpdate, CoreError> {
        let _gate = self.apply_gate.lock().await;
        let applied = self.session.apply(transition).await?;
        let map_command = if applied.changed {
            self.lock_map()?.sync_from_query(&applied.query)
        } else {
            None
        };
        Ok(QueryUpdate {
            query: applied.query,
            changed: applied.changed,
            map_command,
        })
    }

    /// Fetches the current query. A successful fetch is recorded in history;
    /// a failed history write is logged and does not affect the outcome.
    pub async fn execute(&self, policy: FetchPolicy) -> FetchOutcome {
        let query = self.session.current();
        let outcome = self.fetcher.fetch(&query, policy).await;

        if let FetchOutcome::Ready(page) = &outcome
            && let Err(error) = self.library.record_search(&query, page.total).await
        {
            tracing::error!(
                operation = ?Operation::RecordHistory,
                kind = ?error.kind,
                message = %error.message,
                "failed to record search history"
            );
        }
        outcome
    }

    /// [`Self::execute`] with the list/map freshness policy.
    pub async fn execute_list(&self) -> FetchOutcome {
        self.execute(self.config.list_policy()).await
    }

    pub async fn save_current(
        &self,
        name: &str,
        email_alerts: bool,
    ) -> Result<SavedSearch, CoreError> {
        self.library
            .save(name, &self.session.current(), email_alerts)
            .await
    }

    /// Replaces the live query with a saved snapshot.
    pub async fn apply_saved_search(&self, id: &SavedSearchId) -> Result<QueryUpdate, CoreError> {
        let query = self.library.apply(id).await?;
        self.apply(QueryTransition::Replace { query }).await
    }

    pub async fn replay_history(
        &self,
        entry: &SearchHistoryEntry,
    ) -> Result<QueryUpdate, CoreError> {
        self.apply(QueryTransition::Replace {
            query: entry.query(),
        })
        .await
    }

    pub async fn history(&self) -> Result<Vec<SearchHistoryEntry>, CoreError> {
        self.library.history(self.config.history_limit).await
    }

    pub async fn enter_map_mode(&self) -> Result<QueryUpdate, CoreError> {
        let listings = self
            .fetcher
            .current()
            .map(|page| page.listings.clone())
            .unwrap_or_default();
        let (next, command) = self
            .lock_map()?
            .enter_map_mode(&self.session.current(), &listings);

        let mut update = self.apply(QueryTransition::Replace { query: next }).await?;
        update.map_command = Some(command);
        Ok(update)
    }

    pub async fn leave_map_mode(&self) -> Result<QueryUpdate, CoreError> {
        let next = self.lock_map()?.leave_map_mode(&self.session.current());
        self.apply(QueryTransition::Replace { query: next }).await
    }

    /// The map reported `moveend` at `center`.
    pub async fn map_moved(&self, center: LatLng) -> Result<QueryUpdate, CoreError> {
        let current = self.session.current();
        let next = self.lock_map()?.on_move_end(center, &current);
        match next {
            Some(query) => self.apply(QueryTransition::Replace { query }).await,
            None => Ok(QueryUpdate {
                query: current,
                changed: false,
                map_command: None,
            }),
        }
    }

    pub fn map_center(&self) -> Result<LatLng, CoreError> {
        Ok(self.lock_map()?.center())
    }

    /// Slider drag; returns the clamped radius in miles.
    pub fn set_radius(&self, radius_miles: f64) -> Result<f64, CoreError> {
        Ok(self.lock_map()?.set_radius(radius_miles))
    }

    pub fn circle_radius_meters(&self) -> Result<f64, CoreError> {
        Ok(self.lock_map()?.circle_radius_meters())
    }

    pub async fn release_radius(&self) -> Result<QueryUpdate, CoreError> {
        let current = self.session.current();
        let next = self.lock_map()?.release_radius(&current);
        match next {
            Some(query) => self.apply(QueryTransition::Replace { query }).await,
            None => Ok(QueryUpdate {
                query: current,
                changed: false,
                map_command: None,
            }),
        }
    }

    fn lock_map(&self) -> Result<MutexGuard<'_, MapViewController>, CoreError> {
        self.map.lock().map_err(|_| {
            CoreError::new(CoreErrorKind::Internal, "map controller mutex poisoned")
                .during(Operation::Transition)
        })
    }
}
