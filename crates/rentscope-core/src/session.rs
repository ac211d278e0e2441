use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::chips;
use crate::codec;
use crate::models::{ChipKey, CoreError, GeoFilter, Operation, SearchQuery};
use crate::persistence::QueryStateStore;

/// One UI event against the canonical query.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueryTransition {
    SetText { text: Option<String> },
    SetCity { city: Option<String> },
    SetState { state: Option<String> },
    SetPriceRange { min: Option<u32>, max: Option<u32> },
    ToggleAmenity { amenity: String },
    SetAvailabilityDate { date: Option<NaiveDate> },
    SetSort { sort: Option<String> },
    SetPage { page: u32 },
    RemoveChip { key: ChipKey },
    ClearAll,
    SetGeo { geo: Option<GeoFilter> },
    /// Wholesale replacement, e.g. from a saved search or the map.
    Replace { query: SearchQuery },
    /// A shared URL or its query string.
    Navigate { url: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Applied {
    pub query: SearchQuery,
    pub changed: bool,
}

/// Sole writer of the canonical query. Readers subscribe to the watch
/// channel and always observe whole values.
pub struct SearchSession {
    sender: watch::Sender<SearchQuery>,
    state_store: Option<Arc<dyn QueryStateStore>>,
}

impl SearchSession {
    pub fn new(initial: SearchQuery) -> Self {
        let (sender, _) = watch::channel(codec::canonicalize(&initial));
        Self {
            sender,
            state_store: None,
        }
    }

    /// Starts from the last stored query. Unreadable or corrupt state yields
    /// the empty query.
    pub async fn restore(store: Arc<dyn QueryStateStore>) -> Self {
        let reader = Arc::clone(&store);
        let stored = tokio::task::spawn_blocking(move || reader.last_query()).await;

        let initial = match stored {
            Ok(Ok(Some(encoded))) => codec::decode_str(&encoded),
            Ok(Ok(None)) => SearchQuery::new(),
            Ok(Err(error)) => {
                tracing::warn!(
                    operation = ?Operation::RestoreQueryState,
                    message = %error.message,
                    "could not read last query; starting empty"
                );
                SearchQuery::new()
            }
            Err(join_error) => {
                tracing::warn!(
                    operation = ?Operation::RestoreQueryState,
                    message = %join_error,
                    "query restore task failed; starting empty"
                );
                SearchQuery::new()
            }
        };

        let mut session = Self::new(initial);
        session.state_store = Some(store);
        session
    }

    pub fn subscribe(&self) -> watch::Receiver<SearchQuery> {
        self.sender.subscribe()
    }

    pub fn current(&self) -> SearchQuery {
        self.sender.borrow().clone()
    }

    /// The shareable URL query string of the current state.
    pub fn url(&self) -> String {
        self.sender.borrow().fingerprint()
    }

    pub async fn apply(&self, transition: QueryTransition) -> Result<Applied, CoreError> {
        let mut rejected = None;
        let changed = self.sender.send_if_modified(|current| {
            match next_query(current, transition) {
                Ok(next) if next != *current => {
                    *current = next;
                    true
                }
                Ok(_) => false,
                Err(error) => {
                    rejected = Some(error);
                    false
                }
            }
        });
        if let Some(error) = rejected {
            return Err(error);
        }

        let query = self.current();
        if changed {
            tracing::debug!(fingerprint = %query.fingerprint(), "query updated");
            self.persist(&query).await;
        }
        Ok(Applied { query, changed })
    }

    async fn persist(&self, query: &SearchQuery) {
        let Some(store) = self.state_store.as_ref().map(Arc::clone) else {
            return;
        };
        let encoded = query.fingerprint();
        let result = tokio::task::spawn_blocking(move || store.store_last_query(&encoded)).await;
        match result {
            Ok(Ok(())) => {}
            Ok(Err(error)) => tracing::error!(
                operation = ?Operation::StoreQueryState,
                kind = ?error.kind,
                message = %error.message,
                "failed to persist last query"
            ),
            Err(join_error) => tracing::error!(
                operation = ?Operation::StoreQueryState,
                message = %join_error,
                "query persistence task failed"
            ),
        }
    }
}

impl Default for SearchSession {
    fn default() -> Self {
        Self::new(SearchQuery::new())
    }
}

/// Computes the canonical successor of `current`. Any change outside `page`
/// sends the query back to the first page.
pub fn next_query(
    current: &SearchQuery,
    transition: QueryTransition,
) -> Result<SearchQuery, CoreError> {
    let mut next = current.clone();
    match transition {
        QueryTransition::SetText { text } => next.text = text,
        QueryTransition::SetCity { city } => next.city = city,
        QueryTransition::SetState { state } => next.state = state,
        QueryTransition::SetPriceRange { min, max } => {
            if let (Some(min), Some(max)) = (min, max)
                && min > max
            {
                return Err(CoreError::invalid_input(
                    Operation::Transition,
                    format!("minimum price {min} exceeds maximum price {max}"),
                ));
            }
            next.min_price = min;
            next.max_price = max;
        }
        QueryTransition::ToggleAmenity { amenity } => {
            let amenity = amenity.trim();
            if amenity.is_empty() {
                return Err(CoreError::invalid_input(
                    Operation::Transition,
                    "amenity must not be blank",
                ));
            }
            if amenity.contains(',') {
                return Err(CoreError::invalid_input(
                    Operation::Transition,
                    format!("amenity '{amenity}' must not contain a comma"),
                ));
            }
            if !next.amenities.remove(amenity) {
                next.amenities.insert(amenity.to_string());
            }
        }
        QueryTransition::SetAvailabilityDate { date } => next.availability_date = date,
        QueryTransition::SetSort { sort } => next.sort = sort,
        QueryTransition::SetPage { page } => {
            next.page = page.max(1);
            return Ok(codec::canonicalize(&next));
        }
        QueryTransition::RemoveChip { key } => next = chips::remove_chip(current, &key),
        QueryTransition::ClearAll => next = chips::clear_all(current),
        QueryTransition::SetGeo { geo } => {
            next.geo = match geo {
                Some(geo) => Some(GeoFilter::new(geo.center, geo.radius_miles)?),
                None => None,
            };
        }
        QueryTransition::Replace { query } => return Ok(codec::canonicalize(&query)),
        QueryTransition::Navigate { url } => {
            let query_string = url.split_once('?').map_or(url.as_str(), |(_, rest)| rest);
            let query_string = query_string.split('#').next().unwrap_or_default();
            return Ok(codec::decode_str(query_string));
        }
    }

    let mut next = codec::canonicalize(&next);
    if next.filters_differ(current) {
        next.page = 1;
    }
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CoreErrorKind, LatLng};

    fn on_page(page: u32) -> SearchQuery {
        SearchQuery {
            city: Some("Boston".to_string()),
            page,
            ..SearchQuery::new()
        }
    }

    #[test]
    fn filter_change_resets_page() {
        let next = next_query(
            &on_page(4),
            QueryTransition::SetSort {
                sort: Some("price_asc".to_string()),
            },
        )
        .unwrap();
        assert_eq!(next.page, 1);
    }

    #[test]
    fn set_page_keeps_filters() {
        let next = next_query(&on_page(1), QueryTransition::SetPage { page: 0 }).unwrap();
        assert_eq!(next, on_page(1));
        let next = next_query(&on_page(1), QueryTransition::SetPage { page: 3 }).unwrap();
        assert_eq!(next.page, 3);
    }

    #[test]
    fn inverted_price_range_is_rejected() {
        let error = next_query(
            &SearchQuery::new(),
            QueryTransition::SetPriceRange {
                min: Some(3000),
                max: Some(1000),
            },
        )
        .unwrap_err();
        assert_eq!(error.kind, CoreErrorKind::InvalidInput);
    }

    #[test]
    fn out_of_range_geo_is_rejected() {
        let error = next_query(
            &SearchQuery::new(),
            QueryTransition::SetGeo {
                geo: Some(GeoFilter {
                    center: LatLng::new(40.0, -74.0),
                    radius_miles: 75.0,
                }),
            },
        )
        .unwrap_err();
        assert_eq!(error.kind, CoreErrorKind::InvalidInput);
    }

    #[test]
    fn toggle_amenity_adds_then_removes() {
        let added = next_query(
            &SearchQuery::new(),
            QueryTransition::ToggleAmenity {
                amenity: " Gym ".to_string(),
            },
        )
        .unwrap();
        assert!(added.amenities.contains("Gym"));
        let removed = next_query(
            &added,
            QueryTransition::ToggleAmenity {
                amenity: "Gym".to_string(),
            },
        )
        .unwrap();
        assert!(removed.amenities.is_empty());
    }

    #[test]
    fn amenity_with_comma_is_rejected() {
        let error = next_query(
            &SearchQuery::new(),
            QueryTransition::ToggleAmenity {
                amenity: "Washer, Dryer".to_string(),
            },
        )
        .unwrap_err();
        assert_eq!(error.kind, CoreErrorKind::InvalidInput);
        assert_eq!(error.operation, Some(Operation::Transition));
    }

    #[test]
    fn navigate_accepts_full_urls() {
        let next = next_query(
            &SearchQuery::new(),
            QueryTransition::Navigate {
                url: "https://rent.example/search?city=Austin&page=2#map".to_string(),
            },
        )
        .unwrap();
        assert_eq!(next.city.as_deref(), Some("Austin"));
        assert_eq!(next.page, 2);
    }

    #[test]
    fn transitions_deserialize_from_tagged_json() {
        let transition: QueryTransition =
            serde_json::from_str(r#"{"type":"remove_chip","key":{"field":"amenity","value":"WiFi"}}"#)
                .unwrap();
        assert_eq!(
            transition,
            QueryTransition::RemoveChip {
                key: ChipKey::Amenity("WiFi".to_string())
            }
        );
    }

    #[tokio::test]
    async fn unchanged_transition_does_not_notify() {
        let session = SearchSession::new(on_page(1));
        let receiver = session.subscribe();

        let applied = session
            .apply(QueryTransition::SetCity {
                city: Some("Boston".to_string()),
            })
            .await
            .unwrap();
        assert!(!applied.changed);
        assert!(!receiver.has_changed().unwrap());
    }
}
