use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use crate::codec;
use crate::models::SearchQuery;

#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct SavedSearchId(pub String);

#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct HistoryEntryId(pub String);

/// A named query snapshot. The snapshot is the canonical encoding captured
/// at save time, so later edits to the live query cannot reach it.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SavedSearch {
    pub id: SavedSearchId,
    pub name: String,
    pub snapshot: String,
    pub email_alerts: bool,
    pub created_at: SystemTime,
}

impl SavedSearch {
    /// Decodes the snapshot; a corrupt snapshot yields the empty query.
    pub fn query(&self) -> SearchQuery {
        codec::decode_str(&self.snapshot)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct NewSavedSearch {
    pub name: String,
    pub snapshot: String,
    pub email_alerts: bool,
    pub created_at: SystemTime,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SearchHistoryEntry {
    pub id: HistoryEntryId,
    pub text: Option<String>,
    pub filters: String,
    pub results_count: u64,
    pub created_at: SystemTime,
}

impl SearchHistoryEntry {
    pub fn filters(&self) -> SearchQuery {
        codec::decode_str(&self.filters)
    }

    /// The recorded filters with the free-text term put back, on page 1.
    pub fn query(&self) -> SearchQuery {
        SearchQuery {
            text: self.text.clone(),
            ..self.filters()
        }
        .first_page()
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct NewSearchHistoryEntry {
    pub text: Option<String>,
    pub filters: String,
    pub results_count: u64,
    pub created_at: SystemTime,
}
