pub mod chip;
pub mod error;
pub mod listing;
pub mod query;
pub mod saved_search;
pub mod suggestion;

pub use chip::{ChipGroup, ChipKey, FilterChip};
pub use error::{CoreError, CoreErrorKind, Operation};
pub use listing::{Landlord, Listing, ListingLocation, ListingPage};
pub use query::{
    GeoFilter, LatLng, MAX_RADIUS_MILES, MIN_RADIUS_MILES, SearchQuery, clamp_radius,
};
pub use saved_search::{
    HistoryEntryId, NewSavedSearch, NewSearchHistoryEntry, SavedSearch, SavedSearchId,
    SearchHistoryEntry,
};
pub use suggestion::{Suggestion, SuggestionKind};
