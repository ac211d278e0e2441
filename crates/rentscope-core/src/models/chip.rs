use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChipGroup {
    Search,
    Location,
    Price,
    Amenity,
    Date,
}

/// Identifies the single query field (or amenity element) a chip clears.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "snake_case")]
pub enum ChipKey {
    Text,
    City,
    State,
    MinPrice,
    MaxPrice,
    AvailabilityDate,
    Amenity(String),
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct FilterChip {
    pub key: ChipKey,
    pub label: String,
    pub value: String,
    pub group: ChipGroup,
}
