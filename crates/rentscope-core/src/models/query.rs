use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::codec;
use crate::models::{CoreError, Operation};

pub const MIN_RADIUS_MILES: f64 = 1.0;
pub const MAX_RADIUS_MILES: f64 = 50.0;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_valid(self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

/// Clamps a radius into `[MIN_RADIUS_MILES, MAX_RADIUS_MILES]`. Non-finite
/// input collapses to the minimum.
pub fn clamp_radius(radius_miles: f64) -> f64 {
    if radius_miles.is_nan() {
        return MIN_RADIUS_MILES;
    }
    radius_miles.clamp(MIN_RADIUS_MILES, MAX_RADIUS_MILES)
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoFilter {
    pub center: LatLng,
    pub radius_miles: f64,
}

impl GeoFilter {
    pub fn new(center: LatLng, radius_miles: f64) -> Result<Self, CoreError> {
        if !center.is_valid() {
            return Err(CoreError::invalid_input(
                Operation::Transition,
                format!("map center ({}, {}) is out of range", center.lat, center.lng),
            ));
        }
        if !(MIN_RADIUS_MILES..=MAX_RADIUS_MILES).contains(&radius_miles) {
            return Err(CoreError::invalid_input(
                Operation::Transition,
                format!(
                    "radius {radius_miles} must be within [{MIN_RADIUS_MILES}, {MAX_RADIUS_MILES}] miles"
                ),
            ));
        }
        Ok(Self {
            center,
            radius_miles,
        })
    }

    pub fn clamped(center: LatLng, radius_miles: f64) -> Self {
        Self {
            center,
            radius_miles: clamp_radius(radius_miles),
        }
    }
}

/// The canonical search state shared by every view.
///
/// Equality is defined by the canonical URL encoding: two queries are equal
/// exactly when [`SearchQuery::fingerprint`] agrees.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchQuery {
    pub text: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub min_price: Option<u32>,
    pub max_price: Option<u32>,
    pub amenities: BTreeSet<String>,
    pub availability_date: Option<NaiveDate>,
    pub geo: Option<GeoFilter>,
    pub sort: Option<String>,
    pub page: u32,
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            text: None,
            city: None,
            state: None,
            min_price: None,
            max_price: None,
            amenities: BTreeSet::new(),
            availability_date: None,
            geo: None,
            sort: None,
            page: 1,
        }
    }
}

impl SearchQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fingerprint(&self) -> String {
        codec::encode(self).to_query_string()
    }

    pub fn is_map_mode(&self) -> bool {
        self.geo.is_some()
    }

    /// Same query with `page` forced back to the first page.
    pub fn first_page(mut self) -> Self {
        self.page = 1;
        self
    }

    pub fn without_geo(mut self) -> Self {
        self.geo = None;
        self
    }

    /// True when the two queries differ in anything other than `page`.
    pub fn filters_differ(&self, other: &Self) -> bool {
        self.clone().first_page() != other.clone().first_page()
    }
}

impl PartialEq for SearchQuery {
    fn eq(&self, other: &Self) -> bool {
        self.fingerprint() == other.fingerprint()
    }
}

impl Eq for SearchQuery {}

impl Hash for SearchQuery {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.fingerprint().hash(state);
    }
}
