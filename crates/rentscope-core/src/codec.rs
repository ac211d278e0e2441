//! Bidirectional mapping between [`SearchQuery`] and its flat URL form.
//!
//! Keys are always written in schema order, amenities are sorted before
//! joining, and numbers use Rust's locale-independent formatting, so the
//! encoded string doubles as the query's identity (its fingerprint).

use std::collections::BTreeSet;

use chrono::NaiveDate;
use url::form_urlencoded;

use crate::models::{GeoFilter, LatLng, SearchQuery};

pub const PARAM_SEARCH: &str = "search";
pub const PARAM_CITY: &str = "city";
pub const PARAM_STATE: &str = "state";
pub const PARAM_MIN_PRICE: &str = "minPrice";
pub const PARAM_MAX_PRICE: &str = "maxPrice";
pub const PARAM_AMENITIES: &str = "amenities";
pub const PARAM_AVAILABILITY_DATE: &str = "availabilityDate";
pub const PARAM_LATITUDE: &str = "latitude";
pub const PARAM_LONGITUDE: &str = "longitude";
pub const PARAM_RADIUS: &str = "radius";
pub const PARAM_SORT: &str = "sort";
pub const PARAM_PAGE: &str = "page";

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Ordered key/value pairs as they appear in the URL query string.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct QueryParams {
    entries: Vec<(String, String)>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a query string, with or without its leading `?`. For repeated
    /// keys the last occurrence wins.
    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim();
        let raw = trimmed.strip_prefix('?').unwrap_or(trimmed);
        form_urlencoded::parse(raw.as_bytes())
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_query_string(&self) -> String {
        form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.iter())
            .finish()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for QueryParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (key, value) in iter {
            params.insert(key, value);
        }
        params
    }
}

pub fn encode(query: &SearchQuery) -> QueryParams {
    let mut params = QueryParams::new();

    if let Some(text) = non_blank(query.text.as_deref()) {
        params.insert(PARAM_SEARCH, text);
    }
    if let Some(city) = non_blank(query.city.as_deref()) {
        params.insert(PARAM_CITY, city);
    }
    if let Some(state) = non_blank(query.state.as_deref()) {
        params.insert(PARAM_STATE, state);
    }
    if let Some(min_price) = query.min_price {
        params.insert(PARAM_MIN_PRICE, min_price.to_string());
    }
    if let Some(max_price) = query.max_price {
        params.insert(PARAM_MAX_PRICE, max_price.to_string());
    }

    let amenities = normalized_amenities(query.amenities.iter().map(String::as_str));
    if !amenities.is_empty() {
        let joined = amenities.into_iter().collect::<Vec<_>>().join(",");
        params.insert(PARAM_AMENITIES, joined);
    }

    if let Some(date) = query.availability_date {
        params.insert(PARAM_AVAILABILITY_DATE, date.format(DATE_FORMAT).to_string());
    }
    if let Some(geo) = query.geo {
        params.insert(PARAM_LATITUDE, geo.center.lat.to_string());
        params.insert(PARAM_LONGITUDE, geo.center.lng.to_string());
        params.insert(PARAM_RADIUS, geo.radius_miles.to_string());
    }
    if let Some(sort) = non_blank(query.sort.as_deref()) {
        params.insert(PARAM_SORT, sort);
    }
    params.insert(PARAM_PAGE, query.page.max(1).to_string());

    params
}

/// Inverse of [`encode`]. Unknown keys are ignored and malformed values are
/// dropped rather than reported.
pub fn decode(params: &QueryParams) -> SearchQuery {
    let mut min_price = params.get(PARAM_MIN_PRICE).and_then(parse_price);
    let mut max_price = params.get(PARAM_MAX_PRICE).and_then(parse_price);
    if let (Some(min), Some(max)) = (min_price, max_price)
        && min > max
    {
        min_price = Some(max);
        max_price = Some(min);
    }

    SearchQuery {
        text: owned_non_blank(params.get(PARAM_SEARCH)),
        city: owned_non_blank(params.get(PARAM_CITY)),
        state: owned_non_blank(params.get(PARAM_STATE)),
        min_price,
        max_price,
        amenities: params
            .get(PARAM_AMENITIES)
            .map(|raw| normalized_amenities(raw.split(',')))
            .unwrap_or_default(),
        availability_date: params
            .get(PARAM_AVAILABILITY_DATE)
            .and_then(|raw| NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT).ok()),
        geo: decode_geo(params),
        sort: owned_non_blank(params.get(PARAM_SORT)),
        page: params
            .get(PARAM_PAGE)
            .and_then(|raw| raw.trim().parse::<u32>().ok())
            .filter(|page| *page >= 1)
            .unwrap_or(1),
    }
}

pub fn encode_string(query: &SearchQuery) -> String {
    encode(query).to_query_string()
}

pub fn decode_str(input: &str) -> SearchQuery {
    decode(&QueryParams::parse(input))
}

/// Normalizes a query by passing it through the codec once.
pub fn canonicalize(query: &SearchQuery) -> SearchQuery {
    decode(&encode(query))
}

fn decode_geo(params: &QueryParams) -> Option<GeoFilter> {
    let lat = params.get(PARAM_LATITUDE).and_then(parse_finite)?;
    let lng = params.get(PARAM_LONGITUDE).and_then(parse_finite)?;
    let radius = params.get(PARAM_RADIUS).and_then(parse_finite)?;
    let center = LatLng::new(lat, lng);
    if !center.is_valid() {
        return None;
    }
    Some(GeoFilter::clamped(center, radius))
}

fn parse_price(raw: &str) -> Option<u32> {
    raw.trim().parse::<u32>().ok()
}

fn parse_finite(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|value| value.is_finite())
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn owned_non_blank(value: Option<&str>) -> Option<String> {
    non_blank(value).map(str::to_owned)
}

fn normalized_amenities<'a>(raw: impl Iterator<Item = &'a str>) -> BTreeSet<String> {
    raw.map(str::trim)
        .filter(|amenity| !amenity.is_empty())
        .map(str::to_owned)
        .collect()
}
