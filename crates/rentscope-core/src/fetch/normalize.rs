//! The single normalization boundary between backend payloads and the
//! canonical models.

use std::collections::HashSet;

use chrono::NaiveDate;
use serde_json::Value;

use crate::fetch::FetchResult;
use crate::models::{
    CoreError, CoreErrorKind, Landlord, LatLng, Listing, ListingLocation, ListingPage, Suggestion,
    SuggestionKind,
};

pub fn parse_listing_page(raw: &str) -> FetchResult<ListingPage> {
    let json = parse_json(raw, "listings")?;
    let envelope = unwrap_data(&json);

    let records = envelope
        .get("listings")
        .or_else(|| envelope.get("results"))
        .and_then(Value::as_array)
        .or_else(|| envelope.as_array())
        .ok_or_else(|| parse_error("listings response has no listings array"))?;

    let listings = parse_records(records);
    let count = listings.len();

    Ok(ListingPage {
        total: u64_field(envelope, &["total", "totalCount"]).unwrap_or(count as u64),
        page: u32_field(envelope, &["page", "currentPage"])
            .filter(|page| *page >= 1)
            .unwrap_or(1),
        limit: u32_field(envelope, &["limit", "pageSize"]).unwrap_or(count as u32),
        listings,
    })
}

/// Parses a bare collection of listings (e.g. favorites). Records may be
/// wrapped as `{ "listing": { ... } }`.
pub fn parse_listing_collection(raw: &str) -> FetchResult<Vec<Listing>> {
    let json = parse_json(raw, "favorites")?;
    let envelope = unwrap_data(&json);

    let records = envelope
        .as_array()
        .or_else(|| envelope.get("favorites").and_then(Value::as_array))
        .or_else(|| envelope.get("listings").and_then(Value::as_array))
        .ok_or_else(|| parse_error("favorites response has no listing array"))?;

    Ok(parse_records(records))
}

/// Cities first, then states; blanks and duplicates dropped; truncated to
/// `max` entries.
pub fn parse_suggestions(raw: &str, max: usize) -> FetchResult<Vec<Suggestion>> {
    let json = parse_json(raw, "suggestions")?;
    let envelope = unwrap_data(&json);

    let mut seen = HashSet::new();
    let mut suggestions = Vec::new();
    for (field, kind) in [("cities", SuggestionKind::City), ("states", SuggestionKind::State)] {
        let Some(values) = envelope.get(field).and_then(Value::as_array) else {
            continue;
        };
        for value in values.iter().filter_map(Value::as_str).map(str::trim) {
            if value.is_empty() || !seen.insert((kind, value.to_string())) {
                continue;
            }
            suggestions.push(Suggestion {
                kind,
                value: value.to_string(),
            });
        }
    }

    suggestions.truncate(max);
    Ok(suggestions)
}

pub fn parse_listing(record: &Value) -> Option<Listing> {
    let record = record
        .get("listing")
        .filter(|inner| inner.is_object())
        .unwrap_or(record);

    let id = string_field(record, &["id", "_id"])?;
    let title = string_field(record, &["title"])?;
    let price = number_field(record, &["price", "rent"])?;

    let location_source = record
        .get("location")
        .filter(|location| location.is_object())
        .unwrap_or(record);
    let coordinates = coordinates_from(location_source).or_else(|| coordinates_from(record));

    Some(Listing {
        id,
        landlord: parse_landlord(record),
        title,
        description: string_field(record, &["description"]).unwrap_or_default(),
        price,
        bedrooms: u32_field(record, &["bedrooms", "beds"]),
        bathrooms: number_field(record, &["bathrooms", "baths"]),
        square_feet: u32_field(record, &["squareFeet", "square_feet", "sqft"]),
        location: ListingLocation {
            city: string_field(location_source, &["city"]).unwrap_or_default(),
            state: string_field(location_source, &["state"]).unwrap_or_default(),
            zip: string_field(location_source, &["zip", "zipCode", "postalCode"]),
            address: string_field(location_source, &["address", "street"]),
            coordinates,
        },
        images: string_list(record, "images"),
        amenities: string_list(record, "amenities"),
        availability_date: string_field(record, &["availabilityDate", "availableFrom"])
            .and_then(|raw| parse_date(&raw)),
        status: string_field(record, &["status"]).unwrap_or_else(|| "available".to_string()),
        distance_miles: number_field(record, &["distanceMiles", "distance"]),
    })
}

fn parse_records(records: &[Value]) -> Vec<Listing> {
    let mut listings = Vec::with_capacity(records.len());
    let mut skipped = 0usize;
    for record in records {
        match parse_listing(record) {
            Some(listing) => listings.push(listing),
            None => skipped += 1,
        }
    }
    if skipped > 0 {
        tracing::warn!(skipped, "dropped listing records missing id, title or price");
    }
    listings
}

fn parse_landlord(record: &Value) -> Landlord {
    match record.get("landlord") {
        Some(landlord @ Value::Object(_)) => Landlord {
            id: string_field(landlord, &["id", "_id"]).unwrap_or_default(),
            name: string_field(landlord, &["name", "fullName"]).unwrap_or_default(),
            email: string_field(landlord, &["email"]).unwrap_or_default(),
            image: string_field(landlord, &["image", "avatar"]),
        },
        Some(Value::String(id)) => Landlord {
            id: id.trim().to_string(),
            name: String::new(),
            email: String::new(),
            image: None,
        },
        _ => Landlord {
            id: string_field(record, &["landlordId"]).unwrap_or_default(),
            name: String::new(),
            email: String::new(),
            image: None,
        },
    }
}

fn coordinates_from(source: &Value) -> Option<LatLng> {
    let point = match source.get("coordinates") {
        Some(Value::Object(_)) => {
            let coordinates = &source["coordinates"];
            let lat = number_field(coordinates, &["lat", "latitude"])?;
            let lng = number_field(coordinates, &["lng", "lon", "longitude"])?;
            LatLng::new(lat, lng)
        }
        // GeoJSON order: [longitude, latitude].
        Some(Value::Array(pair)) if pair.len() == 2 => {
            LatLng::new(pair[1].as_f64()?, pair[0].as_f64()?)
        }
        _ => {
            let lat = number_field(source, &["latitude", "lat"])?;
            let lng = number_field(source, &["longitude", "lng", "lon"])?;
            LatLng::new(lat, lng)
        }
    };
    point.is_valid().then_some(point)
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    let date_part = raw.trim().get(..10)?;
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

fn parse_json(raw: &str, what: &str) -> FetchResult<Value> {
    serde_json::from_str(raw.trim())
        .map_err(|error| parse_error(&format!("invalid {what} JSON: {error}")))
}

pub(crate) fn unwrap_data(json: &Value) -> &Value {
    json.get("data")
        .filter(|data| data.is_object() || data.is_array())
        .unwrap_or(json)
}

pub(crate) fn string_field(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match value.get(key)? {
        Value::String(text) => Some(text.trim().to_string()).filter(|text| !text.is_empty()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    })
}

pub(crate) fn number_field(value: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter()
        .find_map(|key| match value.get(key)? {
            Value::Number(number) => number.as_f64(),
            Value::String(text) => text.trim().parse::<f64>().ok(),
            _ => None,
        })
        .filter(|number| number.is_finite())
}

pub(crate) fn u64_field(value: &Value, keys: &[&str]) -> Option<u64> {
    number_field(value, keys)
        .filter(|number| *number >= 0.0 && number.fract() == 0.0)
        .map(|number| number as u64)
}

fn u32_field(value: &Value, keys: &[&str]) -> Option<u32> {
    u64_field(value, keys).and_then(|number| u32::try_from(number).ok())
}

pub(crate) fn bool_field(value: &Value, keys: &[&str]) -> Option<bool> {
    keys.iter().find_map(|key| value.get(key)?.as_bool())
}

fn string_list(value: &Value, key: &str) -> Vec<String> {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| match item {
                    Value::String(text) => Some(text.trim().to_string()),
                    Value::Object(_) => string_field(item, &["url", "src"]),
                    _ => None,
                })
                .filter(|text| !text.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

fn parse_error(message: &str) -> CoreError {
    CoreError::new(CoreErrorKind::ParseFailure, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NESTED_PAGE: &str = r#"{
        "data": {
            "listings": [
                {
                    "_id": "665f1c",
                    "title": "Sunny two-bed",
                    "description": "Close to the T",
                    "price": "2400",
                    "bedrooms": 2,
                    "bathrooms": 1.5,
                    "landlord": {"_id": "u-9", "name": "Ari", "email": "ari@example.com"},
                    "location": {"city": "Boston", "state": "MA", "zipCode": "02116"},
                    "latitude": 42.35,
                    "longitude": -71.07,
                    "images": ["a.jpg", {"url": "b.jpg"}],
                    "amenities": ["WiFi"],
                    "availabilityDate": "2025-03-01T00:00:00.000Z",
                    "status": "available"
                },
                {"title": "missing id", "price": 100}
            ],
            "total": 41,
            "page": 2,
            "limit": 20
        }
    }"#;

    #[test]
    fn normalizes_nested_envelope_and_scalar_coordinates() {
        let page = parse_listing_page(NESTED_PAGE).unwrap();
        assert_eq!(page.total, 41);
        assert_eq!(page.page, 2);
        assert_eq!(page.limit, 20);
        assert_eq!(page.listings.len(), 1);

        let listing = &page.listings[0];
        assert_eq!(listing.id, "665f1c");
        assert_eq!(listing.price, 2400.0);
        assert_eq!(listing.bathrooms, Some(1.5));
        assert_eq!(listing.square_feet, None);
        assert_eq!(listing.landlord.id, "u-9");
        assert_eq!(listing.landlord.image, None);
        assert_eq!(listing.location.zip.as_deref(), Some("02116"));
        assert_eq!(listing.coordinates(), Some(LatLng::new(42.35, -71.07)));
        assert_eq!(listing.images, vec!["a.jpg", "b.jpg"]);
        assert_eq!(listing.availability_date, NaiveDate::from_ymd_opt(2025, 3, 1));
    }

    #[test]
    fn accepts_flat_envelope_and_geojson_coordinates() {
        let raw = r#"{
            "listings": [{
                "id": 7,
                "title": "Studio",
                "price": 1100,
                "landlord": "u-1",
                "location": {"city": "Austin", "state": "TX", "coordinates": [-97.74, 30.27]}
            }]
        }"#;
        let page = parse_listing_page(raw).unwrap();
        let listing = &page.listings[0];
        assert_eq!(listing.id, "7");
        assert_eq!(listing.landlord.id, "u-1");
        assert_eq!(listing.coordinates(), Some(LatLng::new(30.27, -97.74)));
        assert_eq!(page.total, 1);
        assert_eq!(page.page, 1);
    }

    #[test]
    fn rejects_payload_without_listings() {
        let error = parse_listing_page(r#"{"message":"ok"}"#).unwrap_err();
        assert_eq!(error.kind, CoreErrorKind::ParseFailure);
    }

    #[test]
    fn suggestions_put_cities_first_and_truncate() {
        let raw = r#"{"cities":["Boston","Boise","Boston"," "],"states":["Bolivar","Bo1","Bo2","Bo3","Bo4","Bo5"]}"#;
        let suggestions = parse_suggestions(raw, 8).unwrap();
        assert_eq!(suggestions.len(), 8);
        assert_eq!(suggestions[0], Suggestion::city("Boston"));
        assert_eq!(suggestions[1], Suggestion::city("Boise"));
        assert_eq!(suggestions[2], Suggestion::state("Bolivar"));
        assert!(suggestions[2..].iter().all(|s| s.kind == SuggestionKind::State));
    }

    #[test]
    fn favorites_accept_wrapped_records() {
        let raw = r#"[{"listing": {"id": "f1", "title": "Loft", "price": 3000}}]"#;
        let favorites = parse_listing_collection(raw).unwrap();
        assert_eq!(favorites[0].id, "f1");
    }
}
