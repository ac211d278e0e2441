use crate::models::{ChipGroup, ChipKey, FilterChip, SearchQuery};

const CHIP_DATE_FORMAT: &str = "%b %-d, %Y";

/// Derives the removable filter chips for `query`, one per scalar filter and
/// one per amenity element, in display order.
pub fn derive_chips(query: &SearchQuery) -> Vec<FilterChip> {
    let mut chips = Vec::new();

    if let Some(text) = present(query.text.as_deref()) {
        chips.push(chip(ChipKey::Text, "Search", text, ChipGroup::Search));
    }
    if let Some(city) = present(query.city.as_deref()) {
        chips.push(chip(ChipKey::City, "City", city, ChipGroup::Location));
    }
    if let Some(state) = present(query.state.as_deref()) {
        chips.push(chip(ChipKey::State, "State", state, ChipGroup::Location));
    }
    if let Some(min_price) = query.min_price {
        chips.push(chip(
            ChipKey::MinPrice,
            "Min price",
            &format_price(min_price),
            ChipGroup::Price,
        ));
    }
    if let Some(max_price) = query.max_price {
        chips.push(chip(
            ChipKey::MaxPrice,
            "Max price",
            &format_price(max_price),
            ChipGroup::Price,
        ));
    }
    for amenity in query.amenities.iter().filter(|a| !a.trim().is_empty()) {
        chips.push(chip(
            ChipKey::Amenity(amenity.clone()),
            "Amenity",
            amenity,
            ChipGroup::Amenity,
        ));
    }
    if let Some(date) = query.availability_date {
        chips.push(chip(
            ChipKey::AvailabilityDate,
            "Available from",
            &date.format(CHIP_DATE_FORMAT).to_string(),
            ChipGroup::Date,
        ));
    }

    chips
}

/// Clears exactly the field (or amenity element) `key` refers to.
pub fn remove_chip(query: &SearchQuery, key: &ChipKey) -> SearchQuery {
    let mut next = query.clone();
    match key {
        ChipKey::Text => next.text = None,
        ChipKey::City => next.city = None,
        ChipKey::State => next.state = None,
        ChipKey::MinPrice => next.min_price = None,
        ChipKey::MaxPrice => next.max_price = None,
        ChipKey::AvailabilityDate => next.availability_date = None,
        ChipKey::Amenity(amenity) => {
            next.amenities.remove(amenity);
        }
    }
    if next.filters_differ(query) {
        next.page = 1;
    }
    next
}

/// Resets every filter but keeps the sort order.
pub fn clear_all(query: &SearchQuery) -> SearchQuery {
    SearchQuery {
        sort: query.sort.clone(),
        ..SearchQuery::new()
    }
}

fn chip(key: ChipKey, label: &str, value: &str, group: ChipGroup) -> FilterChip {
    FilterChip {
        key,
        label: label.to_string(),
        value: value.trim().to_string(),
        group,
    }
}

fn present(value: Option<&str>) -> Option<&str> {
    value.filter(|value| !value.trim().is_empty())
}

fn format_price(amount: u32) -> String {
    let digits = amount.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, digit) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    format!("${grouped}")
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::codec;

    fn boston_with_amenities() -> SearchQuery {
        SearchQuery {
            city: Some("Boston".to_string()),
            amenities: ["WiFi", "Parking"].into_iter().map(String::from).collect(),
            ..SearchQuery::new()
        }
    }

    #[test]
    fn derives_one_chip_per_amenity_element() {
        let chips = derive_chips(&boston_with_amenities());
        let amenity_values: Vec<_> = chips
            .iter()
            .filter(|chip| chip.group == ChipGroup::Amenity)
            .map(|chip| chip.value.as_str())
            .collect();
        assert_eq!(amenity_values, vec!["Parking", "WiFi"]);
        assert_eq!(chips[0].key, ChipKey::City);
    }

    #[test]
    fn formats_prices_and_dates() {
        let query = SearchQuery {
            min_price: Some(1500),
            max_price: Some(12000),
            availability_date: NaiveDate::from_ymd_opt(2025, 3, 1),
            ..SearchQuery::new()
        };
        let values: Vec<_> = derive_chips(&query)
            .into_iter()
            .map(|chip| chip.value)
            .collect();
        assert_eq!(values, vec!["$1,500", "$12,000", "Mar 1, 2025"]);
    }

    #[test]
    fn removing_an_amenity_chip_keeps_the_other_elements() {
        let query = boston_with_amenities();
        let next = remove_chip(&query, &ChipKey::Amenity("WiFi".to_string()));

        let expected = SearchQuery {
            city: Some("Boston".to_string()),
            amenities: ["Parking".to_string()].into_iter().collect(),
            ..SearchQuery::new()
        };
        assert_eq!(next, expected);
    }

    #[test]
    fn removing_a_scalar_chip_clears_only_that_field() {
        let next = remove_chip(&boston_with_amenities(), &ChipKey::City);
        assert!(next.city.is_none());
        assert_eq!(next.amenities.len(), 2);
        assert!(codec::encode(&next).get(codec::PARAM_CITY).is_none());
    }

    #[test]
    fn removing_the_last_amenity_drops_the_key() {
        let query = SearchQuery {
            amenities: ["Gym".to_string()].into_iter().collect(),
            page: 4,
            ..SearchQuery::new()
        };
        let next = remove_chip(&query, &ChipKey::Amenity("Gym".to_string()));
        assert!(codec::encode(&next).get(codec::PARAM_AMENITIES).is_none());
        assert_eq!(next.page, 1);
    }

    #[test]
    fn clear_all_preserves_sort() {
        let query = SearchQuery {
            sort: Some("newest".to_string()),
            page: 2,
            ..boston_with_amenities()
        };
        let cleared = clear_all(&query);
        assert_eq!(cleared.sort.as_deref(), Some("newest"));
        assert!(derive_chips(&cleared).is_empty());
        assert_eq!(cleared.page, 1);
    }
}
