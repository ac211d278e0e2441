//! Map view controller: keeps the map's center/radius and the canonical
//! query's `geo` filter in agreement without echo requeries.

use serde::Serialize;

use crate::models::{GeoFilter, LatLng, Listing, SearchQuery, clamp_radius};

/// Meters per statute mile, as used for the radius circle overlay.
pub const METERS_PER_MILE: f64 = 1609.34;

/// Geographic center of the contiguous United States.
pub const DEFAULT_CENTER: LatLng = LatLng::new(39.8283, -98.5795);

pub const DEFAULT_RADIUS_MILES: f64 = 10.0;

const EARTH_RADIUS_MILES: f64 = 3958.8;
const COORDINATE_SCALE: f64 = 1_000_000.0;
const CENTER_EPSILON: f64 = 1e-7;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewMode {
    List,
    Map,
}

/// What the host map widget should do after a query change.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MapCommand {
    SetView { center: LatLng, radius_meters: f64 },
    SetRadius { radius_meters: f64 },
}

pub fn miles_to_meters(miles: f64) -> f64 {
    miles * METERS_PER_MILE
}

/// Arithmetic mean of the coordinates of every listing that has them.
pub fn centroid(listings: &[Listing]) -> Option<LatLng> {
    let (count, lat_sum, lng_sum) = listings
        .iter()
        .filter_map(Listing::coordinates)
        .filter(|coordinates| coordinates.is_valid())
        .fold((0usize, 0.0, 0.0), |(count, lat, lng), point| {
            (count + 1, lat + point.lat, lng + point.lng)
        });

    if count == 0 {
        return None;
    }
    let count = count as f64;
    Some(LatLng::new(lat_sum / count, lng_sum / count))
}

/// Explicit query center, else the listings' centroid, else `fallback`.
pub fn initial_center(query: &SearchQuery, listings: &[Listing], fallback: LatLng) -> LatLng {
    query
        .geo
        .map(|geo| geo.center)
        .or_else(|| centroid(listings))
        .unwrap_or(fallback)
}

/// Great-circle distance in miles (haversine).
pub fn distance_miles(from: LatLng, to: LatLng) -> f64 {
    let from_lat = from.lat.to_radians();
    let to_lat = to.lat.to_radians();
    let delta_lat = (to.lat - from.lat).to_radians();
    let delta_lng = (to.lng - from.lng).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + from_lat.cos() * to_lat.cos() * (delta_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_MILES * a.sqrt().asin()
}

fn round_coordinate(value: f64) -> f64 {
    (value * COORDINATE_SCALE).round() / COORDINATE_SCALE
}

fn round_center(center: LatLng) -> LatLng {
    LatLng::new(round_coordinate(center.lat), round_coordinate(center.lng))
}

fn same_center(first: LatLng, second: LatLng) -> bool {
    (first.lat - second.lat).abs() < CENTER_EPSILON
        && (first.lng - second.lng).abs() < CENTER_EPSILON
}

#[derive(Clone, Debug)]
pub struct MapViewController {
    mode: ViewMode,
    center: LatLng,
    radius_miles: f64,
    default_center: LatLng,
    /// Center most recently pushed to the map by us; its `moveend` echo is
    /// swallowed exactly once.
    programmatic_center: Option<LatLng>,
}

impl Default for MapViewController {
    fn default() -> Self {
        Self::new(DEFAULT_CENTER, DEFAULT_RADIUS_MILES)
    }
}

impl MapViewController {
    pub fn new(default_center: LatLng, default_radius_miles: f64) -> Self {
        Self {
            mode: ViewMode::List,
            center: default_center,
            radius_miles: clamp_radius(default_radius_miles),
            default_center,
            programmatic_center: None,
        }
    }

    pub fn mode(&self) -> ViewMode {
        self.mode
    }

    pub fn center(&self) -> LatLng {
        self.center
    }

    pub fn radius_miles(&self) -> f64 {
        self.radius_miles
    }

    pub fn circle_radius_meters(&self) -> f64 {
        miles_to_meters(self.radius_miles)
    }

    /// Switches to map mode. Non-geo filters are kept; without an explicit
    /// center the listings' centroid (or the default center) is used.
    pub fn enter_map_mode(
        &mut self,
        query: &SearchQuery,
        listings: &[Listing],
    ) -> (SearchQuery, MapCommand) {
        self.mode = ViewMode::Map;
        let center = match query.geo {
            Some(geo) => {
                self.radius_miles = clamp_radius(geo.radius_miles);
                geo.center
            }
            None => round_center(initial_center(query, listings, self.default_center)),
        };
        self.center = center;
        self.programmatic_center = Some(center);

        tracing::debug!(
            lat = center.lat,
            lng = center.lng,
            radius_miles = self.radius_miles,
            "entering map mode"
        );

        let next = self.with_geo(query, center);
        (
            next,
            MapCommand::SetView {
                center,
                radius_meters: self.circle_radius_meters(),
            },
        )
    }

    /// Switches back to list mode; `geo` is dropped from the query.
    pub fn leave_map_mode(&mut self, query: &SearchQuery) -> SearchQuery {
        self.mode = ViewMode::List;
        self.programmatic_center = None;
        let mut next = query.clone().without_geo();
        if next.filters_differ(query) {
            next.page = 1;
        }
        next
    }

    /// Reconciles the controller with a query that changed elsewhere (URL
    /// navigation, saved search, chip removal) and returns the map update to
    /// apply, if any. The applied center is marked programmatic so the
    /// resulting `moveend` does not write back.
    pub fn sync_from_query(&mut self, query: &SearchQuery) -> Option<MapCommand> {
        let Some(geo) = query.geo else {
            if self.mode == ViewMode::Map {
                self.mode = ViewMode::List;
                self.programmatic_center = None;
            }
            return None;
        };

        self.mode = ViewMode::Map;
        let radius_changed = (self.radius_miles - geo.radius_miles).abs() > f64::EPSILON;
        self.radius_miles = clamp_radius(geo.radius_miles);

        if !same_center(self.center, geo.center) {
            self.center = geo.center;
            self.programmatic_center = Some(geo.center);
            return Some(MapCommand::SetView {
                center: geo.center,
                radius_meters: self.circle_radius_meters(),
            });
        }
        if radius_changed {
            return Some(MapCommand::SetRadius {
                radius_meters: self.circle_radius_meters(),
            });
        }
        None
    }

    /// Handles the map's `moveend`. Returns the query to write back, or
    /// `None` when the move is our own echo or the center is unchanged.
    ///
    /// Echo and unchanged checks use the reported center as-is; only a
    /// genuine user move is rounded before it is written into the query.
    pub fn on_move_end(&mut self, reported: LatLng, query: &SearchQuery) -> Option<SearchQuery> {
        if self.mode != ViewMode::Map || !reported.is_valid() {
            return None;
        }

        if let Some(applied) = self.programmatic_center.take()
            && same_center(applied, reported)
        {
            tracing::trace!("ignoring moveend echo of programmatic center");
            return None;
        }

        let current = query.geo.map(|geo| geo.center);
        if let Some(current) = current
            && same_center(current, reported)
        {
            self.center = current;
            return None;
        }

        let reported = round_center(reported);
        self.center = reported;
        if current.is_some_and(|current| same_center(current, reported)) {
            return None;
        }

        tracing::debug!(lat = reported.lat, lng = reported.lng, "map center moved");
        Some(self.with_geo(query, reported))
    }

    /// Slider drag: clamps into the allowed range and returns the effective
    /// radius. Nothing is written to the query until release.
    pub fn set_radius(&mut self, radius_miles: f64) -> f64 {
        self.radius_miles = clamp_radius(radius_miles);
        self.radius_miles
    }

    /// Slider release: writes the radius into the query when it changed.
    pub fn release_radius(&mut self, query: &SearchQuery) -> Option<SearchQuery> {
        if self.mode != ViewMode::Map {
            return None;
        }
        if query
            .geo
            .is_some_and(|geo| (geo.radius_miles - self.radius_miles).abs() <= f64::EPSILON)
        {
            return None;
        }
        let center = query.geo.map_or(self.center, |geo| geo.center);
        Some(self.with_geo(query, center))
    }

    fn with_geo(&self, query: &SearchQuery, center: LatLng) -> SearchQuery {
        let mut next = query.clone();
        next.geo = Some(GeoFilter::clamped(center, self.radius_miles));
        if next.filters_differ(query) {
            next.page = 1;
        }
        next
    }
}
