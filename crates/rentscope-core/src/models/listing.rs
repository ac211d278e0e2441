use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::LatLng;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Landlord {
    pub id: String,
    pub name: String,
    pub email: String,
    pub image: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ListingLocation {
    pub city: String,
    pub state: String,
    pub zip: Option<String>,
    pub address: Option<String>,
    pub coordinates: Option<LatLng>,
}

/// One normalized listing record. Built once at the normalization boundary
/// and never mutated afterwards.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub id: String,
    pub landlord: Landlord,
    pub title: String,
    pub description: String,
    pub price: f64,
    pub bedrooms: Option<u32>,
    pub bathrooms: Option<f64>,
    pub square_feet: Option<u32>,
    pub location: ListingLocation,
    pub images: Vec<String>,
    pub amenities: Vec<String>,
    pub availability_date: Option<NaiveDate>,
    pub status: String,
    pub distance_miles: Option<f64>,
}

impl Listing {
    pub fn coordinates(&self) -> Option<LatLng> {
        self.location.coordinates
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ListingPage {
    pub listings: Vec<Listing>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}
