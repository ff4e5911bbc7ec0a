use chrono::NaiveDate;
use compact_str::CompactString;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

pub type StopId = CompactString;
pub type BusId = CompactString;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    pub id: StopId,
    pub name: CompactString,
    pub coordinates: Coordinate,
}

/// Coarse passenger load reported by the driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Occupancy {
    Low,
    Medium,
    High,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bus {
    pub id: BusId,
    pub bus_number: CompactString,
    pub route: CompactString,
    pub current_location: Coordinate,
    pub occupancy: Occupancy,
    pub rating: f64,
    pub driver_name: CompactString,
    pub driver_rating: f64,
    pub fare: f64,
    /// Minutes, never below 1.
    pub eta: u32,
    pub stops: Vec<Stop>,
    pub current_stop_index: usize,
}

impl Bus {
    pub fn serves(&self, stop_id: &str) -> bool {
        self.stops.iter().any(|s| s.id == stop_id)
    }

    pub fn current_stop(&self) -> Option<&Stop> {
        self.stops.get(self.current_stop_index)
    }

    pub fn next_stop(&self) -> Option<&Stop> {
        self.stops.get(self.current_stop_index + 1)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PastRide {
    pub id: CompactString,
    pub bus_id: BusId,
    pub bus_number: CompactString,
    pub date: NaiveDate,
    pub fare: f64,
    pub rating: Stars,
    pub start_stop: CompactString,
    pub end_stop: CompactString,
}

/// A rider rating between one and five stars.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Stars(u8);

impl Stars {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub const fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Stars {
    type Error = StoreError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(StoreError::InvalidRating(value))
        }
    }
}

impl From<Stars> for u8 {
    fn from(stars: Stars) -> Self {
        stars.0
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ImpactSummary {
    pub co2_saved_kg: f64,
    pub rides_this_month: u32,
    pub top_rated: Vec<Bus>,
}
