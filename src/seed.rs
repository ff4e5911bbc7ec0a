use crate::error::SeedError;
use crate::model::{Bus, BusId, Coordinate, Occupancy, PastRide, Stars, Stop};
use chrono::NaiveDate;
use compact_str::CompactString;
use std::collections::{HashMap, HashSet};

/// Static description of a bus; stops are referenced by id and resolved in `Fleet::build`.
#[derive(Clone, Debug)]
pub struct BusSeed {
    pub id: &'static str,
    pub bus_number: &'static str,
    pub route: &'static str,
    pub location: Coordinate,
    pub occupancy: Occupancy,
    pub rating: f64,
    pub driver_name: &'static str,
    pub driver_rating: f64,
    pub fare: f64,
    pub eta: u32,
    pub stop_ids: &'static [&'static str],
    pub current_stop_index: usize,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ImpactFigures {
    pub co2_saved_kg: f64,
    pub rides_this_month: u32,
}

/// Everything a session starts from. Built once, then moved into the store.
#[derive(Clone, Debug)]
pub struct Fleet {
    pub stops: Vec<Stop>,
    pub buses: Vec<Bus>,
    pub past_rides: Vec<PastRide>,
    pub favorites: Vec<BusId>,
    pub impact: ImpactFigures,
}

impl Fleet {
    pub fn build(
        stops: Vec<Stop>,
        bus_seeds: &[BusSeed],
        past_rides: Vec<PastRide>,
        favorites: Vec<BusId>,
        impact: ImpactFigures,
    ) -> Result<Self, SeedError> {
        let mut stop_index: HashMap<&str, &Stop> = HashMap::new();
        for stop in &stops {
            if stop_index.insert(stop.id.as_str(), stop).is_some() {
                return Err(SeedError::DuplicateStop(stop.id.clone()));
            }
        }

        let mut seen = HashSet::new();
        let mut buses = Vec::with_capacity(bus_seeds.len());
        for seed in bus_seeds {
            if !seen.insert(seed.id) {
                return Err(SeedError::DuplicateBus(seed.id.into()));
            }
            if seed.stop_ids.is_empty() {
                return Err(SeedError::EmptyRoute(seed.id.into()));
            }

            let route_stops = seed
                .stop_ids
                .iter()
                .map(|sid| {
                    stop_index
                        .get(sid)
                        .map(|s| (*s).clone())
                        .ok_or_else(|| SeedError::UnknownStop {
                            bus: seed.id.into(),
                            stop: (*sid).into(),
                        })
                })
                .collect::<Result<Vec<_>, _>>()?;

            if seed.current_stop_index >= route_stops.len() {
                return Err(SeedError::StopIndexOutOfRange {
                    bus: seed.id.into(),
                    index: seed.current_stop_index,
                    len: route_stops.len(),
                });
            }

            buses.push(Bus {
                id: seed.id.into(),
                bus_number: seed.bus_number.into(),
                route: seed.route.into(),
                current_location: seed.location,
                occupancy: seed.occupancy,
                rating: seed.rating,
                driver_name: seed.driver_name.into(),
                driver_rating: seed.driver_rating,
                fare: seed.fare,
                eta: seed.eta.max(1),
                stops: route_stops,
                current_stop_index: seed.current_stop_index,
            });
        }

        Ok(Self {
            stops,
            buses,
            past_rides,
            favorites,
            impact,
        })
    }

    /// The demo dataset every session starts with.
    pub fn seeded() -> Result<Self, SeedError> {
        Self::build(
            seed_stops(),
            &seed_buses(),
            seed_past_rides()?,
            vec!["bus-1".into(), "bus-4".into()],
            ImpactFigures {
                co2_saved_kg: 3.0,
                rides_this_month: 12,
            },
        )
    }

    /// Every coordinate in the dataset: stops plus initial bus positions.
    pub fn coordinates(&self) -> impl Iterator<Item = Coordinate> + '_ {
        self.stops
            .iter()
            .map(|s| s.coordinates)
            .chain(self.buses.iter().map(|b| b.current_location))
    }
}

fn stop(id: &str, name: &str, lat: f64, lng: f64) -> Stop {
    Stop {
        id: id.into(),
        name: name.into(),
        coordinates: Coordinate::new(lat, lng),
    }
}

pub fn seed_stops() -> Vec<Stop> {
    vec![
        stop("1", "Central Station", 40.7128, -74.006),
        stop("2", "University Campus", 40.7589, -73.9851),
        stop("3", "Shopping Mall", 40.7505, -73.9934),
        stop("4", "Airport Terminal", 40.6892, -74.1745),
        stop("5", "Business District", 40.7614, -73.9776),
        stop("6", "Hospital", 40.7282, -73.9942),
        stop("7", "Sports Complex", 40.7831, -73.9712),
        stop("8", "Beach Front", 40.5795, -73.9707),
    ]
}

pub fn seed_buses() -> Vec<BusSeed> {
    vec![
        BusSeed {
            id: "bus-1",
            bus_number: "B101",
            route: "Central-University",
            location: Coordinate::new(40.73, -74.0),
            occupancy: Occupancy::Low,
            rating: 4.5,
            driver_name: "John Smith",
            driver_rating: 4.8,
            fare: 2.5,
            eta: 5,
            stop_ids: &["1", "2", "3"],
            current_stop_index: 0,
        },
        BusSeed {
            id: "bus-2",
            bus_number: "B202",
            route: "Airport-Downtown",
            location: Coordinate::new(40.7, -74.15),
            occupancy: Occupancy::Medium,
            rating: 4.2,
            driver_name: "Sarah Johnson",
            driver_rating: 4.6,
            fare: 3.75,
            eta: 12,
            stop_ids: &["4", "5", "1"],
            current_stop_index: 1,
        },
        BusSeed {
            id: "bus-3",
            bus_number: "B303",
            route: "Hospital-Sports",
            location: Coordinate::new(40.74, -73.99),
            occupancy: Occupancy::High,
            rating: 4.0,
            driver_name: "Mike Davis",
            driver_rating: 4.3,
            fare: 2.25,
            eta: 8,
            stop_ids: &["6", "7", "8"],
            current_stop_index: 0,
        },
        BusSeed {
            id: "bus-4",
            bus_number: "B404",
            route: "Beach-Mall",
            location: Coordinate::new(40.6, -73.96),
            occupancy: Occupancy::Low,
            rating: 4.7,
            driver_name: "Lisa Wilson",
            driver_rating: 4.9,
            fare: 3.0,
            eta: 15,
            stop_ids: &["8", "3", "2"],
            current_stop_index: 2,
        },
    ]
}

/// Static description of a finished ride; date and rating are validated in `seed_past_rides`.
#[derive(Clone, Debug)]
pub struct RideSeed {
    pub id: &'static str,
    pub bus_id: &'static str,
    pub bus_number: &'static str,
    pub date: (i32, u32, u32),
    pub fare: f64,
    pub stars: u8,
    pub from: &'static str,
    pub to: &'static str,
}

impl TryFrom<&RideSeed> for PastRide {
    type Error = SeedError;

    fn try_from(seed: &RideSeed) -> Result<Self, SeedError> {
        let (y, m, d) = seed.date;
        let date = NaiveDate::from_ymd_opt(y, m, d).ok_or(SeedError::InvalidRideDate {
            ride: seed.id.into(),
            date: seed.date,
        })?;
        let rating = Stars::try_from(seed.stars).map_err(|_| SeedError::InvalidRideRating {
            ride: seed.id.into(),
            stars: seed.stars,
        })?;
        Ok(PastRide {
            id: seed.id.into(),
            bus_id: seed.bus_id.into(),
            bus_number: seed.bus_number.into(),
            date,
            fare: seed.fare,
            rating,
            start_stop: CompactString::from(seed.from),
            end_stop: CompactString::from(seed.to),
        })
    }
}

pub fn seed_past_rides() -> Result<Vec<PastRide>, SeedError> {
    [
        RideSeed {
            id: "ride-1",
            bus_id: "bus-1",
            bus_number: "B101",
            date: (2024, 1, 15),
            fare: 2.5,
            stars: 5,
            from: "Central Station",
            to: "University Campus",
        },
        RideSeed {
            id: "ride-2",
            bus_id: "bus-2",
            bus_number: "B202",
            date: (2024, 1, 14),
            fare: 3.75,
            stars: 4,
            from: "Airport Terminal",
            to: "Business District",
        },
        RideSeed {
            id: "ride-3",
            bus_id: "bus-3",
            bus_number: "B303",
            date: (2024, 1, 13),
            fare: 2.25,
            stars: 4,
            from: "Hospital",
            to: "Sports Complex",
        },
    ]
    .iter()
    .map(PastRide::try_from)
    .collect()
}
