use compact_str::CompactString;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Bus not found: {0}")]
    BusNotFound(CompactString),
    #[error("Rating must be between 1 and 5 stars, got {0}")]
    InvalidRating(u8),
}

/// Problems with the static dataset a fleet is built from.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SeedError {
    #[error("Bus {0} has an empty route")]
    EmptyRoute(CompactString),
    #[error("Bus {bus} references unknown stop {stop}")]
    UnknownStop {
        bus: CompactString,
        stop: CompactString,
    },
    #[error("Bus {bus} current stop index {index} is outside its {len} stops")]
    StopIndexOutOfRange {
        bus: CompactString,
        index: usize,
        len: usize,
    },
    #[error("Duplicate bus id: {0}")]
    DuplicateBus(CompactString),
    #[error("Duplicate stop id: {0}")]
    DuplicateStop(CompactString),
    #[error("Ride {ride} has an invalid date {date:?}")]
    InvalidRideDate {
        ride: CompactString,
        date: (i32, u32, u32),
    },
    #[error("Ride {ride} rating must be between 1 and 5 stars, got {stars}")]
    InvalidRideRating { ride: CompactString, stars: u8 },
    #[error("Fleet has no buses")]
    EmptyFleet,
}
