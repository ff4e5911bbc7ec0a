//! Snapshots for the landing page, the driver console, the passenger console and
//! the per-bus detail view, plus the feed bookkeeping each view implies.

use crate::error::{SeedError, StoreError};
use crate::feeds::{FeedKind, FeedRegistry, FeedSettings};
use crate::model::{Bus, BusId, ImpactSummary, Occupancy, PastRide, Stars, Stop};
use crate::search::RouteSearch;
use crate::state::FleetStore;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

pub const NEARBY_COUNT: usize = 3;

#[derive(Debug, Serialize)]
pub struct LandingView {
    pub stops: Vec<Stop>,
    pub nearby: Vec<Bus>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopProgress {
    Passed,
    Current,
    Upcoming,
}

#[derive(Debug, Serialize)]
pub struct RouteStop {
    pub stop: Stop,
    pub progress: StopProgress,
}

#[derive(Debug, Serialize)]
pub struct DriverView {
    pub bus: Bus,
    pub sharing: bool,
    pub route: Vec<RouteStop>,
    pub next_stop: Option<Stop>,
}

#[derive(Debug, Serialize)]
pub struct PassengerView {
    pub results: Vec<Bus>,
    pub favorites: Vec<Bus>,
    pub history: Vec<PastRide>,
    pub impact: ImpactSummary,
}

#[derive(Debug, Serialize)]
pub struct BusDetailView {
    pub bus: Bus,
    pub current_stop: Option<Stop>,
    pub favorite: bool,
    pub my_rating: Option<Stars>,
    pub watchers: usize,
    /// The driver is sharing location, so the map view moves.
    pub live_position: bool,
}

pub fn route_progress(bus: &Bus) -> Vec<RouteStop> {
    bus.stops
        .iter()
        .enumerate()
        .map(|(i, stop)| RouteStop {
            stop: stop.clone(),
            progress: match i.cmp(&bus.current_stop_index) {
                std::cmp::Ordering::Less => StopProgress::Passed,
                std::cmp::Ordering::Equal => StopProgress::Current,
                std::cmp::Ordering::Greater => StopProgress::Upcoming,
            },
        })
        .collect()
}

/// One running demo: the store, its feeds, and the state the consoles keep between requests.
pub struct Session {
    store: Arc<FleetStore>,
    feeds: FeedRegistry,
    // The driver console acts as the first bus of the fleet.
    driver_bus: BusId,
    sharing: Mutex<bool>,
    // Buses shown in the passenger console's last search.
    results: Mutex<Vec<BusId>>,
    // Open detail views per bus; each holds one ETA subscription.
    detail_watches: DashMap<BusId, usize>,
}

impl Session {
    pub fn new(store: Arc<FleetStore>, settings: FeedSettings) -> Result<Self, SeedError> {
        let driver_bus = store
            .bus_ids()
            .first()
            .cloned()
            .ok_or(SeedError::EmptyFleet)?;
        Ok(Self {
            feeds: FeedRegistry::new(store.clone(), settings),
            store,
            driver_bus,
            sharing: Mutex::new(false),
            results: Mutex::new(Vec::new()),
            detail_watches: DashMap::new(),
        })
    }

    pub fn store(&self) -> &FleetStore {
        &self.store
    }

    pub fn feeds(&self) -> &FeedRegistry {
        &self.feeds
    }

    pub fn landing(&self) -> LandingView {
        LandingView {
            stops: self.store.list_stops(),
            nearby: self.store.nearby_buses(NEARBY_COUNT),
        }
    }

    pub async fn driver_console(&self) -> Result<DriverView, StoreError> {
        let bus = self.store.get_bus(&self.driver_bus)?;
        let sharing = *self.sharing.lock().await;
        Ok(DriverView {
            route: route_progress(&bus),
            next_stop: bus.next_stop().cloned(),
            bus,
            sharing,
        })
    }

    /// Location sharing drives the position feed of the driver's bus.
    pub async fn toggle_sharing(&self) -> Result<bool, StoreError> {
        let mut sharing = self.sharing.lock().await;
        if *sharing {
            self.feeds
                .unsubscribe(&self.driver_bus, FeedKind::Position)
                .await;
        } else {
            self.feeds.subscribe(&self.driver_bus, FeedKind::Position)?;
        }
        *sharing = !*sharing;
        info!(bus_id = %self.driver_bus, sharing = *sharing, "Location sharing toggled");
        Ok(*sharing)
    }

    pub fn set_driver_occupancy(&self, level: Occupancy) -> Result<Bus, StoreError> {
        self.store.set_occupancy(&self.driver_bus, level)
    }

    /// Runs a passenger search and moves the ETA feeds over to the new results.
    /// An empty query leaves the previous results, and their feeds, untouched.
    pub async fn search(&self, start_stop_id: &str, end_stop_id: &str) -> Option<RouteSearch> {
        let result = self.store.find_routes(start_stop_id, end_stop_id)?;
        let next: Vec<BusId> = result.buses.iter().map(|b| b.id.clone()).collect();

        let mut shown = self.results.lock().await;
        for id in &next {
            if let Err(e) = self.feeds.subscribe(id, FeedKind::Eta) {
                warn!(bus_id = %id, "Could not watch search result: {}", e);
            }
        }
        for id in shown.drain(..) {
            self.feeds.unsubscribe(&id, FeedKind::Eta).await;
        }
        *shown = next;
        Some(result)
    }

    pub async fn passenger_console(&self) -> PassengerView {
        let results = self
            .results
            .lock()
            .await
            .iter()
            .filter_map(|id| self.store.get_bus(id).ok())
            .collect();
        PassengerView {
            results,
            favorites: self.store.favorite_buses(),
            history: self.store.past_rides(),
            impact: self.store.impact_summary(),
        }
    }

    pub fn bus_detail(&self, bus_id: &str) -> Result<BusDetailView, StoreError> {
        let bus = self.store.get_bus(bus_id)?;
        Ok(BusDetailView {
            favorite: self.store.is_favorite(bus_id),
            my_rating: self.store.rating_for(bus_id),
            watchers: self.feeds.observers(bus_id, FeedKind::Eta),
            live_position: self.feeds.is_active(bus_id, FeedKind::Position),
            current_stop: bus.current_stop().cloned(),
            bus,
        })
    }

    /// The detail view was opened: its ETA starts ticking.
    pub fn watch_bus(&self, bus_id: &str) -> Result<usize, StoreError> {
        let watchers = self.feeds.subscribe(bus_id, FeedKind::Eta)?;
        *self.detail_watches.entry(BusId::from(bus_id)).or_insert(0) += 1;
        Ok(watchers)
    }

    /// Releases one detail view's subscription. Without an open detail view the
    /// feed is left to its other observers.
    pub async fn unwatch_bus(&self, bus_id: &str) -> Result<usize, StoreError> {
        if !self.store.contains_bus(bus_id) {
            return Err(StoreError::BusNotFound(bus_id.into()));
        }
        let released = match self.detail_watches.get_mut(bus_id) {
            Some(mut open) if *open > 0 => {
                *open -= 1;
                true
            }
            _ => false,
        };
        if !released {
            return Ok(self.feeds.observers(bus_id, FeedKind::Eta));
        }
        self.detail_watches.remove_if(bus_id, |_, open| *open == 0);
        Ok(self
            .feeds
            .unsubscribe(bus_id, FeedKind::Eta)
            .await
            .unwrap_or(0))
    }

    pub async fn close(&self) {
        self.feeds.shutdown().await;
    }
}
