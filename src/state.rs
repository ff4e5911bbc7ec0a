use crate::error::StoreError;
use crate::model::{Bus, BusId, Coordinate, ImpactSummary, Occupancy, PastRide, Stars, Stop};
use crate::search::{self, RouteSearch};
use crate::seed::{Fleet, ImpactFigures};
use dashmap::{DashMap, DashSet};
use tracing::{debug, info};

/// Session-scoped owner of the fleet. Reads hand out clones; writes go through
/// the named mutations below.
pub struct FleetStore {
    stops: Vec<Stop>,
    // Seed order, used for every listing.
    order: Vec<BusId>,
    buses: DashMap<BusId, Bus>,
    past_rides: Vec<PastRide>,
    favorites: DashSet<BusId>,
    // Bus ID -> the rider's own submitted rating
    ratings: DashMap<BusId, Stars>,
    impact: ImpactFigures,
}

impl FleetStore {
    pub fn new(fleet: Fleet) -> Self {
        let order = fleet.buses.iter().map(|b| b.id.clone()).collect();
        let buses = fleet
            .buses
            .into_iter()
            .map(|b| (b.id.clone(), b))
            .collect();
        let favorites = DashSet::new();
        for id in fleet.favorites {
            favorites.insert(id);
        }
        Self {
            stops: fleet.stops,
            order,
            buses,
            past_rides: fleet.past_rides,
            favorites,
            ratings: DashMap::new(),
            impact: fleet.impact,
        }
    }

    pub fn list_stops(&self) -> Vec<Stop> {
        self.stops.clone()
    }

    pub fn list_buses(&self) -> Vec<Bus> {
        self.order
            .iter()
            .filter_map(|id| self.buses.get(id).map(|b| b.value().clone()))
            .collect()
    }

    pub fn bus_ids(&self) -> &[BusId] {
        &self.order
    }

    pub fn get_bus(&self, id: &str) -> Result<Bus, StoreError> {
        self.buses
            .get(id)
            .map(|b| b.value().clone())
            .ok_or_else(|| StoreError::BusNotFound(id.into()))
    }

    pub fn contains_bus(&self, id: &str) -> bool {
        self.buses.contains_key(id)
    }

    pub fn find_routes(&self, start_stop_id: &str, end_stop_id: &str) -> Option<RouteSearch> {
        let result = search::find_routes(&self.list_buses(), start_stop_id, end_stop_id);
        if let Some(r) = &result {
            debug!(
                start = start_stop_id,
                end = end_stop_id,
                kind = ?r.kind,
                count = r.buses.len(),
                "Route search"
            );
        }
        result
    }

    pub fn set_occupancy(&self, bus_id: &str, level: Occupancy) -> Result<Bus, StoreError> {
        let mut bus = self
            .buses
            .get_mut(bus_id)
            .ok_or_else(|| StoreError::BusNotFound(bus_id.into()))?;
        bus.occupancy = level;
        info!(bus_id, occupancy = ?level, "Occupancy updated");
        Ok(bus.clone())
    }

    pub fn submit_rating(&self, bus_id: &str, stars: Stars) -> Result<Stars, StoreError> {
        if !self.contains_bus(bus_id) {
            return Err(StoreError::BusNotFound(bus_id.into()));
        }
        self.ratings.insert(bus_id.into(), stars);
        info!(bus_id, stars = stars.get(), "Rating submitted");
        Ok(stars)
    }

    pub fn rating_for(&self, bus_id: &str) -> Option<Stars> {
        self.ratings.get(bus_id).map(|r| *r.value())
    }

    /// Returns whether the bus is a favorite afterwards.
    pub fn toggle_favorite(&self, bus_id: &str) -> Result<bool, StoreError> {
        if !self.contains_bus(bus_id) {
            return Err(StoreError::BusNotFound(bus_id.into()));
        }
        let now_favorite = if self.favorites.remove(bus_id).is_some() {
            false
        } else {
            self.favorites.insert(bus_id.into());
            true
        };
        debug!(bus_id, favorite = now_favorite, "Favorite toggled");
        Ok(now_favorite)
    }

    pub fn is_favorite(&self, bus_id: &str) -> bool {
        self.favorites.contains(bus_id)
    }

    pub fn favorite_buses(&self) -> Vec<Bus> {
        self.list_buses()
            .into_iter()
            .filter(|b| self.is_favorite(&b.id))
            .collect()
    }

    pub fn past_rides(&self) -> Vec<PastRide> {
        self.past_rides.clone()
    }

    pub fn nearby_buses(&self, limit: usize) -> Vec<Bus> {
        self.list_buses().into_iter().take(limit).collect()
    }

    /// Highest rider rating first; ties keep fleet order.
    pub fn top_rated(&self, limit: usize) -> Vec<Bus> {
        let mut buses = self.list_buses();
        buses.sort_by(|a, b| b.rating.total_cmp(&a.rating));
        buses.truncate(limit);
        buses
    }

    pub fn impact_summary(&self) -> ImpactSummary {
        ImpactSummary {
            co2_saved_kg: self.impact.co2_saved_kg,
            rides_this_month: self.impact.rides_this_month,
            top_rated: self.top_rated(3),
        }
    }

    /// Replaces one bus's location. Returns the new value, or `None` if the bus is gone.
    pub fn apply_position_step(
        &self,
        bus_id: &str,
        step: impl FnOnce(Coordinate) -> Coordinate,
    ) -> Option<Coordinate> {
        let mut bus = self.buses.get_mut(bus_id)?;
        bus.current_location = step(bus.current_location);
        Some(bus.current_location)
    }

    /// Replaces one bus's ETA, clamped to at least one minute.
    pub fn apply_eta_step(&self, bus_id: &str, step: impl FnOnce(u32) -> u32) -> Option<u32> {
        let mut bus = self.buses.get_mut(bus_id)?;
        bus.eta = step(bus.eta).max(1);
        Some(bus.eta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::MatchKind;
    use crate::telemetry::step_eta;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::BTreeSet;

    fn store() -> FleetStore {
        FleetStore::new(Fleet::seeded().unwrap())
    }

    fn favorite_ids(store: &FleetStore) -> BTreeSet<String> {
        store.favorites.iter().map(|f| f.key().to_string()).collect()
    }

    #[test]
    fn lists_in_seed_order() {
        let store = store();
        let ids: Vec<_> = store.list_buses().into_iter().map(|b| b.id).collect();
        assert_eq!(ids, ["bus-1", "bus-2", "bus-3", "bus-4"]);
        assert_eq!(store.list_stops().len(), 8);
        assert_eq!(store.list_stops()[5].name, "Hospital");
    }

    #[test]
    fn get_bus_reports_not_found() {
        let store = store();
        assert_eq!(
            store.get_bus("bus-99"),
            Err(StoreError::BusNotFound("bus-99".into()))
        );
    }

    #[test]
    fn get_bus_is_idempotent_between_ticks() {
        let store = store();
        assert_eq!(store.get_bus("bus-2"), store.get_bus("bus-2"));
    }

    #[test]
    fn seed_scenario_routes() {
        let store = store();
        let direct = store.find_routes("1", "3").unwrap();
        assert_eq!(direct.kind, MatchKind::Direct);
        assert!(direct.buses.iter().any(|b| b.id == "bus-1"));

        let fallback = store.find_routes("1", "6").unwrap();
        assert_eq!(fallback.kind, MatchKind::Suggested);
        let ids: Vec<_> = fallback.buses.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, ["bus-1", "bus-2"]);
    }

    #[test]
    fn toggling_favorite_twice_restores_set() {
        let store = store();
        let before = favorite_ids(&store);
        for id in ["bus-1", "bus-3"] {
            let first = store.toggle_favorite(id).unwrap();
            let second = store.toggle_favorite(id).unwrap();
            assert_ne!(first, second);
            assert_eq!(favorite_ids(&store), before);
        }
    }

    #[test]
    fn favorite_buses_follow_fleet_order() {
        let store = store();
        store.toggle_favorite("bus-2").unwrap();
        let ids: Vec<_> = store.favorite_buses().into_iter().map(|b| b.id).collect();
        assert_eq!(ids, ["bus-1", "bus-2", "bus-4"]);
        assert!(store.toggle_favorite("bus-9").is_err());
    }

    #[test]
    fn rating_is_recorded_unchanged() {
        let store = store();
        assert_eq!(store.rating_for("bus-1"), None);
        for v in 1..=5 {
            let stars = Stars::try_from(v).unwrap();
            assert_eq!(store.submit_rating("bus-1", stars), Ok(stars));
            assert_eq!(store.rating_for("bus-1").map(Stars::get), Some(v));
        }
    }

    #[test]
    fn rating_for_unknown_bus_is_rejected() {
        let store = store();
        let stars = Stars::try_from(4).unwrap();
        assert!(store.submit_rating("bus-0", stars).is_err());
        assert_eq!(store.rating_for("bus-0"), None);
    }

    #[test]
    fn occupancy_changes_only_target_bus() {
        let store = store();
        let before = store.get_bus("bus-2").unwrap();
        let updated = store.set_occupancy("bus-1", Occupancy::High).unwrap();
        assert_eq!(updated.occupancy, Occupancy::High);
        assert_eq!(store.get_bus("bus-1").unwrap().occupancy, Occupancy::High);
        assert_eq!(store.get_bus("bus-2").unwrap(), before);
    }

    #[test]
    fn eta_ticks_touch_only_eta() {
        let store = store();
        let mut rng = StdRng::seed_from_u64(1);
        let before = store.get_bus("bus-3").unwrap();
        let others = store.get_bus("bus-4").unwrap();
        for _ in 0..500 {
            let eta = store
                .apply_eta_step("bus-3", |e| step_eta(e, &mut rng))
                .unwrap();
            assert!(eta >= 1);
        }
        let after = store.get_bus("bus-3").unwrap();
        assert_eq!(after.current_location, before.current_location);
        assert_eq!(after.occupancy, before.occupancy);
        assert!(after.current_stop_index < after.stops.len());
        assert_eq!(store.get_bus("bus-4").unwrap(), others);
    }

    #[test]
    fn eta_step_is_clamped_by_store() {
        let store = store();
        assert_eq!(store.apply_eta_step("bus-1", |_| 0), Some(1));
        assert_eq!(store.apply_eta_step("missing", |e| e + 1), None);
    }

    #[test]
    fn impact_lists_top_three_by_rating() {
        let store = store();
        let impact = store.impact_summary();
        assert_eq!(impact.rides_this_month, 12);
        let ids: Vec<_> = impact.top_rated.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, ["bus-4", "bus-1", "bus-2"]);
    }
}
