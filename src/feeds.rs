//! Periodic tick tasks that animate observed buses.
//!
//! A feed is started when a view begins observing a bus and cancelled when it stops.
//! Position and ETA feeds touch disjoint fields and run independently.

use crate::error::StoreError;
use crate::model::BusId;
use crate::state::FleetStore;
use crate::telemetry::{PositionWalk, step_eta};
use dashmap::DashMap;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

pub const POSITION_PERIOD: Duration = Duration::from_millis(5_000);
pub const ETA_PERIOD: Duration = Duration::from_millis(10_000);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedKind {
    Position,
    Eta,
}

#[derive(Clone, Debug)]
pub struct FeedSettings {
    pub position_period: Duration,
    pub eta_period: Duration,
    pub walk: PositionWalk,
    /// Fixed seed for reproducible walks; entropy when `None`.
    pub seed: Option<u64>,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            position_period: POSITION_PERIOD,
            eta_period: ETA_PERIOD,
            walk: PositionWalk::default(),
            seed: None,
        }
    }
}

impl FeedSettings {
    pub fn period(&self, kind: FeedKind) -> Duration {
        let period = match kind {
            FeedKind::Position => self.position_period,
            FeedKind::Eta => self.eta_period,
        };
        // tokio intervals panic on a zero period
        period.max(Duration::from_millis(1))
    }

    fn rng(&self, bus_id: &str, kind: FeedKind) -> StdRng {
        match self.seed {
            Some(seed) => {
                let salt = match kind {
                    FeedKind::Position => 0x5eed,
                    FeedKind::Eta => 0xe7a,
                };
                let mixed = bus_id
                    .bytes()
                    .fold(seed ^ salt, |h, b| h.wrapping_mul(31).wrapping_add(u64::from(b)));
                StdRng::seed_from_u64(mixed)
            }
            None => StdRng::from_entropy(),
        }
    }
}

/// A running feed. `cancel` stops it for good; dropping it aborts the task.
pub struct FeedHandle {
    bus_id: BusId,
    kind: FeedKind,
    cancel: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl FeedHandle {
    /// Signals the task and waits for it to finish. No tick runs after this returns.
    pub async fn cancel(mut self) {
        let _ = self.cancel.send(true);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    warn!(bus_id = %self.bus_id, kind = ?self.kind, "Feed task failed: {}", e);
                }
            }
        }
    }
}

impl Drop for FeedHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Starts ticking `bus_id` one period from now. Must be called inside a tokio runtime.
pub fn spawn_feed(
    store: Arc<FleetStore>,
    bus_id: BusId,
    kind: FeedKind,
    settings: &FeedSettings,
) -> FeedHandle {
    let (cancel_tx, mut cancel_rx) = watch::channel(false);
    let period = settings.period(kind);
    let walk = settings.walk;
    let mut rng = settings.rng(&bus_id, kind);

    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let task_bus = bus_id.clone();
    let task = tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                _ = cancel_rx.changed() => break,
                _ = ticker.tick() => {
                    let applied = match kind {
                        FeedKind::Position => store
                            .apply_position_step(&task_bus, |c| walk.step(c, &mut rng))
                            .map(|c| debug!(bus_id = %task_bus, lat = c.lat, lng = c.lng, "Position tick")),
                        FeedKind::Eta => store
                            .apply_eta_step(&task_bus, |eta| step_eta(eta, &mut rng))
                            .map(|eta| debug!(bus_id = %task_bus, eta, "ETA tick")),
                    };
                    if applied.is_none() {
                        warn!(bus_id = %task_bus, ?kind, "Bus left the fleet, stopping feed");
                        break;
                    }
                }
            }
        }
        debug!(bus_id = %task_bus, ?kind, "Feed stopped");
    });

    FeedHandle {
        bus_id,
        kind,
        cancel: cancel_tx,
        task: Some(task),
    }
}

struct ActiveFeed {
    handle: FeedHandle,
    observers: usize,
}

/// Running feeds keyed by bus and kind, shared by every view observing them.
/// A feed starts with its first observer and is cancelled when the last one leaves.
pub struct FeedRegistry {
    store: Arc<FleetStore>,
    settings: FeedSettings,
    active: DashMap<(BusId, FeedKind), ActiveFeed>,
}

impl FeedRegistry {
    pub fn new(store: Arc<FleetStore>, settings: FeedSettings) -> Self {
        Self {
            store,
            settings,
            active: DashMap::new(),
        }
    }

    /// Returns the number of observers after subscribing.
    pub fn subscribe(&self, bus_id: &str, kind: FeedKind) -> Result<usize, StoreError> {
        if !self.store.contains_bus(bus_id) {
            return Err(StoreError::BusNotFound(bus_id.into()));
        }
        let mut feed = self.active.entry((bus_id.into(), kind)).or_insert_with(|| {
            info!(bus_id, ?kind, "Feed started");
            ActiveFeed {
                handle: spawn_feed(self.store.clone(), bus_id.into(), kind, &self.settings),
                observers: 0,
            }
        });
        feed.observers += 1;
        Ok(feed.observers)
    }

    /// Returns the observers left, or `None` if the feed was not running.
    /// The last observer leaving cancels the feed before this returns.
    pub async fn unsubscribe(&self, bus_id: &str, kind: FeedKind) -> Option<usize> {
        let key = (BusId::from(bus_id), kind);
        let remaining = {
            let mut feed = self.active.get_mut(&key)?;
            feed.observers = feed.observers.saturating_sub(1);
            feed.observers
        };
        if remaining == 0 {
            if let Some((_, feed)) = self.active.remove_if(&key, |_, f| f.observers == 0) {
                feed.handle.cancel().await;
                info!(bus_id, ?kind, "Feed cancelled");
            }
        }
        Some(remaining)
    }

    pub fn observers(&self, bus_id: &str, kind: FeedKind) -> usize {
        self.active
            .get(&(BusId::from(bus_id), kind))
            .map_or(0, |f| f.observers)
    }

    pub fn is_active(&self, bus_id: &str, kind: FeedKind) -> bool {
        self.active.contains_key(&(BusId::from(bus_id), kind))
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub async fn shutdown(&self) {
        let keys: Vec<_> = self.active.iter().map(|r| r.key().clone()).collect();
        for key in keys {
            if let Some((_, feed)) = self.active.remove(&key) {
                feed.handle.cancel().await;
            }
        }
        info!("All feeds stopped");
    }
}
