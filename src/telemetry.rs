//! Random-walk perturbations that stand in for live GPS and ETA data.

use crate::model::Coordinate;
use rand::Rng;

pub const DEFAULT_STEP_SPAN: f64 = 0.001;

/// Lat/lng box a position walk is clamped into.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Corridor {
    pub min: Coordinate,
    pub max: Coordinate,
}

impl Corridor {
    /// Bounding box of `points`, padded by `margin` degrees on every side.
    /// Returns `None` for an empty set of points.
    pub fn around(points: impl IntoIterator<Item = Coordinate>, margin: f64) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let (mut min, mut max) = (first, first);
        for p in iter {
            min.lat = min.lat.min(p.lat);
            min.lng = min.lng.min(p.lng);
            max.lat = max.lat.max(p.lat);
            max.lng = max.lng.max(p.lng);
        }
        let margin = margin.max(0.0);
        Some(Self {
            min: Coordinate::new(min.lat - margin, min.lng - margin),
            max: Coordinate::new(max.lat + margin, max.lng + margin),
        })
    }

    pub fn clamp(&self, c: Coordinate) -> Coordinate {
        Coordinate::new(
            c.lat.clamp(self.min.lat, self.max.lat),
            c.lng.clamp(self.min.lng, self.max.lng),
        )
    }

    pub fn contains(&self, c: Coordinate) -> bool {
        (self.min.lat..=self.max.lat).contains(&c.lat)
            && (self.min.lng..=self.max.lng).contains(&c.lng)
    }
}

/// Uniform jitter on each coordinate component: `(u - 0.5) * step_span`, `u ~ U[0, 1)`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PositionWalk {
    pub step_span: f64,
    pub corridor: Option<Corridor>,
}

impl Default for PositionWalk {
    fn default() -> Self {
        Self {
            step_span: DEFAULT_STEP_SPAN,
            corridor: None,
        }
    }
}

impl PositionWalk {
    pub fn step<R: Rng + ?Sized>(&self, from: Coordinate, rng: &mut R) -> Coordinate {
        let moved = Coordinate::new(
            from.lat + (rng.r#gen::<f64>() - 0.5) * self.step_span,
            from.lng + (rng.r#gen::<f64>() - 0.5) * self.step_span,
        );
        match &self.corridor {
            Some(corridor) if !corridor.contains(moved) => corridor.clamp(moved),
            _ => moved,
        }
    }
}

/// ±1 minute with equal probability, never below one minute.
pub fn step_eta<R: Rng + ?Sized>(eta: u32, rng: &mut R) -> u32 {
    let next = if rng.r#gen::<f64>() > 0.5 {
        eta.saturating_sub(1)
    } else {
        eta.saturating_add(1)
    };
    next.max(1)
}
