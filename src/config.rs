use crate::feeds::FeedSettings;
use crate::seed::Fleet;
use crate::telemetry::{Corridor, DEFAULT_STEP_SPAN, PositionWalk};
use clap::Parser;
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(name = "smartbus-sim", version, about = "In-memory SmartBus fleet telemetry simulator")]
pub struct Config {
    /// HTTP port
    #[arg(long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Milliseconds between position ticks of a shared bus
    #[arg(long, env = "SMARTBUS_POSITION_PERIOD_MS", default_value_t = 5_000)]
    pub position_period_ms: u64,

    /// Milliseconds between ETA ticks of a watched bus
    #[arg(long, env = "SMARTBUS_ETA_PERIOD_MS", default_value_t = 10_000)]
    pub eta_period_ms: u64,

    /// Width of the uniform jitter applied to each coordinate per tick, in degrees
    #[arg(long, env = "SMARTBUS_STEP_SPAN", default_value_t = DEFAULT_STEP_SPAN)]
    pub step_span: f64,

    /// Padding in degrees around the dataset's bounding box that positions are clamped to
    #[arg(long, env = "SMARTBUS_CORRIDOR_MARGIN", default_value_t = 0.05)]
    pub corridor_margin: f64,

    /// Let positions drift without a corridor
    #[arg(long, env = "SMARTBUS_UNBOUNDED")]
    pub unbounded: bool,

    /// Seed for reproducible walks
    #[arg(long, env = "SMARTBUS_SEED")]
    pub seed: Option<u64>,
}

impl Config {
    pub fn feed_settings(&self, fleet: &Fleet) -> FeedSettings {
        let corridor = if self.unbounded {
            None
        } else {
            Corridor::around(fleet.coordinates(), self.corridor_margin)
        };
        FeedSettings {
            position_period: Duration::from_millis(self.position_period_ms),
            eta_period: Duration::from_millis(self.eta_period_ms),
            walk: PositionWalk {
                step_span: self.step_span,
                corridor,
            },
            seed: self.seed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_reference_cadence() {
        let config = Config::try_parse_from(["smartbus-sim"]).unwrap();
        assert_eq!(config.position_period_ms, 5_000);
        assert_eq!(config.eta_period_ms, 10_000);
        assert!(!config.unbounded);

        let fleet = Fleet::seeded().unwrap();
        let settings = config.feed_settings(&fleet);
        let corridor = settings.walk.corridor.unwrap();
        for c in fleet.coordinates() {
            assert!(corridor.contains(c));
        }
        assert!((corridor.min.lat - (40.5795 - 0.05)).abs() < 1e-9);
        assert!((corridor.min.lng - (-74.1745 - 0.05)).abs() < 1e-9);
    }

    #[test]
    fn flags_override_defaults() {
        let config = Config::try_parse_from([
            "smartbus-sim",
            "--port",
            "8080",
            "--eta-period-ms",
            "250",
            "--unbounded",
            "--seed",
            "4",
        ])
        .unwrap();
        let settings = config.feed_settings(&Fleet::seeded().unwrap());
        assert_eq!(config.port, 8080);
        assert_eq!(settings.eta_period, Duration::from_millis(250));
        assert_eq!(settings.walk.corridor, None);
        assert_eq!(settings.seed, Some(4));
    }
}
