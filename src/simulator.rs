//! Synthetic event source cycling through scripted operational scenarios.
//!
//! A 480-tick cycle: quiet traffic, a slow deploy drift, quiet again, a
//! database saturation episode, then quiet until the cycle restarts.

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::event::{Event, LogLevel, LogRecord, MetricSample};

/// Anything that can hand the pipeline its next (metric, log) pair.
pub trait EventSource {
    fn next_event(&mut self, now: DateTime<Utc>) -> Event;
}

const CYCLE_TICKS: u64 = 480;

const BASE_LATENCY_MS: f64 = 120.0;
const BASE_ERROR_RATE: f64 = 0.2;
const BASE_CPU_PCT: f64 = 40.0;

const INFO_MESSAGES: &[&str] = &[
    "request completed in time",
    "cache hit on product detail",
    "session validated",
    "api response sent",
];

const DRIFT_MESSAGES: &[&str] = &[
    "migration step is slower than expected",
    "schema lock wait observed",
    "warmup cache still building",
];

const SATURATION_MESSAGES: &[&str] = &[
    "db timeout on checkout",
    "connection pool exhausted",
    "slow query detected: orders table",
    "deadlock retry triggered",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scenario {
    Normal,
    DeployDrift,
    DbSaturation,
}

impl Scenario {
    /// Scenario active at `tick`.
    pub fn at(tick: u64) -> Self {
        match tick % CYCLE_TICKS {
            180..=259 => Scenario::DeployDrift,
            340..=419 => Scenario::DbSaturation,
            _ => Scenario::Normal,
        }
    }
}

impl std::fmt::Display for Scenario {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scenario::Normal => write!(f, "normal"),
            Scenario::DeployDrift => write!(f, "deploy_drift"),
            Scenario::DbSaturation => write!(f, "db_saturation"),
        }
    }
}

pub struct Simulator {
    tick: u64,
    rng: StdRng,
}

impl Simulator {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { tick: 0, rng }
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn scenario(&self) -> Scenario {
        Scenario::at(self.tick)
    }

    fn pick(&mut self, messages: &[&'static str]) -> &'static str {
        messages.choose(&mut self.rng).copied().unwrap_or("")
    }
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

impl EventSource for Simulator {
    fn next_event(&mut self, now: DateTime<Utc>) -> Event {
        let scenario = self.scenario();
        let phase = (self.tick % 80) as f64;

        let (drift, error_bump, cpu_bump) = match scenario {
            Scenario::Normal => (0.0, 0.0, 0.0),
            Scenario::DeployDrift => ((phase * 1.8).min(120.0), (phase * 0.015).min(1.2), 10.0),
            Scenario::DbSaturation => (
                220.0 + self.rng.gen_range(0.0..60.0),
                2.5 + self.rng.gen_range(0.0..1.0),
                25.0,
            ),
        };

        let latency_ms = BASE_LATENCY_MS + drift + self.rng.gen_range(-8.0..8.0);
        let error_rate = (BASE_ERROR_RATE + error_bump + self.rng.gen_range(-0.05..0.05)).max(0.0);
        let cpu_pct = (BASE_CPU_PCT + cpu_bump + self.rng.gen_range(-4.0..4.0)).min(100.0);

        let mut level = LogLevel::Info;
        let mut message = self.pick(INFO_MESSAGES);
        if scenario == Scenario::DeployDrift && self.rng.gen_bool(0.35) {
            level = LogLevel::Warn;
            message = self.pick(DRIFT_MESSAGES);
        }
        if scenario == Scenario::DbSaturation && self.rng.gen_bool(0.6) {
            level = LogLevel::Error;
            message = self.pick(SATURATION_MESSAGES);
        }

        self.tick += 1;

        Event {
            metric: MetricSample {
                ts: now,
                latency_ms: round_to(latency_ms, 2),
                error_rate: round_to(error_rate, 3),
                cpu_pct: round_to(cpu_pct, 2),
                scenario: scenario.to_string(),
            },
            log: LogRecord {
                ts: now,
                level,
                message: message.to_string(),
                scenario: scenario.to_string(),
            },
        }
    }
}
