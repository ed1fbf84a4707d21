//! Cooldown gate between anomaly flags and fired incidents.

use chrono::{DateTime, Duration, Utc};

/// Throttles incidents to at most one per cooldown window of wall-clock time.
#[derive(Debug, Clone)]
pub struct IncidentGate {
    cooldown: Duration,
    last_incident: Option<DateTime<Utc>>,
}

impl IncidentGate {
    pub fn new(cooldown_sec: u64) -> Self {
        Self {
            cooldown: Duration::seconds(cooldown_sec.min(u32::MAX as u64) as i64),
            last_incident: None,
        }
    }

    /// True when `is_anomaly` holds and the cooldown since the last fired
    /// incident has elapsed (or nothing has fired yet). Does not mutate.
    pub fn decide(&self, is_anomaly: bool, now: DateTime<Utc>) -> bool {
        if !is_anomaly {
            return false;
        }
        match self.last_incident {
            None => true,
            Some(last) => now.signed_duration_since(last) >= self.cooldown,
        }
    }

    /// Record a fired incident. Called once per firing, before any
    /// downstream work that may fail.
    pub fn mark_fired(&mut self, now: DateTime<Utc>) {
        self.last_incident = Some(now);
    }

    pub fn last_incident(&self) -> Option<DateTime<Utc>> {
        self.last_incident
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }
}
