//! Per-tick orchestration: score the metric, gate it, explain and record incidents.
//!
//! The orchestrator owns the detector, gate and clusterer. It never reads a
//! clock or sleeps; the driver hands it one event and the current time per
//! tick. Storage and log retrieval sit behind the collaborator traits below.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::RadarConfig;
use crate::detect::{AnomalyDetector, Assessment, DetectError, IncidentDecision, IncidentGate, TickState};
use crate::event::{Event, LogRecord, MetricSample};
use crate::summarize::LogClusterer;

/// Receives every raw metric and log, anomalous or not.
pub trait ObservationSink {
    fn record_observation(&self, metric: &MetricSample, log: &LogRecord) -> Result<()>;
}

/// Receives fired incidents. Retrying is the sink's business.
pub trait IncidentSink {
    fn record_incident(&self, incident: &IncidentDecision) -> Result<()>;
}

/// Supplies the most recent log lines, oldest first.
pub trait LogSource {
    fn recent_logs(&self, limit: usize) -> Result<Vec<LogRecord>>;
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("rejected sample: {0}")]
    Detect(#[from] DetectError),

    #[error("observation sink failed: {0:#}")]
    Observation(anyhow::Error),

    #[error("log source failed: {0:#}")]
    LogSource(anyhow::Error),

    #[error("incident sink failed: {0:#}")]
    Incident(anyhow::Error),
}

impl PipelineError {
    /// Collaborator failures are recoverable; a malformed sample is not.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, PipelineError::Detect(_))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TickOutcome {
    pub state: TickState,
    pub assessment: Assessment,
    pub incident: Option<IncidentDecision>,
}

pub struct Orchestrator<S> {
    detector: AnomalyDetector,
    gate: IncidentGate,
    clusterer: LogClusterer,
    store: S,
    recent_log_limit: usize,
}

impl<S> Orchestrator<S>
where
    S: ObservationSink + IncidentSink + LogSource,
{
    pub fn new(config: &RadarConfig, store: S) -> Self {
        Self {
            detector: AnomalyDetector::new(&config.detector),
            gate: IncidentGate::new(config.incident.cooldown_sec),
            clusterer: LogClusterer::new(config.clustering.clone()),
            store,
            recent_log_limit: config.incident.recent_log_limit,
        }
    }

    /// Process one event observed at `now`.
    ///
    /// A malformed metric is rejected before any state changes. The cooldown
    /// is marked as soon as an incident fires, so a failing sink or log
    /// source afterwards does not let the next tick fire again. A failed
    /// observation write does not stop a fired incident from reaching the
    /// incident sink.
    pub fn tick(&mut self, event: &Event, now: DateTime<Utc>) -> Result<TickOutcome, PipelineError> {
        let vector = event.metric.features()?;
        let assessment = self.detector.update(vector)?;

        let state = match assessment.score {
            None => TickState::Warmup,
            Some(_) if !assessment.is_anomaly => TickState::Normal,
            Some(score) => {
                if self.gate.decide(true, now) {
                    self.gate.mark_fired(now);
                    TickState::Fired
                } else {
                    info!(
                        score,
                        last_incident = ?self.gate.last_incident(),
                        "anomaly suppressed by cooldown"
                    );
                    TickState::Suppressed
                }
            }
        };
        if assessment.retrained {
            debug!(
                observed = self.detector.observed(),
                retrains = self.detector.retrain_count(),
                "model refreshed"
            );
        }

        let forwarded = self
            .store
            .record_observation(&event.metric, &event.log)
            .map_err(PipelineError::Observation);

        // A fired incident is raised even when forwarding failed; the
        // observation error is reported afterwards.
        let incident = match (state, assessment.score) {
            (TickState::Fired, Some(score)) => match self.raise_incident(&event.metric, score, now) {
                Ok(incident) => Some(incident),
                Err(e) => {
                    if let Err(lost) = forwarded {
                        error!("{}", lost);
                    }
                    return Err(e);
                }
            },
            _ => None,
        };
        forwarded?;

        Ok(TickOutcome {
            state,
            assessment,
            incident,
        })
    }

    fn raise_incident(
        &self,
        metric: &MetricSample,
        score: f64,
        now: DateTime<Utc>,
    ) -> Result<IncidentDecision, PipelineError> {
        let logs = self
            .store
            .recent_logs(self.recent_log_limit)
            .map_err(PipelineError::LogSource)?;
        let cluster = self.clusterer.summarize(&logs);
        let incident = IncidentDecision::new(now, score, metric, cluster);

        warn!(
            id = %incident.id,
            score = incident.score,
            scenario = %incident.scenario,
            cluster = %incident.top_cluster,
            "{}",
            incident.summary
        );

        self.store
            .record_incident(&incident)
            .map_err(PipelineError::Incident)?;
        Ok(incident)
    }

    pub fn detector(&self) -> &AnomalyDetector {
        &self.detector
    }

    pub fn gate(&self) -> &IncidentGate {
        &self.gate
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::LogLevel;
    use crate::storage::memory::MemoryStore;
    use chrono::Duration;
    use std::cell::Cell;

    const NORMAL_TICKS: u64 = 30;

    fn base_config() -> RadarConfig {
        let mut cfg = RadarConfig::default();
        cfg.detector.window_size = 40;
        cfg.detector.warmup_points = 20;
        cfg.detector.retrain_interval = 1_000;
        cfg.detector.n_trees = 50;
        cfg.incident.cooldown_sec = 30;
        cfg
    }

    /// Threshold placed between the lowest normal score and the spike's score,
    /// using a reference detector fed the same deterministic stream.
    fn config() -> RadarConfig {
        let mut cfg = base_config();
        let mut reference = AnomalyDetector::new(&cfg.detector);
        let mut min_normal = f64::INFINITY;
        for i in 0..NORMAL_TICKS {
            let vector = event(i, 120.0, "").metric.features().unwrap();
            if let Some(score) = reference.update(vector).unwrap().score {
                min_normal = min_normal.min(score);
            }
        }
        let spike_score = reference
            .score(&spike(NORMAL_TICKS).metric.features().unwrap())
            .unwrap();
        assert!(spike_score < min_normal);
        cfg.detector.anomaly_threshold = (spike_score + min_normal) / 2.0;
        cfg
    }

    fn event(i: u64, latency: f64, message: &str) -> Event {
        let ts = DateTime::from_timestamp(1_700_000_000 + i as i64, 0).unwrap();
        let jitter = (i % 7) as f64;
        Event {
            metric: MetricSample {
                ts,
                latency_ms: latency + jitter,
                error_rate: 0.2 + (i % 5) as f64 * 0.01,
                cpu_pct: 40.0 + (i % 3) as f64,
                scenario: "normal".into(),
            },
            log: LogRecord {
                ts,
                level: LogLevel::Info,
                message: message.into(),
                scenario: "normal".into(),
            },
        }
    }

    fn spike(i: u64) -> Event {
        let mut e = event(i, 12_000.0, "db timeout on checkout");
        e.metric.error_rate = 20.0;
        e.metric.cpu_pct = 100.0;
        e
    }

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap() + Duration::seconds(secs)
    }

    #[test]
    fn test_malformed_sample_leaves_state_untouched() {
        let mut orch = Orchestrator::new(&base_config(), MemoryStore::default());
        let mut bad = event(0, 120.0, "api response sent");
        bad.metric.latency_ms = f64::NAN;
        let err = orch.tick(&bad, at(0)).unwrap_err();
        assert!(!err.is_recoverable());
        assert_eq!(orch.detector().observed(), 0);
        assert!(orch.store().metrics().is_empty());
    }

    #[test]
    fn test_every_tick_is_forwarded() {
        let mut orch = Orchestrator::new(&base_config(), MemoryStore::default());
        for i in 0..25 {
            orch.tick(&event(i, 120.0, "session validated"), at(i as i64)).unwrap();
        }
        assert_eq!(orch.store().metrics().len(), 25);
        assert_eq!(orch.store().logs().len(), 25);
    }

    #[test]
    fn test_fires_then_suppresses_within_cooldown() {
        let mut orch = Orchestrator::new(&config(), MemoryStore::default());
        for i in 0..NORMAL_TICKS {
            let out = orch.tick(&event(i, 120.0, "session validated"), at(i as i64)).unwrap();
            assert_ne!(out.state, TickState::Fired);
        }

        let first = orch.tick(&spike(30), at(30)).unwrap();
        assert_eq!(first.state, TickState::Fired);
        let incident = first.incident.unwrap();
        assert!(incident.summary.starts_with("Anomaly detected: latency"));

        let second = orch.tick(&spike(35), at(35)).unwrap();
        assert_eq!(second.state, TickState::Suppressed);
        assert!(second.incident.is_none());
        assert_eq!(orch.store().incidents().len(), 1);
    }

    struct BrokenIncidentSink {
        inner: MemoryStore,
        attempts: Cell<u32>,
    }

    impl ObservationSink for BrokenIncidentSink {
        fn record_observation(&self, metric: &MetricSample, log: &LogRecord) -> Result<()> {
            self.inner.record_observation(metric, log)
        }
    }

    impl IncidentSink for BrokenIncidentSink {
        fn record_incident(&self, _incident: &IncidentDecision) -> Result<()> {
            self.attempts.set(self.attempts.get() + 1);
            anyhow::bail!("disk full")
        }
    }

    impl LogSource for BrokenIncidentSink {
        fn recent_logs(&self, limit: usize) -> Result<Vec<LogRecord>> {
            self.inner.recent_logs(limit)
        }
    }

    #[test]
    fn test_cooldown_marked_even_when_sink_fails() {
        let store = BrokenIncidentSink {
            inner: MemoryStore::default(),
            attempts: Cell::new(0),
        };
        let mut orch = Orchestrator::new(&config(), store);
        for i in 0..NORMAL_TICKS {
            orch.tick(&event(i, 120.0, "session validated"), at(i as i64)).unwrap();
        }

        let err = orch.tick(&spike(30), at(30)).unwrap_err();
        assert!(err.is_recoverable());
        assert!(matches!(err, PipelineError::Incident(_)));
        assert_eq!(orch.gate().last_incident(), Some(at(30)));

        let next = orch.tick(&spike(31), at(31)).unwrap();
        assert_eq!(next.state, TickState::Suppressed);
        assert_eq!(orch.store().attempts.get(), 1);
    }

    struct FailingObservationSink {
        inner: MemoryStore,
        failing: Cell<bool>,
    }

    impl ObservationSink for FailingObservationSink {
        fn record_observation(&self, metric: &MetricSample, log: &LogRecord) -> Result<()> {
            if self.failing.get() {
                anyhow::bail!("metrics table locked");
            }
            self.inner.record_observation(metric, log)
        }
    }

    impl IncidentSink for FailingObservationSink {
        fn record_incident(&self, incident: &IncidentDecision) -> Result<()> {
            self.inner.record_incident(incident)
        }
    }

    impl LogSource for FailingObservationSink {
        fn recent_logs(&self, limit: usize) -> Result<Vec<LogRecord>> {
            self.inner.recent_logs(limit)
        }
    }

    #[test]
    fn test_incident_raised_when_observation_write_fails() {
        let store = FailingObservationSink {
            inner: MemoryStore::default(),
            failing: Cell::new(false),
        };
        let mut orch = Orchestrator::new(&config(), store);
        for i in 0..NORMAL_TICKS {
            orch.tick(&event(i, 120.0, "session validated"), at(i as i64)).unwrap();
        }

        orch.store().failing.set(true);
        let err = orch.tick(&spike(30), at(30)).unwrap_err();
        assert!(err.is_recoverable());
        assert!(matches!(err, PipelineError::Observation(_)));
        assert_eq!(orch.gate().last_incident(), Some(at(30)));

        let incidents = orch.store().inner.incidents();
        assert_eq!(incidents.len(), 1);
        assert_eq!(incidents[0].ts, at(30));
        assert_eq!(orch.store().inner.metrics().len(), NORMAL_TICKS as usize);
    }
}
