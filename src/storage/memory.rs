//! In-process store used by `simulate` and tests.

use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Result;

use crate::detect::IncidentDecision;
use crate::event::{LogRecord, MetricSample};
use crate::pipeline::{IncidentSink, LogSource, ObservationSink};

#[derive(Debug, Default)]
struct Inner {
    metrics: Vec<MetricSample>,
    logs: Vec<LogRecord>,
    incidents: Vec<IncidentDecision>,
}

/// Unbounded vectors behind a shared mutex. Clones share the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn metrics(&self) -> Vec<MetricSample> {
        self.lock().metrics.clone()
    }

    pub fn logs(&self) -> Vec<LogRecord> {
        self.lock().logs.clone()
    }

    pub fn incidents(&self) -> Vec<IncidentDecision> {
        self.lock().incidents.clone()
    }
}

impl ObservationSink for MemoryStore {
    fn record_observation(&self, metric: &MetricSample, log: &LogRecord) -> Result<()> {
        let mut inner = self.lock();
        inner.metrics.push(metric.clone());
        inner.logs.push(log.clone());
        Ok(())
    }
}

impl IncidentSink for MemoryStore {
    fn record_incident(&self, incident: &IncidentDecision) -> Result<()> {
        self.lock().incidents.push(incident.clone());
        Ok(())
    }
}

impl LogSource for MemoryStore {
    fn recent_logs(&self, limit: usize) -> Result<Vec<LogRecord>> {
        let inner = self.lock();
        let start = inner.logs.len().saturating_sub(limit);
        Ok(inner.logs[start..].to_vec())
    }
}
