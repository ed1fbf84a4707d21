use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::event::MetricSample;
use crate::summarize::ClusterSummary;

/// A fired incident, built once and handed to the incident sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentDecision {
    pub id: Uuid,
    pub ts: DateTime<Utc>,
    pub score: f64,
    pub summary: String,
    pub top_cluster: String,
    pub sample_log: String,
    pub scenario: String,
}

impl IncidentDecision {
    pub fn new(
        now: DateTime<Utc>,
        score: f64,
        metric: &MetricSample,
        cluster: ClusterSummary,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            ts: now,
            score: (score * 10_000.0).round() / 10_000.0,
            summary: format!(
                "Anomaly detected: latency {:?}ms, error {:?}%, cpu {:?}%",
                metric.latency_ms, metric.error_rate, metric.cpu_pct
            ),
            top_cluster: cluster.label,
            sample_log: cluster.sample,
            scenario: metric.scenario.clone(),
        }
    }
}
