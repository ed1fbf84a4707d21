//! Anomaly scoring and incident gating.

pub mod forest;
pub mod gate;
pub mod incident;
pub mod scorer;
pub mod window;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use self::gate::IncidentGate;
pub use self::incident::IncidentDecision;
pub use self::scorer::{AnomalyDetector, Assessment};
pub use self::window::FeatureWindow;

/// Number of fields in a [`FeatureVector`].
pub const FEATURE_COUNT: usize = 3;

/// Field names in schema order.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = ["latency_ms", "error_rate", "cpu_pct"];

#[derive(Debug, Error, PartialEq)]
pub enum DetectError {
    #[error("feature vector has {got} fields, expected {expected}")]
    Arity { expected: usize, got: usize },

    #[error("feature `{field}` is not a finite number ({value})")]
    NonFinite { field: &'static str, value: f64 },

    #[error("cannot train on an empty window")]
    EmptyTrainingSet,
}

/// One tick's numeric features: latency, error rate, CPU utilization.
///
/// Values are validated finite on construction and never change afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector([f64; FEATURE_COUNT]);

impl FeatureVector {
    pub fn new(latency_ms: f64, error_rate: f64, cpu_pct: f64) -> Result<Self, DetectError> {
        Self::from_slice(&[latency_ms, error_rate, cpu_pct])
    }

    /// Build from an untyped slice, rejecting wrong arity and NaN/infinite values.
    pub fn from_slice(values: &[f64]) -> Result<Self, DetectError> {
        if values.len() != FEATURE_COUNT {
            return Err(DetectError::Arity {
                expected: FEATURE_COUNT,
                got: values.len(),
            });
        }
        let mut fields = [0.0; FEATURE_COUNT];
        for (i, &value) in values.iter().enumerate() {
            if !value.is_finite() {
                return Err(DetectError::NonFinite {
                    field: FEATURE_NAMES[i],
                    value,
                });
            }
            fields[i] = value;
        }
        Ok(Self(fields))
    }

    pub fn get(&self, feature: usize) -> f64 {
        self.0[feature]
    }

    pub fn as_array(&self) -> &[f64; FEATURE_COUNT] {
        &self.0
    }

    pub fn latency_ms(&self) -> f64 {
        self.0[0]
    }

    pub fn error_rate(&self) -> f64 {
        self.0[1]
    }

    pub fn cpu_pct(&self) -> f64 {
        self.0[2]
    }
}

/// Where a single tick ended up on the anomaly path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TickState {
    /// Window below warmup size, score suppressed.
    Warmup,
    /// Scored, not anomalous.
    Normal,
    /// Anomalous and outside the cooldown window; an incident was raised.
    Fired,
    /// Anomalous but inside the cooldown window.
    Suppressed,
}
