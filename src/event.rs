//! Metric and log records handed to the pipeline by the event source.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::detect::{DetectError, FeatureVector};

/// One operational metric sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub ts: DateTime<Utc>,
    pub latency_ms: f64,
    pub error_rate: f64,
    pub cpu_pct: f64,
    pub scenario: String,
}

impl MetricSample {
    /// Extract the fixed-schema feature vector, rejecting non-finite fields.
    pub fn features(&self) -> Result<FeatureVector, DetectError> {
        FeatureVector::new(self.latency_ms, self.error_rate, self.cpu_pct)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warn => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARN" | "WARNING" => Ok(LogLevel::Warn),
            "ERROR" => Ok(LogLevel::Error),
            other => anyhow::bail!("unknown log level '{}'", other),
        }
    }
}

/// One log line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub ts: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    pub scenario: String,
}

/// The pair delivered once per tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub metric: MetricSample,
    pub log: LogRecord,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_roundtrip() {
        for level in [LogLevel::Debug, LogLevel::Info, LogLevel::Warn, LogLevel::Error] {
            let parsed: LogLevel = level.to_string().parse().unwrap();
            assert_eq!(parsed, level);
        }
        assert_eq!("warning".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert!("fatal".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_level_serializes_uppercase() {
        let json = serde_json::to_string(&LogLevel::Warn).unwrap();
        assert_eq!(json, "\"WARN\"");
    }

    #[test]
    fn test_metric_features_reject_infinite() {
        let metric = MetricSample {
            ts: Utc::now(),
            latency_ms: f64::INFINITY,
            error_rate: 0.1,
            cpu_pct: 10.0,
            scenario: "normal".into(),
        };
        assert!(metric.features().is_err());
    }
}
