//! TOML configuration for opsradar.
//!
//! Layered: compiled-in defaults, an optional TOML file (`OPSRADAR_CONFIG` or
//! `/etc/opsradar/opsradar.toml`), then per-setting `OPSRADAR_*` environment
//! overrides. Values are fixed once the pipeline is constructed.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::detect::forest::ForestParams;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("detector.window_size must be at least 2")]
    WindowTooSmall,
    #[error("detector.warmup_points ({warmup}) must be between 2 and window_size ({window})")]
    WarmupOutOfRange { warmup: usize, window: usize },
    #[error("detector.retrain_interval must be greater than zero")]
    ZeroRetrainInterval,
    #[error("detector.n_trees must be greater than zero")]
    ZeroTrees,
    #[error("detector.subsample_fraction must be in (0, 1], got {0}")]
    SubsampleFraction(f64),
    #[error("detector.contamination must be in (0, 0.5], got {0}")]
    Contamination(f64),
    #[error("detector.anomaly_threshold must be finite")]
    Threshold,
    #[error("clustering.max_clusters must be at least 1")]
    ZeroClusters,
    #[error("pipeline.sample_interval_ms must be greater than zero")]
    ZeroInterval,
}

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RadarConfig {
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub incident: IncidentConfig,
    #[serde(default)]
    pub clustering: ClusterConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub simulator: SimulatorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl RadarConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        info!(path = %path.display(), "loaded opsradar configuration");
        Ok(config)
    }

    /// Try, in order: `OPSRADAR_CONFIG`, `/etc/opsradar/opsradar.toml`, defaults.
    pub fn load_or_default() -> Self {
        if let Ok(env_path) = std::env::var("OPSRADAR_CONFIG") {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "OPSRADAR_CONFIG set but file could not be loaded, trying fallback"
                    );
                }
            }
        }

        let system_path = Path::new("/etc/opsradar/opsradar.toml");
        if system_path.exists() {
            match Self::load(system_path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %system_path.display(),
                        error = %e,
                        "system config file exists but could not be loaded, using defaults"
                    );
                }
            }
        }

        debug!("no config file found, using compiled-in defaults");
        Self::default()
    }

    /// Apply `OPSRADAR_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup. Unparseable values are errors.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parse<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T>
        where
            T::Err: std::fmt::Display,
        {
            raw.trim()
                .parse::<T>()
                .map_err(|e| anyhow::anyhow!("invalid value for {}: '{}' ({})", key, raw, e))
        }

        if let Some(v) = lookup("OPSRADAR_WINDOW_SIZE") {
            self.detector.window_size = parse("OPSRADAR_WINDOW_SIZE", &v)?;
        }
        if let Some(v) = lookup("OPSRADAR_WARMUP_POINTS") {
            self.detector.warmup_points = parse("OPSRADAR_WARMUP_POINTS", &v)?;
        }
        if let Some(v) = lookup("OPSRADAR_RETRAIN_INTERVAL") {
            self.detector.retrain_interval = parse("OPSRADAR_RETRAIN_INTERVAL", &v)?;
        }
        if let Some(v) = lookup("OPSRADAR_ANOMALY_THRESHOLD") {
            self.detector.anomaly_threshold = parse("OPSRADAR_ANOMALY_THRESHOLD", &v)?;
        }
        if let Some(v) = lookup("OPSRADAR_INCIDENT_COOLDOWN_SEC") {
            self.incident.cooldown_sec = parse("OPSRADAR_INCIDENT_COOLDOWN_SEC", &v)?;
        }
        if let Some(v) = lookup("OPSRADAR_RECENT_LOG_LIMIT") {
            self.incident.recent_log_limit = parse("OPSRADAR_RECENT_LOG_LIMIT", &v)?;
        }
        if let Some(v) = lookup("OPSRADAR_SAMPLE_INTERVAL_MS") {
            self.pipeline.sample_interval_ms = parse("OPSRADAR_SAMPLE_INTERVAL_MS", &v)?;
        }
        if let Some(v) = lookup("OPSRADAR_DB_PATH") {
            self.storage.db_path = PathBuf::from(v);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.detector.validate()?;
        if self.clustering.max_clusters == 0 {
            return Err(ConfigError::ZeroClusters);
        }
        if self.pipeline.sample_interval_ms == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Detector
// ---------------------------------------------------------------------------

/// Rolling window, warmup/retrain policy and isolation forest settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Capacity of the rolling feature window.
    pub window_size: usize,
    /// Vectors required before the first model is trained.
    pub warmup_points: usize,
    /// Retrain whenever the observation count is a multiple of this.
    pub retrain_interval: u64,
    /// Scores strictly below this are anomalous (lower = more anomalous).
    pub anomaly_threshold: f64,
    /// Trees per ensemble.
    pub n_trees: usize,
    /// Share of the window sampled per tree, capped at 256 points.
    pub subsample_fraction: f64,
    /// Expected outlier share; sets the score's zero point. `None` uses a fixed offset.
    pub contamination: Option<f64>,
    /// Seed for deterministic retraining.
    pub seed: u64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            window_size: 400,
            warmup_points: 120,
            retrain_interval: 200,
            anomaly_threshold: -0.12,
            n_trees: 150,
            subsample_fraction: 1.0,
            contamination: Some(0.03),
            seed: 42,
        }
    }
}

impl DetectorConfig {
    pub fn forest_params(&self) -> ForestParams {
        ForestParams {
            n_trees: self.n_trees,
            subsample_fraction: self.subsample_fraction,
            contamination: self.contamination,
            seed: self.seed,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_size < 2 {
            return Err(ConfigError::WindowTooSmall);
        }
        if self.warmup_points < 2 || self.warmup_points > self.window_size {
            return Err(ConfigError::WarmupOutOfRange {
                warmup: self.warmup_points,
                window: self.window_size,
            });
        }
        if self.retrain_interval == 0 {
            return Err(ConfigError::ZeroRetrainInterval);
        }
        if self.n_trees == 0 {
            return Err(ConfigError::ZeroTrees);
        }
        if !(self.subsample_fraction > 0.0 && self.subsample_fraction <= 1.0) {
            return Err(ConfigError::SubsampleFraction(self.subsample_fraction));
        }
        if let Some(c) = self.contamination {
            if !(c > 0.0 && c <= 0.5) {
                return Err(ConfigError::Contamination(c));
            }
        }
        if !self.anomaly_threshold.is_finite() {
            return Err(ConfigError::Threshold);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Incident
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IncidentConfig {
    /// Minimum wall-clock seconds between two fired incidents.
    pub cooldown_sec: u64,
    /// How many recent log lines feed the clusterer.
    pub recent_log_limit: usize,
}

impl Default for IncidentConfig {
    fn default() -> Self {
        Self {
            cooldown_sec: 30,
            recent_log_limit: 200,
        }
    }
}

// ---------------------------------------------------------------------------
// Clustering
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Batches smaller than this get the "insufficient volume" summary.
    pub min_logs: usize,
    pub max_clusters: usize,
    /// Terms taken from the top centroid for the label. Only positive-weight
    /// terms count, so a narrow cluster may yield fewer.
    pub label_terms: usize,
    /// k-means restarts; the lowest-inertia run wins.
    pub n_init: usize,
    pub max_iter: usize,
    pub seed: u64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            min_logs: 5,
            max_clusters: 3,
            label_terms: 4,
            n_init: 10,
            max_iter: 300,
            seed: 42,
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline / storage / API / simulator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Pause between ticks.
    pub sample_interval_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: 1000,
        }
    }
}

impl PipelineConfig {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("data/ops_radar.db"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub bind: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Fixed seed for reproducible synthetic traffic; random when unset.
    pub seed: Option<u64>,
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum tracing level (`trace`, `debug`, `info`, `warn`, `error`).
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_sane() {
        let cfg = RadarConfig::default();

        assert_eq!(cfg.detector.window_size, 400);
        assert_eq!(cfg.detector.warmup_points, 120);
        assert_eq!(cfg.detector.retrain_interval, 200);
        assert_eq!(cfg.detector.anomaly_threshold, -0.12);
        assert_eq!(cfg.detector.n_trees, 150);
        assert_eq!(cfg.detector.contamination, Some(0.03));
        assert_eq!(cfg.detector.seed, 42);

        assert_eq!(cfg.incident.cooldown_sec, 30);
        assert_eq!(cfg.incident.recent_log_limit, 200);

        assert_eq!(cfg.clustering, ClusterConfig::default());
        assert_eq!(cfg.clustering.min_logs, 5);
        assert_eq!(cfg.clustering.max_clusters, 3);

        assert_eq!(cfg.pipeline.sample_interval(), Duration::from_secs(1));
        assert_eq!(cfg.storage.db_path, PathBuf::from("data/ops_radar.db"));
        assert_eq!(cfg.api.bind, "0.0.0.0:8000");
        assert!(cfg.simulator.seed.is_none());
        assert_eq!(cfg.logging.level, "info");
        assert!(!cfg.logging.json);

        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let toml_str = r#"
[detector]
warmup_points = 60
anomaly_threshold = -0.2

[incident]
cooldown_sec = 10
"#;

        let cfg: RadarConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(cfg.detector.warmup_points, 60);
        assert_eq!(cfg.detector.anomaly_threshold, -0.2);
        assert_eq!(cfg.incident.cooldown_sec, 10);

        assert_eq!(cfg.detector.window_size, 400);
        assert_eq!(cfg.incident.recent_log_limit, 200);
        assert_eq!(cfg.api.bind, "0.0.0.0:8000");
    }

    #[test]
    fn test_empty_toml_uses_all_defaults() {
        let cfg: RadarConfig = toml::from_str("").unwrap();
        let defaults = RadarConfig::default();
        assert_eq!(cfg.detector.window_size, defaults.detector.window_size);
        assert_eq!(cfg.storage.db_path, defaults.storage.db_path);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("opsradar.toml");
        std::fs::write(
            &path,
            r#"
[api]
bind = "127.0.0.1:9999"
"#,
        )
        .unwrap();

        let cfg = RadarConfig::load(&path).unwrap();
        assert_eq!(cfg.api.bind, "127.0.0.1:9999");
    }

    #[test]
    fn test_load_missing_file_errors() {
        let result = RadarConfig::load(Path::new("/nonexistent/path/opsradar.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("OPSRADAR_WARMUP_POINTS", "50"),
            ("OPSRADAR_ANOMALY_THRESHOLD", "-0.3"),
            ("OPSRADAR_DB_PATH", "/tmp/radar.db"),
        ]
        .into_iter()
        .collect();

        let mut cfg = RadarConfig::default();
        cfg.apply_overrides(|k| env.get(k).map(|v| v.to_string())).unwrap();

        assert_eq!(cfg.detector.warmup_points, 50);
        assert_eq!(cfg.detector.anomaly_threshold, -0.3);
        assert_eq!(cfg.storage.db_path, PathBuf::from("/tmp/radar.db"));
        assert_eq!(cfg.detector.window_size, 400);
    }

    #[test]
    fn test_bad_override_is_an_error() {
        let mut cfg = RadarConfig::default();
        let result = cfg.apply_overrides(|k| {
            (k == "OPSRADAR_WINDOW_SIZE").then(|| "lots".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_validation_rejects_bad_combinations() {
        let mut cfg = RadarConfig::default();
        cfg.detector.warmup_points = 500;
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::WarmupOutOfRange { warmup: 500, window: 400 })
        );

        let mut cfg = RadarConfig::default();
        cfg.detector.retrain_interval = 0;
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroRetrainInterval));

        let mut cfg = RadarConfig::default();
        cfg.detector.contamination = Some(0.7);
        assert_eq!(cfg.validate(), Err(ConfigError::Contamination(0.7)));

        let mut cfg = RadarConfig::default();
        cfg.detector.contamination = None;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_serialization_roundtrip() {
        let cfg = RadarConfig::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let back: RadarConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(cfg.detector.window_size, back.detector.window_size);
        assert_eq!(cfg.clustering, back.clustering);
    }
}
