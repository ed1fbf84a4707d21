//! Rolling-window anomaly scorer with warmup and periodic retraining.

use serde::Serialize;
use tracing::debug;

use crate::config::DetectorConfig;
use crate::detect::forest::{ForestParams, IsolationForest};
use crate::detect::{DetectError, FeatureVector, FeatureWindow};

/// Result of feeding one vector to the detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Assessment {
    /// `None` while the window is still warming up.
    pub score: Option<f64>,
    pub is_anomaly: bool,
    /// Whether this update rebuilt the model before scoring.
    pub retrained: bool,
}

impl Assessment {
    const WARMUP: Self = Self {
        score: None,
        is_anomaly: false,
        retrained: false,
    };
}

/// Owns the feature window and the current isolation forest.
///
/// The model stays absent until the window holds `warmup_points` vectors.
/// It is rebuilt from a window snapshot the first time warmup completes and
/// whenever the observation counter hits a multiple of `retrain_interval`.
#[derive(Debug)]
pub struct AnomalyDetector {
    window: FeatureWindow,
    model: Option<IsolationForest>,
    params: ForestParams,
    warmup_points: usize,
    retrain_interval: u64,
    threshold: f64,
    observed: u64,
    retrains: u64,
}

impl AnomalyDetector {
    pub fn new(config: &DetectorConfig) -> Self {
        Self {
            window: FeatureWindow::new(config.window_size),
            model: None,
            params: config.forest_params(),
            warmup_points: config.warmup_points,
            retrain_interval: config.retrain_interval.max(1),
            threshold: config.anomaly_threshold,
            observed: 0,
            retrains: 0,
        }
    }

    /// Append `vector`, retrain if due, and score it.
    pub fn update(&mut self, vector: FeatureVector) -> Result<Assessment, DetectError> {
        self.window.append(vector);
        self.observed += 1;

        if self.window.size() < self.warmup_points {
            return Ok(Assessment::WARMUP);
        }

        let retrained = self.model.is_none() || self.observed % self.retrain_interval == 0;
        if retrained {
            self.retrain()?;
        }

        let score = match self.score(&vector) {
            Some(score) => score,
            None => return Ok(Assessment::WARMUP),
        };
        Ok(Assessment {
            score: Some(score),
            is_anomaly: score < self.threshold,
            retrained,
        })
    }

    /// Score against the current model without touching the window.
    pub fn score(&self, vector: &FeatureVector) -> Option<f64> {
        self.model.as_ref().map(|m| m.decision_function(vector))
    }

    fn retrain(&mut self) -> Result<(), DetectError> {
        let snapshot = self.window.snapshot();
        let model = IsolationForest::fit(&snapshot, &self.params)?;
        debug!(
            observed = self.observed,
            window = snapshot.len(),
            trees = model.n_trees(),
            subsample = model.subsample_size(),
            offset = model.offset(),
            "retrained isolation forest"
        );
        self.model = Some(model);
        self.retrains += 1;
        Ok(())
    }

    pub fn window(&self) -> &FeatureWindow {
        &self.window
    }

    pub fn is_trained(&self) -> bool {
        self.model.is_some()
    }

    /// Vectors seen since this detector was created.
    pub fn observed(&self) -> u64 {
        self.observed
    }

    pub fn retrain_count(&self) -> u64 {
        self.retrains
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }
}
