//! Log clustering used to explain a fired incident.
//!
//! A batch of recent log lines is tokenized, TF-IDF weighted and partitioned
//! with k-means. The largest cluster supplies the label (its heaviest centroid
//! terms) and the sample (its first member in batch order).

pub mod kmeans;
pub mod tfidf;
pub mod tokenize;

use serde::{Deserialize, Serialize};

use crate::config::ClusterConfig;
use crate::event::LogRecord;

use self::kmeans::KMeansParams;
use self::tfidf::TfIdfMatrix;
use self::tokenize::Tokenizer;

pub const INSUFFICIENT_LABEL: &str = "not enough logs for clustering";
pub const INSUFFICIENT_SAMPLE: &str = "insufficient log volume for clustering";
pub const UNIFORM_LABEL: &str = "log patterns are uniform";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryKind {
    Clustered,
    InsufficientVolume,
    Uniform,
}

/// Short explanation of what the recent logs are dominated by.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSummary {
    pub label: String,
    pub sample: String,
}

/// Stateless log summarizer; every call depends only on its input batch.
#[derive(Debug)]
pub struct LogClusterer {
    config: ClusterConfig,
    tokenizer: Tokenizer,
}

impl LogClusterer {
    pub fn new(config: ClusterConfig) -> Self {
        Self {
            config,
            tokenizer: Tokenizer::default(),
        }
    }

    pub fn summarize(&self, logs: &[LogRecord]) -> ClusterSummary {
        self.summarize_with_kind(logs).1
    }

    pub fn summarize_with_kind(&self, logs: &[LogRecord]) -> (SummaryKind, ClusterSummary) {
        if logs.len() < self.config.min_logs {
            return (
                SummaryKind::InsufficientVolume,
                ClusterSummary {
                    label: INSUFFICIENT_LABEL.to_string(),
                    sample: INSUFFICIENT_SAMPLE.to_string(),
                },
            );
        }

        let texts: Vec<&str> = logs.iter().map(|l| l.message.as_str()).collect();
        let uniform = || {
            (
                SummaryKind::Uniform,
                ClusterSummary {
                    label: UNIFORM_LABEL.to_string(),
                    sample: texts[0].to_string(),
                },
            )
        };

        let docs: Vec<Vec<String>> = texts.iter().map(|t| self.tokenizer.tokenize(t)).collect();
        let matrix = TfIdfMatrix::fit_transform(&docs);
        if matrix.is_empty() {
            return uniform();
        }

        // Identical vectors cannot be separated, so k is bounded by distinct rows.
        let k = self.config.max_clusters.min(matrix.distinct_rows());
        if k <= 1 {
            return uniform();
        }

        let fit = kmeans::fit(
            &matrix.rows,
            &KMeansParams {
                k,
                n_init: self.config.n_init,
                max_iter: self.config.max_iter,
                seed: self.config.seed,
            },
        );

        let sizes = fit.cluster_sizes();
        let mut top = 0;
        for (j, &size) in sizes.iter().enumerate() {
            if size > sizes[top] {
                top = j;
            }
        }

        let centroid = &fit.centroids[top];
        let mut ranked: Vec<usize> = (0..centroid.len()).filter(|&i| centroid[i] > 0.0).collect();
        ranked.sort_by(|&a, &b| centroid[b].total_cmp(&centroid[a]).then(a.cmp(&b)));
        let label = ranked
            .iter()
            .take(self.config.label_terms)
            .map(|&i| matrix.vocabulary[i].as_str())
            .collect::<Vec<_>>()
            .join(", ");

        let sample = fit
            .labels
            .iter()
            .position(|&l| l == top)
            .map_or(texts[0], |i| texts[i])
            .to_string();

        (SummaryKind::Clustered, ClusterSummary { label, sample })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::LogLevel;
    use chrono::Utc;

    fn batch(messages: &[&str]) -> Vec<LogRecord> {
        messages
            .iter()
            .map(|m| LogRecord {
                ts: Utc::now(),
                level: LogLevel::Info,
                message: m.to_string(),
                scenario: "normal".into(),
            })
            .collect()
    }

    fn clusterer() -> LogClusterer {
        LogClusterer::new(ClusterConfig::default())
    }

    #[test]
    fn test_four_logs_is_insufficient() {
        let logs = batch(&["a one", "b two", "c three", "d four"]);
        let (kind, summary) = clusterer().summarize_with_kind(&logs);
        assert_eq!(kind, SummaryKind::InsufficientVolume);
        assert_eq!(summary.label, INSUFFICIENT_LABEL);
        assert_eq!(summary.sample, INSUFFICIENT_SAMPLE);
    }

    #[test]
    fn test_identical_logs_are_uniform() {
        let logs = batch(&["connection pool exhausted"; 6]);
        let (kind, summary) = clusterer().summarize_with_kind(&logs);
        assert_eq!(kind, SummaryKind::Uniform);
        assert_eq!(summary.label, UNIFORM_LABEL);
        assert_eq!(summary.sample, "connection pool exhausted");
    }

    #[test]
    fn test_stop_word_only_logs_are_uniform() {
        let logs = batch(&["it is", "we were", "they are", "I am", "you are"]);
        let (kind, summary) = clusterer().summarize_with_kind(&logs);
        assert_eq!(kind, SummaryKind::Uniform);
        assert_eq!(summary.sample, "it is");
    }

    #[test]
    fn test_dominant_family_wins() {
        let logs = batch(&[
            "session validated",
            "db timeout on checkout",
            "api response sent",
            "db timeout on checkout",
            "db timeout on checkout",
            "db timeout on checkout",
            "session validated",
            "db timeout on checkout",
        ]);
        let (kind, summary) = clusterer().summarize_with_kind(&logs);
        assert_eq!(kind, SummaryKind::Clustered);
        assert_eq!(summary.sample, "db timeout on checkout");
        let terms: Vec<&str> = summary.label.split(", ").collect();
        assert_eq!(terms.len(), 3);
        for term in ["db", "timeout", "checkout"] {
            assert!(terms.contains(&term), "label was {}", summary.label);
        }
    }

    #[test]
    fn test_label_has_at_most_four_terms() {
        let logs = batch(&[
            "slow query detected orders table scan index",
            "slow query detected orders table scan index",
            "slow query detected orders table scan index",
            "cache hit",
            "session validated",
            "api response sent",
        ]);
        let summary = clusterer().summarize(&logs);
        assert_eq!(summary.label.split(", ").count(), 4);
        assert_eq!(summary.sample, "slow query detected orders table scan index");
    }

    #[test]
    fn test_is_repeatable() {
        let logs = batch(&[
            "request completed in time",
            "cache hit on product detail",
            "deadlock retry triggered",
            "connection pool exhausted",
            "session validated",
            "db timeout on checkout",
            "api response sent",
        ]);
        let c = clusterer();
        assert_eq!(c.summarize(&logs), c.summarize(&logs));
    }
}
