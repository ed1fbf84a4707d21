//! Term-frequency x inverse-document-frequency weighting over one batch.

use std::collections::BTreeMap;

/// Dense, L2-normalized TF-IDF rows over an alphabetically sorted vocabulary.
#[derive(Debug, Clone)]
pub struct TfIdfMatrix {
    pub vocabulary: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

impl TfIdfMatrix {
    /// Weight tokenized documents. Uses smoothed idf,
    /// `ln((1 + n) / (1 + df)) + 1`, and raw counts for tf.
    pub fn fit_transform(docs: &[Vec<String>]) -> Self {
        let mut df: BTreeMap<&str, usize> = BTreeMap::new();
        for doc in docs {
            let mut seen: Vec<&str> = doc.iter().map(String::as_str).collect();
            seen.sort_unstable();
            seen.dedup();
            for term in seen {
                *df.entry(term).or_default() += 1;
            }
        }

        let index: BTreeMap<&str, usize> = df.keys().enumerate().map(|(i, t)| (*t, i)).collect();
        let n_docs = docs.len() as f64;
        let idf: Vec<f64> = df
            .values()
            .map(|&d| ((1.0 + n_docs) / (1.0 + d as f64)).ln() + 1.0)
            .collect();

        let rows = docs
            .iter()
            .map(|doc| {
                let mut row = vec![0.0; index.len()];
                for term in doc {
                    row[index[term.as_str()]] += 1.0;
                }
                for (w, idf) in row.iter_mut().zip(&idf) {
                    *w *= idf;
                }
                let norm = row.iter().map(|w| w * w).sum::<f64>().sqrt();
                if norm > 0.0 {
                    row.iter_mut().for_each(|w| *w /= norm);
                }
                row
            })
            .collect();

        Self {
            vocabulary: df.keys().map(|t| t.to_string()).collect(),
            rows,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.vocabulary.is_empty()
    }

    /// Number of pairwise-distinct rows.
    pub fn distinct_rows(&self) -> usize {
        let mut distinct: Vec<&Vec<f64>> = Vec::new();
        for row in &self.rows {
            if !distinct.contains(&row) {
                distinct.push(row);
            }
        }
        distinct.len()
    }
}
