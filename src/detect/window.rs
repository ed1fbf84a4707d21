//! Bounded rolling buffer of recent feature vectors.

use std::collections::VecDeque;

use crate::detect::FeatureVector;

/// Fixed-capacity FIFO of the most recent feature vectors, oldest first.
#[derive(Debug, Clone)]
pub struct FeatureWindow {
    capacity: usize,
    buf: VecDeque<FeatureVector>,
}

impl FeatureWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            buf: VecDeque::with_capacity(capacity),
        }
    }

    /// Push at the newest end, evicting the oldest vector when full.
    pub fn append(&mut self, vector: FeatureVector) {
        if self.buf.len() == self.capacity {
            self.buf.pop_front();
        }
        self.buf.push_back(vector);
    }

    pub fn size(&self) -> usize {
        self.buf.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Owned copy of the current contents for training.
    pub fn snapshot(&self) -> Vec<FeatureVector> {
        self.buf.iter().copied().collect()
    }

    pub fn mean(&self) -> Option<FeatureVector> {
        if self.buf.is_empty() {
            return None;
        }
        let n = self.buf.len() as f64;
        let mut sums = [0.0; crate::detect::FEATURE_COUNT];
        for v in &self.buf {
            for (sum, x) in sums.iter_mut().zip(v.as_array()) {
                *sum += x;
            }
        }
        FeatureVector::from_slice(&sums.map(|s| s / n)).ok()
    }
}
