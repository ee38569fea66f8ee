//! Bounded record of recent attempts, used to tune the confidence threshold
//! while one file is processed.

use std::collections::VecDeque;
use std::sync::Mutex;

use serde::Serialize;

/// Records kept per file.
pub const HISTORY_CAPACITY: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AttemptRecord {
    pub batch_index: usize,
    pub attempt: u32,
    /// Observed confidence; `None` when the attempt failed before parsing.
    pub confidence: Option<f64>,
    pub temperature: f64,
    pub success: bool,
}

/// Thread-safe ring buffer of [`AttemptRecord`]s.
#[derive(Debug)]
pub struct AttemptHistory {
    records: Mutex<VecDeque<AttemptRecord>>,
    capacity: usize,
}

impl Default for AttemptHistory {
    fn default() -> Self {
        Self::with_capacity(HISTORY_CAPACITY)
    }
}

impl AttemptHistory {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn record(&self, record: AttemptRecord) {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        if records.len() == self.capacity {
            records.pop_front();
        }
        records.push_back(record);
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Observed confidences, oldest first.
    pub fn confidences(&self) -> Vec<f64> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter_map(|r| r.confidence)
            .collect()
    }

    /// Mean of the observed confidences, if there are at least `min_samples`.
    pub fn mean_confidence(&self, min_samples: usize) -> Option<f64> {
        let confidences = self.confidences();
        if confidences.is_empty() || confidences.len() < min_samples {
            return None;
        }
        Some(confidences.iter().sum::<f64>() / confidences.len() as f64)
    }

    pub fn snapshot(&self) -> Vec<AttemptRecord> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .copied()
            .collect()
    }
}
