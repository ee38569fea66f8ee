//! Comments read from a source file and the batches they are grouped into.

use serde::{Deserialize, Serialize};

/// A single customer comment plus the optional row-level ratings found next to it.
///
/// Immutable once read; batches receive their own copies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    /// 1-based data row in the source file (header excluded).
    pub row: usize,
    /// Trimmed comment text.
    pub text: String,
    /// Net Promoter Score, 0–10.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nps: Option<u8>,
    /// Satisfaction score, 0–100.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub satisfaction: Option<f64>,
}

impl Comment {
    pub fn new(row: usize, text: impl Into<String>) -> Self {
        Self {
            row,
            text: text.into(),
            nps: None,
            satisfaction: None,
        }
    }

    pub fn with_nps(mut self, nps: u8) -> Self {
        self.nps = Some(nps);
        self
    }

    pub fn with_satisfaction(mut self, score: f64) -> Self {
        self.satisfaction = Some(score);
        self
    }
}

/// An ordered, bounded slice of comments sent together in one AI request.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// Position of this batch in the plan (0-based).
    pub index: usize,
    /// Offset of the first comment in the original sequence.
    pub offset: usize,
    pub comments: Vec<Comment>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.comments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.comments.is_empty()
    }

    /// Comment texts in prompt order.
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.comments.iter().map(|c| c.text.as_str())
    }
}
