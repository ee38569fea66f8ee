//! Domain models for Comment Insights.
//!
//! - `Comment`, `Batch`: input side
//! - `BatchResult`, `CommentAnalysis`: raw model output per batch
//! - value objects (`Sentiment`, `Emotion`, `Theme`, `PainPoint`): validated per-comment analysis
//! - `AggregatedResult`, `FileAnalysis`: file-level output

pub mod aggregate;
pub mod analysis;
pub mod comment;
pub mod error;
pub mod value_objects;

pub use aggregate::{AggregatedResult, CommentInsight, FileAnalysis, MappingStats};
pub use analysis::{
    normalize_score, BatchResult, CommentAnalysis, NormalizedScore, RawEmotion, RawPainPoint,
    RawTheme, SentimentCategory, TokenUsage, Urgency,
};
pub use comment::{Batch, Comment};
pub use error::{InsightsError, Result, ValidationError};
pub use value_objects::{
    DomainAnalysis, Emotion, EmotionKind, ImpactLevel, PainPoint, PainPointKind, Sentiment, Theme,
    ThemeCategory, CRITICAL_SEVERITY, MODERATE_SEVERITY,
};
