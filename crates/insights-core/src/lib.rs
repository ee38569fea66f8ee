//! Comment Insights Core Library
//!
//! Batch sentiment, emotion, theme and pain-point analysis of customer
//! comments through a chat-completion model: ingestion, batch planning,
//! retry control, aggregation, domain mapping and reporting.

pub mod aggregator;
pub mod batcher;
pub mod cache;
pub mod client;
pub mod config;
pub mod domain;
pub mod fakes;
pub mod ingest;
pub mod mapper;
pub mod metrics;
pub mod obs;
pub mod parallel;
pub mod pipeline;
pub mod prompt;
pub mod report;
pub mod retry;
pub mod services;
pub mod telemetry;

pub use aggregator::{aggregate, dominant_trend};

pub use batcher::{split_into_batches, BatchPlan, ModelProfile};

pub use cache::{cache_key, CacheStats, ResponseCache};

pub use client::{ChatClient, ChatMessage, ChatRequest, ChatResponse, ClientError, OpenAiClient};

pub use config::{AnalysisConfig, ConfigError, ParallelConfig, RetryConfig};

pub use domain::{
    AggregatedResult, Batch, BatchResult, Comment, CommentAnalysis, CommentInsight,
    DomainAnalysis, Emotion, EmotionKind, FileAnalysis, ImpactLevel, InsightsError,
    MappingStats, PainPoint, PainPointKind, Result, Sentiment, SentimentCategory, Theme,
    ThemeCategory, TokenUsage, Urgency, ValidationError,
};

pub use ingest::{inspect_file, read_comments, FileInspection, IngestError, IngestedFile};

pub use mapper::{map_batch, map_comment};

pub use obs::AnalysisSpan;

pub use parallel::{run_bounded, TaskError};

pub use pipeline::{AnalysisPipeline, BatchOutcome};

pub use report::{render_summary_markdown, write_excel_report, write_json, ReportError};

pub use retry::{
    AttemptOutcome, RetryContext, RetryController, RetryDecision, RetryPolicy,
};

pub use services::Services;

pub use telemetry::init_tracing;
