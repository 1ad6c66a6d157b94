//! cpseval - Creative Process Score evaluation of LLM-generated competition
//! math solutions.
//!
//! ## Architecture
//!
//! - **Client**: provider adapters behind the `LanguageModel` trait, with
//!   pacing and capacity retry per endpoint
//! - **Pool**: the judge ensemble, verdict aggregation and prompts
//! - **Checkpoint**: corpus loading and whole-file sample persistence
//! - **Scoring**: difficulty weight, rewrite detection, novelty, process
//!   quality and CPS
//!
//! ## Pipelines
//!
//! - **Generation**: Problems × k → model under evaluation → Samples
//! - **Evaluation**: Samples → correctness → coarse novelty → fine novelty,
//!   resumable from any checkpoint
//! - **Classification**: Problems → classifier model → category per problem

pub mod checkpoint;
pub mod client;
pub mod models;
pub mod pipeline;
pub mod pool;
pub mod scoring;

// Re-exports for convenience
pub use checkpoint::{CategoryStore, DatasetStore, JsonFileStore, load_or_seed, load_problems};
pub use client::{LLMClient, LanguageModel, ModelRegistry, RateLimiter};
pub use models::{Config, CpsEvalError, Decision, Problem, Result, Sample, ScoredResult, Stage};
pub use pipeline::{ClassificationPipeline, EvaluationPipeline, GenerationPipeline};
pub use pool::JudgePool;
pub use scoring::ScoringEngine;
