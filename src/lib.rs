// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod api;
pub mod config;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod schedule;
pub mod speech;

// Content acquisition: proxy fetching + feed/page extraction
pub mod ingest;

// LLM rewrite stage: prompt, providers, meta-commentary scrub
pub mod rewrite;

// ---- Re-exports for stable public API ----
pub use crate::api::router;
pub use crate::config::AppConfig;
pub use crate::error::PipelineError;
pub use crate::pipeline::{
    Delivery, GenerationPipeline, GenerationRecord, GenerationRequest, OutputRef,
};
pub use crate::schedule::{ScheduleController, ScheduleSpec};
