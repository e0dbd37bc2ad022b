//! Core pipeline orchestration for Debrief.
//!
//! This crate ties together map sampling, relevance filtering, article
//! scraping, and summarization into one end-to-end run (`run_briefing`).

pub mod cache;
pub mod checkpoint;
pub mod fanout;
pub mod pipeline;
pub mod source;

pub use pipeline::{
    BriefingConfig, PipelineDeps, ProgressReporter, SilentProgress, run_briefing,
};
pub use source::{AtlasSource, HeadlineSource, StaticSource};
