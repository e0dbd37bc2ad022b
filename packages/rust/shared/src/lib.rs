//! Shared types, error model, and configuration for Debrief.
//!
//! This crate is the foundation depended on by all other Debrief crates.
//! It provides:
//! - [`DebriefError`]: the unified error type
//! - Domain types ([`Headline`], [`Briefing`], [`RunId`], [`RunRecord`])
//! - Configuration ([`AppConfig`], config loading, API key validation)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, ArticleFormat, AtlasConfig, CacheConfig, DefaultsConfig, LlmConfig, ScrapeConfig,
    config_dir, config_file_path, init_config, load_config, load_config_from, resolve_api_key,
    validate_api_keys,
};
pub use error::{DebriefError, Result};
pub use types::{Briefing, Headline, RunId, RunRecord, RunStatus};
