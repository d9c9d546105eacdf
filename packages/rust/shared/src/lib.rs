//! Shared types, error model, and configuration for Brain.
//!
//! This crate is the foundation depended on by all other Brain crates.
//! It provides:
//! - [`BrainError`]: the unified error type
//! - Domain types ([`Query`], [`KeywordSet`], [`RankedFileList`], [`AssembledContext`])
//! - Configuration ([`AppConfig`], [`SearchOptions`], config loading)
//! - The caller-facing result object ([`PipelineOutput`])

pub mod config;
pub mod error;
pub mod output;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, KnowledgeConfig, OllamaConfig, PipelineConfig, SearchConfig, SearchOptions,
    config_dir, config_file_path, expand_home, init_config, load_config, load_config_from,
};
pub use error::{BrainError, ErrorKind, InferenceFailure, Result};
pub use output::{MatchedFile, OutputStatus, PipelineOutput};
pub use types::{
    AssembledContext, ContextEntry, FileContent, FileMatch, KeywordSet, Mode, PipelineResult,
    Query, RankedFileList,
};
