//! Core pipeline orchestration for Brain.
//!
//! This crate ties together keyword extraction, knowledge-base search, context
//! assembly, and answer generation behind the [`Brain`] capability interface.

pub mod assembler;
pub mod pipeline;

pub use assembler::ContextAssembler;
pub use pipeline::{
    Brain, PipelineReport, PipelineState, ProgressReporter, RetryPolicy, SilentProgress,
};
