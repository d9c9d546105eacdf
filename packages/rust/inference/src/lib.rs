//! Language-model side of the Brain pipeline.
//!
//! This crate provides:
//! - [`InferenceClient`]: the "prompt in, text out" seam, with [`OllamaClient`]
//! - [`KeywordExtractor`]: query → [`KeywordSet`](brain_shared::KeywordSet)
//! - [`ResponseGenerator`]: query + assembled context → answer text

pub mod client;
pub mod keywords;
pub mod respond;

pub use client::{InferenceClient, OllamaClient};
pub use keywords::{DEFAULT_MAX_KEYWORDS, KeywordExtractor, parse_keywords};
pub use respond::ResponseGenerator;
