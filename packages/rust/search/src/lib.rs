//! Knowledge-base access for Brain.
//!
//! - [`FileSearcher`]: concurrent per-term search, merged into a ranked list
//! - [`ContentLoader`]: rank-preserving file reads

pub mod loader;
pub mod searcher;

pub use loader::{ContentLoader, LoadOutcome};
pub use searcher::{FileSearcher, SearchOutcome, TermFailure};
