//! Core domain types for the Brain query pipeline.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{BrainError, ErrorKind, Result};

// ---------------------------------------------------------------------------
// Query
// ---------------------------------------------------------------------------

/// A non-empty natural-language question. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Query(String);

impl Query {
    /// Create a query, rejecting empty or whitespace-only text.
    pub fn new(text: impl Into<String>) -> Result<Self> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(BrainError::validation("query must not be empty"));
        }
        Ok(Self(text))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// KeywordSet
// ---------------------------------------------------------------------------

/// Ordered, duplicate-free list of trimmed, non-empty search terms.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct KeywordSet(Vec<String>);

impl KeywordSet {
    /// Normalize raw terms: trim, drop empties, drop repeats (first one wins).
    pub fn from_terms<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let terms = terms
            .into_iter()
            .map(|t| t.as_ref().trim().to_string())
            .filter(|t| !t.is_empty())
            .filter(|t| seen.insert(t.clone()))
            .collect();
        Self(terms)
    }

    /// Keep at most `max` terms.
    pub fn truncated(mut self, max: usize) -> Self {
        self.0.truncate(max);
        self
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }
}

// ---------------------------------------------------------------------------
// FileMatch / RankedFileList
// ---------------------------------------------------------------------------

/// One candidate file produced by search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileMatch {
    /// Path of the matching file.
    pub path: PathBuf,
    /// Number of distinct keyword terms found in the file.
    pub score: usize,
    /// The matching terms, in keyword order.
    pub matched_terms: Vec<String>,
    /// Total literal occurrences across all matching terms.
    pub occurrences: usize,
}

/// File matches sorted by descending score, ties by ascending path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RankedFileList(Vec<FileMatch>);

impl RankedFileList {
    /// Sort `matches` into rank order and keep the first `max_files`.
    pub fn from_matches(mut matches: Vec<FileMatch>, max_files: usize) -> Self {
        matches.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.path.cmp(&b.path)));
        matches.truncate(max_files);
        Self(matches)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FileMatch> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[FileMatch] {
        &self.0
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.0.iter().map(|m| m.path.as_path())
    }
}

impl<'a> IntoIterator for &'a RankedFileList {
    type Item = &'a FileMatch;
    type IntoIter = std::slice::Iter<'a, FileMatch>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

// ---------------------------------------------------------------------------
// FileContent / AssembledContext
// ---------------------------------------------------------------------------

/// The text of one loaded file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileContent {
    pub path: PathBuf,
    pub content: String,
    /// Length of `content` in characters.
    pub char_len: usize,
}

impl FileContent {
    pub fn new(path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            path: path.into(),
            char_len: content.chars().count(),
            content,
        }
    }
}

/// One entry of the assembled context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextEntry {
    pub path: PathBuf,
    pub content: String,
    /// Whether `content` is a prefix cut of the file.
    pub truncated: bool,
}

impl ContextEntry {
    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }
}

/// Rank-ordered file contents fitted into a character budget.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AssembledContext {
    pub entries: Vec<ContextEntry>,
    /// The budget the entries were fitted into.
    pub budget: usize,
}

impl AssembledContext {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_chars(&self) -> usize {
        self.entries.iter().map(ContextEntry::char_len).sum()
    }

    pub fn included_paths(&self) -> Vec<PathBuf> {
        self.entries.iter().map(|e| e.path.clone()).collect()
    }
}

// ---------------------------------------------------------------------------
// Mode
// ---------------------------------------------------------------------------

/// How far the pipeline runs before returning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    /// Stop after keyword extraction.
    ExtractOnly,
    /// Stop after file search.
    SearchOnly,
    /// Run the full pipeline.
    #[default]
    GenerateResponse,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExtractOnly => "extract-only",
            Self::SearchOnly => "search-only",
            Self::GenerateResponse => "generate-response",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = BrainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "extract-only" => Ok(Self::ExtractOnly),
            "search-only" => Ok(Self::SearchOnly),
            "generate-response" => Ok(Self::GenerateResponse),
            other => Err(BrainError::validation(format!(
                "unknown mode '{other}': expected extract-only, search-only, or generate-response"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// PipelineResult
// ---------------------------------------------------------------------------

/// Where a pipeline invocation ended. Exactly one variant per run.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineResult {
    Keywords(KeywordSet),
    FilePaths(RankedFileList),
    Answer {
        text: String,
        cited_files: Vec<PathBuf>,
    },
    Error {
        kind: ErrorKind,
        message: String,
    },
}

impl PipelineResult {
    pub fn from_error(err: &BrainError) -> Self {
        Self::Error {
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}
