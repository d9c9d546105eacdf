//! Concurrent keyword search over the knowledge-base tree.
//!
//! Every term gets its own search task that walks the root and counts literal
//! occurrences per file. Tasks run on the blocking pool, at most
//! `parallelism` at a time. Results are merged by path after all tasks are
//! joined, so completion order never affects the ranking.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use regex::{Regex, RegexBuilder};
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};
use walkdir::{DirEntry, WalkDir};

use brain_shared::{BrainError, FileMatch, KeywordSet, RankedFileList, Result, SearchOptions};

/// Terms longer than this are rejected instead of searched.
const MAX_TERM_CHARS: usize = 256;

// ---------------------------------------------------------------------------
// Outcome types
// ---------------------------------------------------------------------------

/// A per-term search that failed while others succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermFailure {
    pub term: String,
    pub reason: String,
}

/// Ranked files plus the per-term failures that were tolerated.
#[derive(Debug, Clone, Default)]
pub struct SearchOutcome {
    pub files: RankedFileList,
    pub failures: Vec<TermFailure>,
}

impl SearchOutcome {
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Files containing one term, with occurrence counts.
#[derive(Debug)]
struct TermHits {
    term: String,
    files: Vec<(PathBuf, usize)>,
}

// ---------------------------------------------------------------------------
// FileSearcher
// ---------------------------------------------------------------------------

/// Keyword search over a read-only directory tree.
#[derive(Debug, Clone)]
pub struct FileSearcher {
    options: SearchOptions,
}

impl FileSearcher {
    pub fn new(options: SearchOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &SearchOptions {
        &self.options
    }

    /// Search `root` for every keyword and rank the matching files.
    ///
    /// Fails if `root` is not a readable directory, or if every per-term
    /// search fails. An empty keyword set yields an empty list.
    #[instrument(skip_all, fields(root = %root.display(), terms = keywords.len()))]
    pub async fn search(&self, keywords: &KeywordSet, root: &Path) -> Result<SearchOutcome> {
        check_root(root).await?;

        if keywords.is_empty() {
            debug!("no keywords, skipping search");
            return Ok(SearchOutcome::default());
        }

        let parallelism = self.options.parallelism.max(1);
        let case_sensitive = self.options.case_sensitive;
        let extensions = self.options.extensions.clone();
        let walk_root = root.to_path_buf();

        info!(parallelism, case_sensitive, "starting search");

        let (hits, failures) = run_terms(keywords, parallelism, move |term| {
            search_term(&walk_root, term, case_sensitive, &extensions)
        })
        .await;

        if hits.is_empty() {
            let detail = failures
                .iter()
                .map(|f| format!("{}: {}", f.term, f.reason))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(BrainError::Search(format!(
                "every keyword search failed ({detail})"
            )));
        }

        let files = aggregate(keywords, hits, self.options.max_files);

        info!(
            matched = files.len(),
            failed_terms = failures.len(),
            "search complete"
        );

        Ok(SearchOutcome { files, failures })
    }
}

/// Run `per_term` for every keyword on the blocking pool, at most
/// `parallelism` at a time, and split the results into hits and failures.
async fn run_terms<F>(
    keywords: &KeywordSet,
    parallelism: usize,
    per_term: F,
) -> (Vec<TermHits>, Vec<TermFailure>)
where
    F: Fn(String) -> Result<TermHits> + Send + Sync + 'static,
{
    let semaphore = Arc::new(Semaphore::new(parallelism));
    let per_term = Arc::new(per_term);

    let mut handles = Vec::with_capacity(keywords.len());
    for term in keywords.iter() {
        let term = term.to_string();
        let sem = semaphore.clone();
        let per_term = per_term.clone();
        let task_term = term.clone();

        handles.push((
            term,
            tokio::spawn(async move {
                let _permit = sem
                    .acquire_owned()
                    .await
                    .map_err(|e| BrainError::Search(format!("search pool closed: {e}")))?;

                tokio::task::spawn_blocking(move || per_term(task_term))
                    .await
                    .map_err(|e| BrainError::Search(format!("search task failed: {e}")))?
            }),
        ));
    }

    let mut hits = Vec::with_capacity(handles.len());
    let mut failures = Vec::new();
    for (term, handle) in handles {
        let reason = match handle.await {
            Ok(Ok(term_hits)) => {
                debug!(term = %term_hits.term, files = term_hits.files.len(), "term searched");
                hits.push(term_hits);
                continue;
            }
            Ok(Err(e)) => e.to_string(),
            Err(e) => format!("search task panicked: {e}"),
        };
        warn!(%term, %reason, "term search failed");
        failures.push(TermFailure { term, reason });
    }

    (hits, failures)
}

/// The root must exist, be a directory, and be listable.
async fn check_root(root: &Path) -> Result<()> {
    let metadata = tokio::fs::metadata(root).await.map_err(|e| {
        let reason = if e.kind() == std::io::ErrorKind::NotFound {
            "does not exist".to_string()
        } else {
            format!("is not accessible ({e})")
        };
        BrainError::Search(format!("knowledge base path {reason}: {}", root.display()))
    })?;
    if !metadata.is_dir() {
        return Err(BrainError::Search(format!(
            "knowledge base path is not a directory: {}",
            root.display()
        )));
    }
    tokio::fs::read_dir(root).await.map_err(|e| {
        BrainError::Search(format!(
            "knowledge base path is not readable: {}: {e}",
            root.display()
        ))
    })?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Per-term search
// ---------------------------------------------------------------------------

fn term_pattern(term: &str, case_sensitive: bool) -> Result<Regex> {
    if term.chars().count() > MAX_TERM_CHARS {
        return Err(BrainError::Search(format!(
            "term longer than {MAX_TERM_CHARS} characters"
        )));
    }
    RegexBuilder::new(&regex::escape(term))
        .case_insensitive(!case_sensitive)
        .build()
        .map_err(|e| BrainError::Search(format!("invalid pattern for '{term}': {e}")))
}

/// Walk `root` and count literal occurrences of `term` in each file.
fn search_term(
    root: &Path,
    term: String,
    case_sensitive: bool,
    extensions: &[String],
) -> Result<TermHits> {
    let pattern = term_pattern(&term, case_sensitive)?;
    let mut files = Vec::new();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => {
                return Err(BrainError::Search(format!("cannot walk {}: {e}", root.display())));
            }
            Err(e) => {
                debug!(error = %e, "skipping unreadable entry");
                continue;
            }
        };

        if !entry.file_type().is_file() || !extension_allowed(entry.path(), extensions) {
            continue;
        }

        // Binary or unreadable files are not candidates.
        let Ok(content) = std::fs::read_to_string(entry.path()) else {
            continue;
        };

        let count = pattern.find_iter(&content).count();
        if count > 0 {
            files.push((entry.into_path(), count));
        }
    }

    Ok(TermHits { term, files })
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .is_some_and(|name| name.starts_with('.'))
}

fn extension_allowed(path: &Path, extensions: &[String]) -> bool {
    if extensions.is_empty() {
        return true;
    }
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(ext)))
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Accumulator {
    terms: HashSet<String>,
    occurrences: usize,
}

/// Merge per-term hits by path. Commutative: input order does not matter.
fn aggregate(keywords: &KeywordSet, hits: Vec<TermHits>, max_files: usize) -> RankedFileList {
    let mut by_path: HashMap<PathBuf, Accumulator> = HashMap::new();

    for term_hits in hits {
        for (path, count) in term_hits.files {
            let acc = by_path.entry(path).or_default();
            acc.terms.insert(term_hits.term.clone());
            acc.occurrences += count;
        }
    }

    let matches = by_path
        .into_iter()
        .map(|(path, acc)| FileMatch {
            score: acc.terms.len(),
            matched_terms: keywords
                .iter()
                .filter(|k| acc.terms.contains(*k))
                .map(String::from)
                .collect(),
            occurrences: acc.occurrences,
            path,
        })
        .collect();

    RankedFileList::from_matches(matches, max_files)
}
