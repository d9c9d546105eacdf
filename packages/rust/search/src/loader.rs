//! Reads ranked files into memory, in rank order.

use std::path::Path;

use tracing::{debug, instrument, warn};

use brain_shared::{BrainError, FileContent, RankedFileList, Result};

/// Loaded file contents plus a warning per file that could not be read.
#[derive(Debug, Clone, Default)]
pub struct LoadOutcome {
    pub contents: Vec<FileContent>,
    pub warnings: Vec<String>,
}

/// Sequential, rank-preserving file reader.
#[derive(Debug, Clone, Default)]
pub struct ContentLoader;

impl ContentLoader {
    pub fn new() -> Self {
        Self
    }

    /// Load every file in `files`, keeping rank order.
    pub async fn load(&self, files: &RankedFileList) -> Result<LoadOutcome> {
        self.load_paths(files.paths()).await
    }

    /// Load arbitrary paths in the given order.
    ///
    /// Unreadable files are skipped with a warning. Fails only when at least
    /// one path was given and none could be read.
    #[instrument(skip_all)]
    pub async fn load_paths<'a, I>(&self, paths: I) -> Result<LoadOutcome>
    where
        I: IntoIterator<Item = &'a Path>,
    {
        let mut outcome = LoadOutcome::default();
        let mut requested = 0usize;

        for path in paths {
            requested += 1;
            match tokio::fs::read(path).await {
                Ok(bytes) => {
                    let content = String::from_utf8_lossy(&bytes).into_owned();
                    debug!(path = %path.display(), bytes = bytes.len(), "loaded");
                    outcome.contents.push(FileContent::new(path, content));
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable file");
                    outcome
                        .warnings
                        .push(format!("could not read {}: {e}", path.display()));
                }
            }
        }

        if requested > 0 && outcome.contents.is_empty() {
            return Err(BrainError::ContentLoad(format!(
                "none of the {requested} matched files could be read"
            )));
        }

        Ok(outcome)
    }
}
