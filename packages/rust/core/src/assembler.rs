//! Context assembler.
//!
//! Fits rank-ordered file contents into a character budget. Whole files are
//! taken while they fit, the first file that does not fit is cut to the
//! remaining budget, and everything after it is dropped. Assembly never fails.

use tracing::{debug, instrument};

use brain_shared::{AssembledContext, ContextEntry, FileContent};

/// Budgeted context builder.
#[derive(Debug, Clone)]
pub struct ContextAssembler {
    /// Maximum combined characters across all entries.
    max_context_length: usize,
    /// Round a cut down to the last newline inside the kept prefix.
    line_boundary: bool,
}

impl ContextAssembler {
    pub fn new(max_context_length: usize) -> Self {
        Self {
            max_context_length,
            line_boundary: false,
        }
    }

    pub fn with_line_boundary(mut self, enabled: bool) -> Self {
        self.line_boundary = enabled;
        self
    }

    pub fn max_context_length(&self) -> usize {
        self.max_context_length
    }

    /// Assemble `contents` (already in rank order) into a context.
    #[instrument(skip_all, fields(files = contents.len(), budget = self.max_context_length))]
    pub fn assemble(&self, contents: &[FileContent]) -> AssembledContext {
        let mut remaining = self.max_context_length;
        let mut entries = Vec::new();

        for file in contents {
            if remaining == 0 {
                break;
            }

            if file.char_len <= remaining {
                remaining -= file.char_len;
                entries.push(ContextEntry {
                    path: file.path.clone(),
                    content: file.content.clone(),
                    truncated: false,
                });
                continue;
            }

            let cut = self.cut(&file.content, remaining);
            debug!(
                path = %file.path.display(),
                kept = cut.chars().count(),
                of = file.char_len,
                "truncated to fit budget"
            );
            entries.push(ContextEntry {
                path: file.path.clone(),
                content: cut.to_string(),
                truncated: true,
            });
            break;
        }

        let context = AssembledContext {
            entries,
            budget: self.max_context_length,
        };
        debug!(
            included = context.entries.len(),
            chars = context.total_chars(),
            "context assembled"
        );
        context
    }

    fn cut<'a>(&self, content: &'a str, budget: usize) -> &'a str {
        let prefix = char_prefix(content, budget);
        if !self.line_boundary {
            return prefix;
        }
        match prefix.rfind('\n') {
            Some(idx) => &prefix[..=idx],
            None => prefix,
        }
    }
}

/// The first `n` characters of `s`.
fn char_prefix(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
