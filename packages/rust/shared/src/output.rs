//! Caller-facing result object, one per pipeline invocation.
//!
//! This is the JSON shape consumed by the CLI `--format json` output and by
//! editor integrations that shell out to `brain ask`.

use serde::{Deserialize, Serialize};

use crate::error::{BrainError, ErrorKind};
use crate::types::{Mode, RankedFileList};

/// Overall outcome of an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputStatus {
    /// The requested mode ran to its accepting stage without warnings.
    Complete,
    /// The requested mode finished but some input was skipped or cut.
    Partial,
    /// The pipeline stopped at an error.
    Failed,
}

/// A ranked file as shown to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedFile {
    pub path: String,
    pub score: usize,
}

impl MatchedFile {
    pub fn from_ranked(files: &RankedFileList) -> Vec<Self> {
        files
            .iter()
            .map(|m| Self {
                path: m.path.to_string_lossy().into_owned(),
                score: m.score,
            })
            .collect()
    }
}

/// The externally visible outcome of one invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineOutput {
    pub mode: Mode,
    pub status: OutputStatus,
    pub keywords: Option<Vec<String>>,
    pub matched_files: Option<Vec<MatchedFile>>,
    pub answer: Option<String>,
    pub cited_files: Option<Vec<String>>,
    pub error_kind: Option<ErrorKind>,
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl PipelineOutput {
    /// A failed invocation that stopped before any stage ran.
    pub fn failed(mode: Mode, err: &BrainError) -> Self {
        Self {
            mode,
            status: OutputStatus::Failed,
            keywords: None,
            matched_files: None,
            answer: None,
            cited_files: None,
            error_kind: Some(err.kind()),
            error_message: Some(err.to_string()),
            warnings: Vec::new(),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == OutputStatus::Failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_fields_serialize_explicitly() {
        let output = PipelineOutput {
            mode: Mode::ExtractOnly,
            status: OutputStatus::Complete,
            keywords: Some(vec!["rust".into(), "ownership".into()]),
            matched_files: None,
            answer: None,
            cited_files: None,
            error_kind: None,
            error_message: None,
            warnings: Vec::new(),
        };

        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["mode"], "extract-only");
        assert_eq!(json["status"], "complete");
        assert_eq!(json["keywords"][1], "ownership");
        assert!(json["matched_files"].is_null());
        assert!(json["answer"].is_null());
        assert!(json.get("warnings").is_none());
    }

    #[test]
    fn error_kind_serializes_snake_case() {
        let output = PipelineOutput {
            mode: Mode::GenerateResponse,
            status: OutputStatus::Failed,
            keywords: None,
            matched_files: None,
            answer: None,
            cited_files: None,
            error_kind: Some(ErrorKind::ContentLoad),
            error_message: Some("no file could be read".into()),
            warnings: vec!["skipped /kb/gone.org".into()],
        };

        let json = serde_json::to_string(&output).unwrap();
        assert!(json.contains(r#""error_kind":"content_load""#));
        assert!(json.contains(r#""warnings":["skipped /kb/gone.org"]"#));
        assert!(output.is_failed());
    }

    #[test]
    fn failed_carries_error_classification() {
        let err = BrainError::config("ollama.model must not be empty");
        let output = PipelineOutput::failed(Mode::SearchOnly, &err);
        assert_eq!(output.error_kind, Some(ErrorKind::Config));
        assert!(output.error_message.unwrap().contains("ollama.model"));
        assert!(output.keywords.is_none());
    }
}
