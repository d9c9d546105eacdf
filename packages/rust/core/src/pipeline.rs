//! Query pipeline: query → keywords → ranked files → contents → context → answer.
//!
//! [`Brain`] exposes each stage on its own and drives them through an explicit
//! state machine in [`Brain::run`]. Every mode has one accepting state and the
//! controller stops there, so stages past the cutoff never run.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, instrument, warn};

use brain_inference::{InferenceClient, KeywordExtractor, OllamaClient, ResponseGenerator};
use brain_search::{ContentLoader, FileSearcher, LoadOutcome, SearchOutcome};
use brain_shared::{
    AppConfig, AssembledContext, BrainError, FileContent, KeywordSet, MatchedFile, Mode,
    OutputStatus, PipelineOutput, PipelineResult, Query, RankedFileList, Result, SearchOptions,
};

use crate::assembler::ContextAssembler;

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// Controller state. Variants are declared in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PipelineState {
    Start,
    KeywordsExtracted,
    FilesFound,
    ContentLoaded,
    ContextAssembled,
    Answered,
    /// Terminal failure state.
    Error,
}

impl PipelineState {
    /// The state at which `mode` stops.
    pub fn accepting(mode: Mode) -> Self {
        match mode {
            Mode::ExtractOnly => Self::KeywordsExtracted,
            Mode::SearchOnly => Self::FilesFound,
            Mode::GenerateResponse => Self::Answered,
        }
    }

    /// Progress label for the transition out of this state.
    fn phase_label(self) -> &'static str {
        match self {
            Self::Start => "Extracting keywords",
            Self::KeywordsExtracted => "Searching knowledge base",
            Self::FilesFound => "Loading files",
            Self::ContentLoaded => "Assembling context",
            Self::ContextAssembled => "Generating answer",
            Self::Answered | Self::Error => "Done",
        }
    }
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called before each state transition.
    fn phase(&self, name: &str);
    /// Called when the run ends, successfully or not.
    fn done(&self, report: &PipelineReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn done(&self, _report: &PipelineReport) {}
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// Everything one run produced, including the results of stages that ran
/// before a failure.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub mode: Mode,
    /// The accepting state on success, [`PipelineState::Error`] otherwise.
    pub final_state: PipelineState,
    pub result: PipelineResult,
    pub keywords: Option<KeywordSet>,
    pub matched_files: Option<RankedFileList>,
    pub warnings: Vec<String>,
    pub elapsed: Duration,
}

impl PipelineReport {
    pub fn status(&self) -> OutputStatus {
        if self.result.is_error() {
            OutputStatus::Failed
        } else if self.warnings.is_empty() {
            OutputStatus::Complete
        } else {
            OutputStatus::Partial
        }
    }

    /// The caller-facing JSON shape.
    pub fn to_output(&self) -> PipelineOutput {
        let (answer, cited_files) = match &self.result {
            PipelineResult::Answer { text, cited_files } => (
                Some(text.clone()),
                Some(
                    cited_files
                        .iter()
                        .map(|p| p.to_string_lossy().into_owned())
                        .collect(),
                ),
            ),
            _ => (None, None),
        };
        let (error_kind, error_message) = match &self.result {
            PipelineResult::Error { kind, message } => (Some(*kind), Some(message.clone())),
            _ => (None, None),
        };

        PipelineOutput {
            mode: self.mode,
            status: self.status(),
            keywords: self.keywords.as_ref().map(|k| k.as_slice().to_vec()),
            matched_files: self.matched_files.as_ref().map(MatchedFile::from_ranked),
            answer,
            cited_files,
            error_kind,
            error_message,
            warnings: self.warnings.clone(),
        }
    }
}

/// Intermediate values accumulated while the controller advances.
#[derive(Default)]
struct RunData {
    keywords: Option<KeywordSet>,
    files: Option<RankedFileList>,
    contents: Vec<FileContent>,
    context: AssembledContext,
    answer: Option<String>,
    warnings: Vec<String>,
}

// ---------------------------------------------------------------------------
// Retry
// ---------------------------------------------------------------------------

/// Controller-level retry for inference stages.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryPolicy {
    /// Extra attempts after the first.
    pub retries: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    /// Run `operation`, retrying transient inference failures only.
    async fn run<T, F, Fut>(&self, stage: &str, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        info!(stage, attempt, "succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) if e.is_transient() && attempt < self.retries => {
                    attempt += 1;
                    warn!(
                        stage,
                        attempt,
                        max_attempts = self.retries + 1,
                        error = %e,
                        "transient inference failure, retrying"
                    );
                    tokio::time::sleep(self.backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Brain
// ---------------------------------------------------------------------------

/// The pipeline components wired to one knowledge base and one model.
pub struct Brain {
    client: Arc<dyn InferenceClient>,
    extractor: KeywordExtractor,
    searcher: FileSearcher,
    loader: ContentLoader,
    assembler: ContextAssembler,
    generator: ResponseGenerator,
    root: PathBuf,
    retry: RetryPolicy,
}

impl Brain {
    /// Build against the configured Ollama service.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let client = OllamaClient::new(&config.ollama)?;
        Self::new(Arc::new(client), config)
    }

    /// Build with an explicit inference client.
    ///
    /// The knowledge root is not checked here; a missing root surfaces as a
    /// search error only when a run reaches the search stage.
    pub fn new(client: Arc<dyn InferenceClient>, config: &AppConfig) -> Result<Self> {
        Ok(Self {
            client,
            extractor: KeywordExtractor::new(config.pipeline.max_keywords),
            searcher: FileSearcher::new(SearchOptions::from(config)),
            loader: ContentLoader::new(),
            assembler: ContextAssembler::new(config.ollama.max_context_length)
                .with_line_boundary(config.pipeline.truncate_at_line_boundary),
            generator: ResponseGenerator::new(),
            root: config.knowledge_root()?,
            retry: RetryPolicy {
                retries: config.pipeline.inference_retries,
                backoff: Duration::from_millis(config.pipeline.retry_backoff_ms),
            },
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    // --- Individual capabilities ---

    pub async fn extract_keywords(&self, query: &Query) -> Result<KeywordSet> {
        self.retry
            .run("keyword extraction", || {
                self.extractor.extract(self.client.as_ref(), query)
            })
            .await
    }

    pub async fn search_files(&self, keywords: &KeywordSet) -> Result<SearchOutcome> {
        self.searcher.search(keywords, &self.root).await
    }

    pub async fn load_content(&self, files: &RankedFileList) -> Result<LoadOutcome> {
        self.loader.load(files).await
    }

    pub async fn load_paths<'a, I>(&self, paths: I) -> Result<LoadOutcome>
    where
        I: IntoIterator<Item = &'a Path>,
    {
        self.loader.load_paths(paths).await
    }

    pub fn assemble_context(&self, contents: &[FileContent]) -> AssembledContext {
        self.assembler.assemble(contents)
    }

    pub async fn generate_response(
        &self,
        query: &Query,
        context: &AssembledContext,
    ) -> Result<String> {
        self.retry
            .run("response generation", || {
                self.generator.generate(self.client.as_ref(), query, context)
            })
            .await
    }

    // --- Controller ---

    /// Run the pipeline up to the accepting state of `mode`.
    pub async fn run(&self, query: &Query, mode: Mode) -> PipelineReport {
        self.run_with_progress(query, mode, &SilentProgress).await
    }

    /// [`Brain::run`] with progress notifications on every transition.
    #[instrument(skip_all, fields(mode = %mode, model = %self.client.model()))]
    pub async fn run_with_progress(
        &self,
        query: &Query,
        mode: Mode,
        progress: &dyn ProgressReporter,
    ) -> PipelineReport {
        let start = Instant::now();
        let accepting = PipelineState::accepting(mode);
        let mut data = RunData::default();
        let mut state = PipelineState::Start;

        info!(root = %self.root.display(), "starting pipeline");

        let result = loop {
            if state >= accepting {
                break self.accepted_result(mode, &mut data);
            }

            progress.phase(state.phase_label());
            match self.advance(state, query, &mut data).await {
                Ok(next) => {
                    debug!(from = ?state, to = ?next, "transition");
                    state = next;
                }
                Err(e) => {
                    error!(at = ?state, error = %e, "pipeline failed");
                    state = PipelineState::Error;
                    break PipelineResult::from_error(&e);
                }
            }
        };

        let report = PipelineReport {
            mode,
            final_state: state,
            result,
            keywords: data.keywords,
            matched_files: data.files,
            warnings: data.warnings,
            elapsed: start.elapsed(),
        };

        progress.done(&report);

        info!(
            final_state = ?report.final_state,
            status = ?report.status(),
            elapsed_ms = report.elapsed.as_millis(),
            "pipeline finished"
        );

        report
    }

    /// Perform exactly one transition out of `state`.
    async fn advance(
        &self,
        state: PipelineState,
        query: &Query,
        data: &mut RunData,
    ) -> Result<PipelineState> {
        match state {
            // --- Phase 1: Keywords ---
            PipelineState::Start => {
                data.keywords = Some(self.extract_keywords(query).await?);
                Ok(PipelineState::KeywordsExtracted)
            }

            // --- Phase 2: Search ---
            PipelineState::KeywordsExtracted => {
                let keywords = data.keywords.clone().unwrap_or_default();
                if keywords.is_empty() {
                    debug!("no keywords extracted, search skipped");
                    data.warnings
                        .push("no keywords could be extracted from the query".to_string());
                    data.files = Some(RankedFileList::default());
                } else {
                    let outcome = self.search_files(&keywords).await?;
                    data.warnings.extend(
                        outcome
                            .failures
                            .iter()
                            .map(|f| format!("search for '{}' failed: {}", f.term, f.reason)),
                    );
                    data.files = Some(outcome.files);
                }
                Ok(PipelineState::FilesFound)
            }

            // --- Phase 3: Load ---
            PipelineState::FilesFound => {
                let files = data.files.clone().unwrap_or_default();
                let outcome = self.load_content(&files).await?;
                data.warnings.extend(outcome.warnings);
                data.contents = outcome.contents;
                Ok(PipelineState::ContentLoaded)
            }

            // --- Phase 4: Assemble ---
            PipelineState::ContentLoaded => {
                let context = self.assemble_context(&data.contents);
                let dropped = data.contents.len() - context.entries.len();
                if let Some(cut) = context.entries.iter().find(|e| e.truncated) {
                    data.warnings.push(format!(
                        "context budget of {} characters reached: {} truncated, {dropped} file(s) left out",
                        context.budget,
                        cut.path.display()
                    ));
                } else if dropped > 0 {
                    data.warnings.push(format!(
                        "context budget of {} characters reached: {dropped} file(s) left out",
                        context.budget
                    ));
                }
                data.context = context;
                Ok(PipelineState::ContextAssembled)
            }

            // --- Phase 5: Answer ---
            PipelineState::ContextAssembled => {
                data.answer = Some(self.generate_response(query, &data.context).await?);
                Ok(PipelineState::Answered)
            }

            PipelineState::Answered | PipelineState::Error => Err(BrainError::validation(
                format!("no transition out of terminal state {state:?}"),
            )),
        }
    }

    fn accepted_result(&self, mode: Mode, data: &mut RunData) -> PipelineResult {
        match mode {
            Mode::ExtractOnly => PipelineResult::Keywords(data.keywords.clone().unwrap_or_default()),
            Mode::SearchOnly => PipelineResult::FilePaths(data.files.clone().unwrap_or_default()),
            Mode::GenerateResponse => PipelineResult::Answer {
                text: data.answer.take().unwrap_or_default(),
                cited_files: data.context.included_paths(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use brain_shared::{ErrorKind, InferenceFailure};

    /// Replies from a fixed script, one entry per call.
    struct ScriptedClient {
        replies: Mutex<VecDeque<std::result::Result<&'static str, InferenceFailure>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedClient {
        fn new(
            replies: impl IntoIterator<Item = std::result::Result<&'static str, InferenceFailure>>,
        ) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into_iter().collect()),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl InferenceClient for ScriptedClient {
        fn model(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            match self.replies.lock().unwrap().pop_front() {
                Some(Ok(text)) => Ok(text.to_string()),
                Some(Err(failure)) => Err(BrainError::inference(failure, "scripted failure")),
                None => Err(BrainError::inference(
                    InferenceFailure::Status,
                    "script exhausted",
                )),
            }
        }
    }

    /// Records phase names in order.
    #[derive(Default)]
    struct RecordingProgress {
        phases: Mutex<Vec<String>>,
        done: Mutex<bool>,
    }

    impl ProgressReporter for RecordingProgress {
        fn phase(&self, name: &str) {
            self.phases.lock().unwrap().push(name.to_string());
        }

        fn done(&self, _report: &PipelineReport) {
            *self.done.lock().unwrap() = true;
        }
    }

    fn knowledge_base() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("a.org"),
            "* Project\nThe project has three features.\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("b.org"), "Ideas for the next project.\n").unwrap();
        std::fs::write(dir.path().join("c.org"), "Grocery list: eggs, milk.\n").unwrap();
        dir
    }

    fn config_for(root: &Path) -> AppConfig {
        let mut config = AppConfig::default();
        config.knowledge.root_path = root.to_string_lossy().into_owned();
        config.pipeline.retry_backoff_ms = 0;
        config
    }

    fn brain(client: &Arc<ScriptedClient>, config: &AppConfig) -> Brain {
        Brain::new(client.clone(), config).unwrap()
    }

    fn query(text: &str) -> Query {
        Query::new(text).unwrap()
    }

    #[test]
    fn accepting_states_follow_mode() {
        assert_eq!(
            PipelineState::accepting(Mode::ExtractOnly),
            PipelineState::KeywordsExtracted
        );
        assert_eq!(PipelineState::accepting(Mode::SearchOnly), PipelineState::FilesFound);
        assert_eq!(
            PipelineState::accepting(Mode::GenerateResponse),
            PipelineState::Answered
        );
        assert!(PipelineState::KeywordsExtracted < PipelineState::FilesFound);
    }

    #[tokio::test]
    async fn extract_only_never_searches() {
        // A root that does not exist would fail any search.
        let dir = tempfile::tempdir().unwrap();
        let client = ScriptedClient::new([Ok("project\nfeatures")]);
        let progress = RecordingProgress::default();

        let report = brain(&client, &config_for(&dir.path().join("missing")))
            .run_with_progress(&query("What are the project features?"), Mode::ExtractOnly, &progress)
            .await;

        assert_eq!(report.final_state, PipelineState::KeywordsExtracted);
        match &report.result {
            PipelineResult::Keywords(k) => assert_eq!(k.as_slice(), ["project", "features"]),
            other => panic!("expected keywords, got {other:?}"),
        }
        assert!(report.matched_files.is_none());
        assert_eq!(client.calls(), 1);
        assert_eq!(*progress.phases.lock().unwrap(), ["Extracting keywords"]);
        assert!(*progress.done.lock().unwrap());

        let output = report.to_output();
        assert_eq!(output.status, OutputStatus::Complete);
        assert!(output.matched_files.is_none());
        assert!(output.answer.is_none());
    }

    #[tokio::test]
    async fn search_only_ranks_and_stops() {
        let kb = knowledge_base();
        let client = ScriptedClient::new([Ok("project\nfeatures")]);

        let report = brain(&client, &config_for(kb.path()))
            .run(&query("What are the project features?"), Mode::SearchOnly)
            .await;

        assert_eq!(report.final_state, PipelineState::FilesFound);
        let output = report.to_output();
        let files = output.matched_files.unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[0].path.ends_with("a.org"));
        assert_eq!(files[0].score, 2);
        assert!(files[1].path.ends_with("b.org"));
        assert!(output.answer.is_none());
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test]
    async fn generate_response_answers_with_citations() {
        let kb = knowledge_base();
        let client = ScriptedClient::new([Ok("project\nfeatures"), Ok("Three features.")]);

        let report = brain(&client, &config_for(kb.path()))
            .run(&query("What are the project features?"), Mode::GenerateResponse)
            .await;

        assert_eq!(report.final_state, PipelineState::Answered);
        let output = report.to_output();
        assert_eq!(output.status, OutputStatus::Complete);
        assert_eq!(output.answer.as_deref(), Some("Three features."));
        let cited = output.cited_files.unwrap();
        assert_eq!(cited.len(), 2);
        assert!(cited[0].ends_with("a.org"));

        let prompts = client.prompts.lock().unwrap();
        assert!(prompts[1].contains("The project has three features."));
    }

    #[tokio::test]
    async fn generation_failure_keeps_search_results() {
        let kb = knowledge_base();
        let client = ScriptedClient::new([Ok("project"), Err(InferenceFailure::Unreachable)]);

        let report = brain(&client, &config_for(kb.path()))
            .run(&query("What are the project features?"), Mode::GenerateResponse)
            .await;

        assert_eq!(report.final_state, PipelineState::Error);
        let output = report.to_output();
        assert_eq!(output.status, OutputStatus::Failed);
        assert_eq!(output.error_kind, Some(ErrorKind::Inference));
        assert!(output.error_message.is_some());
        assert_eq!(output.keywords.as_deref(), Some(&["project".to_string()][..]));
        assert_eq!(output.matched_files.map(|f| f.len()), Some(2));
        assert!(output.answer.is_none());
    }

    #[tokio::test]
    async fn empty_keywords_skip_search_and_still_answer() {
        let kb = knowledge_base();
        let client = ScriptedClient::new([Ok(""), Ok("I found nothing in your notes.")]);

        let report = brain(&client, &config_for(kb.path()))
            .run(&query("hello?"), Mode::GenerateResponse)
            .await;

        assert_eq!(report.final_state, PipelineState::Answered);
        assert_eq!(report.matched_files.as_ref().map(RankedFileList::len), Some(0));
        assert_eq!(report.status(), OutputStatus::Partial);
        let prompts = client.prompts.lock().unwrap();
        assert!(prompts[1].contains("No matching notes were found"));
    }

    #[tokio::test]
    async fn missing_root_fails_search_only() {
        let dir = tempfile::tempdir().unwrap();
        let client = ScriptedClient::new([Ok("project")]);

        let report = brain(&client, &config_for(&dir.path().join("missing")))
            .run(&query("anything"), Mode::SearchOnly)
            .await;

        let output = report.to_output();
        assert_eq!(output.error_kind, Some(ErrorKind::Search));
        assert_eq!(output.keywords.map(|k| k.len()), Some(1));
        assert!(output.matched_files.is_none());
    }

    #[tokio::test]
    async fn budget_cut_is_reported_as_partial() {
        let kb = knowledge_base();
        let client = ScriptedClient::new([Ok("project"), Ok("ok")]);
        let mut config = config_for(kb.path());
        config.ollama.max_context_length = 10;

        let report = brain(&client, &config)
            .run(&query("project?"), Mode::GenerateResponse)
            .await;

        assert_eq!(report.status(), OutputStatus::Partial);
        assert!(report.warnings.iter().any(|w| w.contains("truncated")));
        match &report.result {
            PipelineResult::Answer { cited_files, .. } => assert_eq!(cited_files.len(), 1),
            other => panic!("expected answer, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn transient_failure_is_retried_when_configured() {
        let kb = knowledge_base();
        let client = ScriptedClient::new([
            Err(InferenceFailure::Timeout),
            Ok("project"),
            Err(InferenceFailure::Unreachable),
            Ok("answer"),
        ]);
        let mut config = config_for(kb.path());
        config.pipeline.inference_retries = 1;

        let report = brain(&client, &config)
            .run(&query("project?"), Mode::GenerateResponse)
            .await;

        assert_eq!(report.final_state, PipelineState::Answered);
        assert_eq!(client.calls(), 4);
    }

    #[tokio::test]
    async fn no_retry_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let client = ScriptedClient::new([Err(InferenceFailure::Timeout), Ok("project")]);

        let report = brain(&client, &config_for(dir.path()))
            .run(&query("project?"), Mode::ExtractOnly)
            .await;

        assert_eq!(report.final_state, PipelineState::Error);
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test]
    async fn status_failure_is_never_retried() {
        let dir = tempfile::tempdir().unwrap();
        let client = ScriptedClient::new([Err(InferenceFailure::Status), Ok("project")]);
        let mut config = config_for(dir.path());
        config.pipeline.inference_retries = 3;

        let report = brain(&client, &config)
            .run(&query("project?"), Mode::ExtractOnly)
            .await;

        assert!(report.result.is_error());
        assert_eq!(client.calls(), 1);
    }
}
