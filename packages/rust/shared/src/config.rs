//! Application configuration for Brain.
//!
//! User config lives at `~/.config/brain/config.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{BrainError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Config directory path segments under the user's home.
const CONFIG_DIR_SEGMENTS: [&str; 2] = [".config", "brain"];

// ---------------------------------------------------------------------------
// Config structs (matching config.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Inference service settings.
    #[serde(default)]
    pub ollama: OllamaConfig,

    /// Knowledge base location and result limits.
    #[serde(default)]
    pub knowledge: KnowledgeConfig,

    /// File search behaviour.
    #[serde(default)]
    pub search: SearchConfig,

    /// Pipeline-level policies.
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// `[ollama]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Base URL of the inference service.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Model identifier passed with every request.
    #[serde(default = "default_model")]
    pub model: String,

    /// Character budget for the assembled context.
    #[serde(default = "default_max_context_length")]
    pub max_context_length: usize,

    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            max_context_length: default_max_context_length(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_endpoint() -> String {
    "http://localhost:11434".into()
}
fn default_model() -> String {
    "mistral".into()
}
fn default_max_context_length() -> usize {
    4096
}
fn default_timeout_secs() -> u64 {
    120
}

/// `[knowledge]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    /// Root directory of the knowledge base. `~` expands to the home directory.
    #[serde(default = "default_root_path")]
    pub root_path: String,

    /// Maximum number of ranked files kept after search.
    #[serde(default = "default_max_files")]
    pub max_files: usize,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            root_path: default_root_path(),
            max_files: default_max_files(),
        }
    }
}

fn default_root_path() -> String {
    "~/notes".into()
}
fn default_max_files() -> usize {
    5
}

/// `[search]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Maximum number of per-term searches in flight.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,

    /// Whether keyword matching respects case.
    #[serde(default = "default_true")]
    pub case_sensitive: bool,

    /// File extensions to search (without the dot). Empty means every file.
    #[serde(default)]
    pub extensions: Vec<String>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            parallelism: default_parallelism(),
            case_sensitive: true,
            extensions: Vec::new(),
        }
    }
}

fn default_parallelism() -> usize {
    4
}
fn default_true() -> bool {
    true
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Upper bound on extracted search terms.
    #[serde(default = "default_max_keywords")]
    pub max_keywords: usize,

    /// Round a truncated context entry down to the last line break.
    #[serde(default)]
    pub truncate_at_line_boundary: bool,

    /// Extra attempts for an inference call that failed in transport.
    #[serde(default)]
    pub inference_retries: u32,

    /// Delay between inference attempts.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_keywords: default_max_keywords(),
            truncate_at_line_boundary: false,
            inference_retries: 0,
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

fn default_max_keywords() -> usize {
    5
}
fn default_retry_backoff_ms() -> u64 {
    500
}

// ---------------------------------------------------------------------------
// Search options (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime search configuration merged from config file and CLI flags.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Maximum number of ranked files returned.
    pub max_files: usize,
    /// Maximum number of per-term searches in flight.
    pub parallelism: usize,
    /// Whether keyword matching respects case.
    pub case_sensitive: bool,
    /// Extension allow-list (lowercase, no dot). Empty means every file.
    pub extensions: Vec<String>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for SearchOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_files: config.knowledge.max_files,
            parallelism: config.search.parallelism,
            case_sensitive: config.search.case_sensitive,
            extensions: config
                .search
                .extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Resolve the knowledge-base root, expanding a leading `~`.
    pub fn knowledge_root(&self) -> Result<PathBuf> {
        expand_home(&self.knowledge.root_path)
    }

    /// Check every value the pipeline depends on before it is invoked.
    pub fn validate(&self) -> Result<()> {
        let endpoint = Url::parse(&self.ollama.endpoint).map_err(|e| {
            BrainError::config(format!(
                "invalid ollama.endpoint '{}': {e}",
                self.ollama.endpoint
            ))
        })?;
        if endpoint.scheme() != "http" && endpoint.scheme() != "https" {
            return Err(BrainError::config(format!(
                "ollama.endpoint must use http or https, got '{}'",
                endpoint.scheme()
            )));
        }
        if self.ollama.model.trim().is_empty() {
            return Err(BrainError::config("ollama.model must not be empty"));
        }
        if self.ollama.max_context_length == 0 {
            return Err(BrainError::config("ollama.max_context_length must be at least 1"));
        }
        if self.ollama.timeout_secs == 0 {
            return Err(BrainError::config("ollama.timeout_secs must be at least 1"));
        }
        if self.knowledge.max_files == 0 {
            return Err(BrainError::config("knowledge.max_files must be at least 1"));
        }
        if self.search.parallelism == 0 {
            return Err(BrainError::config("search.parallelism must be at least 1"));
        }
        if self.pipeline.max_keywords == 0 {
            return Err(BrainError::config("pipeline.max_keywords must be at least 1"));
        }

        let root = self.knowledge_root()?;
        if !root.is_dir() {
            return Err(BrainError::config(format!(
                "knowledge base path does not exist or is not a directory: {}",
                root.display()
            )));
        }

        Ok(())
    }
}

/// Expand a leading `~` or `~/` against the user's home directory.
pub fn expand_home(path: &str) -> Result<PathBuf> {
    if path == "~" || path.starts_with("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| BrainError::config("could not determine home directory"))?;
        let rest = path.trim_start_matches('~').trim_start_matches('/');
        return Ok(if rest.is_empty() { home } else { home.join(rest) });
    }
    Ok(PathBuf::from(path))
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.config/brain/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| BrainError::config("could not determine home directory"))?;
    Ok(CONFIG_DIR_SEGMENTS
        .iter()
        .fold(home, |dir, segment| dir.join(segment)))
}

/// Get the path to the config file (`~/.config/brain/config.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| BrainError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| BrainError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| BrainError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    if path.exists() {
        return Err(BrainError::config(format!(
            "config file already exists: {}",
            path.display()
        )));
    }

    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| BrainError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| BrainError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config(root: &Path) -> AppConfig {
        let mut config = AppConfig::default();
        config.knowledge.root_path = root.to_string_lossy().into_owned();
        config
    }

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("max_context_length"));
        assert!(toml_str.contains("http://localhost:11434"));
    }

    #[test]
    fn partial_file_fills_defaults() {
        let toml_str = r#"
[ollama]
model = "llama3"

[knowledge]
root_path = "/tmp/notes"
max_files = 8
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.ollama.model, "llama3");
        assert_eq!(config.ollama.endpoint, "http://localhost:11434");
        assert_eq!(config.knowledge.max_files, 8);
        assert_eq!(config.search.parallelism, 4);
        assert!(config.search.case_sensitive);
        assert_eq!(config.pipeline.inference_retries, 0);
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[knowledge]\nroot_path = \"/srv/notes\"\nmax_files = 3\n\n[search]\nextensions = [\"org\"]\n",
        )
        .expect("write config");

        let config = load_config_from(&path).expect("load");
        assert_eq!(config.knowledge.root_path, "/srv/notes");
        assert_eq!(config.knowledge.max_files, 3);
        assert_eq!(config.search.extensions, vec!["org".to_string()]);
    }

    #[test]
    fn malformed_file_is_config_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[knowledge\nroot_path = 1").expect("write config");

        let err = load_config_from(&path).unwrap_err();
        assert!(matches!(err, BrainError::Config { .. }));
    }

    #[test]
    fn search_options_from_app_config() {
        let mut app = AppConfig::default();
        app.search.extensions = vec![".ORG".into(), "md".into()];
        let opts = SearchOptions::from(&app);
        assert_eq!(opts.max_files, 5);
        assert_eq!(opts.parallelism, 4);
        assert_eq!(opts.extensions, vec!["org".to_string(), "md".to_string()]);
    }

    #[test]
    fn validate_accepts_existing_root() {
        let dir = tempfile::tempdir().expect("tempdir");
        valid_config(dir.path()).validate().expect("valid");
    }

    #[test]
    fn validate_rejects_bad_values() {
        let dir = tempfile::tempdir().expect("tempdir");

        let mut config = valid_config(dir.path());
        config.ollama.endpoint = "not a url".into();
        assert!(config.validate().unwrap_err().to_string().contains("ollama.endpoint"));

        let mut config = valid_config(dir.path());
        config.ollama.endpoint = "ftp://localhost:11434".into();
        assert!(config.validate().is_err());

        let mut config = valid_config(dir.path());
        config.knowledge.max_files = 0;
        assert!(config.validate().unwrap_err().to_string().contains("max_files"));

        let mut config = valid_config(dir.path());
        config.search.parallelism = 0;
        assert!(config.validate().unwrap_err().to_string().contains("parallelism"));

        let mut config = valid_config(dir.path());
        config.ollama.max_context_length = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_missing_root() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = valid_config(&dir.path().join("does-not-exist"));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn expand_home_leaves_plain_paths() {
        assert_eq!(expand_home("/srv/notes").unwrap(), PathBuf::from("/srv/notes"));
        assert_eq!(expand_home("notes").unwrap(), PathBuf::from("notes"));
    }

    #[test]
    fn expand_home_resolves_tilde() {
        let Some(home) = dirs::home_dir() else {
            return;
        };
        assert_eq!(expand_home("~/notes").unwrap(), home.join("notes"));
        assert_eq!(expand_home("~").unwrap(), home);
    }
}
