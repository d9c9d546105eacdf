//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use brain_core::{Brain, PipelineReport, ProgressReporter};
use brain_shared::{
    AppConfig, Mode, PipelineOutput, PipelineResult, Query, init_config, load_config,
    load_config_from,
};
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use crate::serve::ToolServer;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Brain: ask questions about your notes.
#[derive(Parser)]
#[command(
    name = "brain",
    version,
    about = "Answer questions from a local knowledge base of text notes using a local language model.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of ~/.config/brain/config.toml.
    #[arg(long, global = true, env = "BRAIN_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Result output format for `ask`.
#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Ask a question about the knowledge base.
    Ask {
        /// The question, in natural language.
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,

        /// How far to run: extract-only, search-only, or generate-response.
        #[arg(short, long, default_value = "generate-response")]
        mode: Mode,

        /// Result format: text or json.
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,

        /// Override `knowledge.max_files`.
        #[arg(long)]
        max_files: Option<usize>,
    },

    /// Serve the search and load tools over stdio (JSON-RPC).
    Serve,

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

const LOG_TARGETS: [&str; 5] = [
    "brain_cli",
    "brain_core",
    "brain_search",
    "brain_inference",
    "brain_shared",
];

/// Initialize tracing based on CLI flags. Logs go to stderr.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let level = match cli.verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = LOG_TARGETS
        .iter()
        .map(|target| format!("{target}={level}"))
        .chain(std::iter::once("warn".to_string()))
        .collect::<Vec<_>>()
        .join(",");

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Ask {
            query,
            mode,
            format,
            max_files,
        } => cmd_ask(config_path, &query.join(" "), mode, format, max_files).await,
        Command::Serve => cmd_serve(config_path).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(config_path).await,
        },
    }
}

fn resolve_config(path: Option<&Path>) -> brain_shared::Result<AppConfig> {
    match path {
        Some(path) => load_config_from(path),
        None => load_config(),
    }
}

// ---------------------------------------------------------------------------
// ask
// ---------------------------------------------------------------------------

async fn cmd_ask(
    config_path: Option<&Path>,
    query: &str,
    mode: Mode,
    format: OutputFormat,
    max_files: Option<usize>,
) -> Result<()> {
    let prepared = prepare_ask(config_path, query, max_files);
    let (brain, query) = match prepared {
        Ok(prepared) => prepared,
        Err(e) => match format {
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&PipelineOutput::failed(mode, &e))?
                );
                std::process::exit(1);
            }
            OutputFormat::Text => return Err(e.into()),
        },
    };

    info!(%mode, root = %brain.root().display(), "asking");

    let report = match format {
        OutputFormat::Text => {
            let reporter = CliProgress::new();
            brain.run_with_progress(&query, mode, &reporter).await
        }
        OutputFormat::Json => brain.run(&query, mode).await,
    };

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&report.to_output())?);
        }
        OutputFormat::Text => print_report(&report),
    }

    if report.result.is_error() {
        std::process::exit(1);
    }
    Ok(())
}

fn prepare_ask(
    config_path: Option<&Path>,
    query: &str,
    max_files: Option<usize>,
) -> brain_shared::Result<(Brain, Query)> {
    let mut config = resolve_config(config_path)?;
    if let Some(n) = max_files {
        config.knowledge.max_files = n;
    }
    config.validate()?;

    let query = Query::new(query)?;
    let brain = Brain::from_config(&config)?;
    Ok((brain, query))
}

fn print_report(report: &PipelineReport) {
    for warning in &report.warnings {
        eprintln!("warning: {warning}");
    }

    match &report.result {
        PipelineResult::Keywords(keywords) => {
            if keywords.is_empty() {
                println!("No keywords could be extracted.");
            }
            for keyword in keywords.iter() {
                println!("{keyword}");
            }
        }
        PipelineResult::FilePaths(files) => {
            if files.is_empty() {
                println!("No matching files.");
            }
            for file in files {
                println!("{:>3}  {}", file.score, file.path.display());
            }
        }
        PipelineResult::Answer { text, cited_files } => {
            println!("{}", text.trim());
            if !cited_files.is_empty() {
                println!();
                println!("Sources:");
                for path in cited_files {
                    println!("  - {}", path.display());
                }
            }
        }
        PipelineResult::Error { kind, message } => {
            if let Some(keywords) = &report.keywords {
                eprintln!("keywords: {}", keywords.as_slice().join(", "));
            }
            if let Some(files) = &report.matched_files {
                for file in files {
                    eprintln!("matched: {} ({})", file.path.display(), file.score);
                }
            }
            eprintln!("error [{kind}]: {message}");
        }
    }
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner on stderr.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            spinner.set_style(
                style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
            );
        }
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn done(&self, _report: &PipelineReport) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// serve
// ---------------------------------------------------------------------------

async fn cmd_serve(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    config.validate()?;
    let brain = Brain::from_config(&config)?;

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();
    ToolServer::new(brain)
        .serve(stdin, stdout)
        .await
        .map_err(|e| eyre!("tool server I/O failed: {e}"))
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config: AppConfig = resolve_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    if let Err(e) = config.validate() {
        eprintln!("warning: {e}");
    }
    Ok(())
}
