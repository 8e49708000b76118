//! CLI binary for edgequake-docportal.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `PortalConfig` and prints results.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use edgequake_docportal::analyze::analyze_upload_in_session;
use edgequake_docportal::{
    compare_uploads_with, inspect_pdf, AnalysisOutput, ComparisonOutput, ModelLoader,
    PipelineProgressCallback, PortalConfig, ProgressCallback, SessionStore, Stage, UploadedFile,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner that names the running stage and logs a line per finished stage.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Working");
        bar.set_message("starting…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl PipelineProgressCallback for CliProgressCallback {
    fn on_stage_start(&self, stage: Stage) {
        self.bar.set_message(format!("{stage}…"));
    }

    fn on_stage_complete(&self, stage: Stage, elapsed_ms: u64) {
        self.bar.println(format!(
            "  {} {:<18} {}",
            green("✓"),
            stage.to_string(),
            dim(&format!("{:.1}s", elapsed_ms as f64 / 1000.0)),
        ));
    }

    fn on_output_repair(&self, error: &str) {
        let msg = if error.chars().count() > 80 {
            format!("{}…", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} model output did not parse ({}); asking for a fix",
            cyan("⚠"),
            dim(&msg)
        ));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Metadata and summary for one PDF
  docportal analyze report.pdf

  # Reuse an existing analysis session
  docportal analyze report.pdf --session-id session_20250101_120000_1a2b3c4d

  # Page-wise differences between two versions
  docportal compare contract_v1.pdf contract_v2.pdf

  # JSON output
  docportal --json analyze report.pdf > report.json

  # Use Groq instead of Gemini
  docportal --provider groq analyze report.pdf

  # Page count, version and encryption (no API key needed)
  docportal inspect report.pdf

  # Keep only the two newest comparison sessions
  docportal sessions clean --kind compare --keep-latest 2

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY   Google Gemini key (chat and embeddings)
  GROQ_API_KEY     Groq key
  LLM_PROVIDER     Provider key from config.yaml (google, groq)
  BASE_PATH        Directory containing config/config.yaml

  Variables may also be placed in a .env file in the working directory.
"#;

/// Analyse and compare PDF documents with hosted LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "docportal",
    version,
    about = "Analyse and compare PDF documents with hosted LLMs",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to config.yaml (default: $BASE_PATH/config/config.yaml or ./config/config.yaml).
    #[arg(long, global = true, env = "DOCPORTAL_CONFIG")]
    config: Option<PathBuf>,

    /// Provider key from the config's `llm` section.
    #[arg(long, global = true, env = "LLM_PROVIDER")]
    provider: Option<String>,

    /// Root directory for session data.
    #[arg(long, global = true, env = "DOCPORTAL_DATA_ROOT")]
    data_root: Option<PathBuf>,

    /// Directory for JSON log files.
    #[arg(long, global = true, env = "DOCPORTAL_LOG_DIR", default_value = "logs")]
    log_dir: PathBuf,

    /// Output structured JSON instead of text.
    #[arg(long, global = true, env = "DOCPORTAL_JSON")]
    json: bool,

    /// Disable the progress spinner.
    #[arg(long, global = true, env = "DOCPORTAL_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "DOCPORTAL_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "DOCPORTAL_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract metadata and a summary from one PDF.
    Analyze {
        file: PathBuf,
        /// Store the upload in this existing session instead of a new one.
        #[arg(long)]
        session_id: Option<String>,
    },
    /// Compare a reference PDF with an actual PDF, page by page.
    Compare {
        reference: PathBuf,
        actual: PathBuf,
        /// Comparison sessions kept after the run (default from config).
        #[arg(long)]
        keep_latest: Option<usize>,
    },
    /// List or clean session directories.
    Sessions {
        #[command(subcommand)]
        action: SessionAction,
    },
    /// Print page count, PDF version and encryption flag (no API key needed).
    Inspect { file: PathBuf },
    /// Embed a text with the configured embedding model.
    Embed { text: String },
}

#[derive(Subcommand, Debug)]
enum SessionAction {
    /// List sessions, newest first.
    List {
        #[arg(long, value_enum, default_value = "compare")]
        kind: SessionKind,
    },
    /// Remove all but the newest sessions.
    Clean {
        #[arg(long, value_enum, default_value = "compare")]
        kind: SessionKind,
        #[arg(long)]
        keep_latest: Option<usize>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum SessionKind {
    Analyzer,
    Compare,
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env must be loaded before clap reads `env = ...` fallbacks.
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let runs_model = matches!(cli.command, Command::Analyze { .. } | Command::Compare { .. });
    let show_progress = runs_model && !cli.quiet && !cli.no_progress && !cli.json;
    let _log_guard = init_logging(&cli, show_progress)?;

    let progress = show_progress.then(CliProgressCallback::new);
    let config = build_config(
        &cli,
        progress.clone().map(|p| p as ProgressCallback),
    )?;

    let result = run(&cli, &config).await;
    if let Some(ref p) = progress {
        p.finish();
    }
    result
}

async fn run(cli: &Cli, config: &PortalConfig) -> Result<()> {
    match &cli.command {
        Command::Analyze { file, session_id } => {
            let loader = ModelLoader::from_config(config.clone()).context("Model setup failed")?;
            let model = loader.load_llm().context("Model setup failed")?;
            let upload = UploadedFile::from_path(file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let output = analyze_upload_in_session(model, &upload, config, session_id.as_deref())
                .await
                .context("Analysis failed")?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&output).context("Failed to serialise output")?);
            } else {
                print_analysis(&output, cli.quiet);
            }
        }

        Command::Compare {
            reference,
            actual,
            keep_latest,
        } => {
            let mut config = config.clone();
            if let Some(n) = keep_latest {
                config.data.keep_latest = *n;
            }
            let loader = ModelLoader::from_config(config.clone()).context("Model setup failed")?;
            let model = loader.load_llm().context("Model setup failed")?;
            let reference = UploadedFile::from_path(reference)
                .await
                .with_context(|| format!("Failed to read {}", reference.display()))?;
            let actual = UploadedFile::from_path(actual)
                .await
                .with_context(|| format!("Failed to read {}", actual.display()))?;
            let output = compare_uploads_with(model, &reference, &actual, &config)
                .await
                .context("Comparison failed")?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&output).context("Failed to serialise output")?);
            } else {
                print_comparison(&output, cli.quiet);
            }
        }

        Command::Sessions { action } => match action {
            SessionAction::List { kind } => {
                let store = session_store(config, *kind);
                let sessions = store.list().context("Failed to list sessions")?;
                if cli.json {
                    println!("{}", serde_json::to_string_pretty(&sessions)?);
                } else if sessions.is_empty() {
                    eprintln!("No sessions under {}", store.root().display());
                } else {
                    for session in sessions {
                        println!(
                            "{}  {}  {} file(s)",
                            session.id,
                            dim(&session.created_at.format("%Y-%m-%d %H:%M:%S UTC").to_string()),
                            count_files(&session.path)
                        );
                    }
                }
            }
            SessionAction::Clean { kind, keep_latest } => {
                let store = session_store(config, *kind);
                let keep = keep_latest.unwrap_or(config.data.keep_latest);
                let removed = store
                    .clean_old_sessions(keep)
                    .context("Failed to clean sessions")?;
                if cli.json {
                    println!("{}", serde_json::to_string_pretty(&removed)?);
                } else if !cli.quiet {
                    eprintln!(
                        "{} removed {} session(s), kept latest {}",
                        green("✔"),
                        removed.len(),
                        keep
                    );
                }
            }
        },

        Command::Inspect { file } => {
            let info = inspect_pdf(file).await.context("Failed to inspect PDF")?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                println!("File:         {}", info.path.display());
                println!("Pages:        {}", info.page_count);
                println!("PDF Version:  {}", info.pdf_version);
                println!("Encrypted:    {}", info.is_encrypted);
            }
        }

        Command::Embed { text } => {
            let loader = ModelLoader::from_config(config.clone()).context("Model setup failed")?;
            let embeddings = loader.load_embeddings().context("Embedding setup failed")?;
            let vector = embeddings.embed_query(text).await.context("Embedding failed")?;
            if cli.json {
                println!("{}", serde_json::to_string(&vector)?);
            } else {
                let head: Vec<String> = vector.iter().take(5).map(|v| format!("{v:.4}")).collect();
                println!("{} dimensions  [{}, …]", bold(&vector.len().to_string()), head.join(", "));
            }
        }
    }
    Ok(())
}

/// Install a stderr layer and a JSON file layer under `--log-dir`.
fn init_logging(cli: &Cli, show_progress: bool) -> Result<WorkerGuard> {
    // The spinner gives all the feedback that matters; keep stderr quiet under it.
    let stderr_filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    let file_filter = if cli.verbose { "debug" } else { "info" };

    std::fs::create_dir_all(&cli.log_dir)
        .with_context(|| format!("Failed to create log directory {}", cli.log_dir.display()))?;
    let file_name = chrono::Local::now().format("%m_%d_%Y_%H_%M_%S.log").to_string();
    let appender = tracing_appender::rolling::never(&cli.log_dir, file_name);
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    let stderr_layer = fmt::layer().with_writer(io::stderr).with_filter(
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(stderr_filter)),
    );
    let file_layer = fmt::layer()
        .json()
        .with_writer(file_writer)
        .with_filter(EnvFilter::new(file_filter));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();
    Ok(guard)
}

/// Map CLI args onto the discovered or given `PortalConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<PortalConfig> {
    let base = match cli.config {
        Some(ref path) => PortalConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => PortalConfig::discover(|k| std::env::var(k).ok()).context("Failed to load config")?,
    };

    let mut builder = base.into_builder();
    if let Some(ref provider) = cli.provider {
        builder = builder.provider(provider.clone());
    }
    if let Some(ref root) = cli.data_root {
        builder = builder.data_root(root.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }
    builder.build().context("Invalid configuration")
}

fn session_store(config: &PortalConfig, kind: SessionKind) -> SessionStore {
    match kind {
        SessionKind::Analyzer => SessionStore::new(config.data.analyzer_root()),
        SessionKind::Compare => SessionStore::new(config.data.compare_root()),
    }
}

fn count_files(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .map(|entries| entries.filter_map(|e| e.ok()).filter(|e| e.path().is_file()).count())
        .unwrap_or(0)
}

fn print_analysis(output: &AnalysisOutput, quiet: bool) {
    let m = &output.metadata;
    println!("{}", bold(&m.title));
    println!("Author:          {}", m.author.join(", "));
    println!("Created:         {}", m.date_created);
    println!("Last modified:   {}", m.last_modified_date);
    println!("Publisher:       {}", m.publisher);
    println!("Language:        {}", m.language);
    println!("Pages:           {}", m.page_count);
    println!("Sentiment/tone:  {}", m.sentiment_tone);
    if !m.summary.is_empty() {
        println!("\nSummary:");
        for line in &m.summary {
            println!("  - {line}");
        }
    }
    for line in analysis_footer(output, quiet) {
        eprintln!("{line}");
    }
}

/// Stderr summary after an analysis; empty under `--quiet`.
fn analysis_footer(output: &AnalysisOutput, quiet: bool) -> Vec<String> {
    if quiet {
        return Vec::new();
    }
    vec![format!(
        "\n{}  session {}  {} pages  {}ms",
        green("✔"),
        output.session_id,
        output.page_count,
        output.stats.total_duration_ms
    )]
}

fn print_comparison(output: &ComparisonOutput, quiet: bool) {
    print!("{}", output.report.to_table());
    for line in comparison_footer(output, quiet) {
        eprintln!("{line}");
    }
}

/// Stderr summary after a comparison; empty under `--quiet`.
fn comparison_footer(output: &ComparisonOutput, quiet: bool) -> Vec<String> {
    if quiet {
        return Vec::new();
    }
    let mut lines = vec![format!(
        "\n{}  session {}  {} page(s) with changes  {}ms",
        green("✔"),
        output.session_id,
        output.report.changed_pages().count(),
        output.stats.total_duration_ms
    )];
    if !output.removed_sessions.is_empty() {
        lines.push(format!(
            "   {}",
            dim(&format!("removed {} old session(s)", output.removed_sessions.len()))
        ));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgequake_docportal::{ComparisonReport, Metadata, RunStats, SessionId};

    fn analysis() -> AnalysisOutput {
        AnalysisOutput {
            session_id: SessionId::generate(),
            document_path: PathBuf::from("data/analyzer_docs/x/report.pdf"),
            page_count: 4,
            metadata: Metadata::default(),
            stats: RunStats::default(),
        }
    }

    fn comparison() -> ComparisonOutput {
        ComparisonOutput {
            session_id: SessionId::generate(),
            reference_path: PathBuf::from("v1.pdf"),
            actual_path: PathBuf::from("v2.pdf"),
            report: ComparisonReport::default(),
            removed_sessions: vec![SessionId::generate()],
            stats: RunStats::default(),
        }
    }

    #[test]
    fn quiet_silences_both_footers() {
        assert!(analysis_footer(&analysis(), true).is_empty());
        assert!(comparison_footer(&comparison(), true).is_empty());
    }

    #[test]
    fn footers_report_session() {
        let output = analysis();
        let lines = analysis_footer(&output, false);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains(output.session_id.as_str()));
        assert!(lines[0].contains("4 pages"));

        assert_eq!(comparison_footer(&comparison(), false).len(), 2);
    }
}
