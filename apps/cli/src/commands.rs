//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use tourledger_core::{
    BatchReport, LedgerSummary, ProgressReporter, SubjectReport, SubjectStatus, SyncOrchestrator,
};
use tourledger_oracle::GeminiOracle;
use tourledger_shared::{
    AppConfig, SubjectId, SyncConfig, init_config, init_config_at, load_config, load_config_from,
    resolve_api_key,
};
use tourledger_source::LibsqlMessageSource;
use tourledger_storage::{Ledger, WatermarkStore};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// tourledger: turn client conversations into a deduplicated tour ledger.
#[derive(Parser)]
#[command(
    name = "tourledger",
    version,
    about = "Incrementally extract building-level tour interactions into an append-only ledger.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ~/.tourledger/tourledger.toml).
    #[arg(long, global = true, env = "TOURLEDGER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run one incremental batch over clients changed since the last sync.
    Sync,

    /// Process a single client now, ignoring the watermark.
    Subject {
        /// Client identifier.
        id: String,
    },

    /// Print counts from the master ledger.
    Summary {
        /// Print as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print the stored sync watermark.
    Watermark,

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

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "tourledger=info",
        1 => "tourledger=debug",
        _ => "tourledger=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

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
    let config_path = cli.config;
    match cli.command {
        Command::Sync => cmd_sync(config_path).await,
        Command::Subject { id } => cmd_subject(config_path, &id).await,
        Command::Summary { json } => cmd_summary(config_path, json).await,
        Command::Watermark => cmd_watermark(config_path),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(config_path),
            ConfigAction::Show => cmd_config_show(config_path),
        },
    }
}

fn app_config(path: Option<PathBuf>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => load_config_from(&path)?,
        None => load_config()?,
    };
    Ok(config)
}

type Orchestrator<'a> = SyncOrchestrator<'a, LibsqlMessageSource, GeminiOracle>;

/// Open the message source, oracle, and ledger for a run.
async fn orchestrator<'a>(config: &AppConfig, sync: &'a SyncConfig) -> Result<Orchestrator<'a>> {
    let api_key = resolve_api_key(config)?;
    let source = LibsqlMessageSource::open(&sync.source_path, sync.min_stage)
        .await
        .wrap_err("cannot open message source")?;
    let oracle = GeminiOracle::new(sync, api_key)?;
    Ok(SyncOrchestrator::open(sync, source, oracle).await?)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_sync(config_path: Option<PathBuf>) -> Result<()> {
    let config = app_config(config_path)?;
    let sync = SyncConfig::from(&config);
    info!(
        source = %sync.source_path.display(),
        ledger = %sync.ledger_path.display(),
        model = %sync.model,
        "starting sync"
    );

    let mut orchestrator = orchestrator(&config, &sync).await?;
    let reporter = CliProgress::new();
    let result = orchestrator.run_batch(&reporter).await;
    reporter.finish();

    let report = result.wrap_err("sync aborted; watermark left unchanged")?;
    print_batch(&report);
    Ok(())
}

async fn cmd_subject(config_path: Option<PathBuf>, id: &str) -> Result<()> {
    let subject: SubjectId = id.parse()?;
    let config = app_config(config_path)?;
    let sync = SyncConfig::from(&config);

    let mut orchestrator = orchestrator(&config, &sync).await?;
    let reporter = CliProgress::new();
    let result = orchestrator.process_subject(&subject, &reporter).await;
    reporter.finish();

    let report = result?;
    println!();
    println!("  {}", describe(&report));
    if let Some(path) = &report.artifact {
        println!("  Artifact: {}", path.display());
    }
    println!();
    Ok(())
}

async fn cmd_summary(config_path: Option<PathBuf>, json: bool) -> Result<()> {
    let sync = SyncConfig::from(&app_config(config_path)?);
    let ledger = Ledger::open_readonly(&sync.ledger_path, &sync.artifacts_dir).await?;
    let summary = ledger.summary().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(())
}

fn cmd_watermark(config_path: Option<PathBuf>) -> Result<()> {
    let sync = SyncConfig::from(&app_config(config_path)?);
    let store = WatermarkStore::new(&sync.watermark_path);
    match store.stored() {
        Ok(Some(at)) => println!("{}", at.to_rfc3339()),
        Ok(None) => println!("no watermark stored; next sync is a full backfill"),
        Err(e) => println!("watermark unreadable ({e}); next sync is a full backfill"),
    }
    Ok(())
}

fn cmd_config_init(config_path: Option<PathBuf>) -> Result<()> {
    let path = match config_path {
        Some(path) => init_config_at(&path)?,
        None => init_config()?,
    };
    println!("Config written to {}", path.display());
    Ok(())
}

fn cmd_config_show(config_path: Option<PathBuf>) -> Result<()> {
    let config = app_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

fn describe(report: &SubjectReport) -> String {
    match &report.status {
        SubjectStatus::Skipped => format!("client {}: already in ledger", report.subject),
        SubjectStatus::Recorded { records, appended } => format!(
            "client {}: {records} building(s), {appended} appended",
            report.subject
        ),
        SubjectStatus::Diagnostic { kind, cause } => {
            format!("client {}: no records ({kind}: {cause})", report.subject)
        }
    }
}

fn print_batch(report: &BatchReport) {
    println!();
    println!("  Sync complete");
    println!("  Clients:     {}", report.subjects.len());
    println!("  Recorded:    {}", report.recorded());
    println!("  Skipped:     {}", report.skipped());
    println!("  Diagnostics: {}", report.diagnostics());
    println!("  Appended:    {}", report.appended());
    println!("  Watermark:   {}", report.watermark.to_rfc3339());
    println!("  Time:        {:.1}s", report.elapsed.as_secs_f64());
    if let Some(summary) = &report.summary {
        println!();
        print_summary(summary);
    }
    println!();
}

fn print_summary(summary: &LedgerSummary) {
    println!("  Ledger");
    println!("  Clients:         {}", summary.subjects);
    println!("  Records:         {}", summary.total_records);
    println!("  Completed tours: {}", summary.completed_tours);
    for (status, count) in &summary.by_status {
        println!("    status {status:<12} {count}");
    }
    for (tour_type, count) in &summary.by_tour_type {
        println!("    type   {tour_type:<18} {count}");
    }
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .map(|s| s.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]))
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn subject_started(&self, subject: &SubjectId, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Analyzing [{current}/{total}] client {subject}"));
    }

    fn subject_finished(&self, report: &SubjectReport) {
        self.spinner.println(format!("  {}", describe(report)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_subject_and_global_flags() {
        let cli = Cli::parse_from(["tourledger", "-vv", "--log-format", "json", "subject", "42"]);
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.log_format, LogFormat::Json));
        assert!(matches!(cli.command, Command::Subject { ref id } if id == "42"));
    }

    #[test]
    fn describes_outcomes() {
        let report = SubjectReport {
            subject: SubjectId::from(42),
            status: SubjectStatus::Recorded {
                records: 1,
                appended: 1,
            },
            artifact: None,
        };
        assert_eq!(describe(&report), "client 42: 1 building(s), 1 appended");
    }
}
