//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use zenrag_client::{ApiClient, RetryPolicy};
use zenrag_enrichment::{BatchProcessor, EnrichProgress, EnrichmentOptions};
use zenrag_extractor::{
    ExtractProgress, WorkspaceExtractor, normalize, read_jsonl, validate_jsonl, write_jsonl,
};
use zenrag_shared::{AppConfig, FilterCriteria, ZenragError, init_config, load_config, resolve_token};

use crate::report;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// zenrag — turn a project-management workspace into RAG-ready records.
#[derive(Parser)]
#[command(
    name = "zenrag",
    version,
    about = "Convert Zenhub workspace content into retrieval-ready JSONL records.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
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
    /// Convert workspace content to RAG-ready JSONL.
    Convert {
        /// Workspace identifier.
        workspace_id: String,

        /// Workspace API access token (falls back to the configured env var).
        #[arg(short = 't', long)]
        access_token: Option<String>,

        /// Output directory.
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Filter by pipeline name (repeatable).
        #[arg(short, long = "pipeline")]
        pipelines: Vec<String>,

        /// Filter by label (repeatable; an item passes on any match).
        #[arg(short, long = "label")]
        labels: Vec<String>,

        /// Exclude epic information.
        #[arg(long)]
        no_epics: bool,

        /// Exclude dependency information.
        #[arg(long)]
        no_dependencies: bool,

        /// Run LLM enrichment over the normalized records.
        #[arg(long)]
        enrich: bool,

        /// Enrichment model (overrides config).
        #[arg(long)]
        model: Option<String>,

        /// Records per enrichment batch (overrides config).
        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// Fetch a workspace and print a content analysis.
    Inspect {
        /// Workspace identifier.
        workspace_id: String,

        /// Workspace API access token (falls back to the configured env var).
        #[arg(short = 't', long)]
        access_token: Option<String>,

        /// Output directory for the analysis JSON.
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },

    /// Validate a processed JSONL file line-by-line.
    Validate {
        /// JSONL file to validate.
        input_file: PathBuf,
    },

    /// Generate statistics over a processed JSONL file.
    Stats {
        /// JSONL file to analyze.
        input_file: PathBuf,

        /// Output file for the statistics (JSON).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show help about getting the required API tokens.
    HelpToken,

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
        0 => "zenrag=info",
        1 => "zenrag=debug",
        _ => "zenrag=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Convert {
            workspace_id,
            access_token,
            output_dir,
            pipelines,
            labels,
            no_epics,
            no_dependencies,
            enrich,
            model,
            batch_size,
        } => {
            let criteria = FilterCriteria {
                pipelines,
                labels,
                include_epics: !no_epics,
                include_dependencies: !no_dependencies,
            };
            cmd_convert(
                &workspace_id,
                access_token.as_deref(),
                output_dir,
                criteria,
                enrich,
                model,
                batch_size,
            )
            .await
        }
        Command::Inspect {
            workspace_id,
            access_token,
            output_dir,
        } => cmd_inspect(&workspace_id, access_token.as_deref(), output_dir).await,
        Command::Validate { input_file } => cmd_validate(&input_file),
        Command::Stats { input_file, output } => cmd_stats(&input_file, output.as_deref()),
        Command::HelpToken => cmd_help_token(),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(),
        },
    }
}

/// Create `<output>/logs` and `<output>/data`.
fn setup_output_dir(output_dir: &Path) -> Result<()> {
    for sub in ["logs", "data"] {
        let dir = output_dir.join(sub);
        std::fs::create_dir_all(&dir).map_err(|e| ZenragError::io(&dir, e))?;
    }
    Ok(())
}

fn resolved_output_dir(config: &AppConfig, flag: Option<PathBuf>) -> PathBuf {
    flag.unwrap_or_else(|| PathBuf::from(&config.defaults.output_dir))
}

/// Resolve every credential the run will need up front. With enrichment
/// enabled, a missing enrichment key fails here, not after extraction.
fn resolve_credentials(
    config: &AppConfig,
    access_token: Option<&str>,
    enrich: bool,
) -> Result<(String, Option<String>), ZenragError> {
    let workspace = resolve_token(access_token, &config.workspace.api_key_env)?;
    let enrichment = if enrich {
        Some(resolve_token(None, &config.enrichment.api_key_env)?)
    } else {
        None
    };
    Ok((workspace, enrichment))
}

// ---------------------------------------------------------------------------
// convert
// ---------------------------------------------------------------------------

async fn cmd_convert(
    workspace_id: &str,
    access_token: Option<&str>,
    output_dir: Option<PathBuf>,
    criteria: FilterCriteria,
    enrich: bool,
    model: Option<String>,
    batch_size: Option<usize>,
) -> Result<()> {
    let config = load_config()?;
    // Both credentials are resolved before any network call: a missing
    // enrichment key must not surface after a long extraction.
    let (token, enrich_token) = resolve_credentials(&config, access_token, enrich)?;

    let output_dir = resolved_output_dir(&config, output_dir);
    setup_output_dir(&output_dir)?;

    info!(
        workspace_id,
        pipelines = ?criteria.pipelines,
        labels = ?criteria.labels,
        enrich,
        "converting workspace"
    );

    let progress = CliProgress::new();

    // --- Extract ---
    let client = ApiClient::new(&config.workspace.api_base, &token, &config.client)?;
    let extractor = WorkspaceExtractor::new(&client, config.workspace.per_page);
    let extraction = extractor.extract(workspace_id, &criteria, &progress).await?;

    // --- Normalize (page-traversal order) ---
    progress.phase("Normalizing records");
    let records: Vec<_> = extraction
        .included
        .iter()
        .map(|item| normalize(item, &extraction.graph))
        .collect();

    // --- Enrich (optional) ---
    let (records, enrich_summary) = if let Some(enrich_token) = enrich_token {
        let mut options = EnrichmentOptions::from(&config.enrichment);
        if let Some(model) = model {
            options.model = model;
        }
        if let Some(batch_size) = batch_size {
            options.batch_size = batch_size.max(1);
        }

        let enrich_client =
            ApiClient::new(&config.enrichment.api_base, &enrich_token, &config.client)?
                .with_policy(RetryPolicy::new(
                    options.max_retries,
                    std::time::Duration::from_millis(config.client.base_delay_ms),
                    std::time::Duration::from_millis(config.client.max_delay_ms),
                ));

        progress.phase("Enriching records");
        let processor = BatchProcessor::new(enrich_client, options);
        let outcome = processor.process(records, &progress).await;
        let summary = (outcome.batches_merged, outcome.batches_failed);
        (outcome.records, Some(summary))
    } else {
        (records, None)
    };

    // --- Write ---
    progress.phase("Writing output");
    let output_file = output_dir.join("data").join(format!("{workspace_id}_raw.jsonl"));
    write_jsonl(&output_file, &records)?;
    progress.finish();

    println!();
    println!("  Conversion complete!");
    println!("  Fetched:    {}", extraction.fetched);
    println!("  Filtered:   {}", extraction.filtered_out);
    println!("  Records:    {}", records.len());
    if let Some((merged, failed)) = enrich_summary {
        println!("  Batches:    {merged} enriched, {failed} failed");
    }
    println!("  Output:     {}", output_file.display());
    println!();

    Ok(())
}

// ---------------------------------------------------------------------------
// inspect
// ---------------------------------------------------------------------------

async fn cmd_inspect(
    workspace_id: &str,
    access_token: Option<&str>,
    output_dir: Option<PathBuf>,
) -> Result<()> {
    let config = load_config()?;
    let token = resolve_token(access_token, &config.workspace.api_key_env)?;

    let output_dir = resolved_output_dir(&config, output_dir);
    setup_output_dir(&output_dir)?;

    let progress = CliProgress::new();
    progress.phase("Fetching workspace content");

    let client = ApiClient::new(&config.workspace.api_base, &token, &config.client)?;
    let extractor = WorkspaceExtractor::new(&client, config.workspace.per_page);
    let extraction = extractor
        .extract(workspace_id, &FilterCriteria::default(), &progress)
        .await?;

    progress.phase("Analyzing content");
    let records: Vec<_> = extraction
        .included
        .iter()
        .map(|item| normalize(item, &extraction.graph))
        .collect();
    let analysis = report::analyze(&records);
    progress.finish();

    report::print_analysis(&analysis);

    let analysis_file = output_dir
        .join("data")
        .join(format!("analysis_{workspace_id}.json"));
    let json = serde_json::to_string_pretty(&analysis)?;
    std::fs::write(&analysis_file, json).map_err(|e| ZenragError::io(&analysis_file, e))?;
    println!("  Analysis saved to {}", analysis_file.display());

    Ok(())
}

// ---------------------------------------------------------------------------
// validate / stats
// ---------------------------------------------------------------------------

fn cmd_validate(input_file: &Path) -> Result<()> {
    if !input_file.exists() {
        return Err(eyre!("input file not found: {}", input_file.display()));
    }

    let report = validate_jsonl(input_file)?;

    if report.errors.is_empty() {
        println!("All {} records are valid.", report.valid);
    } else {
        println!(
            "Found {} invalid lines ({} valid):",
            report.errors.len(),
            report.valid
        );
        for (line, error) in &report.errors {
            println!("  line {line}: {error}");
        }
        return Err(eyre!("validation failed"));
    }

    Ok(())
}

fn cmd_stats(input_file: &Path, output: Option<&Path>) -> Result<()> {
    if !input_file.exists() {
        return Err(eyre!("input file not found: {}", input_file.display()));
    }

    let records = read_jsonl(input_file)?;
    let analysis = report::analyze(&records);
    report::print_analysis(&analysis);

    if let Some(output) = output {
        let json = serde_json::to_string_pretty(&analysis)?;
        std::fs::write(output, json).map_err(|e| ZenragError::io(output, e))?;
        println!("  Statistics saved to {}", output.display());
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// help-token / config
// ---------------------------------------------------------------------------

fn cmd_help_token() -> Result<()> {
    println!(
        "\
Workspace API token:
  1. Log in to Zenhub (https://app.zenhub.com)
  2. Settings -> App Settings -> API Tokens
  3. Create a token and copy it immediately
  4. export ZENHUB_TOKEN=your_token_here

Workspace ID:
  Found in the board URL:
  https://app.zenhub.com/workspaces/WORKSPACE_ID/board

Enrichment API key:
  export OPENAI_API_KEY=your_key_here

Workflow example:
  zenrag inspect your_workspace_id
  zenrag convert your_workspace_id --output-dir ./output
  zenrag convert your_workspace_id --pipeline \"Sprint Backlog\" --pipeline \"In Progress\"
  zenrag convert your_workspace_id --label bug --label feature
  zenrag convert your_workspace_id --no-epics --no-dependencies
  zenrag convert your_workspace_id --enrich --batch-size 10"
    );
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// Progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap()
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl ExtractProgress for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn items_fetched(&self, count: usize) {
        self.spinner.set_message(format!("Fetched {count} items"));
    }
}

impl EnrichProgress for CliProgress {
    fn batch_started(&self, index: usize, total: usize, size: usize) {
        self.spinner.set_message(format!(
            "Enriching batch {}/{total} ({size} records)",
            index + 1
        ));
    }

    fn batch_finished(&self, index: usize, merged: bool) {
        if !merged {
            self.spinner
                .println(format!("batch {} failed, records kept as-is", index + 1));
        }
    }
}
