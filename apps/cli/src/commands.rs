//! CLI command definitions, routing, and tracing setup.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use debrief_atlas::AtlasClient;
use debrief_core::checkpoint::run_dir;
use debrief_core::{
    AtlasSource, BriefingConfig, HeadlineSource, PipelineDeps, ProgressReporter, StaticSource,
    run_briefing,
};
use debrief_llm::OpenAiClient;
use debrief_scrape::ArticleFetcher;
use debrief_shared::{
    AppConfig, Briefing, Headline, init_config, load_config, resolve_api_key, validate_api_keys,
};
use debrief_storage::Storage;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

/// Database file inside the output directory.
const DB_FILE: &str = "debrief.db";

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Debrief, a persona-tailored news briefing.
#[derive(Parser)]
#[command(
    name = "debrief",
    version,
    about = "Filter, scrape and summarize the day's headlines into one briefing for a reader persona.",
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
    /// Produce a briefing for a reader persona.
    Brief(BriefArgs),

    /// List past briefing runs.
    History {
        /// Number of runs to show.
        #[arg(short, long, default_value = "10")]
        limit: usize,

        /// Output directory holding the database (defaults to config).
        #[arg(short, long)]
        out: Option<String>,
    },

    /// Completion cache management.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Arguments of `debrief brief`.
#[derive(clap::Args)]
pub(crate) struct BriefArgs {
    /// Reader persona. Read from stdin when omitted.
    #[arg(short, long)]
    persona: Option<String>,

    /// Output directory for runs and the database (defaults to config).
    #[arg(short, long)]
    out: Option<String>,

    /// Do not write per-stage JSON snapshots.
    #[arg(long)]
    no_checkpoints: bool,

    /// Ignore the completion cache for this run.
    #[arg(long)]
    no_cache: bool,

    /// Maximum concurrent calls per stage (0 = unbounded).
    #[arg(short, long)]
    concurrency: Option<usize>,

    /// Reuse a saved candidate_headlines.json instead of sampling the map.
    #[arg(long)]
    headlines: Option<PathBuf>,
}

/// Cache subcommands.
#[derive(Subcommand)]
pub(crate) enum CacheAction {
    /// Delete every cached completion.
    Clear {
        /// Output directory holding the database (defaults to config).
        #[arg(short, long)]
        out: Option<String>,
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
        0 => "debrief=info",
        1 => "debrief=debug",
        _ => "debrief=trace",
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    // stdout carries the briefing, logs go to stderr
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
    match cli.command {
        Command::Brief(args) => cmd_brief(args).await,
        Command::History { limit, out } => cmd_history(limit, out.as_deref()).await,
        Command::Cache { action } => match action {
            CacheAction::Clear { out } => cmd_cache_clear(out.as_deref()).await,
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// brief
// ---------------------------------------------------------------------------

async fn cmd_brief(args: BriefArgs) -> Result<()> {
    let mut config = load_config()?;
    if let Some(out) = &args.out {
        config.defaults.output_dir = out.clone();
    }
    if let Some(concurrency) = args.concurrency {
        config.defaults.concurrency = concurrency;
    }
    if args.no_checkpoints {
        config.defaults.checkpoints = false;
    }
    if args.no_cache {
        config.cache.enabled = false;
    }

    // Validate API keys before doing anything
    let source: Arc<dyn HeadlineSource> = match &args.headlines {
        Some(path) => Arc::new(StaticSource(read_headlines(path)?)),
        None => {
            validate_api_keys(&config)?;
            let atlas_key = resolve_api_key(&config.atlas.api_key_env)?;
            let client = AtlasClient::new(&config.atlas, &atlas_key)?;
            Arc::new(AtlasSource::new(client, config.atlas.project.clone()))
        }
    };
    let llm_key = resolve_api_key(&config.llm.api_key_env)?;

    let persona = match args.persona {
        Some(p) => p,
        None => prompt_persona()?,
    };

    let output_dir = PathBuf::from(&config.defaults.output_dir);
    let storage = Storage::open(&output_dir.join(DB_FILE)).await?;

    let deps = PipelineDeps {
        source,
        llm: Arc::new(OpenAiClient::new(&config.llm, llm_key)?),
        fetcher: Arc::new(ArticleFetcher::new(&config.scrape)?),
        storage: Some(Arc::new(storage)),
    };
    let briefing_config = BriefingConfig::from_app(&config, persona);

    info!(
        output_dir = %output_dir.display(),
        concurrency = briefing_config.concurrency,
        cache = briefing_config.use_cache,
        "starting briefing"
    );

    let reporter = CliProgress::new();
    let briefing = run_briefing(&briefing_config, &deps, &reporter).await;
    reporter.spinner.finish_and_clear();
    let briefing = briefing?;

    print_briefing(&briefing, &output_dir, briefing_config.checkpoints);
    Ok(())
}

/// Ask for the persona on stdin.
fn prompt_persona() -> Result<String> {
    print!("Please enter your reader's persona: ");
    std::io::stdout().flush()?;

    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    let persona = line.trim().to_string();
    if persona.is_empty() {
        return Err(eyre!("a persona is required"));
    }
    Ok(persona)
}

/// Load a headline list written by an earlier run.
fn read_headlines(path: &Path) -> Result<Vec<Headline>> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| eyre!("cannot read '{}': {e}", path.display()))?;
    let headlines: Vec<Headline> = serde_json::from_str(&raw)
        .map_err(|e| eyre!("'{}' is not a headline list: {e}", path.display()))?;
    Ok(headlines)
}

fn print_briefing(briefing: &Briefing, output_dir: &Path, checkpoints: bool) {
    println!();
    println!("Combined Summary:");
    println!("{}", briefing.text.trim());
    println!();
    println!("  Run:        {}", briefing.run_id);
    println!("  Sampled:    {}", briefing.candidate_count);
    println!("  Relevant:   {}", briefing.relevant_count);
    println!("  Summarized: {}", briefing.summarized_count);
    println!("  Model:      {}", briefing.model);
    if checkpoints {
        println!(
            "  Files:      {}",
            run_dir(output_dir, &briefing.run_id).display()
        );
    }
    println!();
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

    fn item_done(&self, stage: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("{stage} [{current}/{total}]"));
    }

    fn done(&self, _briefing: &Briefing) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// history / cache
// ---------------------------------------------------------------------------

/// Open the database under `out`, or the configured output directory.
async fn open_storage(out: Option<&str>) -> Result<Storage> {
    let dir = match out {
        Some(dir) => PathBuf::from(dir),
        None => PathBuf::from(load_config()?.defaults.output_dir),
    };
    Ok(Storage::open(&dir.join(DB_FILE)).await?)
}

async fn cmd_history(limit: usize, out: Option<&str>) -> Result<()> {
    let storage = open_storage(out).await?;
    let runs = storage.list_runs(limit).await?;

    if runs.is_empty() {
        println!("No briefing runs recorded yet.");
        return Ok(());
    }

    for run in runs {
        let persona: String = run.persona.chars().take(40).collect();
        println!(
            "{}  {}  {:<9}  {:>3} sampled  {:>3} relevant  {:>3} summarized  {}",
            run.id,
            run.started_at.format("%Y-%m-%d %H:%M"),
            run.status.as_str(),
            run.candidate_count,
            run.relevant_count,
            run.summarized_count,
            persona,
        );
    }
    Ok(())
}

async fn cmd_cache_clear(out: Option<&str>) -> Result<()> {
    let storage = open_storage(out).await?;
    let removed = storage.clear_completions().await?;
    println!("Removed {removed} cached completions.");
    Ok(())
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_brief_flags() {
        let cli = Cli::try_parse_from([
            "debrief",
            "brief",
            "--persona",
            "Likes astronomy",
            "--no-cache",
            "--concurrency",
            "0",
            "-vv",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        let Command::Brief(args) = cli.command else {
            panic!("expected brief");
        };
        assert_eq!(args.persona.as_deref(), Some("Likes astronomy"));
        assert!(args.no_cache);
        assert!(!args.no_checkpoints);
        assert_eq!(args.concurrency, Some(0));
    }

    #[test]
    fn parses_history_and_cache() {
        let cli = Cli::try_parse_from(["debrief", "history", "--limit", "3"]).unwrap();
        assert!(matches!(cli.command, Command::History { limit: 3, .. }));

        let cli = Cli::try_parse_from(["debrief", "--log-format", "json", "cache", "clear"])
            .unwrap();
        assert!(matches!(cli.log_format, LogFormat::Json));
        assert!(matches!(
            cli.command,
            Command::Cache {
                action: CacheAction::Clear { out: None }
            }
        ));
    }

    #[test]
    fn reads_saved_headlines() {
        let path = std::env::temp_dir().join(format!(
            "debrief_cli_headlines_{}.json",
            std::process::id()
        ));
        std::fs::write(
            &path,
            r#"[{"embed_text": "Probe reaches Jupiter", "feed_title": "Space", "id_field": "7"}]"#,
        )
        .unwrap();

        let headlines = read_headlines(&path).unwrap();
        assert_eq!(headlines.len(), 1);
        assert_eq!(headlines[0].embed_text, "Probe reaches Jupiter");
        assert_eq!(headlines[0].extra["id_field"], "7");
    }
}
