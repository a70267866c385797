//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use meshctx_core::{
    CollectOutcome, CollectParams, IstioConnector, ProgressReporter, build_prompt,
    collect_topology,
};
use meshctx_shared::{AppConfig, init_config, load_config, load_config_from};
use meshctx_storage::Storage;
use tracing::info;

use crate::serve;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// meshctx: service-mesh topology as context for AI agents.
#[derive(Parser)]
#[command(
    name = "meshctx",
    version,
    about = "Extract service-mesh topology from Prometheus and assemble per-workload context documents.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ~/.meshctx/meshctx.toml).
    #[arg(long, env = "MESHCTX_CONFIG", global = true)]
    pub config: Option<PathBuf>,

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
    /// Start the HTTP API server.
    Serve {
        /// Listen port (falls back to PORT, then the config file).
        #[arg(long, env = "MESHCTX_PORT")]
        port: Option<u16>,

        /// Listen address.
        #[arg(long, env = "MESHCTX_BIND")]
        bind: Option<String>,

        /// Prometheus instance name (defaults to the first configured).
        #[arg(long)]
        prometheus: Option<String>,
    },

    /// Collect the topology once and store a snapshot.
    Collect {
        /// Window start (RFC 3339 or Unix seconds).
        #[arg(long)]
        from: Option<String>,

        /// Window end (RFC 3339 or Unix seconds).
        #[arg(long)]
        to: Option<String>,

        /// Prometheus instance name (defaults to the first configured).
        #[arg(long)]
        prometheus: Option<String>,

        /// Print the adjacency list as JSON instead of a summary.
        #[arg(long)]
        json: bool,
    },

    /// Print the prompt document built from the latest snapshot.
    Prompt,

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
        0 => "meshctx=info,tower_http=info",
        1 => "meshctx=debug,tower_http=debug",
        _ => "meshctx=trace,tower_http=trace",
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
        Command::Serve {
            port,
            bind,
            prometheus,
        } => cmd_serve(config_path, port, bind, prometheus.as_deref()).await,
        Command::Collect {
            from,
            to,
            prometheus,
            json,
        } => cmd_collect(config_path, from, to, prometheus.as_deref(), json).await,
        Command::Prompt => cmd_prompt(config_path).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(config_path).await,
        },
    }
}

fn load(path: Option<PathBuf>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => load_config_from(&path)?,
        None => load_config()?,
    };
    Ok(config)
}

async fn open_store(config: &AppConfig) -> Result<Storage> {
    let path = config.storage.resolved_path()?;
    Storage::open(&path)
        .await
        .wrap_err_with(|| format!("failed to open topology store at {}", path.display()))
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_serve(
    config_path: Option<PathBuf>,
    port: Option<u16>,
    bind: Option<String>,
    prometheus: Option<&str>,
) -> Result<()> {
    let config = load(config_path)?;

    let port = port
        .or_else(|| std::env::var("PORT").ok().and_then(|p| p.parse().ok()))
        .unwrap_or(config.server.port);
    let bind = bind.unwrap_or_else(|| config.server.bind.clone());

    let connector = IstioConnector::from_config(&config, prometheus)?;
    let store = open_store(&config).await?;
    info!(prometheus = connector.base_url(), "using Prometheus backend");

    serve::start_server(config, Arc::new(connector), Arc::new(store), &bind, port).await
}

async fn cmd_collect(
    config_path: Option<PathBuf>,
    from: Option<String>,
    to: Option<String>,
    prometheus: Option<&str>,
    json: bool,
) -> Result<()> {
    let config = load(config_path)?;
    let connector = IstioConnector::from_config(&config, prometheus)?;
    let store = open_store(&config).await?;

    let params = CollectParams {
        from_timestamp: from,
        to_timestamp: to,
    };

    let reporter = CliProgress::new()?;
    let outcome = collect_topology(
        &connector,
        &store,
        &config.topology,
        &params,
        &reporter,
    )
    .await;
    reporter.spinner.finish_and_clear();
    let outcome = outcome?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&outcome.adjacency_list)?
        );
        return Ok(());
    }

    println!();
    println!("  Topology collected!");
    println!("  Snapshot:  {}", outcome.snapshot_id);
    println!("  Connector: {}", outcome.connector);
    match (&outcome.window, outcome.time_window_minutes) {
        (Some(window), Some(minutes)) => {
            println!("  Window:    last {minutes} minutes (from {})", window.from())
        }
        (Some(window), None) => println!("  Window:    {} .. {}", window.from(), window.to()),
        (None, _) => println!("  Window:    instant"),
    }
    println!("  Sources:   {}", outcome.adjacency_list.source_count());
    println!("  Edges:     {}", outcome.adjacency_list.edge_count());
    println!("  Time:      {:.1}s", outcome.elapsed.as_secs_f64());
    println!();

    Ok(())
}

async fn cmd_prompt(config_path: Option<PathBuf>) -> Result<()> {
    let config = load(config_path)?;
    let store = open_store(&config).await?;
    let document = build_prompt(&store, &config).await?;
    println!("{}", serde_json::to_string_pretty(&document)?);
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config_path: Option<PathBuf>) -> Result<()> {
    let config = load(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Result<Self> {
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .map_err(|e| eyre!("invalid progress template: {e}"))?
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Ok(Self { spinner })
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn done(&self, _outcome: &CollectOutcome) {
        self.spinner.finish_and_clear();
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
    fn collect_accepts_window_flags() {
        let cli = Cli::try_parse_from([
            "meshctx",
            "collect",
            "--from",
            "2024-01-01T00:00:00Z",
            "--to",
            "1704070800",
        ])
        .unwrap();
        match cli.command {
            Command::Collect { from, to, .. } => {
                assert_eq!(from.as_deref(), Some("2024-01-01T00:00:00Z"));
                assert_eq!(to.as_deref(), Some("1704070800"));
            }
            _ => panic!("expected collect"),
        }
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "meshctx",
            "prompt",
            "--config",
            "fixtures/config/meshctx.toml",
            "-vv",
            "--log-format",
            "json",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.log_format, LogFormat::Json));
        assert_eq!(
            cli.config,
            Some(PathBuf::from("fixtures/config/meshctx.toml"))
        );
    }

    #[test]
    fn fixture_config_loads_through_cli_path() {
        let config = load(Some(PathBuf::from("../../fixtures/config/meshctx.toml"))).unwrap();
        assert_eq!(config.server.port, 8080);
        let connector = IstioConnector::from_config(&config, Some("secondary")).unwrap();
        assert!(connector.base_url().starts_with("https://"));
    }
}
