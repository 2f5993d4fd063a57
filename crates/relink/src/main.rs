mod commands;
mod config;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use config::{Config, ConfigOverrides};
use relink_core::{Renamer, RestStore};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "relink",
    version,
    about = "Rename a note in an Obsidian vault and rewrite every wikilink to it"
)]
struct Cli {
    /// Config file (default: ./relink.toml, if present).
    #[arg(long, env = "RELINK_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Base URL of the Local REST API.
    #[arg(long, env = "OBSIDIAN_API_URL", global = true)]
    base_url: Option<String>,

    /// API key; read from the configured key file when absent.
    #[arg(long, env = "OBSIDIAN_API_KEY", global = true, hide_env_values = true)]
    api_key: Option<String>,

    /// Documents processed at once.
    #[arg(long, global = true)]
    concurrency: Option<usize>,

    /// Per-request timeout in seconds.
    #[arg(long, value_name = "SECS", global = true, value_parser = clap::value_parser!(u64).range(1..))]
    timeout: Option<u64>,

    /// Debug logging.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Warnings and errors only.
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Rename a note and rewrite the links that point at it.
    Mv {
        /// Current note name, e.g. "Projects/Popular Note".
        old: String,
        /// New note name.
        new: String,
        /// Show what would change without writing anything.
        #[arg(long)]
        dry_run: bool,
        /// Print the outcome as JSON.
        #[arg(long)]
        json: bool,
    },
    /// List the links that point at a note.
    Refs {
        note: String,
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("{} {:#}", "error:".red().bold(), err);
            ExitCode::from(1)
        }
    }
}

fn init_tracing(verbose: bool, quiet: bool) {
    let level = if verbose {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };
    let default_filter = format!("relink={level},relink_core={level}");
    let filter = if verbose || quiet {
        EnvFilter::new(default_filter)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<u8> {
    let mut config = Config::load(cli.config.as_deref())?;
    config
        .apply(ConfigOverrides {
            base_url: cli.base_url,
            api_key: cli.api_key,
            concurrency: cli.concurrency,
            timeout_secs: cli.timeout,
        })
        .context("Invalid settings")?;

    let dry_run = matches!(cli.command, Command::Mv { dry_run: true, .. });
    let store =
        RestStore::new(config.store_config()?).context("Failed to set up the REST API client")?;
    tracing::debug!("Using vault at {}", store.base_url());
    let renamer = Renamer::new(store, config.rename_options(dry_run));
    let mut stdout = std::io::stdout().lock();

    match cli.command {
        Command::Mv { old, new, json, .. } => {
            let status = commands::mv::run(&renamer, &old, &new, json, &mut stdout).await?;
            Ok(commands::mv::exit_code(status))
        }
        Command::Refs { note, json } => {
            commands::refs::run(&renamer, &note, json, &mut stdout).await?;
            Ok(0)
        }
    }
}
