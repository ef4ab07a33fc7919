//! # Bulletin Ingest CLI (`bulletin`)
//!
//! Ingests the daily wholesale price bulletins published as PDFs: discovers
//! new bulletin links, keeps a ledger of what has been processed, parses the
//! price table of page 1, and writes each bulletin out as CSV and as keyed
//! records in SQLite.
//!
//! ## Usage
//!
//! ```bash
//! bulletin --config ./config/bulletin.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `bulletin init` | Create the SQLite record store schema |
//! | `bulletin sync` | Discover new bulletins on the source page and ingest them |
//! | `bulletin sync --links [FILE]` | Ingest the links listed in FILE, default `pdf_links.txt` (manual backfill) |
//! | `bulletin parse <PDF>` | Parse a local bulletin and print its records as CSV |
//! | `bulletin ledger` | Print the processed ledger |
//! | `bulletin serve` | Start the HTTP trigger (`POST /run`) |
//!
//! ## Examples
//!
//! ```bash
//! # Daily run
//! bulletin sync --config ./config/bulletin.toml
//!
//! # See what would be ingested, without fetching any bulletin
//! bulletin sync --dry-run
//!
//! # Backfill from the seeded list, 20 bulletins at a time
//! bulletin sync --links --limit 20
//!
//! # Debug a bulletin that failed to parse
//! RUST_LOG=debug bulletin parse ./daily_24-02-2024.pdf
//! ```

use bulletin_ingest::{config, ledger, migrate, pipeline, progress::ProgressMode, server};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Bulletin Ingest: idempotent ingestion of daily commodity price bulletins.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/bulletin.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "bulletin",
    about = "Idempotent ingestion of daily commodity price bulletins published as PDFs",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/bulletin.toml`. `parse` and `ledger` fall back to
    /// built-in defaults when the file does not exist.
    #[arg(long, global = true, default_value = "./config/bulletin.toml")]
    config: PathBuf,

    /// Progress on stderr.
    /// Defaults to `human` when stderr is a terminal, `off` otherwise.
    #[arg(long, global = true, value_enum)]
    progress: Option<ProgressMode>,

    /// Emit log lines as JSON.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the record store schema.
    ///
    /// Creates the SQLite database file and the `price_records` table.
    /// Idempotent.
    Init,

    /// Run the pipeline once.
    ///
    /// Without `--links`, bulletin links are discovered on `[source].url`.
    /// Links already in the ledger are skipped; failed bulletins stay out of
    /// the ledger and are retried by the next run.
    Sync {
        /// Read links from a file (one per line) instead of the source page.
        /// Without a value, `[source].links_file` is used.
        #[arg(long, value_name = "FILE")]
        links: Option<Option<PathBuf>>,

        /// List the links that would be processed, without fetching them.
        #[arg(long)]
        dry_run: bool,

        /// Process at most N new bulletins; the rest wait for the next run.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Parse a local bulletin PDF and print its records as CSV.
    Parse {
        /// Path to the PDF.
        pdf: PathBuf,
    },

    /// Print the processed ledger.
    Ledger,

    /// Start the HTTP trigger.
    ///
    /// Listens on `[server].bind`. `POST /run` runs the pipeline in discovery
    /// mode and returns the run report as JSON.
    Serve,
}

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.with_target(false).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_json);

    let progress = cli.progress.unwrap_or_else(ProgressMode::default_for_tty);

    // Commands that work without a config file
    match &cli.command {
        Commands::Parse { pdf } => {
            let cfg = load_or_default(&cli.config)?;
            pipeline::run_parse(&cfg, pdf)?;
            return Ok(());
        }
        Commands::Ledger => {
            let cfg = load_or_default(&cli.config)?;
            ledger::run_ledger(&cfg).await?;
            return Ok(());
        }
        _ => {}
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Record store initialized successfully.");
        }
        Commands::Sync {
            links,
            dry_run,
            limit,
        } => {
            let links = links.map(|file| file.unwrap_or_else(|| cfg.source.links_file.clone()));
            pipeline::run_sync(&cfg, links, dry_run, limit, progress).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Parse { .. } | Commands::Ledger => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}

/// Loads the config file if present; a missing file means all defaults.
fn load_or_default(path: &std::path::Path) -> anyhow::Result<config::Config> {
    if path.exists() {
        config::load_config(path)
    } else {
        Ok(config::Config::minimal())
    }
}
