//! # EAD Import CLI (`eadi`)
//!
//! The `eadi` binary imports EAD finding aids into the record store and
//! the search index.
//!
//! ## Usage
//!
//! ```bash
//! eadi --config ./config/eadi.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `eadi init` | Create the SQLite database and run schema migrations |
//! | `eadi import <paths..>` | Import files and directories of finding aids |
//! | `eadi stats` | Show record counts per service |
//! | `eadi get <stable_id>` | Print a stored record as JSON |
//!
//! Logging goes to stderr through `tracing`; set `RUST_LOG` or pass
//! `--verbose` for more detail.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use ead_import::progress::ProgressMode;
use ead_import::{batch, config, get, migrate, stats};

/// EAD Import CLI: batch importer for archival finding aids.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/eadi.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "eadi",
    about = "EAD Import: batch importer for archival finding aids",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/eadi.toml")]
    config: PathBuf,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables. This
    /// command is idempotent.
    Init,

    /// Import finding aids.
    ///
    /// Directories are searched recursively for `.xml` files. A file whose
    /// base name was already imported is skipped unless `--reimport` is
    /// given.
    Import {
        /// Files or directories to import.
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Replace finding aids that were already imported when their content changed.
        #[arg(long)]
        reimport: bool,

        /// With --reimport, replace even when the content is unchanged.
        #[arg(long)]
        force_delete: bool,

        /// Number of workers (default: available parallelism minus one).
        #[arg(long)]
        workers: Option<usize>,

        /// Run the whole pipeline against an in-memory store and index.
        #[arg(long)]
        dry_run: bool,

        /// Progress output on stderr (default: human when stderr is a TTY).
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Show database statistics.
    Stats,

    /// Print a stored record by stable identifier.
    Get {
        /// Stable identifier (hex SHA-256).
        stable_id: String,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Import {
            paths,
            reimport,
            force_delete,
            workers,
            dry_run,
            progress,
        } => {
            cfg.import.reimport |= reimport || force_delete;
            cfg.import.force_delete |= force_delete;
            if let Some(n) = workers {
                if n == 0 {
                    anyhow::bail!("--workers must be >= 1");
                }
                cfg.import.workers = Some(n);
            }
            let progress = progress.unwrap_or_else(ProgressMode::default_for_tty);
            batch::run_import(&cfg, &paths, dry_run, progress.reporter()).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Get { stable_id } => {
            get::run_get(&cfg, &stable_id).await?;
        }
    }

    Ok(())
}
