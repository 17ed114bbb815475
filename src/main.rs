//! # SmartDoc CLI (`smartdoc`)
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `smartdoc init` | Create the SQLite database and run schema migrations |
//! | `smartdoc import <chunks.jsonl>` | Register sources and add pre-chunked content |
//! | `smartdoc query "<text>"` | Answer a question, reanalyzing schematics on low confidence |
//! | `smartdoc sources` | List registered sources |
//! | `smartdoc logs <source>` | Show processing logs for a source |
//! | `smartdoc stats` | Registry and chunk store statistics |
//! | `smartdoc remove <source>` | Delete a source with its chunks, cache entries, and logs |
//!
//! ## Examples
//!
//! ```bash
//! smartdoc init --config ./config/smartdoc.toml
//! smartdoc import ./out/nano-r4.jsonl
//! smartdoc query "What are the SPI pins on the Nano?"
//! smartdoc query "I2C address of the IMU" --source nano.pdf --reprocess
//! smartdoc query "UART pinout" --type pdf --json
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use smartdoc::config::{self, DEFAULT_CONFIG_PATH};
use smartdoc::query::{self, QueryRequest};
use smartdoc::workspace::Workspace;
use smartdoc::{import, migrate, sources, stats};
use smartdoc_core::models::SourceType;

#[derive(Parser)]
#[command(
    name = "smartdoc",
    about = "SmartDoc: document retrieval with query-focused schematic reanalysis",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Import chunks from a JSON Lines file.
    ///
    /// Each line is one chunk (`source`, `source_type`, `content`, and
    /// optionally `id`, `location`, `category`, `metadata`). Sources are
    /// registered and marked `success` once their chunks are stored.
    Import {
        /// Path to the `.jsonl` file.
        path: PathBuf,
    },

    /// Answer a question from the indexed documents.
    ///
    /// Low-confidence answers to schematic questions trigger a vision
    /// reanalysis of the relevant diagrams.
    Query {
        /// The question.
        text: String,

        /// Restrict retrieval to one source path or URL.
        #[arg(long)]
        source: Option<String>,

        /// Restrict retrieval to a source type (`pdf`, `github`, `web`).
        #[arg(long = "type")]
        source_type: Option<String>,

        /// Reanalyze schematics regardless of confidence.
        #[arg(long)]
        reprocess: bool,

        /// Print the full response as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List registered sources.
    Sources {
        /// Only show sources of this type.
        #[arg(long = "type")]
        source_type: Option<String>,
    },

    /// Show processing logs for a source, oldest first.
    Logs {
        /// Source path or URL.
        source: String,
    },

    /// Show registry and chunk store statistics.
    Stats,

    /// Remove a source with its chunks, cache entries, and logs.
    Remove {
        /// Source path or URL.
        source: String,
    },
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    init_tracing(&cfg.logging.level);

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized at {}", cfg.db.path.display());
        }
        Commands::Import { path } => {
            let ws = Workspace::open(&cfg).await?;
            import::run_import(&ws, &path).await?;
        }
        Commands::Query {
            text,
            source,
            source_type,
            reprocess,
            json,
        } => {
            let filter = query::parse_filter(source.as_deref(), source_type.as_deref())?;
            let ws = Workspace::open(&cfg).await?;
            let request = QueryRequest::new(text)
                .with_filter(filter)
                .force_reprocess(reprocess);
            query::run_query(&ws, &request, json).await?;
        }
        Commands::Sources { source_type } => {
            let source_type = source_type
                .map(|t| t.parse::<SourceType>())
                .transpose()?;
            let ws = Workspace::open(&cfg).await?;
            sources::list_sources(&ws, source_type).await?;
        }
        Commands::Logs { source } => {
            let ws = Workspace::open(&cfg).await?;
            sources::show_logs(&ws, &source).await?;
        }
        Commands::Stats => {
            let ws = Workspace::open(&cfg).await?;
            stats::run_stats(&cfg, &ws).await?;
        }
        Commands::Remove { source } => {
            let ws = Workspace::open(&cfg).await?;
            sources::remove_source(&ws, &source).await?;
        }
    }

    Ok(())
}
