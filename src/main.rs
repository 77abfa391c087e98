//! # pdfchat CLI
//!
//! The `pdfchat` binary runs the HTTP server and exposes each pipeline
//! stage for local use.
//!
//! ## Usage
//!
//! ```bash
//! pdfchat --config ./config/pdfchat.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `pdfchat serve` | Start the HTTP API |
//! | `pdfchat extract <pdf>` | Extract text, tables and page images without indexing |
//! | `pdfchat ingest <pdf>` | Extract and index a PDF as the new corpus |
//! | `pdfchat search "<query>"` | Nearest passages in the current corpus |
//! | `pdfchat ask "<message>"` | One chat turn against the current corpus |
//! | `pdfchat status` | Show the committed corpus stamp |
//!
//! Log verbosity follows `RUST_LOG` (default `info`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use pdfchat::{chat, config, extract, ingest, search, server};

/// pdfchat: ask questions about a PDF's text, tables and pages.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. A missing file means built-in defaults plus environment overrides.
#[derive(Parser)]
#[command(
    name = "pdfchat",
    about = "Retrieval-augmented chat over an uploaded PDF",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/pdfchat.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server on `[server].bind`.
    Serve,

    /// Run extraction only and print what was found.
    Extract {
        /// PDF file to read.
        pdf: PathBuf,

        /// Write rendered page images to this directory.
        #[arg(long)]
        images_out: Option<PathBuf>,
    },

    /// Extract and index a PDF, replacing the current corpus.
    Ingest {
        /// PDF file to index.
        pdf: PathBuf,
    },

    /// Retrieve the passages closest to a query.
    Search {
        /// Query text.
        query: String,

        /// Maximum number of results (defaults to `[retrieval].top_k`).
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Ask one question about the indexed PDF.
    Ask {
        /// The message to send.
        message: String,

        /// Session id for the turn.
        #[arg(long, default_value = chat::DEFAULT_SESSION)]
        session: String,
    },

    /// Show the committed corpus.
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Extract { pdf, images_out } => {
            extract::run_extract(&cfg, &pdf, images_out.as_deref()).await?;
        }
        Commands::Ingest { pdf } => {
            ingest::run_ingest(&cfg, &pdf).await?;
        }
        Commands::Search { query, limit } => {
            search::run_search(&cfg, &query, limit).await?;
        }
        Commands::Ask { message, session } => {
            chat::run_ask(&cfg, &message, &session).await?;
        }
        Commands::Status => {
            chat::run_status(&cfg).await?;
        }
    }

    Ok(())
}
