//! # askpdf CLI
//!
//! Ask questions about uploaded documents and get answers grounded in
//! their content.
//!
//! ## Usage
//!
//! ```bash
//! askpdf --config ./config/askpdf.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `askpdf init` | Create the SQLite database and data directories |
//! | `askpdf ingest <path>` | Extract, chunk, embed and index a document |
//! | `askpdf ask <document> "<question>"` | Answer one question from the command line |
//! | `askpdf questions <document>` | Show (or `--delete`) the question history |
//! | `askpdf serve` | Start the HTTP and WebSocket server |
//!
//! Verbosity is controlled with `RUST_LOG` (default `info`). A `.env` file
//! in the working directory is loaded before anything else.

use askpdf::{commands, config, server};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "askpdf",
    about = "askpdf — grounded question answering over your documents",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/askpdf.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema and data directories.
    ///
    /// Idempotent: running it multiple times is safe.
    Init,

    /// Index a document from disk.
    ///
    /// Re-ingesting a document name replaces its index.
    Ingest {
        /// PDF, DOCX, or plain-text file.
        path: PathBuf,

        /// Document name to index under. Defaults to the file name.
        #[arg(long)]
        name: Option<String>,
    },

    /// Answer a single question about an indexed document.
    Ask {
        document: String,
        question: String,
    },

    /// List the questions asked about a document.
    Questions {
        document: String,

        /// Delete the history instead of listing it.
        #[arg(long)]
        delete: bool,
    },

    /// Start the HTTP and WebSocket server.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            commands::run_init(&cfg).await?;
        }
        Commands::Ingest { path, name } => {
            commands::run_ingest(&cfg, &path, name).await?;
        }
        Commands::Ask { document, question } => {
            commands::run_ask(&cfg, &document, &question).await?;
        }
        Commands::Questions { document, delete } => {
            commands::run_questions(&cfg, &document, delete).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
