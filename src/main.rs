//! # docqa CLI
//!
//! ## Usage
//!
//! ```bash
//! docqa --config ./config/docqa.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docqa ingest <files...>` | Extract, chunk, embed, and index files |
//! | `docqa ask "<question>"` | Answer a question from the indexed files |
//! | `docqa serve` | Start the HTTP server |
//! | `docqa stats` | Print indexed file and chunk counts |
//! | `docqa reset` | Delete the persisted index |
//!
//! `ingest`, `ask`, and `serve` need `OPENAI_API_KEY` in the environment.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use docqa::app::App;
use docqa::config::{self, Config};
use docqa::ingest::{FileOutcome, UploadedFile};
use docqa::store::{FileIndexStore, IndexStore};

/// Question answering over your documents.
#[derive(Parser)]
#[command(name = "docqa", version)]
struct Cli {
    /// Path to configuration file (TOML). Defaults apply when it is missing.
    #[arg(long, global = true, default_value = "./config/docqa.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest files into the index.
    ///
    /// Files already indexed (by content hash) are skipped, as are files
    /// with an unsupported extension.
    Ingest {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Answer a question using the indexed files.
    Ask {
        question: String,

        /// Print the answer and context as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Start the HTTP server.
    Serve {
        /// Override `[server].bind`.
        #[arg(long)]
        bind: Option<String>,
    },

    /// Show index statistics.
    Stats,

    /// Delete the persisted index.
    Reset,
}

#[tokio::main]
async fn main() -> Result<()> {
    docqa::logging::init();
    let cli = Cli::parse();
    let mut cfg = config::load_or_default(&cli.config)?;

    match cli.command {
        Commands::Ingest { files } => {
            let app = build_app(&cfg)?;
            let mut uploads = Vec::with_capacity(files.len());
            for path in &files {
                let bytes = std::fs::read(path)
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string());
                uploads.push(UploadedFile::new(name, bytes));
            }

            let report = app.ingestor.ingest(uploads).await?;
            for file in &report.files {
                match &file.outcome {
                    FileOutcome::Indexed { chunks } => {
                        println!("indexed  {} ({} chunks)", file.filename, chunks)
                    }
                    FileOutcome::Skipped { reason } => {
                        println!("skipped  {} ({:?})", file.filename, reason)
                    }
                    FileOutcome::Failed { stage, reason } => {
                        println!("failed   {} ({:?}: {})", file.filename, stage, reason)
                    }
                }
            }
            println!(
                "{} indexed, {} skipped, {} failed; {} chunks in index",
                report.count(|o| matches!(o, FileOutcome::Indexed { .. })),
                report.count(|o| matches!(o, FileOutcome::Skipped { .. })),
                report.count(|o| matches!(o, FileOutcome::Failed { .. })),
                report.total_chunks
            );
        }
        Commands::Ask { question, json } => {
            let app = build_app(&cfg)?;
            let answer = app.engine.ask(&question).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&answer)?);
            } else {
                println!("{}", answer.answer);
            }
        }
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                cfg.server.bind = bind;
            }
            let app = build_app(&cfg)?;
            docqa::server::run_server(&cfg, Arc::new(app)).await?;
        }
        Commands::Stats => {
            let index = FileIndexStore::new(&cfg.storage.dir).load()?;
            println!("files:  {}", index.metadata().hashes.len());
            println!("chunks: {}", index.len());
            println!("dims:   {}", index.dims());
        }
        Commands::Reset => {
            FileIndexStore::new(&cfg.storage.dir).reset()?;
            println!("index reset: {}", cfg.storage.dir.display());
        }
    }

    Ok(())
}

fn build_app(cfg: &Config) -> Result<App> {
    let key = config::api_key()?;
    App::from_config(cfg, &key)
}
