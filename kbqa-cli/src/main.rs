use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use kbqa_cli::{AppConfig, QaPipeline};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing_subscriber::EnvFilter;

const PROMPT: &str = "question ('quit' or Ctrl+D to exit)> ";

/// Ask questions about a collection of text documents.
#[derive(Debug, Parser)]
#[command(name = "kbqa", version, about)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, env = "KBQA_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Additional document to index (repeatable)
    #[arg(short, long = "file", value_name = "PATH", action = clap::ArgAction::Append)]
    file: Vec<PathBuf>,

    /// Rebuild the index even if a saved one matches the documents
    #[arg(long)]
    reindex: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config =
        AppConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    config.documents.file_paths.extend(cli.file);

    let mut pipeline = QaPipeline::from_config(&config).context("failed to initialize")?;
    let status = pipeline.setup(cli.reindex).await;
    if !status.is_ready() {
        eprintln!("No index is available, so questions cannot be answered from documents.");
    }

    println!("\nReady. Ask a question.");
    let mut rl = DefaultEditor::new()?;
    loop {
        let line = match rl.readline(PROMPT) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };

        let query = line.trim();
        if query.is_empty() {
            println!("The question cannot be empty, please try again.");
            continue;
        }
        if query.eq_ignore_ascii_case("quit") {
            break;
        }
        rl.add_history_entry(query).ok();

        let answer = pipeline.ask(query).await;
        println!("\nAnswer:\n{answer}\n");
    }

    println!("Bye.");
    Ok(())
}
