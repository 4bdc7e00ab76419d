//! `tomo`: build and query a semantic search corpus from the command line.
//!
//! ```text
//! tomo chunk --input libro.txt --out chunks.jsonl
//! tomo embed --chunks chunks.jsonl --out embedded.jsonl
//! tomo ask --corpus embedded.jsonl --question "¿Qué es un agente?"
//! ```

mod ask;
mod chunk;
mod embed;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tomo_retrieval::EmbedderConfig;
use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "tomo", version, about = "Semantic search over chunked documents")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Split a text file into overlapping chunks (JSONL)
    Chunk(chunk::ChunkArgs),
    /// Embed a chunk file into an embedded corpus (JSONL)
    Embed(embed::EmbedArgs),
    /// Ask questions against an embedded corpus
    Ask(ask::AskArgs),
}

/// Embedding endpoint options shared by `embed` and `ask`.
#[derive(Args, Debug, Clone)]
pub struct EmbedderArgs {
    /// OpenAI-compatible API base URL
    #[arg(long, env = "TOMO_EMBED_BASE_URL", default_value = "https://api.openai.com/v1")]
    embed_base_url: String,

    /// Embedding model; must match the one used to build the corpus
    #[arg(long, env = "TOMO_EMBED_MODEL", default_value = "text-embedding-3-small")]
    embed_model: String,

    /// Requested embedding dimension, for models that support it
    #[arg(long)]
    embed_dimensions: Option<usize>,

    /// Inputs per embedding request
    #[arg(long, default_value_t = 32)]
    batch_size: usize,

    /// HTTP timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,
}

impl EmbedderArgs {
    pub fn config(&self) -> EmbedderConfig {
        EmbedderConfig {
            base_url: self.embed_base_url.clone(),
            model: self.embed_model.clone(),
            dimensions: self.embed_dimensions,
            timeout_secs: self.timeout_secs,
            batch_size: self.batch_size,
            ..EmbedderConfig::default()
        }
    }
}

fn main() -> Result<()> {
    // Logs go to stderr; stdout carries command output
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Chunk(args) => chunk::run(args),
        Command::Embed(args) => embed::run(args),
        Command::Ask(args) => ask::run(args),
    }
}
