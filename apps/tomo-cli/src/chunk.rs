use anyhow::{Context, Result};
use clap::Args;
use std::path::{Path, PathBuf};
use tomo_retrieval::corpus::write_chunks;
use tomo_retrieval::{chunk_records, ChunkRecord, ChunkerConfig};

#[derive(Args, Debug)]
pub struct ChunkArgs {
    /// Plain-text document to split
    #[arg(long)]
    pub input: PathBuf,

    /// Output chunk file (JSONL)
    #[arg(long)]
    pub out: PathBuf,

    /// Maximum chunk length in characters
    #[arg(long, default_value_t = 1000)]
    pub max_chars: usize,

    /// Characters shared between consecutive pieces of a long paragraph
    #[arg(long, default_value_t = 200)]
    pub overlap: usize,

    /// Source label stored with every chunk (default: input file stem)
    #[arg(long)]
    pub source: Option<String>,
}

pub fn run(args: ChunkArgs) -> Result<()> {
    let records = chunk_file(&args)?;
    write_chunks(&args.out, &records)
        .with_context(|| format!("failed to write {}", args.out.display()))?;

    tracing::info!(
        "Wrote {} chunks from {} to {}",
        records.len(),
        args.input.display(),
        args.out.display()
    );
    println!("{} chunks -> {}", records.len(), args.out.display());
    Ok(())
}

fn chunk_file(args: &ChunkArgs) -> Result<Vec<ChunkRecord>> {
    let text = std::fs::read_to_string(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;

    let source = args
        .source
        .clone()
        .unwrap_or_else(|| source_label(&args.input));

    let config = ChunkerConfig {
        max_chars: args.max_chars,
        overlap: args.overlap,
    };
    Ok(chunk_records(&text, &source, &config)?)
}

fn source_label(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| tomo_retrieval::UNKNOWN_SOURCE.to_string())
}
