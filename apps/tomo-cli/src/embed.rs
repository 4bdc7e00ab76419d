use crate::EmbedderArgs;
use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use tomo_retrieval::corpus::{read_chunks, write_embedded};
use tomo_retrieval::{ChunkRecord, EmbeddedChunk, Embedder, OpenAiEmbedder};

#[derive(Args, Debug)]
pub struct EmbedArgs {
    /// Chunk file produced by `tomo chunk`
    #[arg(long)]
    pub chunks: PathBuf,

    /// Output embedded corpus (JSONL)
    #[arg(long)]
    pub out: PathBuf,

    #[command(flatten)]
    pub embedder: EmbedderArgs,
}

pub fn run(args: EmbedArgs) -> Result<()> {
    let records = read_chunks(&args.chunks)
        .with_context(|| format!("failed to read {}", args.chunks.display()))?;
    let embedder = OpenAiEmbedder::from_config(&args.embedder.config())?;

    tracing::info!(
        "Embedding {} chunks with {} (batch size {})",
        records.len(),
        embedder.model(),
        embedder.batch_size()
    );
    let embedded = embed_records(&embedder, records)?;

    write_embedded(&args.out, &embedded)
        .with_context(|| format!("failed to write {}", args.out.display()))?;
    println!("{} embedded chunks -> {}", embedded.len(), args.out.display());
    Ok(())
}

/// Attach an embedding to every record, preserving order.
fn embed_records(embedder: &dyn Embedder, records: Vec<ChunkRecord>) -> Result<Vec<EmbeddedChunk>> {
    let texts: Vec<&str> = records.iter().map(|r| r.text.as_str()).collect();
    let vectors = embedder.encode_batch(&texts)?;
    anyhow::ensure!(
        vectors.len() == records.len(),
        "embedder returned {} vectors for {} chunks",
        vectors.len(),
        records.len()
    );

    Ok(records
        .into_iter()
        .zip(vectors)
        .map(|(record, embedding)| EmbeddedChunk { record, embedding })
        .collect())
}
