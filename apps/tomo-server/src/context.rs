//! Application context shared by every request handler.

use crate::config::ServerConfig;
use crate::metrics::SearchMetrics;
use anyhow::Context as _;
use tomo_retrieval::{Corpus, OpenAiEmbedder, OpenAiGenerator, Retriever};

/// Immutable state built once at startup.
pub struct AppContext {
    pub retriever: Retriever,
    pub metrics: SearchMetrics,
}

impl AppContext {
    pub fn new(retriever: Retriever) -> Self {
        Self {
            retriever,
            metrics: SearchMetrics::new(),
        }
    }

    /// Load the corpus, build the index, and connect the configured clients.
    ///
    /// Must run outside an async runtime: the embedding and generation
    /// clients are blocking.
    pub fn from_config(config: &ServerConfig) -> anyhow::Result<Self> {
        let corpus = Corpus::load(&config.corpus)
            .with_context(|| format!("failed to load corpus {}", config.corpus.display()))?;

        let embedder = OpenAiEmbedder::from_config(&config.embedder)?;
        tracing::info!("Embedder: {} at {}", embedder.model(), config.embedder.base_url);

        let mut retriever =
            Retriever::from_corpus(corpus, config.retrieval.backend, Box::new(embedder))?
                .with_config(config.retrieval.retriever);

        match &config.generator {
            Some(generator_config) => {
                let generator = OpenAiGenerator::from_config(generator_config)?;
                tracing::info!(
                    "Generator: {} at {}",
                    generator.model(),
                    generator_config.base_url
                );
                retriever = retriever.with_generator(Box::new(generator));
            }
            None => tracing::info!("No generator configured, answers will contain passages only"),
        }

        tracing::info!(
            "Retriever ready: chunks={}, dimensions={}, backend={}",
            retriever.len(),
            retriever.dimensions(),
            retriever.backend()
        );

        Ok(Self::new(retriever))
    }
}
