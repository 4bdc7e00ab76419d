//! The retrieval façade.
//!
//! A [`Retriever`] owns everything a question needs: the embedder, the
//! built similarity index, the aligned chunk metadata, and optionally a
//! generator. It is built once and shared read-only (`Arc<Retriever>`);
//! nothing on the query path takes a lock.

use crate::corpus::Corpus;
use crate::embedder::Embedder;
use crate::generator::Generator;
use crate::record::ChunkRecord;
use crate::{Result, RetrievalError};
use serde::{Deserialize, Serialize};
use tomo_vector::{build_index_with, BackendKind, BackendPreference, Index, SimilarityIndex};

/// Query-time knobs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetrieverConfig {
    /// Passages requested by [`Retriever::answer`].
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Minimum best score for a result set to count as relevant.
    #[serde(default = "default_threshold")]
    pub threshold: f32,

    /// Minimum score for a passage to enter the generator context.
    ///
    /// Applied only after gating: the generator is never called unless the
    /// best passage reaches `threshold`, so when this is below `threshold` it
    /// only filters the lower-ranked passages that follow the best one.
    #[serde(default = "default_context_min_score")]
    pub context_min_score: f32,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            threshold: default_threshold(),
            context_min_score: default_context_min_score(),
        }
    }
}

fn default_top_k() -> usize {
    4
}

fn default_threshold() -> f32 {
    0.60
}

fn default_context_min_score() -> f32 {
    0.35
}

impl RetrieverConfig {
    pub fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            return Err(RetrievalError::Config("top_k must be > 0".to_string()));
        }
        for (name, value) in [
            ("threshold", self.threshold),
            ("context_min_score", self.context_min_score),
        ] {
            if !(-1.0..=1.0).contains(&value) {
                return Err(RetrievalError::Config(format!(
                    "{} must be within [-1, 1], got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

/// One search hit joined with its chunk metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedPassage {
    /// Row of the chunk in the index.
    pub index: usize,
    pub text: String,
    pub source: String,
    /// Cosine similarity to the question.
    pub score: f32,
}

/// Outcome of threshold gating.
#[derive(Debug, Clone, PartialEq)]
pub enum Retrieval {
    /// At least the best passage scored at or above the threshold.
    Relevant(Vec<RetrievedPassage>),
    /// Nothing cleared the threshold. `best_score` is `None` when the search
    /// returned no hits at all.
    NoRelevantResult { best_score: Option<f32> },
}

impl Retrieval {
    pub fn is_relevant(&self) -> bool {
        matches!(self, Self::Relevant(_))
    }

    pub fn best_score(&self) -> Option<f32> {
        match self {
            Self::Relevant(passages) => passages.first().map(|p| p.score),
            Self::NoRelevantResult { best_score } => *best_score,
        }
    }

    /// Surfaced passages; empty when nothing was relevant.
    pub fn passages(&self) -> &[RetrievedPassage] {
        match self {
            Self::Relevant(passages) => passages,
            Self::NoRelevantResult { .. } => &[],
        }
    }

    pub fn into_passages(self) -> Vec<RetrievedPassage> {
        match self {
            Self::Relevant(passages) => passages,
            Self::NoRelevantResult { .. } => Vec::new(),
        }
    }
}

/// Apply the relevance threshold to ranked passages.
///
/// Only the best (first) score is compared: a set whose best passage clears
/// the threshold is surfaced whole.
pub fn gate(passages: Vec<RetrievedPassage>, threshold: f32) -> Retrieval {
    match passages.first().map(|p| p.score) {
        Some(best) if best >= threshold => Retrieval::Relevant(passages),
        best_score => Retrieval::NoRelevantResult { best_score },
    }
}

/// Join the text of passages scoring at least `min_score`, separated by a
/// blank line.
pub fn build_context(passages: &[RetrievedPassage], min_score: f32) -> String {
    passages
        .iter()
        .filter(|p| p.score >= min_score)
        .map(|p| p.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Result of [`Retriever::answer`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub passages: Vec<RetrievedPassage>,
    /// Generated answer; `None` without a generator, when generation failed,
    /// or when nothing was relevant.
    pub answer: Option<String>,
    /// Why generation failed, if it did.
    pub generation_error: Option<String>,
    pub no_relevant_result: bool,
    pub best_score: Option<f32>,
}

/// Immutable retrieval context.
pub struct Retriever {
    index: Index,
    metadata: Vec<ChunkRecord>,
    embedder: Box<dyn Embedder>,
    generator: Option<Box<dyn Generator>>,
    config: RetrieverConfig,
}

impl Retriever {
    /// Bind an index to its metadata and the embedder that produced it.
    ///
    /// # Errors
    ///
    /// `MisalignedMetadata` if `metadata` does not have one record per row.
    pub fn new(
        index: Index,
        metadata: Vec<ChunkRecord>,
        embedder: Box<dyn Embedder>,
    ) -> Result<Self> {
        if index.len() != metadata.len() {
            return Err(RetrievalError::MisalignedMetadata {
                embeddings: index.len(),
                metadata: metadata.len(),
            });
        }

        Ok(Self {
            index,
            metadata,
            embedder,
            generator: None,
            config: RetrieverConfig::default(),
        })
    }

    /// Build the index for `corpus` with the preferred backend and bind it.
    pub fn from_corpus(
        corpus: Corpus,
        backend: BackendPreference,
        embedder: Box<dyn Embedder>,
    ) -> Result<Self> {
        let index = build_index_with(&corpus.embeddings, backend.resolve())?;
        Self::new(index, corpus.records, embedder)
    }

    pub fn with_generator(mut self, generator: Box<dyn Generator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn with_config(mut self, config: RetrieverConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &RetrieverConfig {
        &self.config
    }

    /// Number of indexed chunks.
    pub fn len(&self) -> usize {
        self.metadata.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty()
    }

    pub fn dimensions(&self) -> usize {
        self.index.dimensions()
    }

    pub fn backend(&self) -> BackendKind {
        self.index.kind()
    }

    pub fn has_generator(&self) -> bool {
        self.generator.is_some()
    }

    /// Ranked passages for `question`, without threshold gating.
    ///
    /// A blank question returns no passages and does not call the embedder.
    ///
    /// # Errors
    ///
    /// - `RetrievalUnavailable` if the embedder fails
    /// - `Index(InvalidTopK)` if `top_k == 0`
    /// - `Index(DimensionMismatch)` if the embedder's output does not match the index
    pub fn search(&self, question: &str, top_k: usize) -> Result<Vec<RetrievedPassage>> {
        let question = question.trim();
        if question.is_empty() {
            return Ok(Vec::new());
        }
        if top_k == 0 {
            return Err(tomo_vector::VectorError::InvalidTopK(top_k).into());
        }

        let query = self
            .embedder
            .encode(question)
            .map_err(|e| RetrievalError::RetrievalUnavailable(format!("{:#}", e)))?;

        let hits = tomo_vector::search(&self.index, &query, top_k)?;

        Ok(hits
            .into_iter()
            .map(|hit| {
                let record = &self.metadata[hit.index];
                RetrievedPassage {
                    index: hit.index,
                    text: record.text.clone(),
                    source: record.source.clone(),
                    score: hit.score,
                }
            })
            .collect())
    }

    /// [`search`](Self::search) followed by threshold gating.
    pub fn retrieve(&self, question: &str, top_k: usize) -> Result<Retrieval> {
        let retrieval = gate(self.search(question, top_k)?, self.config.threshold);
        tracing::debug!(
            "Retrieve: relevant={}, best_score={:?}, threshold={}",
            retrieval.is_relevant(),
            retrieval.best_score(),
            self.config.threshold
        );
        Ok(retrieval)
    }

    /// Retrieve with the configured `top_k` and, if relevant, generate an
    /// answer from the passages scoring at least `context_min_score`.
    ///
    /// Generator failures never fail the call: the passages are returned
    /// with `generation_error` set.
    pub fn answer(&self, question: &str) -> Result<Answer> {
        let retrieval = self.retrieve(question, self.config.top_k)?;
        let best_score = retrieval.best_score();

        let passages = match retrieval {
            Retrieval::Relevant(passages) => passages,
            Retrieval::NoRelevantResult { .. } => {
                return Ok(Answer {
                    passages: Vec::new(),
                    answer: None,
                    generation_error: None,
                    no_relevant_result: true,
                    best_score,
                });
            }
        };

        let (answer, generation_error) = match &self.generator {
            None => (None, None),
            Some(generator) => {
                let context = build_context(&passages, self.config.context_min_score);
                match generator.generate(question.trim(), &context) {
                    Ok(text) => (Some(text), None),
                    Err(e) => {
                        let err = RetrievalError::GenerationUnavailable(format!("{:#}", e));
                        tracing::warn!("{}", err);
                        (None, Some(err.to_string()))
                    }
                }
            }
        };

        Ok(Answer {
            passages,
            answer,
            generation_error,
            no_relevant_result: false,
            best_score,
        })
    }
}

impl std::fmt::Debug for Retriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retriever")
            .field("chunks", &self.metadata.len())
            .field("dimensions", &self.index.dimensions())
            .field("backend", &self.index.kind())
            .field("has_generator", &self.generator.is_some())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tomo_vector::{build_index, EmbeddingMatrix};

    /// Looks questions up in a fixed table.
    struct TableEmbedder(HashMap<&'static str, Vec<f32>>);

    impl Embedder for TableEmbedder {
        fn encode(&self, text: &str) -> anyhow::Result<Vec<f32>> {
            self.0
                .get(text)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("no embedding for {:?}", text))
        }
    }

    struct FailingEmbedder;

    impl Embedder for FailingEmbedder {
        fn encode(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
            anyhow::bail!("connection refused")
        }
    }

    /// Echoes its context and counts calls.
    struct EchoGenerator(Arc<AtomicUsize>);

    impl Generator for EchoGenerator {
        fn generate(&self, _question: &str, context: &str) -> anyhow::Result<String> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(format!("ctx: {}", context))
        }
    }

    struct FailingGenerator;

    impl Generator for FailingGenerator {
        fn generate(&self, _question: &str, _context: &str) -> anyhow::Result<String> {
            anyhow::bail!("quota exceeded")
        }
    }

    fn records() -> Vec<ChunkRecord> {
        vec![
            ChunkRecord::new(0, "east", "a"),
            ChunkRecord::new(1, "north", "b"),
            ChunkRecord::new(2, "mostly east", "a"),
        ]
    }

    fn embedder() -> Box<dyn Embedder> {
        let mut table = HashMap::new();
        table.insert("east?", vec![1.0, 0.0]);
        table.insert("diagonal?", vec![1.0, 1.0]);
        Box::new(TableEmbedder(table))
    }

    fn retriever() -> Retriever {
        let m = EmbeddingMatrix::from_rows(&[vec![1.0, 0.0], vec![0.0, 1.0], vec![0.9, 0.1]]).unwrap();
        Retriever::new(build_index(&m).unwrap(), records(), embedder()).unwrap()
    }

    fn passage(index: usize, score: f32) -> RetrievedPassage {
        RetrievedPassage {
            index,
            text: format!("text {}", index),
            source: "s".to_string(),
            score,
        }
    }

    #[test]
    fn test_search_joins_metadata() {
        let results = retriever().search("east?", 2).unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].index, 0);
        assert_eq!(results[0].text, "east");
        assert_eq!(results[0].source, "a");
        assert!((results[0].score - 1.0).abs() < 1e-4);
        assert_eq!(results[1].index, 2);
        assert_eq!(results[1].text, "mostly east");
        assert!((results[1].score - 0.994).abs() < 1e-3);
    }

    #[test]
    fn test_blank_question_returns_nothing() {
        let r = Retriever::new(
            build_index(&EmbeddingMatrix::from_rows(&[vec![1.0]]).unwrap()).unwrap(),
            vec![ChunkRecord::default()],
            Box::new(FailingEmbedder),
        )
        .unwrap();

        // Embedder would fail; it must not be called
        assert!(r.search("   ", 3).unwrap().is_empty());
        assert!(!r.retrieve("", 3).unwrap().is_relevant());
    }

    #[test]
    fn test_embedder_failure_is_retrieval_unavailable() {
        let r = retriever();
        let err = r.search("unknown question", 2).unwrap_err();
        assert!(matches!(err, RetrievalError::RetrievalUnavailable(_)));
        assert!(err.to_string().contains("unknown question"));
    }

    #[test]
    fn test_zero_top_k_is_bad_request() {
        let err = retriever().search("east?", 0).unwrap_err();
        assert!(err.is_bad_request());
    }

    #[test]
    fn test_misaligned_metadata_rejected() {
        let m = EmbeddingMatrix::from_rows(&[vec![1.0, 0.0]]).unwrap();
        let err = Retriever::new(build_index(&m).unwrap(), records(), embedder()).unwrap_err();
        assert!(matches!(
            err,
            RetrievalError::MisalignedMetadata {
                embeddings: 1,
                metadata: 3
            }
        ));
    }

    #[test]
    fn test_best_score_below_threshold_surfaces_nothing() {
        // Rows at 60 degrees from the query score 0.5; threshold is 0.6
        let angle = 60f32.to_radians();
        let m = EmbeddingMatrix::from_rows(&[
            vec![angle.cos(), angle.sin()],
            vec![angle.cos(), -angle.sin()],
        ])
        .unwrap();
        let r = Retriever::new(
            build_index(&m).unwrap(),
            vec![ChunkRecord::new(0, "x", "s"), ChunkRecord::new(1, "y", "s")],
            embedder(),
        )
        .unwrap();

        let retrieval = r.retrieve("east?", 3).unwrap();
        assert!(!retrieval.is_relevant());
        assert!(retrieval.passages().is_empty());
        assert!((retrieval.best_score().unwrap() - 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_gate() {
        assert!(gate(vec![passage(0, 0.6), passage(1, 0.1)], 0.6).is_relevant());
        assert_eq!(gate(vec![passage(0, 0.61), passage(1, 0.1)], 0.6).passages().len(), 2);

        let rejected = gate(vec![passage(0, 0.59)], 0.6);
        assert_eq!(rejected, Retrieval::NoRelevantResult { best_score: Some(0.59) });

        assert_eq!(gate(vec![], 0.6), Retrieval::NoRelevantResult { best_score: None });
    }

    #[test]
    fn test_build_context_filters_and_joins() {
        let passages = vec![passage(0, 0.9), passage(1, 0.2), passage(2, 0.35)];
        assert_eq!(build_context(&passages, 0.35), "text 0\n\ntext 2");
        assert_eq!(build_context(&passages, 0.95), "");
    }

    #[test]
    fn test_answer_calls_generator_with_context() {
        let calls = Arc::new(AtomicUsize::new(0));
        let r = retriever()
            .with_generator(Box::new(EchoGenerator(Arc::clone(&calls))))
            .with_config(RetrieverConfig {
                top_k: 3,
                ..RetrieverConfig::default()
            });

        let answer = r.answer("east?").unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!answer.no_relevant_result);
        assert_eq!(answer.passages.len(), 3);
        // "north" scores 0.0 and stays out of the context
        assert_eq!(answer.answer.as_deref(), Some("ctx: east\n\nmostly east"));
        assert_eq!(answer.generation_error, None);
    }

    #[test]
    fn test_context_min_score_filters_after_gating() {
        let calls = Arc::new(AtomicUsize::new(0));
        let r = retriever()
            .with_generator(Box::new(EchoGenerator(Arc::clone(&calls))))
            .with_config(RetrieverConfig {
                top_k: 3,
                threshold: 0.6,
                context_min_score: 0.75,
            });

        // "mostly east" scores ~0.78 and clears both; the 0.71 pair passes
        // the gate alongside it but stays out of the context
        let answer = r.answer("diagonal?").unwrap();
        assert_eq!(answer.passages.len(), 3);
        assert_eq!(answer.answer.as_deref(), Some("ctx: mostly east"));

        // Below the gate the context filter is never consulted
        let gated = r
            .with_config(RetrieverConfig {
                top_k: 3,
                threshold: 0.9,
                context_min_score: 0.0,
            })
            .answer("diagonal?")
            .unwrap();
        assert!(gated.no_relevant_result);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_answer_without_generator() {
        let answer = retriever().answer("diagonal?").unwrap();
        assert!(!answer.no_relevant_result);
        assert!(answer.answer.is_none());
        assert!(answer.generation_error.is_none());
        assert!(!answer.passages.is_empty());
    }

    #[test]
    fn test_generator_failure_keeps_passages() {
        let r = retriever().with_generator(Box::new(FailingGenerator));
        let answer = r.answer("east?").unwrap();

        assert!(answer.answer.is_none());
        let err = answer.generation_error.unwrap();
        assert!(err.contains("Generation unavailable"));
        assert!(err.contains("quota exceeded"));
        assert_eq!(answer.passages[0].text, "east");
    }

    #[test]
    fn test_no_generator_call_when_nothing_relevant() {
        let calls = Arc::new(AtomicUsize::new(0));
        let r = retriever()
            .with_generator(Box::new(EchoGenerator(Arc::clone(&calls))))
            .with_config(RetrieverConfig {
                threshold: 1.0,
                ..RetrieverConfig::default()
            });

        let answer = r.answer("diagonal?").unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(answer.no_relevant_result);
        assert!(answer.passages.is_empty());
        assert!(answer.best_score.unwrap() < 1.0);
    }

    #[test]
    fn test_empty_corpus_has_no_relevant_result() {
        let r = Retriever::from_corpus(Corpus::default(), BackendPreference::Auto, embedder()).unwrap();
        assert!(r.is_empty());

        let answer = r.answer("east?").unwrap();
        assert!(answer.no_relevant_result);
        assert_eq!(answer.best_score, None);
    }

    #[test]
    fn test_config_validation() {
        assert!(RetrieverConfig::default().validate().is_ok());
        assert!(RetrieverConfig { top_k: 0, ..Default::default() }.validate().is_err());
        assert!(RetrieverConfig { threshold: 1.5, ..Default::default() }.validate().is_err());
        assert!(RetrieverConfig { context_min_score: -2.0, ..Default::default() }
            .validate()
            .is_err());
    }

    #[test]
    fn test_retriever_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Retriever>();
    }
}
