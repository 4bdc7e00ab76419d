//! Text embedding seam and an OpenAI-compatible client.

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Maps text to a fixed-dimension vector.
///
/// Must use the same model that produced the corpus embeddings, otherwise
/// query vectors and index rows are not comparable.
pub trait Embedder: Send + Sync {
    fn encode(&self, text: &str) -> Result<Vec<f32>>;

    fn encode_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|text| self.encode(text)).collect()
    }
}

/// Settings for [`OpenAiEmbedder`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedderConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Requested output dimension, for models that support shortening.
    #[serde(default)]
    pub dimensions: Option<usize>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Environment variable holding the API key. An unset variable sends no
    /// `Authorization` header (for local OpenAI-compatible servers).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Maximum inputs per request.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            dimensions: None,
            timeout_secs: default_timeout_secs(),
            api_key_env: default_api_key_env(),
            batch_size: default_batch_size(),
        }
    }
}

pub(crate) fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "text-embedding-3-small".to_string()
}

pub(crate) fn default_timeout_secs() -> u64 {
    30
}

pub(crate) fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_batch_size() -> usize {
    32
}

/// Build a blocking client with JSON and optional bearer auth headers.
pub(crate) fn http_client(api_key: Option<&str>, timeout: Duration) -> Result<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Some(key) = api_key.map(str::trim).filter(|k| !k.is_empty()) {
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", key)).context("invalid API key")?,
        );
    }

    Client::builder()
        .timeout(timeout)
        .default_headers(headers)
        .build()
        .context("failed to build HTTP client")
}

/// Blocking client for `POST {base_url}/embeddings`.
#[derive(Clone)]
pub struct OpenAiEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    dimensions: Option<usize>,
    batch_size: usize,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbedderConfig, api_key: Option<&str>) -> Result<Self> {
        anyhow::ensure!(!config.model.trim().is_empty(), "missing embedding model name");
        anyhow::ensure!(config.batch_size > 0, "embedding batch_size must be > 0");

        Ok(Self {
            client: http_client(api_key, Duration::from_secs(config.timeout_secs))?,
            endpoint: format!("{}/embeddings", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            dimensions: config.dimensions,
            batch_size: config.batch_size,
        })
    }

    /// Build a client, reading the API key from `config.api_key_env`.
    pub fn from_config(config: &EmbedderConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).ok();
        if api_key.is_none() {
            tracing::warn!(
                "{} not set, calling {} without credentials",
                config.api_key_env,
                config.base_url
            );
        }
        Self::new(config, api_key.as_deref())
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn request(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: inputs,
            dimensions: self.dimensions,
        };

        let resp = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .with_context(|| format!("failed to call {}", self.endpoint))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp
                .text()
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            anyhow::bail!("embeddings request failed ({}): {}", status, body);
        }

        let mut parsed: EmbeddingResponse =
            resp.json().context("failed to parse embedding response")?;
        parsed.data.sort_by_key(|entry| entry.index);
        anyhow::ensure!(
            parsed.data.len() == inputs.len(),
            "server returned {} embeddings for {} inputs",
            parsed.data.len(),
            inputs.len()
        );

        Ok(parsed.data.into_iter().map(|entry| entry.embedding).collect())
    }
}

impl Embedder for OpenAiEmbedder {
    fn encode(&self, text: &str) -> Result<Vec<f32>> {
        self.request(&[text])?
            .pop()
            .context("server returned no embedding")
    }

    fn encode_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            vectors.extend(self.request(batch)?);
            tracing::debug!("Embedded {}/{} inputs", vectors.len(), texts.len());
        }
        Ok(vectors)
    }
}

impl std::fmt::Debug for OpenAiEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiEmbedder")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("dimensions", &self.dimensions)
            .field("batch_size", &self.batch_size)
            .finish()
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}
