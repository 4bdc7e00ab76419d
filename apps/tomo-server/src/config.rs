//! Server configuration.
//!
//! Loads and validates configuration from YAML files or environment variables.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use tomo_retrieval::{EmbedderConfig, GeneratorConfig, RetrieverConfig};
use tomo_vector::BackendPreference;

/// Server configuration.
///
/// Example YAML:
/// ```yaml
/// http_addr: "0.0.0.0:8080"
/// enable_cors: true
/// corpus: "data/embedded.jsonl"
/// retrieval:
///   top_k: 4
///   threshold: 0.6
///   context_min_score: 0.35
///   backend: auto
/// embedder:
///   base_url: "https://api.openai.com/v1"
///   model: "text-embedding-3-small"
/// generator:
///   model: "gpt-4o-mini"
///   temperature: 0.2
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_http_addr")]
    pub http_addr: String,

    /// Allow cross-origin requests (browser front-ends)
    #[serde(default)]
    pub enable_cors: bool,

    /// Embedded-chunk JSONL file to serve
    pub corpus: PathBuf,

    #[serde(default)]
    pub retrieval: RetrievalConfig,

    #[serde(default)]
    pub embedder: EmbedderConfig,

    /// Answer generation; `/api/answer` returns passages only when absent
    #[serde(default)]
    pub generator: Option<GeneratorConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Query-time knobs (top_k, threshold, context_min_score)
    #[serde(flatten)]
    pub retriever: RetrieverConfig,

    /// Search backend: auto, accelerated or brute_force
    #[serde(default)]
    pub backend: BackendPreference,
}

fn default_http_addr() -> String {
    "0.0.0.0:8080".to_string()
}

impl ServerConfig {
    /// Configuration serving `corpus` with every other setting at its default.
    pub fn new(corpus: impl Into<PathBuf>) -> Self {
        Self {
            http_addr: default_http_addr(),
            enable_cors: false,
            corpus: corpus.into(),
            retrieval: RetrievalConfig::default(),
            embedder: EmbedderConfig::default(),
            generator: None,
        }
    }

    /// Load configuration from a YAML file.
    pub fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(format!("Failed to read config file: {}", e)))?;

        let config: ServerConfig = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(format!("Failed to parse YAML: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables.
    ///
    /// Supported variables:
    /// - TOMO_CORPUS (required)
    /// - TOMO_HTTP_ADDR
    /// - TOMO_ENABLE_CORS
    /// - TOMO_BACKEND
    /// - TOMO_EMBED_BASE_URL
    /// - TOMO_EMBED_MODEL
    /// - TOMO_GENERATOR_MODEL (enables answer generation)
    /// - TOMO_GENERATOR_BASE_URL (defaults to the embedder's base URL)
    pub fn load_from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let corpus = var("TOMO_CORPUS")
            .ok_or_else(|| ConfigError::MissingField("TOMO_CORPUS".to_string()))?;

        let mut config = ServerConfig::new(corpus);

        if let Some(addr) = var("TOMO_HTTP_ADDR") {
            config.http_addr = addr;
        }

        if let Some(cors) = var("TOMO_ENABLE_CORS") {
            config.enable_cors = cors == "1" || cors.eq_ignore_ascii_case("true");
        }

        if let Some(backend) = var("TOMO_BACKEND") {
            config.retrieval.backend = backend
                .parse()
                .map_err(|e| ConfigError::InvalidField(format!("TOMO_BACKEND: {}", e)))?;
        }

        if let Some(base_url) = var("TOMO_EMBED_BASE_URL") {
            config.embedder.base_url = base_url;
        }

        if let Some(model) = var("TOMO_EMBED_MODEL") {
            config.embedder.model = model;
        }

        if let Some(model) = var("TOMO_GENERATOR_MODEL") {
            let mut generator = GeneratorConfig::new(model);
            generator.base_url =
                var("TOMO_GENERATOR_BASE_URL").unwrap_or_else(|| config.embedder.base_url.clone());
            config.generator = Some(generator);
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.socket_addr()?;

        if self.corpus.as_os_str().is_empty() {
            return Err(ConfigError::InvalidField("corpus cannot be empty".to_string()));
        }

        self.retrieval
            .retriever
            .validate()
            .map_err(|e| ConfigError::InvalidField(format!("retrieval: {}", e)))?;

        if self.embedder.model.trim().is_empty() {
            return Err(ConfigError::InvalidField(
                "embedder.model cannot be empty".to_string(),
            ));
        }

        if self.embedder.batch_size == 0 {
            return Err(ConfigError::InvalidField(
                "embedder.batch_size must be > 0".to_string(),
            ));
        }

        if let Some(generator) = &self.generator {
            if generator.model.trim().is_empty() {
                return Err(ConfigError::InvalidField(
                    "generator.model cannot be empty".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Parsed `http_addr`.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.http_addr
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidField(format!("Invalid http_addr: {}", e)))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid field: {0}")]
    InvalidField(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::new("data/embedded.jsonl");

        assert!(config.validate().is_ok());
        assert_eq!(config.retrieval.retriever.top_k, 4);
        assert_eq!(config.retrieval.retriever.threshold, 0.60);
        assert_eq!(config.retrieval.retriever.context_min_score, 0.35);
        assert_eq!(config.retrieval.backend, BackendPreference::Auto);
        assert!(config.generator.is_none());
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
http_addr: "127.0.0.1:9000"
enable_cors: true
corpus: "embedded.jsonl"
retrieval:
  top_k: 3
  threshold: 0.5
  backend: brute_force
embedder:
  base_url: "http://localhost:11434/v1"
  model: "nomic-embed-text"
generator:
  model: "llama3"
"#;
        let config: ServerConfig = serde_yaml::from_str(yaml).unwrap();
        config.validate().unwrap();

        assert_eq!(config.socket_addr().unwrap().port(), 9000);
        assert!(config.enable_cors);
        assert_eq!(config.retrieval.retriever.top_k, 3);
        assert_eq!(config.retrieval.retriever.threshold, 0.5);
        assert_eq!(config.retrieval.retriever.context_min_score, 0.35);
        assert_eq!(config.retrieval.backend, BackendPreference::BruteForce);
        assert_eq!(config.embedder.model, "nomic-embed-text");
        assert_eq!(config.generator.unwrap().model, "llama3");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("tomo.yaml");
        std::fs::write(&path, "corpus: embedded.jsonl\n").unwrap();

        let config = ServerConfig::load_from_file(path.to_str().unwrap()).unwrap();
        assert_eq!(config.corpus, PathBuf::from("embedded.jsonl"));

        std::fs::write(&path, "corpus: [unclosed\n").unwrap();
        assert!(matches!(
            ServerConfig::load_from_file(path.to_str().unwrap()),
            Err(ConfigError::ParseError(_))
        ));

        assert!(matches!(
            ServerConfig::load_from_file("/nonexistent/tomo.yaml"),
            Err(ConfigError::IoError(_))
        ));
    }

    #[test]
    fn test_invalid_http_addr() {
        let mut config = ServerConfig::new("c.jsonl");
        config.http_addr = "invalid_addr".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_retrieval_settings() {
        let mut config = ServerConfig::new("c.jsonl");
        config.retrieval.retriever.top_k = 0;
        assert!(config.validate().is_err());

        let mut config = ServerConfig::new("c.jsonl");
        config.retrieval.retriever.threshold = 1.2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_model_names() {
        let mut config = ServerConfig::new("c.jsonl");
        config.embedder.model = String::new();
        assert!(config.validate().is_err());

        let mut config = ServerConfig::new("c.jsonl");
        config.generator = Some(GeneratorConfig::new(" "));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_requires_corpus() {
        assert!(matches!(
            ServerConfig::from_vars(vars(&[])),
            Err(ConfigError::MissingField(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let config = ServerConfig::from_vars(vars(&[
            ("TOMO_CORPUS", "/data/embedded.jsonl"),
            ("TOMO_HTTP_ADDR", "127.0.0.1:7000"),
            ("TOMO_BACKEND", "brute-force"),
            ("TOMO_EMBED_BASE_URL", "http://localhost:11434/v1"),
            ("TOMO_GENERATOR_MODEL", "llama3"),
        ]))
        .unwrap();

        assert_eq!(config.http_addr, "127.0.0.1:7000");
        assert_eq!(config.retrieval.backend, BackendPreference::BruteForce);
        let generator = config.generator.unwrap();
        assert_eq!(generator.model, "llama3");
        assert_eq!(generator.base_url, "http://localhost:11434/v1");
    }

    #[test]
    fn test_env_unknown_backend() {
        assert!(matches!(
            ServerConfig::from_vars(vars(&[("TOMO_CORPUS", "c"), ("TOMO_BACKEND", "gpu")])),
            Err(ConfigError::InvalidField(_))
        ));
    }
}
