//! Answer generation seam and an OpenAI-compatible chat client.

use crate::embedder::{default_api_key_env, default_base_url, default_timeout_secs, http_client};
use anyhow::{Context, Result};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Produces a natural-language answer from a question and retrieved context.
pub trait Generator: Send + Sync {
    fn generate(&self, question: &str, context: &str) -> Result<String>;
}

/// Instructions sent as the system message with every question.
pub const SYSTEM_PROMPT: &str = "\
You are an assistant that answers questions about a book using only the \
context passages retrieved from it.

Rules:
1. Use the context to write a coherent, complete and natural answer.
2. If the answer is not in the context, say politely that the book has no \
information on that topic and add nothing else.
3. Do not invent information.
4. Keep an academic but accessible tone.
5. Do not use markdown emphasis such as *, ** or ***.";

/// User message carrying the retrieved context and the question.
pub fn build_prompt(question: &str, context: &str) -> String {
    format!("Context:\n{}\n\nQuestion: {}\n\nAnswer:", context, question)
}

/// Settings for [`OpenAiGenerator`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

impl GeneratorConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            base_url: default_base_url(),
            model: model.into(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
            api_key_env: default_api_key_env(),
        }
    }
}

fn default_temperature() -> f32 {
    0.2
}

fn default_max_tokens() -> usize {
    800
}

/// Blocking client for `POST {base_url}/chat/completions`.
pub struct OpenAiGenerator {
    client: Client,
    endpoint: String,
    model: String,
    temperature: f32,
    max_tokens: usize,
}

impl OpenAiGenerator {
    pub fn new(config: &GeneratorConfig, api_key: Option<&str>) -> Result<Self> {
        anyhow::ensure!(!config.model.trim().is_empty(), "missing generator model name");

        Ok(Self {
            client: http_client(api_key, Duration::from_secs(config.timeout_secs))?,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    /// Build a client, reading the API key from `config.api_key_env`.
    pub fn from_config(config: &GeneratorConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).ok();
        Self::new(config, api_key.as_deref())
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl Generator for OpenAiGenerator {
    fn generate(&self, question: &str, context: &str) -> Result<String> {
        let prompt = build_prompt(question, context);
        let body = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
        };

        let resp = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .with_context(|| format!("failed to call {}", self.endpoint))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp
                .text()
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            anyhow::bail!("chat completion failed ({}): {}", status, text);
        }

        let parsed: ChatResponse = resp.json().context("failed to parse chat completion")?;
        let answer = parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.trim().to_string())
            .context("chat completion returned no choices")?;
        anyhow::ensure!(!answer.is_empty(), "chat completion returned an empty answer");

        Ok(answer)
    }
}

impl std::fmt::Debug for OpenAiGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiGenerator")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .finish()
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: usize,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_contains_context_and_question() {
        let prompt = build_prompt("¿Qué es un agente?", "Un agente percibe su entorno.");
        assert!(prompt.starts_with("Context:\nUn agente percibe su entorno."));
        assert!(prompt.contains("Question: ¿Qué es un agente?"));
        assert!(prompt.ends_with("Answer:"));
    }

    #[test]
    fn test_system_prompt_forbids_invention() {
        assert!(SYSTEM_PROMPT.contains("only"));
        assert!(SYSTEM_PROMPT.contains("Do not invent"));
    }

    #[test]
    fn test_config_requires_model() {
        assert!(serde_json::from_str::<GeneratorConfig>("{}").is_err());

        let config: GeneratorConfig = serde_json::from_str(r#"{"model": "gpt-4o-mini"}"#).unwrap();
        assert_eq!(config, GeneratorConfig::new("gpt-4o-mini"));
    }

    #[test]
    fn test_rejects_empty_model() {
        assert!(OpenAiGenerator::new(&GeneratorConfig::new(""), None).is_err());
    }

    #[test]
    fn test_response_parsing() {
        let parsed: ChatResponse = serde_json::from_str(
            r#"{"choices":[{"index":0,"message":{"role":"assistant","content":" Hola "}}]}"#,
        )
        .unwrap();
        assert_eq!(parsed.choices[0].message.content, " Hola ");
    }
}
