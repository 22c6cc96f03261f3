//! Lightweight Ollama embeddings client.
//!
//! - `POST {endpoint}/api/embeddings`: embeddings retrieval
//!
//! Uses the shared [`EmbeddingModelConfig`] and requires the provider to be
//! [`EmbeddingProvider::Ollama`].

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument};

use crate::config::embedding_model_config::EmbeddingModelConfig;
use crate::config::embedding_provider::EmbeddingProvider;
use crate::error_handler::{
    EmbeddingError, HttpError, Provider, ProviderError, ProviderErrorKind, make_snippet,
};

/// Thin client for Ollama.
#[derive(Debug)]
pub struct OllamaService {
    client: reqwest::Client,
    cfg: EmbeddingModelConfig,
    url_embeddings: String,
}

impl OllamaService {
    /// Creates a new [`OllamaService`] from the given config.
    ///
    /// # Errors
    /// - `InvalidProvider` if `cfg.provider` is not Ollama
    /// - `InvalidEndpoint` if `cfg.endpoint` is empty or lacks http(s)
    /// - [`EmbeddingError::HttpTransport`] if the HTTP client cannot be built
    pub fn new(cfg: EmbeddingModelConfig) -> Result<Self, EmbeddingError> {
        if cfg.provider != EmbeddingProvider::Ollama {
            return Err(
                ProviderError::new(Provider::Ollama, ProviderErrorKind::InvalidProvider).into(),
            );
        }

        let endpoint = cfg.endpoint.trim();
        if endpoint.is_empty()
            || !(endpoint.starts_with("http://") || endpoint.starts_with("https://"))
        {
            return Err(ProviderError::new(
                Provider::Ollama,
                ProviderErrorKind::InvalidEndpoint(cfg.endpoint.clone()),
            )
            .into());
        }

        let timeout = Duration::from_secs(cfg.timeout_secs.unwrap_or(60));
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let url_embeddings = format!("{}/api/embeddings", endpoint.trim_end_matches('/'));

        Ok(Self {
            client,
            cfg,
            url_embeddings,
        })
    }

    /// Full URL of the embeddings endpoint.
    pub fn url(&self) -> &str {
        &self.url_embeddings
    }

    /// Retrieves embeddings for `input` via `POST /api/embeddings`.
    ///
    /// # Errors
    /// - `HttpStatus` for non-2xx responses
    /// - [`EmbeddingError::HttpTransport`] for network failures
    /// - `Decode` / `EmptyData` for unexpected payloads
    #[instrument(level = "debug", skip(self, input), fields(model = %self.cfg.model, input_len = input.len()))]
    pub async fn embeddings(&self, input: &str) -> Result<Vec<f32>, EmbeddingError> {
        let started = Instant::now();
        let body = EmbeddingsRequest {
            model: &self.cfg.model,
            prompt: input,
        };

        let resp = self
            .client
            .post(&self.url_embeddings)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let snippet = make_snippet(&text);
            error!(%status, url = %self.url_embeddings, %snippet, "Ollama /api/embeddings returned non-success status");
            return Err(ProviderError::new(
                Provider::Ollama,
                ProviderErrorKind::HttpStatus(HttpError {
                    status,
                    url: self.url_embeddings.clone(),
                    snippet,
                }),
            )
            .into());
        }

        let text = resp.text().await?;
        let embedding = decode_embeddings(&text)?;

        debug!(
            dim = embedding.len(),
            latency_ms = started.elapsed().as_millis(),
            "ollama embeddings completed"
        );
        Ok(embedding)
    }
}

fn decode_embeddings(body: &str) -> Result<Vec<f32>, ProviderError> {
    let out: EmbeddingsResponse = serde_json::from_str(body).map_err(|e| {
        ProviderError::new(
            Provider::Ollama,
            ProviderErrorKind::Decode(format!("serde error: {e}; expected `embedding`")),
        )
    })?;
    if out.embedding.is_empty() {
        return Err(ProviderError::new(
            Provider::Ollama,
            ProviderErrorKind::EmptyData,
        ));
    }
    Ok(out.embedding)
}

#[derive(Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    #[serde(default)]
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> EmbeddingModelConfig {
        EmbeddingModelConfig {
            provider: EmbeddingProvider::Ollama,
            model: "nomic-embed-text".into(),
            endpoint: "http://localhost:11434/".into(),
            api_key: None,
            dimensions: 768,
            timeout_secs: Some(5),
        }
    }

    #[test]
    fn builds_embeddings_url() {
        let svc = OllamaService::new(cfg()).unwrap();
        assert_eq!(svc.url(), "http://localhost:11434/api/embeddings");
    }

    #[test]
    fn rejects_bad_endpoint() {
        let mut c = cfg();
        c.endpoint = "localhost:11434".into();
        assert!(OllamaService::new(c).is_err());
    }

    #[test]
    fn decodes_embedding_payload() {
        assert_eq!(
            decode_embeddings(r#"{"embedding": [1.0, 2.0]}"#).unwrap(),
            vec![1.0, 2.0]
        );
        let err = decode_embeddings("{}").unwrap_err();
        assert!(matches!(err.kind, ProviderErrorKind::EmptyData));
    }
}
