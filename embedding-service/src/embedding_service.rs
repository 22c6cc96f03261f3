//! Provider-agnostic embedding facade.
//!
//! - Construct once from an [`EmbeddingModelConfig`], wrap in `Arc`, share.
//! - Dispatches to the OpenAI or Ollama client selected by the config.
//! - Every returned vector is checked against `dimensions` and for non-finite
//!   components, so callers never see a malformed vector.
//!
//! # Example
//! ```no_run
//! use std::sync::Arc;
//! use embedding_service::{EmbeddingModelConfig, EmbeddingService};
//!
//! # async fn run() -> Result<(), embedding_service::EmbeddingError> {
//! let svc = Arc::new(EmbeddingService::new(EmbeddingModelConfig::openai("sk-..."))?);
//! let v = svc.embed("```Ferris is a friendly crab.```").await?;
//! assert_eq!(v.len(), svc.dimensions());
//! # Ok(()) }
//! ```

use tracing::debug;

use crate::{
    config::{embedding_model_config::EmbeddingModelConfig, embedding_provider::EmbeddingProvider},
    error_handler::{EmbeddingError, Provider, ProviderError, ProviderErrorKind},
    services::{ollama_service::OllamaService, open_ai_service::OpenAiService},
};

#[derive(Debug)]
enum Client {
    OpenAI(OpenAiService),
    Ollama(OllamaService),
}

/// Embedding client for a single configured model.
#[derive(Debug)]
pub struct EmbeddingService {
    cfg: EmbeddingModelConfig,
    client: Client,
}

impl EmbeddingService {
    /// Validates the config and builds the matching HTTP client.
    ///
    /// # Errors
    /// Config validation errors or client construction errors.
    pub fn new(cfg: EmbeddingModelConfig) -> Result<Self, EmbeddingError> {
        cfg.validate()?;
        let client = match cfg.provider {
            EmbeddingProvider::OpenAI => Client::OpenAI(OpenAiService::new(cfg.clone())?),
            EmbeddingProvider::Ollama => Client::Ollama(OllamaService::new(cfg.clone())?),
        };
        Ok(Self { cfg, client })
    }

    /// Backend selected by the config.
    pub fn provider(&self) -> EmbeddingProvider {
        self.cfg.provider
    }

    /// Model identifier sent with each request.
    pub fn model(&self) -> &str {
        &self.cfg.model
    }

    /// Expected vector length.
    pub fn dimensions(&self) -> usize {
        self.cfg.dimensions
    }

    /// Computes one embedding for `input`.
    ///
    /// # Errors
    /// Transport/status/decode errors from the provider, or
    /// `DimensionMismatch` / `NonFinite` if the vector is unusable.
    pub async fn embed(&self, input: &str) -> Result<Vec<f32>, EmbeddingError> {
        let (provider, vector) = match &self.client {
            Client::OpenAI(c) => (Provider::OpenAI, c.embeddings(input).await?),
            Client::Ollama(c) => (Provider::Ollama, c.embeddings(input).await?),
        };
        check_vector(provider, &vector, self.cfg.dimensions)?;
        debug!(model = %self.cfg.model, dim = vector.len(), "embedding accepted");
        Ok(vector)
    }
}

/// Rejects vectors of the wrong size or with NaN/inf components.
pub fn check_vector(provider: Provider, v: &[f32], want: usize) -> Result<(), ProviderError> {
    if v.len() != want {
        return Err(ProviderError::new(
            provider,
            ProviderErrorKind::DimensionMismatch { got: v.len(), want },
        ));
    }
    if v.iter().any(|x| !x.is_finite()) {
        return Err(ProviderError::new(provider, ProviderErrorKind::NonFinite));
    }
    Ok(())
}
