use std::fmt;

use crate::config::embedding_provider::EmbeddingProvider;
use crate::error_handler::{ConfigError, Result, validate_http_endpoint};

/// Default OpenAI embedding model.
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Dimensionality of [`DEFAULT_EMBEDDING_MODEL`].
pub const DEFAULT_EMBEDDING_DIM: usize = 1536;

/// Configuration for one embedding model invocation.
///
/// - `provider`: backend (OpenAI-compatible or Ollama).
/// - `model`: model identifier sent with every request.
/// - `endpoint`: base URL, without the `/v1/embeddings` or `/api/embeddings` suffix.
/// - `api_key`: bearer token, required for OpenAI.
/// - `dimensions`: expected vector length; responses of any other size are rejected.
/// - `timeout_secs`: per-request timeout.
#[derive(Clone, PartialEq, Eq)]
pub struct EmbeddingModelConfig {
    pub provider: EmbeddingProvider,
    pub model: String,
    pub endpoint: String,
    pub api_key: Option<String>,
    pub dimensions: usize,
    pub timeout_secs: Option<u64>,
}

impl EmbeddingModelConfig {
    /// OpenAI defaults: public endpoint, `text-embedding-3-small`, 1536 dimensions.
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self {
            provider: EmbeddingProvider::OpenAI,
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            endpoint: "https://api.openai.com".to_string(),
            api_key: Some(api_key.into()),
            dimensions: DEFAULT_EMBEDDING_DIM,
            timeout_secs: Some(30),
        }
    }

    /// Checks the invariants every client relies on.
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(ConfigError::EmptyModel.into());
        }
        if self.dimensions == 0 {
            return Err(ConfigError::ZeroDimensions.into());
        }
        validate_http_endpoint("endpoint", self.endpoint.trim())
    }
}

impl fmt::Debug for EmbeddingModelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddingModelConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "***REDACTED***"))
            .field("dimensions", &self.dimensions)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}
