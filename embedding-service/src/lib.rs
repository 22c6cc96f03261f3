//! Embedding API clients used by the backfill job.
//!
//! - [`config`]: provider/model configuration, loaded from the environment.
//! - [`services`]: HTTP clients for OpenAI-compatible and Ollama endpoints.
//! - [`embedding_service::EmbeddingService`]: provider-agnostic facade that
//!   validates every returned vector against the configured dimensionality.

pub mod config;
pub mod embedding_service;
pub mod error_handler;
pub mod services;

pub use config::embedding_model_config::EmbeddingModelConfig;
pub use config::embedding_provider::EmbeddingProvider;
pub use embedding_service::{EmbeddingService, check_vector};
pub use error_handler::{ConfigError, EmbeddingError, HttpError, Provider, ProviderError, ProviderErrorKind};
