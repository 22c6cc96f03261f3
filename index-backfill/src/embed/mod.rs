//! Embedding abstraction.

use embedding_service::{EmbeddingError, EmbeddingProvider};

use crate::index::BoxFuture;

pub mod service_embedder;

/// Provider interface for embedding generation.
///
/// Implement this trait to plug in your own embedding backend. Async because
/// every real provider performs an HTTP request.
pub trait EmbeddingsProvider: Send + Sync {
    /// Produces one embedding vector for the given text.
    fn embed<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<Vec<f32>, EmbeddingError>>;

    /// Backend, for error attribution.
    fn provider(&self) -> EmbeddingProvider;

    /// Model identifier used for every request.
    fn model(&self) -> &str;

    /// Length of every vector this provider returns.
    fn dimensions(&self) -> usize;
}
