//! [`EmbeddingsProvider`] backed by the shared [`EmbeddingService`].

use std::sync::Arc;

use embedding_service::{EmbeddingError, EmbeddingProvider, EmbeddingService};

use crate::embed::EmbeddingsProvider;
use crate::index::BoxFuture;

/// Adapter over an `Arc<EmbeddingService>`; cheap to clone.
#[derive(Clone, Debug)]
pub struct ServiceEmbedder {
    svc: Arc<EmbeddingService>,
}

impl ServiceEmbedder {
    pub fn new(svc: Arc<EmbeddingService>) -> Self {
        Self { svc }
    }
}

impl EmbeddingsProvider for ServiceEmbedder {
    fn embed<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<Vec<f32>, EmbeddingError>> {
        Box::pin(self.svc.embed(text))
    }

    fn provider(&self) -> EmbeddingProvider {
        self.svc.provider()
    }

    fn model(&self) -> &str {
        self.svc.model()
    }

    fn dimensions(&self) -> usize {
        self.svc.dimensions()
    }
}
