//! Embedding backfill over a search engine.
//!
//! This crate finds records of a collection that lack a vector field, embeds
//! their content and writes the vector back with a partial update:
//! - Lazily scans eligible records (`must_not exists` + scroll pagination)
//! - Computes one embedding per record through an [`EmbeddingsProvider`]
//! - Applies it by updating only the vector field
//! - Runs every non-reserved collection, independently of each other
//!
//! The engine sits behind [`SearchIndex`]; [`OpenSearchFacade`] implements it
//! over the REST API.

mod backfill;
mod config;
mod embed;
mod embed_pool;
mod errors;
mod filters;
mod index;
mod normalize;
mod opensearch_facade;
mod record;
mod reserved;
mod scan;

#[cfg(test)]
mod test_support;

pub use backfill::ALL_COLLECTIONS;
pub use config::{BackfillConfig, SearchConfig};
pub use embed::{EmbeddingsProvider, service_embedder::ServiceEmbedder};
pub use errors::{BackfillError, StoreError};
pub use filters::MissingFieldQuery;
pub use index::{BoxFuture, SearchIndex};
pub use normalize::{DELIMITER, embedding_text};
pub use opensearch_facade::OpenSearchFacade;
pub use record::{BackfillReport, Record, ScanCursor, ScanPage, SkippedRecord};
pub use reserved::ReservedNames;

use std::sync::Arc;

use futures::Stream;
use tracing::trace;

/// Result of one collection inside a multi-collection run.
pub type CollectionOutcome = (String, Result<BackfillReport, BackfillError>);

/// High-level facade wiring configuration, the search engine and the embedder.
///
/// Cheap to share by reference; every operation takes `&self`.
pub struct BackfillJob {
    cfg: BackfillConfig,
    index: Arc<dyn SearchIndex>,
    embedder: Arc<dyn EmbeddingsProvider>,
    reserved: ReservedNames,
}

impl BackfillJob {
    /// Validates `cfg` and builds the job.
    ///
    /// # Errors
    /// Returns `BackfillError::Config` on invalid configuration.
    pub fn new(
        cfg: BackfillConfig,
        index: Arc<dyn SearchIndex>,
        embedder: Arc<dyn EmbeddingsProvider>,
    ) -> Result<Self, BackfillError> {
        cfg.validate()?;
        trace!(field = %cfg.field, model = embedder.model(), "BackfillJob::new");
        let reserved = ReservedNames::new(cfg.reserved_prefixes.iter().cloned());
        Ok(Self {
            cfg,
            index,
            embedder,
            reserved,
        })
    }

    pub fn config(&self) -> &BackfillConfig {
        &self.cfg
    }

    /// `true` if the job never processes a collection with this name.
    pub fn is_reserved_name(&self, name: &str) -> bool {
        self.reserved.is_reserved(name)
    }

    /// Non-reserved collections, sorted.
    ///
    /// # Errors
    /// `CollectionUnavailable` (named [`ALL_COLLECTIONS`]) if the list cannot be read.
    pub async fn eligible_collections(&self) -> Result<Vec<String>, BackfillError> {
        backfill::eligible_collections(self).await
    }

    /// Lazy stream of the records of `collection` missing the vector field.
    ///
    /// # Errors
    /// `ReservedCollection` before any request; stream items fail with
    /// `CollectionUnavailable`.
    pub fn list_eligible_records<'a>(
        &'a self,
        collection: &'a str,
    ) -> Result<impl Stream<Item = Result<Record, BackfillError>> + Send + 'a, BackfillError> {
        backfill::list_eligible_records(self, collection)
    }

    /// Embeds the serialized content of `record`.
    ///
    /// # Errors
    /// `EmbeddingService` on any provider failure or unusable vector.
    pub async fn compute_embedding(&self, record: &Record) -> Result<Vec<f32>, BackfillError> {
        backfill::compute_embedding(self, record).await
    }

    /// Writes `vector` into the vector field of one record, nothing else.
    ///
    /// # Errors
    /// `RecordUpdate` if the record is gone or the update is rejected.
    pub async fn apply_embedding(
        &self,
        collection: &str,
        record_id: &str,
        vector: &[f32],
    ) -> Result<(), BackfillError> {
        backfill::apply_embedding(self, collection, record_id, vector).await
    }

    /// Backfills one collection and reports what happened.
    ///
    /// # Errors
    /// `ReservedCollection`, `MappingRejected`, or `CollectionUnavailable`.
    /// Per-record failures end up in [`BackfillReport::skipped`].
    pub async fn backfill(&self, collection: &str) -> Result<BackfillReport, BackfillError> {
        backfill::backfill(self, collection).await
    }

    /// Backfills every non-reserved collection.
    ///
    /// # Errors
    /// Only when the collection list itself cannot be read; per-collection
    /// failures are returned in the list.
    pub async fn backfill_all(&self) -> Result<Vec<CollectionOutcome>, BackfillError> {
        backfill::backfill_all(self).await
    }

    /// Backfills the given collections. Reserved names come back as
    /// `ReservedCollection` entries without any request.
    pub async fn backfill_collections(&self, collections: Vec<String>) -> Vec<CollectionOutcome> {
        backfill::run_collections(self, collections).await
    }
}
