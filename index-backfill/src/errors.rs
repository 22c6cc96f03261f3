//! Unified error types for the crate.

use embedding_service::EmbeddingError;
use reqwest::StatusCode;
use thiserror::Error;

/// Errors raised by the search engine layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Invalid or unsupported configuration.
    #[error("config error: {0}")]
    Config(String),

    /// Connection refused, timeout, TLS failure.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Search engine answered with a non-success status.
    #[error("HTTP {status} from {url}: {snippet}")]
    HttpStatus {
        status: StatusCode,
        url: String,
        snippet: String,
    },

    /// Index or document does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Response did not have the expected shape.
    #[error("decode error: {0}")]
    Decode(String),

    /// JSON parsing / serialization errors.
    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Errors raised by the backfill job.
///
/// `ReservedCollection`, `CollectionUnavailable` and `MappingRejected` abort a
/// collection run. `EmbeddingService` and `RecordUpdate` are per record: the
/// record is skipped and the run goes on.
#[derive(Debug, Error)]
pub enum BackfillError {
    /// Invalid job configuration.
    #[error("config error: {0}")]
    Config(String),

    /// The collection name carries a reserved prefix.
    #[error("collection '{0}' is reserved and is never processed")]
    ReservedCollection(String),

    /// Search engine unreachable, failing, or collection missing.
    #[error("collection '{collection}' unavailable: {source}")]
    CollectionUnavailable {
        collection: String,
        #[source]
        source: StoreError,
    },

    /// The engine refused the vector field mapping.
    #[error("vector mapping rejected for '{collection}': {source}")]
    MappingRejected {
        collection: String,
        #[source]
        source: StoreError,
    },

    /// The embedding service failed or returned an unusable vector.
    #[error("embedding failed for record '{id}': {source}")]
    EmbeddingService {
        id: String,
        #[source]
        source: EmbeddingError,
    },

    /// The partial update was rejected (e.g. record deleted meanwhile).
    #[error("update failed for record '{id}': {source}")]
    RecordUpdate {
        id: String,
        #[source]
        source: StoreError,
    },
}

impl BackfillError {
    /// `true` for the per-record variants that skip a record without aborting the run.
    pub fn is_per_record(&self) -> bool {
        matches!(
            self,
            BackfillError::EmbeddingService { .. } | BackfillError::RecordUpdate { .. }
        )
    }
}
