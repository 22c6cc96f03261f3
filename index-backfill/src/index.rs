//! Search engine seam used by the backfill job.

use std::{future::Future, pin::Pin};

use serde_json::{Map, Value};

use crate::errors::StoreError;
use crate::filters::MissingFieldQuery;
use crate::record::{ScanCursor, ScanPage};

/// Boxed, sendable future returned by the async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Minimal search engine API the job consumes.
///
/// Implemented by [`crate::OpenSearchFacade`] over REST; tests use an
/// in-memory implementation.
pub trait SearchIndex: Send + Sync {
    /// Names of all collections, reserved ones included.
    fn list_collections(&self) -> BoxFuture<'_, Result<Vec<String>, StoreError>>;

    /// Starts a scan of `collection` and returns its first page.
    fn open_scan<'a>(
        &'a self,
        collection: &'a str,
        query: &'a MissingFieldQuery,
    ) -> BoxFuture<'a, Result<ScanPage, StoreError>>;

    /// Fetches the page following `cursor`.
    fn next_page<'a>(&'a self, cursor: &'a ScanCursor) -> BoxFuture<'a, Result<ScanPage, StoreError>>;

    /// Partial update: merges `fields` into the record, leaving the rest untouched.
    fn update_fields<'a>(
        &'a self,
        collection: &'a str,
        id: &'a str,
        fields: Map<String, Value>,
    ) -> BoxFuture<'a, Result<(), StoreError>>;

    /// Declares `field` as a vector of `dimensions` in the collection mapping.
    fn ensure_vector_mapping<'a>(
        &'a self,
        collection: &'a str,
        field: &'a str,
        dimensions: usize,
    ) -> BoxFuture<'a, Result<(), StoreError>>;
}
