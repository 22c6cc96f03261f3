//! Scrolled eligibility scan as a lazy record stream.

use futures::stream::{self, Stream, TryStreamExt};
use tracing::trace;

use crate::errors::StoreError;
use crate::filters::MissingFieldQuery;
use crate::index::SearchIndex;
use crate::record::{Record, ScanCursor};

enum ScanState {
    Start(MissingFieldQuery),
    Next(ScanCursor),
    Done,
}

/// Streams every record of `collection` matching `query`, one page in memory at a time.
///
/// Pages are only fetched as the stream is polled. If the consumer stops early
/// the server-side context is left to expire with its keep-alive.
pub fn scan_missing<'a>(
    index: &'a dyn SearchIndex,
    collection: &'a str,
    query: MissingFieldQuery,
) -> impl Stream<Item = Result<Record, StoreError>> + Send + 'a {
    stream::try_unfold(ScanState::Start(query), move |state| async move {
        let page = match state {
            ScanState::Start(query) => index.open_scan(collection, &query).await?,
            ScanState::Next(cursor) => index.next_page(&cursor).await?,
            ScanState::Done => return Ok(None),
        };
        trace!(collection, records = page.records.len(), "scan::page");
        let next = match page.cursor {
            Some(cursor) => ScanState::Next(cursor),
            None => ScanState::Done,
        };
        Ok::<_, StoreError>(Some((page.records, next)))
    })
    .map_ok(|records| stream::iter(records.into_iter().map(Ok::<Record, StoreError>)))
    .try_flatten()
}
