//! Per-record embed + update pipeline with a bounded number of records in flight.

use futures::stream::{Stream, StreamExt};
use tracing::{debug, info, warn};

use crate::BackfillJob;
use crate::errors::BackfillError;
use crate::record::{BackfillReport, Record, SkippedRecord};

enum Outcome {
    Embedded(String),
    Skipped(SkippedRecord),
}

/// Drains `records`, embedding and updating each one, and fills `report`.
///
/// Each in-flight unit is a single record: its vector is computed and then
/// written with one partial update. Per-record failures are logged and
/// collected; a listing error stops the run and is returned.
pub(crate) async fn process_records<S>(
    job: &BackfillJob,
    collection: &str,
    records: S,
    report: &mut BackfillReport,
) -> Result<(), BackfillError>
where
    S: Stream<Item = Result<Record, BackfillError>> + Send,
{
    let concurrency = job.cfg.concurrency.max(1);
    debug!(collection, concurrency, "embed_pool::process_records");

    let outcomes = records
        .map(move |item| async move {
            let record = item?;
            Ok::<_, BackfillError>(embed_one(job, collection, record).await)
        })
        .buffer_unordered(concurrency);
    let mut outcomes = std::pin::pin!(outcomes);

    while let Some(outcome) = outcomes.next().await {
        match outcome? {
            Outcome::Embedded(id) => {
                report.scanned += 1;
                report.embedded += 1;
                if report.embedded % 100 == 0 {
                    info!(collection, embedded = report.embedded, last_id = %id, "backfill progress");
                }
            }
            Outcome::Skipped(skip) => {
                report.scanned += 1;
                report.skipped.push(skip);
            }
        }
    }
    Ok(())
}

async fn embed_one(job: &BackfillJob, collection: &str, record: Record) -> Outcome {
    let vector = match job.compute_embedding(&record).await {
        Ok(v) => v,
        Err(error) => {
            warn!(collection, id = %record.id, %error, "record skipped: embedding failed");
            return Outcome::Skipped(SkippedRecord {
                id: record.id,
                error,
            });
        }
    };

    match job.apply_embedding(collection, &record.id, &vector).await {
        Ok(()) => Outcome::Embedded(record.id),
        Err(error) => {
            warn!(collection, id = %record.id, %error, "record skipped: update failed");
            Outcome::Skipped(SkippedRecord {
                id: record.id,
                error,
            })
        }
    }
}
