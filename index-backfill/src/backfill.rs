//! Collection-level orchestration: eligibility, per-record steps, full runs.

use std::time::Instant;

use embedding_service::{Provider, check_vector};
use futures::stream::{self, Stream, StreamExt, TryStreamExt};
use serde_json::{Map, json};
use tracing::{debug, error, info, warn};

use crate::{BackfillJob, CollectionOutcome};
use crate::embed_pool;
use crate::errors::{BackfillError, StoreError};
use crate::filters::MissingFieldQuery;
use crate::normalize::embedding_text;
use crate::record::{BackfillReport, Record};
use crate::scan::scan_missing;

/// Collection name used in errors when the collection list itself is unavailable.
pub const ALL_COLLECTIONS: &str = "_all";

pub(crate) fn ensure_not_reserved(job: &BackfillJob, collection: &str) -> Result<(), BackfillError> {
    if job.reserved.is_reserved(collection) {
        return Err(BackfillError::ReservedCollection(collection.to_string()));
    }
    Ok(())
}

pub(crate) fn list_eligible_records<'a>(
    job: &'a BackfillJob,
    collection: &'a str,
) -> Result<impl Stream<Item = Result<Record, BackfillError>> + Send + 'a, BackfillError> {
    ensure_not_reserved(job, collection)?;
    let query = MissingFieldQuery::new(job.cfg.field.clone(), job.cfg.page_size);
    debug!(collection, field = %query.field, page_size = query.page_size, "list_eligible_records");

    Ok(
        scan_missing(job.index.as_ref(), collection, query).map_err(move |source| {
            BackfillError::CollectionUnavailable {
                collection: collection.to_string(),
                source,
            }
        }),
    )
}

/// Embeds one record and validates the vector.
///
/// This is the authoritative length/finiteness check for every
/// [`EmbeddingsProvider`](crate::EmbeddingsProvider); providers may check too.
pub(crate) async fn compute_embedding(job: &BackfillJob, record: &Record) -> Result<Vec<f32>, BackfillError> {
    let text = embedding_text(&record.fields, &job.cfg.field, job.cfg.max_text_chars);
    let embedder = job.embedder.as_ref();

    let vector = embedder
        .embed(&text)
        .await
        .map_err(|source| BackfillError::EmbeddingService {
            id: record.id.clone(),
            source,
        })?;

    check_vector(Provider::from(embedder.provider()), &vector, embedder.dimensions()).map_err(|e| {
        BackfillError::EmbeddingService {
            id: record.id.clone(),
            source: e.into(),
        }
    })?;
    Ok(vector)
}

pub(crate) async fn apply_embedding(
    job: &BackfillJob,
    collection: &str,
    record_id: &str,
    vector: &[f32],
) -> Result<(), BackfillError> {
    let mut fields = Map::new();
    fields.insert(job.cfg.field.clone(), json!(vector));

    job.index
        .update_fields(collection, record_id, fields)
        .await
        .map_err(|source| BackfillError::RecordUpdate {
            id: record_id.to_string(),
            source,
        })
}

pub(crate) async fn backfill(job: &BackfillJob, collection: &str) -> Result<BackfillReport, BackfillError> {
    ensure_not_reserved(job, collection)?;
    let started = Instant::now();
    info!(
        collection,
        field = %job.cfg.field,
        model = job.embedder.model(),
        "backfill started"
    );

    if job.cfg.ensure_mapping {
        ensure_mapping(job, collection).await?;
    }

    let mut report = BackfillReport::new(collection);
    let records = list_eligible_records(job, collection)?;
    let outcome = embed_pool::process_records(job, collection, records, &mut report).await;
    report.elapsed = started.elapsed();

    if let Err(e) = outcome {
        error!(
            collection,
            embedded = report.embedded,
            error = %e,
            "backfill aborted"
        );
        return Err(e);
    }

    info!(
        collection,
        scanned = report.scanned,
        embedded = report.embedded,
        skipped = report.skipped.len(),
        elapsed_ms = report.elapsed.as_millis() as u64,
        "backfill finished"
    );
    Ok(report)
}

async fn ensure_mapping(job: &BackfillJob, collection: &str) -> Result<(), BackfillError> {
    let dims = job.embedder.dimensions();
    debug!(collection, dims, "ensure_vector_mapping");
    job.index
        .ensure_vector_mapping(collection, &job.cfg.field, dims)
        .await
        .map_err(|source| match source {
            StoreError::HttpStatus { .. } | StoreError::Decode(_) | StoreError::Parse(_) => {
                BackfillError::MappingRejected {
                    collection: collection.to_string(),
                    source,
                }
            }
            other => BackfillError::CollectionUnavailable {
                collection: collection.to_string(),
                source: other,
            },
        })
}

pub(crate) async fn eligible_collections(job: &BackfillJob) -> Result<Vec<String>, BackfillError> {
    let names = job
        .index
        .list_collections()
        .await
        .map_err(|source| BackfillError::CollectionUnavailable {
            collection: ALL_COLLECTIONS.to_string(),
            source,
        })?;
    let total = names.len();
    let eligible = job.reserved.retain_eligible(names);
    debug!(total, eligible = eligible.len(), "eligible_collections");
    Ok(eligible)
}

pub(crate) async fn backfill_all(job: &BackfillJob) -> Result<Vec<CollectionOutcome>, BackfillError> {
    let collections = eligible_collections(job).await?;
    Ok(run_collections(job, collections).await)
}

/// Runs `backfill` over `collections`, at most `collection_concurrency` at a time.
///
/// Results come back sorted by collection name.
pub(crate) async fn run_collections(job: &BackfillJob, collections: Vec<String>) -> Vec<CollectionOutcome> {
    let limit = job.cfg.collection_concurrency.max(1);
    info!(collections = collections.len(), limit, "backfill_all");

    let mut results: Vec<CollectionOutcome> = stream::iter(collections)
        .map(move |name| async move {
            let result = backfill(job, &name).await;
            if let Err(e) = &result {
                warn!(collection = %name, error = %e, "collection run failed");
            }
            (name, result)
        })
        .buffer_unordered(limit)
        .collect()
        .await;

    results.sort_by(|a, b| a.0.cmp(&b.0));
    results
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use embedding_service::{EmbeddingError, ProviderError, ProviderErrorKind};
    use serde_json::json;

    use super::*;
    use crate::config::BackfillConfig;
    use crate::test_support::{MemoryIndex, ScriptedEmbedder};

    const DIMS: usize = 1536;

    fn job_with(index: &Arc<MemoryIndex>, embedder: &Arc<ScriptedEmbedder>, cfg: BackfillConfig) -> BackfillJob {
        BackfillJob::new(cfg, index.clone(), embedder.clone()).unwrap()
    }

    fn job(index: &Arc<MemoryIndex>, embedder: &Arc<ScriptedEmbedder>) -> BackfillJob {
        job_with(index, embedder, BackfillConfig::default())
    }

    fn stored_vector(index: &MemoryIndex, collection: &str, id: &str) -> Option<Vec<f32>> {
        let doc = index.doc(collection, id)?;
        serde_json::from_value(doc.get("embedding")?.clone()).ok()
    }

    fn docs_fixture() -> (Arc<MemoryIndex>, Vec<f32>) {
        let index = Arc::new(MemoryIndex::new());
        let existing: Vec<f32> = (0..DIMS).map(|i| i as f32 / 2_000.0).collect();
        index.insert("docs", "1", json!({"text": "alpha"}));
        index.insert("docs", "2", json!({"text": "beta", "embedding": existing}));
        (index, existing)
    }

    #[tokio::test]
    async fn embeds_missing_records_and_leaves_existing_vectors() {
        let (index, existing) = docs_fixture();
        let embedder = Arc::new(ScriptedEmbedder::new(DIMS));
        let job = job(&index, &embedder);

        let report = job.backfill("docs").await.unwrap();

        assert_eq!(report.collection, "docs");
        assert_eq!(report.scanned, 1);
        assert_eq!(report.embedded, 1);
        assert!(report.is_complete());

        let v1 = stored_vector(&index, "docs", "1").unwrap();
        assert_eq!(v1.len(), DIMS);
        assert_eq!(stored_vector(&index, "docs", "2").unwrap(), existing);
        assert_eq!(embedder.calls(), 1);
        assert_eq!(embedder.returned()[0].0, "```alpha```");
    }

    #[tokio::test]
    async fn second_run_finds_nothing_to_do() {
        let (index, _) = docs_fixture();
        let embedder = Arc::new(ScriptedEmbedder::new(DIMS));
        let job = job(&index, &embedder);

        job.backfill("docs").await.unwrap();
        let before = index.doc("docs", "1");
        let report = job.backfill("docs").await.unwrap();

        assert_eq!(report.scanned, 0);
        assert_eq!(report.embedded, 0);
        assert_eq!(embedder.calls(), 1);
        assert_eq!(index.doc("docs", "1"), before);
    }

    #[tokio::test]
    async fn update_touches_only_the_vector_field() {
        let index = Arc::new(MemoryIndex::new());
        index.insert(
            "notices",
            "7",
            json!({"title": "입법예고", "body": "line one\nline two", "meta": {"views": 3}}),
        );
        let embedder = Arc::new(ScriptedEmbedder::new(4));
        let job = job_with(&index, &embedder, BackfillConfig::default());

        job.backfill("notices").await.unwrap();

        let doc = index.doc("notices", "7").unwrap();
        assert_eq!(doc["title"], json!("입법예고"));
        assert_eq!(doc["body"], json!("line one\nline two"));
        assert_eq!(doc["meta"], json!({"views": 3}));
        assert_eq!(doc.len(), 4);
    }

    #[tokio::test]
    async fn stored_vector_is_exactly_what_the_service_returned() {
        let (index, _) = docs_fixture();
        let embedder = Arc::new(ScriptedEmbedder::new(DIMS));
        let job = job(&index, &embedder);

        job.backfill("docs").await.unwrap();

        let returned = embedder.vector_for("alpha").unwrap();
        assert_eq!(stored_vector(&index, "docs", "1").unwrap(), returned);
    }

    #[tokio::test]
    async fn reserved_collections_are_rejected_without_requests() {
        let index = Arc::new(MemoryIndex::new());
        index.insert(".kibana", "cfg", json!({"text": "system"}));
        let embedder = Arc::new(ScriptedEmbedder::new(4));
        let job = job_with(&index, &embedder, BackfillConfig::default());

        let err = job.backfill(".kibana").await.unwrap_err();
        assert!(matches!(err, BackfillError::ReservedCollection(ref c) if c == ".kibana"));
        assert!(matches!(
            job.list_eligible_records(".kibana"),
            Err(BackfillError::ReservedCollection(_))
        ));

        assert!(index.calls_for(".kibana").is_empty());
        assert_eq!(embedder.calls(), 0);
        assert!(!index.doc(".kibana", "cfg").unwrap().contains_key("embedding"));
    }

    #[tokio::test]
    async fn backfill_all_skips_reserved_and_sorts_results() {
        let index = Arc::new(MemoryIndex::new());
        index.insert("raw_data", "a", json!({"text": "one"}));
        index.insert(".opendistro-job-scheduler-lock", "l", json!({"text": "lock"}));
        index.insert("docs", "b", json!({"text": "two"}));
        let embedder = Arc::new(ScriptedEmbedder::new(4));
        let job = job_with(&index, &embedder, BackfillConfig::default());

        assert_eq!(job.eligible_collections().await.unwrap(), vec!["docs", "raw_data"]);

        let results = job.backfill_all().await.unwrap();
        let names: Vec<&str> = results.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["docs", "raw_data"]);
        assert!(results.iter().all(|(_, r)| r.as_ref().is_ok_and(|r| r.embedded == 1)));

        assert!(index.calls_for(".opendistro-job-scheduler-lock").is_empty());
        assert!(
            !index
                .doc(".opendistro-job-scheduler-lock", "l")
                .unwrap()
                .contains_key("embedding")
        );
    }

    #[tokio::test]
    async fn embedding_failure_skips_only_that_record() {
        let index = Arc::new(MemoryIndex::new());
        for (id, text) in [("1", "first"), ("2", "second"), ("3", "third"), ("4", "fourth")] {
            index.insert("docs", id, json!({"text": text}));
        }
        let embedder = Arc::new(ScriptedEmbedder::new(4).failing_on("third"));
        let job = job_with(&index, &embedder, BackfillConfig::default());

        let report = job.backfill("docs").await.unwrap();

        assert_eq!(report.scanned, 4);
        assert_eq!(report.embedded, 3);
        assert_eq!(report.skipped_ids(), vec!["3"]);
        let skipped = &report.skipped[0].error;
        assert!(skipped.is_per_record());
        assert!(matches!(
            skipped,
            BackfillError::EmbeddingService { id, source } if id == "3" && source.is_rate_limited()
        ));

        assert!(stored_vector(&index, "docs", "3").is_none());
        for id in ["1", "2", "4"] {
            assert!(stored_vector(&index, "docs", id).is_some(), "record {id}");
        }

        // Still eligible for the next run.
        let pending: Vec<Record> = job.list_eligible_records("docs").unwrap().try_collect().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, "3");
    }

    #[tokio::test]
    async fn record_deleted_before_update_is_reported() {
        let index = Arc::new(MemoryIndex::new());
        index.insert("docs", "1", json!({"text": "kept"}));
        index.insert("docs", "2", json!({"text": "gone"}));
        index.vanish_on_update("2");
        let embedder = Arc::new(ScriptedEmbedder::new(4));
        let job = job_with(&index, &embedder, BackfillConfig::default());

        let report = job.backfill("docs").await.unwrap();

        assert_eq!(report.embedded, 1);
        assert!(matches!(
            &report.skipped[0].error,
            BackfillError::RecordUpdate { id, source: StoreError::NotFound(_) } if id == "2"
        ));
        assert!(index.doc("docs", "2").is_none());
    }

    #[tokio::test]
    async fn wrong_dimension_is_never_written() {
        let index = Arc::new(MemoryIndex::new());
        index.insert("docs", "1", json!({"text": "fine"}));
        index.insert("docs", "2", json!({"text": "truncated"}));
        let embedder = Arc::new(ScriptedEmbedder::new(8).short_on("truncated"));
        let job = job_with(&index, &embedder, BackfillConfig::default());

        let report = job.backfill("docs").await.unwrap();

        assert_eq!(report.skipped_ids(), vec!["2"]);
        assert!(matches!(
            &report.skipped[0].error,
            BackfillError::EmbeddingService {
                source: EmbeddingError::Provider(ProviderError {
                    kind: ProviderErrorKind::DimensionMismatch { got: 7, want: 8 },
                    ..
                }),
                ..
            }
        ));
        assert!(stored_vector(&index, "docs", "2").is_none());
        assert!(!index.calls().contains(&"update:docs/2".to_string()));
    }

    #[tokio::test]
    async fn scans_across_several_pages() {
        let index = Arc::new(MemoryIndex::new());
        for i in 0..25 {
            index.insert("docs", &format!("{i:02}"), json!({"n": i}));
        }
        let embedder = Arc::new(ScriptedEmbedder::new(4));
        let cfg = BackfillConfig {
            page_size: 10,
            ..BackfillConfig::default()
        };
        let job = job_with(&index, &embedder, cfg);

        let report = job.backfill("docs").await.unwrap();

        assert_eq!(report.scanned, 25);
        assert_eq!(report.embedded, 25);
        let next_calls = index.calls().iter().filter(|c| c.starts_with("next:")).count();
        assert_eq!(next_calls, 2);
        assert_eq!(index.open_scans(), 0);
    }

    #[tokio::test]
    async fn listing_failure_aborts_but_keeps_earlier_work() {
        let index = Arc::new(MemoryIndex::new());
        for i in 0..6 {
            index.insert("docs", &i.to_string(), json!({"n": i}));
        }
        index.fail_after_pages(1);
        let embedder = Arc::new(ScriptedEmbedder::new(4));
        let cfg = BackfillConfig {
            page_size: 3,
            ..BackfillConfig::default()
        };
        let job = job_with(&index, &embedder, cfg);

        let err = job.backfill("docs").await.unwrap_err();

        assert!(matches!(err, BackfillError::CollectionUnavailable { ref collection, .. } if collection == "docs"));
        assert!(!err.is_per_record());
        let embedded = (0..6)
            .filter(|i| stored_vector(&index, "docs", &i.to_string()).is_some())
            .count();
        assert_eq!(embedded, 3);
    }

    #[tokio::test]
    async fn unavailable_or_missing_collection() {
        let index = Arc::new(MemoryIndex::new());
        index.insert("docs", "1", json!({"text": "x"}));
        index.make_unavailable("docs");
        let embedder = Arc::new(ScriptedEmbedder::new(4));
        let job = job_with(&index, &embedder, BackfillConfig::default());

        assert!(matches!(
            job.backfill("docs").await,
            Err(BackfillError::CollectionUnavailable { .. })
        ));
        assert!(matches!(
            job.backfill("nope").await,
            Err(BackfillError::CollectionUnavailable {
                source: StoreError::NotFound(_),
                ..
            })
        ));
        assert_eq!(embedder.calls(), 0);
    }

    #[tokio::test]
    async fn collection_list_failure_is_reported_as_all() {
        let index = Arc::new(MemoryIndex::new());
        index.fail_listing();
        let embedder = Arc::new(ScriptedEmbedder::new(4));
        let job = job_with(&index, &embedder, BackfillConfig::default());

        let err = job.backfill_all().await.unwrap_err();
        assert!(matches!(err, BackfillError::CollectionUnavailable { ref collection, .. } if collection == ALL_COLLECTIONS));
    }

    #[tokio::test]
    async fn concurrent_run_reaches_the_same_state() {
        let seed = |index: &MemoryIndex| {
            for i in 0..40 {
                let doc = if i % 5 == 0 {
                    json!({"n": i, "embedding": [0.0, 0.0, 0.0, 0.0]})
                } else {
                    json!({"n": i})
                };
                index.insert("docs", &format!("{i:02}"), doc);
            }
        };

        let seq_index = Arc::new(MemoryIndex::new());
        seed(seq_index.as_ref());
        let seq = job_with(
            &seq_index,
            &Arc::new(ScriptedEmbedder::new(4)),
            BackfillConfig {
                page_size: 7,
                ..BackfillConfig::default()
            },
        )
        .backfill("docs")
        .await
        .unwrap();

        let par_index = Arc::new(MemoryIndex::new());
        seed(par_index.as_ref());
        let par = job_with(
            &par_index,
            &Arc::new(ScriptedEmbedder::new(4)),
            BackfillConfig {
                page_size: 7,
                concurrency: 8,
                ..BackfillConfig::default()
            },
        )
        .backfill("docs")
        .await
        .unwrap();

        assert_eq!((seq.scanned, seq.embedded), (32, 32));
        assert_eq!((par.scanned, par.embedded), (32, 32));
        for i in 0..40 {
            let id = format!("{i:02}");
            let a = seq_index.doc("docs", &id).unwrap();
            let b = par_index.doc("docs", &id).unwrap();
            assert_eq!(a.contains_key("embedding"), b.contains_key("embedding"));
            assert_eq!(a["n"], b["n"]);
        }
    }

    #[tokio::test]
    async fn apply_embedding_is_idempotent() {
        let (index, _) = docs_fixture();
        let embedder = Arc::new(ScriptedEmbedder::new(DIMS));
        let job = job(&index, &embedder);
        let vector = vec![0.25_f32; DIMS];

        job.apply_embedding("docs", "1", &vector).await.unwrap();
        let once = index.doc("docs", "1");
        job.apply_embedding("docs", "1", &vector).await.unwrap();

        assert_eq!(index.doc("docs", "1"), once);
        assert_eq!(stored_vector(&index, "docs", "1").unwrap(), vector);
    }

    #[tokio::test]
    async fn ensure_mapping_runs_before_scanning() {
        let (index, _) = docs_fixture();
        let embedder = Arc::new(ScriptedEmbedder::new(DIMS));
        let cfg = BackfillConfig {
            ensure_mapping: true,
            ..BackfillConfig::default()
        };
        let job = job_with(&index, &embedder, cfg);

        job.backfill("docs").await.unwrap();

        assert_eq!(
            index.mappings(),
            vec![("docs".to_string(), "embedding".to_string(), DIMS)]
        );
        assert_eq!(index.calls()[..2], ["mapping:docs".to_string(), "scan:docs".to_string()]);
    }

    #[tokio::test]
    async fn rejected_mapping_aborts_the_collection() {
        let (index, _) = docs_fixture();
        index.reject_mapping();
        let embedder = Arc::new(ScriptedEmbedder::new(DIMS));
        let cfg = BackfillConfig {
            ensure_mapping: true,
            ..BackfillConfig::default()
        };
        let job = job_with(&index, &embedder, cfg);

        let err = job.backfill("docs").await.unwrap_err();
        assert!(matches!(err, BackfillError::MappingRejected { .. }));
        assert_eq!(embedder.calls(), 0);
        assert!(stored_vector(&index, "docs", "1").is_none());
    }

    #[tokio::test]
    async fn explicit_collection_list_reports_reserved_entries() {
        let (index, _) = docs_fixture();
        let embedder = Arc::new(ScriptedEmbedder::new(DIMS));
        let job = job(&index, &embedder);

        let results = job
            .backfill_collections(vec!["docs".to_string(), ".tasks".to_string()])
            .await;

        assert_eq!(results[0].0, ".tasks");
        assert!(matches!(results[0].1, Err(BackfillError::ReservedCollection(_))));
        assert!(results[1].1.is_ok());
    }
}
