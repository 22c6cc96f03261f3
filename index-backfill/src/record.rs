//! Core data models used by the library.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::BackfillError;

/// One document of a collection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    /// Source content, without the vector field.
    #[serde(default)]
    pub fields: Map<String, Value>,
    pub embedding: Option<Vec<f32>>,
}

impl Record {
    /// Splits a `_source` document into content fields and the vector field.
    ///
    /// A vector field that is not an array of numbers counts as absent.
    pub fn from_source(id: impl Into<String>, mut source: Map<String, Value>, field: &str) -> Self {
        let embedding = source
            .remove(field)
            .and_then(|v| serde_json::from_value::<Vec<f32>>(v).ok());
        Self {
            id: id.into(),
            fields: source,
            embedding,
        }
    }
}

/// Opaque server-side cursor over a scan.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScanCursor {
    pub token: String,
    /// Vector field of the scan, split out of every `_source`.
    pub field: String,
    pub page_size: usize,
}

/// One page of a scan. `cursor == None` means the scan is exhausted and its
/// server-side context has been released.
#[derive(Debug, Default)]
pub struct ScanPage {
    pub records: Vec<Record>,
    pub cursor: Option<ScanCursor>,
}

/// A record left pending by a run, with the reason.
#[derive(Debug)]
pub struct SkippedRecord {
    pub id: String,
    pub error: BackfillError,
}

/// Outcome of one collection run.
#[derive(Debug, Default)]
pub struct BackfillReport {
    pub collection: String,
    /// Records found without the vector field.
    pub scanned: usize,
    /// Records that received their vector.
    pub embedded: usize,
    /// Records left pending.
    pub skipped: Vec<SkippedRecord>,
    pub elapsed: Duration,
}

impl BackfillReport {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            ..Default::default()
        }
    }

    /// `true` when no record was skipped.
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }

    /// Ids of skipped records, in the order they were reported.
    pub fn skipped_ids(&self) -> Vec<&str> {
        self.skipped.iter().map(|s| s.id.as_str()).collect()
    }
}
