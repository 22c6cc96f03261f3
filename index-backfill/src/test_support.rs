//! In-memory search index and scripted embedder for unit tests.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use embedding_service::{EmbeddingError, EmbeddingProvider, HttpError, Provider, ProviderError, ProviderErrorKind};
use reqwest::StatusCode;
use serde_json::{Map, Value};

use crate::embed::EmbeddingsProvider;
use crate::errors::StoreError;
use crate::filters::MissingFieldQuery;
use crate::index::{BoxFuture, SearchIndex};
use crate::record::{Record, ScanCursor, ScanPage};

type Docs = BTreeMap<String, Map<String, Value>>;

#[derive(Default)]
struct State {
    collections: BTreeMap<String, Docs>,
    scans: HashMap<String, (String, VecDeque<Vec<Record>>)>,
    next_token: usize,
    unavailable: HashSet<String>,
    list_fails: bool,
    /// Fails every `next_page` call after this many successful pages.
    fail_after_pages: Option<usize>,
    pages_served: usize,
    /// Ids deleted right before their update arrives.
    vanish: HashSet<String>,
    reject_mapping: bool,
    mappings: Vec<(String, String, usize)>,
    calls: Vec<String>,
}

/// Search engine held in memory. Scans are snapshots taken at `open_scan`.
#[derive(Default)]
pub struct MemoryIndex {
    state: Mutex<State>,
}

fn unavailable(collection: &str) -> StoreError {
    StoreError::HttpStatus {
        status: StatusCode::SERVICE_UNAVAILABLE,
        url: format!("memory://{collection}"),
        snippet: "unavailable".into(),
    }
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, collection: &str, id: &str, doc: Value) {
        let doc = doc.as_object().cloned().unwrap_or_default();
        let mut st = self.state.lock().unwrap();
        st.collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), doc);
    }

    pub fn create(&self, collection: &str) {
        let mut st = self.state.lock().unwrap();
        st.collections.entry(collection.to_string()).or_default();
    }

    pub fn doc(&self, collection: &str, id: &str) -> Option<Map<String, Value>> {
        let st = self.state.lock().unwrap();
        st.collections.get(collection)?.get(id).cloned()
    }

    pub fn make_unavailable(&self, collection: &str) {
        self.state.lock().unwrap().unavailable.insert(collection.to_string());
    }

    pub fn fail_listing(&self) {
        self.state.lock().unwrap().list_fails = true;
    }

    pub fn fail_after_pages(&self, pages: usize) {
        self.state.lock().unwrap().fail_after_pages = Some(pages);
    }

    pub fn vanish_on_update(&self, id: &str) {
        self.state.lock().unwrap().vanish.insert(id.to_string());
    }

    pub fn reject_mapping(&self) {
        self.state.lock().unwrap().reject_mapping = true;
    }

    pub fn mappings(&self) -> Vec<(String, String, usize)> {
        self.state.lock().unwrap().mappings.clone()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Calls that touched `collection`.
    pub fn calls_for(&self, collection: &str) -> Vec<String> {
        let suffix = format!(":{collection}");
        self.calls()
            .into_iter()
            .filter(|c| c.ends_with(&suffix) || c.contains(&format!(":{collection}/")))
            .collect()
    }

    pub fn open_scans(&self) -> usize {
        self.state.lock().unwrap().scans.len()
    }

    fn page_from(st: &mut State, token: String) -> ScanPage {
        let Some((field, pages)) = st.scans.get_mut(&token) else {
            return ScanPage::default();
        };
        let records = pages.pop_front().unwrap_or_default();
        let field = field.clone();
        let page_size = records.len().max(1);
        st.pages_served += 1;
        if st.scans.get(&token).is_some_and(|(_, p)| p.is_empty()) {
            st.scans.remove(&token);
            return ScanPage { records, cursor: None };
        }
        ScanPage {
            records,
            cursor: Some(ScanCursor {
                token,
                field,
                page_size,
            }),
        }
    }
}

impl SearchIndex for MemoryIndex {
    fn list_collections(&self) -> BoxFuture<'_, Result<Vec<String>, StoreError>> {
        Box::pin(async move {
            let mut st = self.state.lock().unwrap();
            st.calls.push("list".into());
            if st.list_fails {
                return Err(unavailable("_cat/indices"));
            }
            Ok(st.collections.keys().cloned().collect())
        })
    }

    fn open_scan<'a>(
        &'a self,
        collection: &'a str,
        query: &'a MissingFieldQuery,
    ) -> BoxFuture<'a, Result<ScanPage, StoreError>> {
        Box::pin(async move {
            let mut st = self.state.lock().unwrap();
            st.calls.push(format!("scan:{collection}"));
            if st.unavailable.contains(collection) {
                return Err(unavailable(collection));
            }
            let docs = st
                .collections
                .get(collection)
                .ok_or_else(|| StoreError::NotFound(collection.to_string()))?;

            let eligible: Vec<Record> = docs
                .iter()
                .filter(|(_, doc)| !doc.contains_key(&query.field))
                .map(|(id, doc)| Record::from_source(id.clone(), doc.clone(), &query.field))
                .collect();
            let mut pages: VecDeque<Vec<Record>> = eligible
                .chunks(query.page_size)
                .map(|c| c.to_vec())
                .collect();
            if pages.is_empty() {
                pages.push_back(Vec::new());
            }

            st.next_token += 1;
            let token = format!("scroll-{}", st.next_token);
            st.scans.insert(token.clone(), (query.field.clone(), pages));
            Ok(Self::page_from(&mut st, token))
        })
    }

    fn next_page<'a>(&'a self, cursor: &'a ScanCursor) -> BoxFuture<'a, Result<ScanPage, StoreError>> {
        Box::pin(async move {
            let mut st = self.state.lock().unwrap();
            st.calls.push(format!("next:{}", cursor.token));
            if st.fail_after_pages.is_some_and(|n| st.pages_served >= n) {
                return Err(unavailable("_search/scroll"));
            }
            Ok(Self::page_from(&mut st, cursor.token.clone()))
        })
    }

    fn update_fields<'a>(
        &'a self,
        collection: &'a str,
        id: &'a str,
        fields: Map<String, Value>,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            let mut st = self.state.lock().unwrap();
            st.calls.push(format!("update:{collection}/{id}"));
            if st.vanish.contains(id) {
                if let Some(docs) = st.collections.get_mut(collection) {
                    docs.remove(id);
                }
            }
            let doc = st
                .collections
                .get_mut(collection)
                .and_then(|docs| docs.get_mut(id))
                .ok_or_else(|| StoreError::NotFound(format!("{collection}/{id}")))?;
            doc.extend(fields);
            Ok(())
        })
    }

    fn ensure_vector_mapping<'a>(
        &'a self,
        collection: &'a str,
        field: &'a str,
        dimensions: usize,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            let mut st = self.state.lock().unwrap();
            st.calls.push(format!("mapping:{collection}"));
            if st.reject_mapping {
                return Err(StoreError::HttpStatus {
                    status: StatusCode::BAD_REQUEST,
                    url: format!("memory://{collection}/_mapping"),
                    snippet: "mapper_parsing_exception".into(),
                });
            }
            if st.unavailable.contains(collection) {
                return Err(unavailable(collection));
            }
            st.mappings.push((collection.to_string(), field.to_string(), dimensions));
            Ok(())
        })
    }
}

/// Embedder returning a distinct vector per call.
///
/// Text containing a `fail_on` marker gets a 429; text containing a
/// `short_on` marker gets a vector one component short.
pub struct ScriptedEmbedder {
    dims: usize,
    calls: AtomicUsize,
    fail_on: Vec<String>,
    short_on: Vec<String>,
    returned: Mutex<Vec<(String, Vec<f32>)>>,
}

impl ScriptedEmbedder {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            calls: AtomicUsize::new(0),
            fail_on: Vec::new(),
            short_on: Vec::new(),
            returned: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_on(mut self, marker: &str) -> Self {
        self.fail_on.push(marker.to_string());
        self
    }

    pub fn short_on(mut self, marker: &str) -> Self {
        self.short_on.push(marker.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// `(input text, vector)` for every successful call.
    pub fn returned(&self) -> Vec<(String, Vec<f32>)> {
        self.returned.lock().unwrap().clone()
    }

    /// Vector returned for the input containing `marker`.
    pub fn vector_for(&self, marker: &str) -> Option<Vec<f32>> {
        self.returned()
            .into_iter()
            .find(|(text, _)| text.contains(marker))
            .map(|(_, v)| v)
    }
}

impl EmbeddingsProvider for ScriptedEmbedder {
    fn embed<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<Vec<f32>, EmbeddingError>> {
        Box::pin(async move {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_on.iter().any(|m| text.contains(m.as_str())) {
                return Err(ProviderError::new(
                    Provider::OpenAI,
                    ProviderErrorKind::HttpStatus(HttpError {
                        status: StatusCode::TOO_MANY_REQUESTS,
                        url: "memory://v1/embeddings".into(),
                        snippet: "rate limited".into(),
                    }),
                )
                .into());
            }
            let len = if self.short_on.iter().any(|m| text.contains(m.as_str())) {
                self.dims - 1
            } else {
                self.dims
            };
            let vector: Vec<f32> = (0..len).map(|i| n as f32 + i as f32 / 10_000.0).collect();
            self.returned
                .lock()
                .unwrap()
                .push((text.to_string(), vector.clone()));
            Ok(vector)
        })
    }

    fn provider(&self) -> EmbeddingProvider {
        EmbeddingProvider::OpenAI
    }

    fn model(&self) -> &str {
        "scripted"
    }

    fn dimensions(&self) -> usize {
        self.dims
    }
}
