//! Thin adapter around the OpenSearch / Elasticsearch REST API.
//!
//! All search engine traffic goes through this facade so the rest of the crate
//! only sees [`SearchIndex`]. Endpoints used:
//! - `GET  /_cat/indices?format=json&h=index`
//! - `POST /{collection}/_search?scroll=..` then `POST /_search/scroll`
//! - `DELETE /_search/scroll`
//! - `POST /{collection}/_update/{id}`
//! - `PUT  /{collection}/_mapping`

use std::time::{Duration, Instant};

use reqwest::{Method, StatusCode, Url};
use serde_json::{Map, Value, json};
use tracing::{debug, error, info, trace, warn};

use crate::config::SearchConfig;
use crate::errors::StoreError;
use crate::filters::MissingFieldQuery;
use crate::index::{BoxFuture, SearchIndex};
use crate::record::{Record, ScanCursor, ScanPage};

const SNIPPET_MAX_CHARS: usize = 200;

/// REST client bound to one cluster.
pub struct OpenSearchFacade {
    client: reqwest::Client,
    base: Url,
    username: Option<String>,
    password: Option<String>,
    keep_alive: String,
}

impl OpenSearchFacade {
    /// Creates a new facade from the given configuration.
    ///
    /// # Errors
    /// `StoreError::Config` for invalid settings, `StoreError::Transport` if
    /// the HTTP client cannot be built.
    pub fn new(cfg: &SearchConfig) -> Result<Self, StoreError> {
        cfg.validate()?;

        let base = Url::parse(cfg.url.trim_end_matches('/'))
            .map_err(|e| StoreError::Config(format!("invalid search url: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(StoreError::Config(format!("search url cannot be a base: {base}")));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .danger_accept_invalid_certs(!cfg.verify_certs)
            .build()?;

        info!(
            url = %base,
            verify_certs = cfg.verify_certs,
            auth = cfg.username.is_some(),
            "OpenSearchFacade initialized"
        );

        Ok(Self {
            client,
            base,
            username: cfg.username.clone(),
            password: cfg.password.clone(),
            keep_alive: cfg.scroll_keep_alive.clone(),
        })
    }

    /// Builds `{base}/{segments...}` with each segment percent-encoded.
    fn url(&self, segments: &[&str]) -> Result<Url, StoreError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::Config(format!("search url cannot be a base: {}", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Sends a request and returns the decoded JSON body.
    ///
    /// 404 maps to [`StoreError::NotFound`], other non-2xx to [`StoreError::HttpStatus`].
    async fn send(&self, method: Method, url: Url, body: Option<&Value>) -> Result<Value, StoreError> {
        let started = Instant::now();
        trace!(%method, %url, "search request");

        let mut rb = self.client.request(method.clone(), url.clone());
        if let Some(user) = &self.username {
            rb = rb.basic_auth(user, self.password.as_ref());
        }
        if let Some(b) = body {
            rb = rb.json(b);
        }

        let resp = rb.send().await?;
        let status = resp.status();
        let text = resp.text().await?;

        if status == StatusCode::NOT_FOUND {
            debug!(%method, %url, "search engine answered 404");
            return Err(StoreError::NotFound(format!("{url}: {}", snippet(&text))));
        }
        if !status.is_success() {
            let snippet = snippet(&text);
            error!(
                %status,
                %method,
                %url,
                %snippet,
                latency_ms = started.elapsed().as_millis(),
                "search engine returned non-success status"
            );
            return Err(StoreError::HttpStatus {
                status,
                url: url.to_string(),
                snippet,
            });
        }

        trace!(%status, latency_ms = started.elapsed().as_millis(), "search response");
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }

    async fn release_scroll(&self, token: &str) {
        let result = match self.url(&["_search", "scroll"]) {
            Ok(url) => {
                self.send(Method::DELETE, url, Some(&json!({ "scroll_id": [token] })))
                    .await
            }
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            // The context expires with its keep-alive anyway.
            warn!(error = %e, "failed to clear scroll context");
        }
    }

    /// Turns a raw search response into a page, releasing the scroll once exhausted.
    async fn into_page(
        &self,
        body: &Value,
        field: &str,
        page_size: usize,
    ) -> Result<ScanPage, StoreError> {
        let (records, token) = parse_search_page(body, field)?;
        let exhausted = records.len() < page_size;

        let cursor = match token {
            Some(token) if exhausted => {
                self.release_scroll(&token).await;
                None
            }
            Some(token) => Some(ScanCursor {
                token,
                field: field.to_string(),
                page_size,
            }),
            None => None,
        };
        debug!(hits = records.len(), more = cursor.is_some(), "scan page");
        Ok(ScanPage { records, cursor })
    }
}

impl SearchIndex for OpenSearchFacade {
    fn list_collections(&self) -> BoxFuture<'_, Result<Vec<String>, StoreError>> {
        Box::pin(async move {
            let mut url = self.url(&["_cat", "indices"])?;
            url.query_pairs_mut()
                .append_pair("format", "json")
                .append_pair("h", "index");
            let body = self.send(Method::GET, url, None).await?;
            let names = parse_cat_indices(&body)?;
            debug!(count = names.len(), "listed collections");
            Ok(names)
        })
    }

    fn open_scan<'a>(
        &'a self,
        collection: &'a str,
        query: &'a MissingFieldQuery,
    ) -> BoxFuture<'a, Result<ScanPage, StoreError>> {
        Box::pin(async move {
            let mut url = self.url(&[collection, "_search"])?;
            url.query_pairs_mut().append_pair("scroll", &self.keep_alive);
            debug!(collection, field = %query.field, page_size = query.page_size, "opening scan");
            let body = self
                .send(Method::POST, url, Some(&query.to_search_body()))
                .await?;
            self.into_page(&body, &query.field, query.page_size).await
        })
    }

    fn next_page<'a>(&'a self, cursor: &'a ScanCursor) -> BoxFuture<'a, Result<ScanPage, StoreError>> {
        Box::pin(async move {
            let url = self.url(&["_search", "scroll"])?;
            let req = json!({ "scroll": self.keep_alive, "scroll_id": cursor.token });
            let body = self.send(Method::POST, url, Some(&req)).await?;
            self.into_page(&body, &cursor.field, cursor.page_size).await
        })
    }

    fn update_fields<'a>(
        &'a self,
        collection: &'a str,
        id: &'a str,
        fields: Map<String, Value>,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            let url = self.url(&[collection, "_update", id])?;
            let body = self
                .send(Method::POST, url, Some(&json!({ "doc": fields })))
                .await?;
            trace!(collection, id, result = ?body.get("result"), "record updated");
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
            let url = self.url(&[collection, "_mapping"])?;
            let body = vector_mapping_body(field, dimensions);
            self.send(Method::PUT, url, Some(&body)).await?;
            info!(collection, field, dimensions, "vector mapping ensured");
            Ok(())
        })
    }
}

/// `knn_vector` mapping for the vector field.
pub fn vector_mapping_body(field: &str, dimensions: usize) -> Value {
    let mut properties = Map::new();
    properties.insert(
        field.to_string(),
        json!({ "type": "knn_vector", "dimension": dimensions }),
    );
    json!({ "properties": properties })
}

/// Extracts records and the scroll id from a `_search` / `_search/scroll` response.
pub fn parse_search_page(body: &Value, field: &str) -> Result<(Vec<Record>, Option<String>), StoreError> {
    let token = body
        .get("_scroll_id")
        .and_then(Value::as_str)
        .map(str::to_string);

    let hits = body
        .pointer("/hits/hits")
        .and_then(Value::as_array)
        .ok_or_else(|| StoreError::Decode("missing `hits.hits` in search response".into()))?;

    let mut records = Vec::with_capacity(hits.len());
    for hit in hits {
        let id = match hit.get("_id") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => return Err(StoreError::Decode("hit without `_id`".into())),
        };
        let source = hit
            .get("_source")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        records.push(Record::from_source(id, source, field));
    }
    Ok((records, token))
}

/// Extracts index names from `_cat/indices?format=json`.
pub fn parse_cat_indices(body: &Value) -> Result<Vec<String>, StoreError> {
    let rows = body
        .as_array()
        .ok_or_else(|| StoreError::Decode("expected an array from _cat/indices".into()))?;
    let mut names: Vec<String> = rows
        .iter()
        .filter_map(|row| row.get("index").and_then(Value::as_str))
        .map(str::to_string)
        .collect();
    names.sort();
    Ok(names)
}

fn snippet(body: &str) -> String {
    let flat = body.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= SNIPPET_MAX_CHARS {
        flat
    } else {
        flat.chars().take(SNIPPET_MAX_CHARS).collect::<String>() + "…"
    }
}
