//! Search engine connection and job configuration.

use std::fmt;
use std::str::FromStr;

use crate::errors::{BackfillError, StoreError};

/// Connection settings for the search engine REST API.
#[derive(Clone)]
pub struct SearchConfig {
    /// Base URL, e.g. `https://search.internal:9200`.
    pub url: String,
    /// Basic auth user.
    pub username: Option<String>,
    /// Basic auth password.
    pub password: Option<String>,
    /// Verify TLS certificates (off in the self-signed default deployment).
    pub verify_certs: bool,
    /// Per-request timeout.
    pub timeout_secs: u64,
    /// Scroll context keep-alive, e.g. `5m`.
    pub scroll_keep_alive: String,
}

impl SearchConfig {
    /// Creates a sane default config for the given endpoint.
    pub fn new_default(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            username: None,
            password: None,
            verify_certs: false,
            timeout_secs: 30,
            scroll_keep_alive: "5m".to_string(),
        }
    }

    /// Reads the config from the process environment.
    pub fn from_env() -> Result<Self, StoreError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the config from a variable lookup.
    ///
    /// `OPENSEARCH_URL` wins; otherwise the URL is assembled from
    /// `OPENSEARCH_HOST` (or `HOST`), `OPENSEARCH_PORT` (or `PORT`, default 9200)
    /// and `OPENSEARCH_USE_SSL` (default true).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, StoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let get_any = |names: &[&str]| names.iter().find_map(|&n| get(n));

        let url = match get("OPENSEARCH_URL") {
            Some(url) => url.trim().to_string(),
            None => {
                let host = get_any(&["OPENSEARCH_HOST", "HOST"][..]).ok_or_else(|| {
                    StoreError::Config("OPENSEARCH_URL or OPENSEARCH_HOST must be set".into())
                })?;
                let port: u16 =
                    parse_or(get_any(&["OPENSEARCH_PORT", "PORT"][..]), "OPENSEARCH_PORT", 9200)?;
                let use_ssl =
                    parse_bool_or(get("OPENSEARCH_USE_SSL"), "OPENSEARCH_USE_SSL", true)?;
                let scheme = if use_ssl { "https" } else { "http" };
                format!("{scheme}://{}:{port}", host.trim())
            }
        };

        let cfg = Self {
            url,
            username: get("OPENSEARCH_ID"),
            password: get("OPENSEARCH_PASSWORD"),
            verify_certs: parse_bool_or(
                get("OPENSEARCH_VERIFY_CERTS"),
                "OPENSEARCH_VERIFY_CERTS",
                false,
            )?,
            timeout_secs: parse_or(get("OPENSEARCH_TIMEOUT_SECS"), "OPENSEARCH_TIMEOUT_SECS", 30)?,
            scroll_keep_alive: get("BACKFILL_SCROLL_KEEP_ALIVE")
                .map(|s| s.trim().to_string())
                .unwrap_or_else(|| "5m".to_string()),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Validates config values.
    pub fn validate(&self) -> Result<(), StoreError> {
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(StoreError::Config(
                "search url must start with http:// or https://".into(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(StoreError::Config("timeout_secs must be > 0".into()));
        }
        if self.scroll_keep_alive.is_empty() {
            return Err(StoreError::Config("scroll_keep_alive is empty".into()));
        }
        if self.password.is_some() && self.username.is_none() {
            return Err(StoreError::Config("password set without username".into()));
        }
        Ok(())
    }
}

impl fmt::Debug for SearchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchConfig")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***REDACTED***"))
            .field("verify_certs", &self.verify_certs)
            .field("timeout_secs", &self.timeout_secs)
            .field("scroll_keep_alive", &self.scroll_keep_alive)
            .finish()
    }
}

/// Behaviour of one backfill run.
#[derive(Clone, Debug)]
pub struct BackfillConfig {
    /// Name of the vector field to fill.
    pub field: String,
    /// Records fetched per scroll page.
    pub page_size: usize,
    /// Max in-flight records (embed + update) within one collection.
    pub concurrency: usize,
    /// Max collections processed at the same time by `backfill_all`.
    pub collection_concurrency: usize,
    /// Cap on the serialized text sent to the embedding service.
    pub max_text_chars: usize,
    /// Collections whose name starts with one of these are never touched.
    pub reserved_prefixes: Vec<String>,
    /// Put a `knn_vector` mapping for `field` before scanning.
    pub ensure_mapping: bool,
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            field: "embedding".to_string(),
            page_size: 100,
            concurrency: 1,
            collection_concurrency: 1,
            max_text_chars: 24_000,
            reserved_prefixes: vec![".".to_string()],
            ensure_mapping: false,
        }
    }
}

impl BackfillConfig {
    /// Reads the config from the process environment.
    pub fn from_env() -> Result<Self, BackfillError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the config from a variable lookup; unset values keep their default.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, BackfillError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let d = Self::default();
        let to_cfg = |e: StoreError| match e {
            StoreError::Config(msg) => BackfillError::Config(msg),
            other => BackfillError::Config(other.to_string()),
        };

        let cfg = Self {
            field: get("BACKFILL_FIELD")
                .map(|s| s.trim().to_string())
                .unwrap_or(d.field),
            page_size: parse_or(get("BACKFILL_PAGE_SIZE"), "BACKFILL_PAGE_SIZE", d.page_size)
                .map_err(to_cfg)?,
            concurrency: parse_or(get("BACKFILL_CONCURRENCY"), "BACKFILL_CONCURRENCY", d.concurrency)
                .map_err(to_cfg)?,
            collection_concurrency: parse_or(
                get("BACKFILL_COLLECTION_CONCURRENCY"),
                "BACKFILL_COLLECTION_CONCURRENCY",
                d.collection_concurrency,
            )
            .map_err(to_cfg)?,
            max_text_chars: parse_or(
                get("BACKFILL_MAX_TEXT_CHARS"),
                "BACKFILL_MAX_TEXT_CHARS",
                d.max_text_chars,
            )
            .map_err(to_cfg)?,
            reserved_prefixes: get("BACKFILL_RESERVED_PREFIXES")
                .map(|s| {
                    s.split(',')
                        .map(str::trim)
                        .filter(|p| !p.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or(d.reserved_prefixes),
            ensure_mapping: parse_bool_or(
                get("BACKFILL_ENSURE_MAPPING"),
                "BACKFILL_ENSURE_MAPPING",
                d.ensure_mapping,
            )
            .map_err(to_cfg)?,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Validates config values.
    pub fn validate(&self) -> Result<(), BackfillError> {
        if self.field.is_empty() {
            return Err(BackfillError::Config("field is empty".into()));
        }
        if self.page_size == 0 {
            return Err(BackfillError::Config("page_size must be > 0".into()));
        }
        if self.concurrency == 0 || self.collection_concurrency == 0 {
            return Err(BackfillError::Config("concurrency must be > 0".into()));
        }
        if self.max_text_chars == 0 {
            return Err(BackfillError::Config("max_text_chars must be > 0".into()));
        }
        Ok(())
    }
}

fn parse_or<T: FromStr>(raw: Option<String>, var: &str, default: T) -> Result<T, StoreError> {
    match raw {
        Some(v) => v
            .trim()
            .parse::<T>()
            .map_err(|_| StoreError::Config(format!("invalid number in {var}: {v}"))),
        None => Ok(default),
    }
}

fn parse_bool_or(raw: Option<String>, var: &str, default: bool) -> Result<bool, StoreError> {
    match raw.as_deref().map(|s| s.trim().to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) => match v.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(StoreError::Config(format!("invalid boolean in {var}: {v}"))),
        },
    }
}
