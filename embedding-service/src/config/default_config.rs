//! Embedding config loaded from environment variables.
//!
//! # Environment variables
//!
//! Common:
//! - `EMBEDDING_PROVIDER`     = `openai` (default) or `ollama`
//! - `EMBEDDING_MODEL`        = model identifier (default `text-embedding-3-small`)
//! - `EMBEDDING_DIM`          = expected vector size (default `1536`)
//! - `EMBEDDING_TIMEOUT_SECS` = request timeout (default `30`)
//!
//! OpenAI-specific:
//! - `OPENAI_API_KEY`  = bearer token (mandatory)
//! - `OPENAI_BASE_URL` = endpoint (default `https://api.openai.com`)
//!
//! Ollama-specific:
//! - `OLLAMA_URL` or `OLLAMA_PORT` = endpoint (mandatory)

use crate::{
    config::{
        embedding_model_config::{
            DEFAULT_EMBEDDING_DIM, DEFAULT_EMBEDDING_MODEL, EmbeddingModelConfig,
        },
        embedding_provider::EmbeddingProvider,
    },
    error_handler::{ConfigError, EmbeddingError, validate_http_endpoint},
};

const DEFAULT_OPENAI_BASE: &str = "https://api.openai.com";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Builds the embedding config from the process environment.
///
/// # Errors
/// See [`config_from_lookup`].
pub fn config_from_env() -> Result<EmbeddingModelConfig, EmbeddingError> {
    config_from_lookup(|name| std::env::var(name).ok())
}

/// Builds the embedding config from an arbitrary variable lookup.
///
/// Empty values are treated as unset.
///
/// # Errors
///
/// - [`ConfigError::UnsupportedProvider`] for an unknown `EMBEDDING_PROVIDER`
/// - [`ConfigError::MissingVar`] if `OPENAI_API_KEY` (openai) or the Ollama endpoint is absent
/// - [`ConfigError::InvalidNumber`] for malformed `EMBEDDING_DIM`, timeouts or ports
/// - [`ConfigError::InvalidFormat`] if an endpoint lacks an http(s) scheme
pub fn config_from_lookup<F>(lookup: F) -> Result<EmbeddingModelConfig, EmbeddingError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    let provider = match get("EMBEDDING_PROVIDER") {
        Some(p) => p.parse::<EmbeddingProvider>()?,
        None => EmbeddingProvider::OpenAI,
    };

    let model = get("EMBEDDING_MODEL").unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string());

    let dimensions = match get("EMBEDDING_DIM") {
        Some(v) => v
            .trim()
            .parse::<usize>()
            .map_err(|_| ConfigError::InvalidNumber {
                var: "EMBEDDING_DIM",
                reason: "expected usize",
            })?,
        None => DEFAULT_EMBEDDING_DIM,
    };

    let timeout_secs = match get("EMBEDDING_TIMEOUT_SECS") {
        Some(v) => v
            .trim()
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidNumber {
                var: "EMBEDDING_TIMEOUT_SECS",
                reason: "expected u64",
            })?,
        None => DEFAULT_TIMEOUT_SECS,
    };

    let (endpoint, api_key) = match provider {
        EmbeddingProvider::OpenAI => {
            let key = get("OPENAI_API_KEY").ok_or(ConfigError::MissingVar("OPENAI_API_KEY"))?;
            let base = get("OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_OPENAI_BASE.to_string());
            validate_http_endpoint("OPENAI_BASE_URL", base.trim())?;
            (base, Some(key))
        }
        EmbeddingProvider::Ollama => (ollama_endpoint(&get)?, None),
    };

    let cfg = EmbeddingModelConfig {
        provider,
        model,
        endpoint,
        api_key,
        dimensions,
        timeout_secs: Some(timeout_secs),
    };
    cfg.validate()?;
    Ok(cfg)
}

/// Resolves the Ollama endpoint.
///
/// Precedence:
/// 1. `OLLAMA_URL`
/// 2. `OLLAMA_PORT` → `http://localhost:{port}`
fn ollama_endpoint<G>(get: &G) -> Result<String, EmbeddingError>
where
    G: Fn(&str) -> Option<String>,
{
    if let Some(url) = get("OLLAMA_URL") {
        validate_http_endpoint("OLLAMA_URL", url.trim())?;
        return Ok(url);
    }
    if let Some(port) = get("OLLAMA_PORT") {
        let port = port
            .trim()
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidNumber {
                var: "OLLAMA_PORT",
                reason: "expected u16 (1..=65535)",
            })?;
        return Ok(format!("http://localhost:{port}"));
    }
    Err(ConfigError::MissingVar("OLLAMA_URL or OLLAMA_PORT").into())
}
