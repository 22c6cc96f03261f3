use std::str::FromStr;

use crate::error_handler::ConfigError;

/// Backend used to compute embeddings.
///
/// # Examples
///
/// ```
/// use embedding_service::config::embedding_provider::EmbeddingProvider;
///
/// let p: EmbeddingProvider = "openai".parse().unwrap();
/// assert_eq!(p, EmbeddingProvider::OpenAI);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EmbeddingProvider {
    /// OpenAI or any OpenAI-compatible `/v1/embeddings` endpoint.
    OpenAI,
    /// Local Ollama runtime (`/api/embeddings`).
    Ollama,
}

impl FromStr for EmbeddingProvider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" | "chatgpt" => Ok(Self::OpenAI),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::UnsupportedProvider(other.to_string())),
        }
    }
}
