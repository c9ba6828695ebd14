//! Error types shared across the engine.

/// Alias for Results returning [`MemoriaError`].
pub type Result<T> = std::result::Result<T, MemoriaError>;

/// Anything that can go wrong between an episode arriving and a result
/// leaving: persistence, the oracle, embeddings, input validation, or a
/// blown deadline.
#[derive(Debug, thiserror::Error)]
pub enum MemoriaError {
    #[error("storage: {0}")]
    Storage(String),

    #[error("llm: {0}")]
    Llm(#[from] LlmError),

    #[error("embedder: {0}")]
    Embedder(String),

    #[error("validation: {0}")]
    Validation(String),

    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{operation} timed out after {secs}s")]
    Timeout { operation: String, secs: u64 },
}

/// Failure modes of a chat completion call, separated because retry policy
/// and HTTP mapping differ per mode.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("provider rate limit hit")]
    RateLimit,

    #[error("model refused the request")]
    Refusal,

    #[error("model returned no content")]
    EmptyResponse,

    #[error("provider rejected the API key")]
    Authentication,

    #[error("provider error: {message}")]
    Api { message: String },
}
