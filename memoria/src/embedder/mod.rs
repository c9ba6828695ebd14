//! The embedding seam.
//!
//! The pipeline embeds fact strings and entity names in one batch per
//! episode; retrieval embeds the query string. Both go through
//! [`EmbedderClient`].

pub mod openai;

use std::time::Duration;

use async_trait::async_trait;

use crate::errors::{MemoriaError, Result};

/// A dense vector over `f32`.
pub type Embedding = Vec<f32>;

/// Turns text into vectors of a fixed width.
#[async_trait]
pub trait EmbedderClient: Send + Sync {
    /// Embed one text.
    async fn embed(&self, text: &str) -> Result<Embedding>;

    /// Embed a batch, returning one vector per input in input order.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>>;

    /// Width of the vectors this client produces.
    fn dim(&self) -> usize;
}

/// Run [`EmbedderClient::embed`] under a hard deadline.
pub async fn embed_bounded<E>(
    embedder: &E,
    limit: Duration,
    operation: &str,
    text: &str,
) -> Result<Embedding>
where
    E: EmbedderClient + ?Sized,
{
    match tokio::time::timeout(limit, embedder.embed(text)).await {
        Ok(result) => result,
        Err(_) => Err(MemoriaError::Timeout {
            operation: operation.to_string(),
            secs: limit.as_secs(),
        }),
    }
}

/// Run [`EmbedderClient::embed_batch`] under a hard deadline.
pub async fn embed_batch_bounded<E>(
    embedder: &E,
    limit: Duration,
    operation: &str,
    texts: &[&str],
) -> Result<Vec<Embedding>>
where
    E: EmbedderClient + ?Sized,
{
    match tokio::time::timeout(limit, embedder.embed_batch(texts)).await {
        Ok(result) => result,
        Err(_) => Err(MemoriaError::Timeout {
            operation: operation.to_string(),
            secs: limit.as_secs(),
        }),
    }
}
