//! Embeddings over the OpenAI API (and compatible endpoints).
//!
//! Texts are sent in chunks, vectors are reassembled by response index, and
//! every returned vector is checked against the configured width before it
//! can reach ranking. Repeated texts are served from a `moka` cache.

use std::time::Duration;

use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::CreateEmbeddingRequestArgs;
use async_openai::Client;
use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoffBuilder};
use moka::future::Cache;

use crate::embedder::{EmbedderClient, Embedding};
use crate::errors::{MemoriaError, Result};
use crate::types::MemoriaConfig;

/// Inputs per API call; the endpoint rejects larger batches.
const MAX_INPUTS_PER_CALL: usize = 2_048;

/// Cached vectors for re-embedded texts (entity names recur across episodes).
const CACHE_ENTRIES: u64 = 10_000;
const CACHE_TTL: Duration = Duration::from_secs(3_600);

/// Embedding client for OpenAI and OpenAI-compatible endpoints.
pub struct OpenAiEmbedder {
    client: Client<OpenAIConfig>,
    model: String,
    dim: usize,
    /// `md5(model + text)` → embedding.
    cache: Cache<String, Embedding>,
}

impl OpenAiEmbedder {
    /// Embedder using `config`'s model, dimension, key and optional base URL.
    pub fn from_config(config: &MemoriaConfig) -> Self {
        let mut api = OpenAIConfig::new().with_api_key(config.openai_api_key.clone());
        if let Some(base) = &config.api_base {
            api = api.with_api_base(base.clone());
        }
        Self::build(api, config.embedding_model.clone(), config.embedding_dim)
    }

    fn build(api: OpenAIConfig, model: String, dim: usize) -> Self {
        Self {
            client: Client::with_config(api),
            model,
            dim,
            cache: Cache::builder()
                .max_capacity(CACHE_ENTRIES)
                .time_to_live(CACHE_TTL)
                .build(),
        }
    }

    #[cfg(test)]
    fn for_base_url(base_url: impl Into<String>, dim: usize) -> Self {
        let api = OpenAIConfig::new()
            .with_api_key("sk-test")
            .with_api_base(base_url.into());
        Self::build(api, "text-embedding-3-small".to_string(), dim)
    }

    fn cache_key(&self, text: &str) -> String {
        use md5::{Digest, Md5};
        let mut digest = Md5::new();
        digest.update(self.model.as_bytes());
        digest.update([0u8]);
        digest.update(text.as_bytes());
        format!("{:x}", digest.finalize())
    }

    /// One API round trip for `texts`, retried on transport interruptions.
    ///
    /// Output position comes from each item's `index` field, not from array
    /// order. Third-generation models take the requested dimension in the
    /// call; the width of every vector is verified afterwards either way.
    async fn fetch_chunk(&self, texts: Vec<String>) -> Result<Vec<Embedding>> {
        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(500))
            .with_max_interval(Duration::from_secs(10))
            .with_max_elapsed_time(Some(Duration::from_secs(60)))
            .build();

        let expected = texts.len();
        let vectors: Vec<Embedding> = retry(policy, || {
            let texts = texts.clone();
            async move {
                let mut builder = CreateEmbeddingRequestArgs::default();
                builder.model(self.model.as_str()).input(texts);
                if self.model.starts_with("text-embedding-3") {
                    builder.dimensions(self.dim as u32);
                }
                let request = builder.build().map_err(|e| {
                    backoff::Error::permanent(MemoriaError::Embedder(e.to_string()))
                })?;

                let response = self
                    .client
                    .embeddings()
                    .create(request)
                    .await
                    .map_err(sort_failure)?;

                let mut by_index: Vec<Option<Embedding>> = vec![None; expected];
                for item in response.data {
                    let vector: Embedding =
                        item.embedding.into_iter().map(|x| x as f32).collect();
                    match by_index.get_mut(item.index as usize) {
                        Some(slot) => *slot = Some(vector),
                        None => {
                            return Err(backoff::Error::permanent(MemoriaError::Embedder(
                                format!("embedding index {} out of range", item.index),
                            )));
                        }
                    }
                }

                by_index
                    .into_iter()
                    .collect::<Option<Vec<Embedding>>>()
                    .ok_or_else(|| {
                        backoff::Error::permanent(MemoriaError::Embedder(format!(
                            "expected {} embeddings in response",
                            expected
                        )))
                    })
            }
        })
        .await?;

        for vector in &vectors {
            if vector.len() != self.dim {
                return Err(MemoriaError::Embedder(format!(
                    "embedding width {} does not match configured dimension {}",
                    vector.len(),
                    self.dim
                )));
            }
        }

        Ok(vectors)
    }
}

#[async_trait]
impl EmbedderClient for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Embedding> {
        let mut batch = self.embed_batch(&[text]).await?;
        batch
            .pop()
            .ok_or_else(|| MemoriaError::Embedder("embedding response was empty".to_string()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        let mut out: Vec<Option<Embedding>> = vec![None; texts.len()];

        // Serve repeats from cache; everything else goes to the API.
        let mut misses: Vec<usize> = Vec::new();
        for (i, text) in texts.iter().enumerate() {
            match self.cache.get(&self.cache_key(text)).await {
                Some(hit) => out[i] = Some(hit),
                None => misses.push(i),
            }
        }

        for chunk in misses.chunks(MAX_INPUTS_PER_CALL) {
            let inputs: Vec<String> = chunk.iter().map(|&i| texts[i].to_owned()).collect();
            let vectors = self.fetch_chunk(inputs).await?;
            for (&i, vector) in chunk.iter().zip(vectors) {
                self.cache
                    .insert(self.cache_key(texts[i]), vector.clone())
                    .await;
                out[i] = Some(vector);
            }
        }

        out.into_iter()
            .collect::<Option<Vec<Embedding>>>()
            .ok_or_else(|| MemoriaError::Embedder("embedding batch left gaps".to_string()))
    }

    fn dim(&self) -> usize {
        self.dim
    }
}

/// Transport interruptions are worth retrying; anything else is final.
fn sort_failure(err: OpenAIError) -> backoff::Error<MemoriaError> {
    let description = err.to_string();
    match &err {
        OpenAIError::Reqwest(e) if e.is_timeout() || e.is_connect() => {
            backoff::Error::transient(MemoriaError::Embedder(description))
        }
        _ => backoff::Error::permanent(MemoriaError::Embedder(description)),
    }
}
