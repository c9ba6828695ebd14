//! The oracle seam.
//!
//! Every oracle interaction in the pipeline goes through
//! [`LlmClient::complete_structured`]: the caller supplies chat messages and a
//! response type, and the client constrains the model to a JSON schema derived
//! from that type (via `schemars`). [`openai::OpenAiClient`] implements the
//! seam over OpenAI chat completions and compatible APIs.

pub mod openai;

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::errors::{MemoriaError, Result};

/// One turn of the conversation sent to the model.
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Who a [`Message`] speaks as, serialized in the wire casing.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A model that answers in a caller-chosen structured type.
///
/// Boxed futures (`async_trait`) keep the returned futures `Send`, so
/// enrichment work calling through a generic client can run on spawned tasks.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Complete `messages` and decode the reply as a `T`, with the model
    /// constrained to `T`'s derived JSON schema.
    async fn complete_structured<T>(&self, messages: &[Message]) -> Result<T>
    where
        T: DeserializeOwned + schemars::JsonSchema + Send;
}

/// Run [`LlmClient::complete_structured`] under a hard deadline.
///
/// The per-call retry budget inside a client can exceed what an enrichment
/// stage is willing to wait, so stages bound every call with this wrapper.
/// `operation` names the call in the timeout error.
pub async fn complete_bounded<L, T>(
    client: &L,
    limit: Duration,
    operation: &str,
    messages: &[Message],
) -> Result<T>
where
    L: LlmClient + ?Sized,
    T: DeserializeOwned + schemars::JsonSchema + Send,
{
    match tokio::time::timeout(limit, client.complete_structured::<T>(messages)).await {
        Ok(result) => result,
        Err(_) => Err(MemoriaError::Timeout {
            operation: operation.to_string(),
            secs: limit.as_secs(),
        }),
    }
}
