//! OpenAI-compatible chat client.
//!
//! Structured completions ride on `async-openai`'s byot escape hatch so the
//! request can carry a `json_schema` response format. Identical requests are
//! served from a `moka` cache; rate limits and transient failures retry with
//! `backoff`.

use std::time::Duration;

use async_trait::async_trait;
use backoff::ExponentialBackoffBuilder;
use moka::future::Cache;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, warn};

use crate::errors::{LlmError, MemoriaError, Result};
use crate::types::MemoriaConfig;
use crate::utils::extract_json_from_response;

use super::{LlmClient, Message};

/// Sampling temperature for every oracle call. Extraction wants determinism.
const TEMPERATURE: f32 = 0.0;

/// Output token ceiling per completion.
const MAX_COMPLETION_TOKENS: u32 = 8_192;

/// Completed responses kept for identical re-requests.
const CACHE_ENTRIES: u64 = 1_000;
const CACHE_TTL: Duration = Duration::from_secs(3_600);

/// Chat client for OpenAI and OpenAI-compatible endpoints.
pub struct OpenAiClient {
    inner: async_openai::Client<async_openai::config::OpenAIConfig>,
    model: String,
    /// `md5(response type + model + messages)` → raw response text.
    cache: Cache<String, String>,
}

impl OpenAiClient {
    /// Client for the given model using `config`'s key and optional base URL.
    pub fn from_config(config: &MemoriaConfig, model: impl Into<String>) -> Self {
        let mut api = async_openai::config::OpenAIConfig::new()
            .with_api_key(config.openai_api_key.clone());
        if let Some(base) = &config.api_base {
            api = api.with_api_base(base.clone());
        }
        Self::with_api_config(api, model)
    }

    fn with_api_config(
        api: async_openai::config::OpenAIConfig,
        model: impl Into<String>,
    ) -> Self {
        Self {
            inner: async_openai::Client::with_config(api),
            model: model.into(),
            cache: Cache::builder()
                .max_capacity(CACHE_ENTRIES)
                .time_to_live(CACHE_TTL)
                .build(),
        }
    }

    /// Cache key for one request: response type, model, full message sequence.
    fn request_fingerprint(&self, response_type: &str, messages: &[Message]) -> Result<String> {
        use md5::{Digest, Md5};
        let mut digest = Md5::new();
        digest.update(response_type.as_bytes());
        digest.update(self.model.as_bytes());
        digest.update(serde_json::to_vec(messages)?);
        Ok(format!("{:x}", digest.finalize()))
    }

    /// One `chat/completions` round trip, retried on transient failures.
    async fn send(&self, request: serde_json::Value) -> Result<serde_json::Value> {
        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(500))
            .with_max_interval(Duration::from_secs(60))
            .with_max_elapsed_time(Some(Duration::from_secs(300)))
            .build();

        backoff::future::retry(policy, || async {
            let outcome: std::result::Result<serde_json::Value, async_openai::error::OpenAIError> =
                self.inner.chat().create_byot(request.clone()).await;
            outcome.map_err(sort_failure)
        })
        .await
        .map_err(MemoriaError::Llm)
    }

    /// Pull the assistant turn out of a completions response.
    ///
    /// A populated `refusal` field means the model declined to answer; that is
    /// surfaced as [`LlmError::Refusal`] rather than a parse failure.
    fn assistant_text(response: &serde_json::Value) -> Result<String> {
        let message = response
            .pointer("/choices/0/message")
            .ok_or(MemoriaError::Llm(LlmError::EmptyResponse))?;

        match message.get("refusal").and_then(|r| r.as_str()) {
            Some(refusal) if !refusal.is_empty() => Err(MemoriaError::Llm(LlmError::Refusal)),
            _ => message
                .get("content")
                .and_then(|c| c.as_str())
                .map(str::to_owned)
                .ok_or(MemoriaError::Llm(LlmError::EmptyResponse)),
        }
    }

    /// Decode response text as `T`, tolerating a markdown-fenced payload.
    fn decode<T: DeserializeOwned>(text: &str) -> Result<T> {
        serde_json::from_str(text).or_else(|direct_err| {
            extract_json_from_response(text)
                .and_then(|inner| serde_json::from_str(inner).ok())
                .ok_or(MemoriaError::Serialization(direct_err))
        })
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete_structured<T>(&self, messages: &[Message]) -> Result<T>
    where
        T: DeserializeOwned + schemars::JsonSchema + Send,
    {
        // Distinct response types for the same messages must not collide.
        let response_type = std::any::type_name::<T>();
        let key = self.request_fingerprint(response_type, messages)?;

        if let Some(hit) = self.cache.get(&key).await {
            debug!(response_type, "chat cache hit");
            return Self::decode(&hit);
        }

        let schema = serde_json::to_value(schemars::schema_for!(T))?;
        let request = json!({
            "model": self.model,
            "messages": messages,
            "temperature": TEMPERATURE,
            "max_tokens": MAX_COMPLETION_TOKENS,
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": "response",
                    "schema": schema,
                    "strict": true,
                }
            }
        });

        let response = self.send(request).await?;
        let text = Self::assistant_text(&response)?;
        let value = Self::decode(&text)?;
        self.cache.insert(key, text).await;

        Ok(value)
    }
}

/// Sort an [`async_openai::error::OpenAIError`] into retry-now or give-up.
///
/// The byot payload carries no status code, so API errors are classified by
/// message text; transport errors by kind.
fn sort_failure(err: async_openai::error::OpenAIError) -> backoff::Error<LlmError> {
    use async_openai::error::OpenAIError;

    let transient = |e: LlmError| {
        warn!(error = %e, "transient OpenAI failure, will retry");
        backoff::Error::transient(e)
    };

    match err {
        OpenAIError::Reqwest(e) if e.is_timeout() || e.is_connect() => {
            transient(LlmError::Api {
                message: format!("transport error: {}", e),
            })
        }
        OpenAIError::ApiError(api) => {
            let message = api.message;
            let lower = message.to_ascii_lowercase();
            if lower.contains("rate limit") || lower.contains("429") {
                transient(LlmError::RateLimit)
            } else if lower.contains("api key") || lower.contains("authentication") {
                backoff::Error::permanent(LlmError::Authentication)
            } else if lower.contains("server error") || lower.contains("overloaded") {
                transient(LlmError::Api { message })
            } else {
                backoff::Error::permanent(LlmError::Api { message })
            }
        }
        other => backoff::Error::permanent(LlmError::Api {
            message: other.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemars::JsonSchema;
    use serde::{Deserialize, Serialize};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
    struct CityFact {
        city: String,
        country: String,
    }

    fn client_for(server: &MockServer) -> OpenAiClient {
        let api = async_openai::config::OpenAIConfig::new()
            .with_api_key("sk-test")
            .with_api_base(server.uri());
        OpenAiClient::with_api_config(api, "gpt-4o")
    }

    fn offline_client() -> OpenAiClient {
        let api = async_openai::config::OpenAIConfig::new().with_api_key("sk-test");
        OpenAiClient::with_api_config(api, "gpt-4o")
    }

    /// Chat-completions body whose assistant turn carries `content`.
    fn completion_with(content: serde_json::Value) -> serde_json::Value {
        json!({
            "id": "chatcmpl-abc123",
            "object": "chat.completion",
            "created": 1_726_000_000_u64,
            "model": "gpt-4o",
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": content },
                "finish_reason": "stop",
            }],
            "usage": { "prompt_tokens": 12, "completion_tokens": 9, "total_tokens": 21 }
        })
    }

    async fn mount_completion(server: &MockServer, text: &str) {
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_with(json!(text))))
            .mount(server)
            .await;
    }

    fn ask(text: &str) -> Vec<Message> {
        vec![Message::user(text)]
    }

    #[tokio::test]
    async fn test_structured_completion_roundtrip() {
        let server = MockServer::start().await;
        mount_completion(&server, r#"{"city": "Lisbon", "country": "Portugal"}"#).await;

        let fact: CityFact = client_for(&server)
            .complete_structured(&ask("Where is Fernando?"))
            .await
            .expect("completion should succeed");

        assert_eq!(
            fact,
            CityFact {
                city: "Lisbon".to_string(),
                country: "Portugal".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_fenced_json_still_decodes() {
        let server = MockServer::start().await;
        mount_completion(
            &server,
            "```json\n{\"city\": \"Porto\", \"country\": \"Portugal\"}\n```",
        )
        .await;

        let fact: CityFact = client_for(&server)
            .complete_structured(&ask("fenced"))
            .await
            .expect("fenced JSON should still parse");

        assert_eq!(fact.city, "Porto");
    }

    #[tokio::test]
    async fn test_second_identical_request_hits_cache() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_with(json!(
                r#"{"city": "Madrid", "country": "Spain"}"#
            ))))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let first: CityFact = client
            .complete_structured(&ask("repeat me"))
            .await
            .expect("first call");
        let second: CityFact = client
            .complete_structured(&ask("repeat me"))
            .await
            .expect("served from cache");

        assert_eq!(first, second);
        // wiremock verifies the expect(1) on drop
    }

    #[tokio::test]
    async fn test_auth_failure_is_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": {
                    "message": "Incorrect API key provided",
                    "type": "invalid_request_error",
                    "code": "invalid_api_key"
                }
            })))
            // A permanent classification must not produce a second request.
            .expect(1)
            .mount(&server)
            .await;

        let err = client_for(&server)
            .complete_structured::<CityFact>(&ask("hello"))
            .await
            .expect_err("auth error should fail");

        assert!(
            matches!(err, MemoriaError::Llm(LlmError::Authentication)),
            "expected Authentication, got {err:?}"
        );
    }

    #[tokio::test]
    async fn test_rate_limit_retries_until_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "error": {
                    "message": "Rate limit exceeded",
                    "type": "requests",
                    "code": "rate_limit_exceeded"
                }
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        mount_completion(&server, r#"{"city": "Rome", "country": "Italy"}"#).await;

        let fact: CityFact = client_for(&server)
            .complete_structured(&ask("after 429"))
            .await
            .expect("should succeed on the retry");

        assert_eq!(fact.city, "Rome");
    }

    #[tokio::test]
    async fn test_refusal_is_surfaced() {
        let server = MockServer::start().await;
        let mut body = completion_with(serde_json::Value::Null);
        body["choices"][0]["message"]["refusal"] = json!("I can't help with that.");

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .complete_structured::<CityFact>(&ask("refused"))
            .await
            .expect_err("refusal should be an error");

        assert!(matches!(err, MemoriaError::Llm(LlmError::Refusal)));
    }

    #[test]
    fn test_fingerprint_varies_by_message() {
        let client = offline_client();
        let a = client.request_fingerprint("T", &ask("hello")).unwrap();
        let b = client.request_fingerprint("T", &ask("goodbye")).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_fingerprint_varies_by_response_type() {
        let client = offline_client();
        let msgs = ask("hello");
        let a = client.request_fingerprint("TypeA", &msgs).unwrap();
        let b = client.request_fingerprint("TypeB", &msgs).unwrap();
        assert_ne!(a, b);
    }
}
