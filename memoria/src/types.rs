//! Runtime configuration.

use serde::{Deserialize, Serialize};
use validator::Validate;

const DEFAULT_MODEL: &str = "gpt-4o";
const DEFAULT_SMALL_MODEL: &str = "gpt-4.1-nano";
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
const DEFAULT_EMBEDDING_DIM: usize = 1536;
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Engine configuration, normally sourced from the process environment via
/// [`MemoriaConfig::from_env`]. Only `DATABASE_URL` and `OPENAI_API_KEY` are
/// mandatory; every other knob falls back to the values in `Default`.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct MemoriaConfig {
    /// Postgres connection string, e.g. `postgres://localhost/memoria`.
    #[validate(length(min = 1))]
    pub database_url: String,

    /// API key for the OpenAI-compatible endpoint.
    #[validate(length(min = 1))]
    pub openai_api_key: String,

    /// Alternate base URL for OpenAI-compatible providers.
    pub api_base: Option<String>,

    /// Chat model answering extraction, reflection, and summary calls.
    pub model_name: String,

    /// Smaller, cheaper chat model.
    pub small_model_name: String,

    /// Embedding model name.
    pub embedding_model: String,

    /// Width of stored embedding vectors.
    #[validate(custom(function = "nonzero_embedding_dim"))]
    pub embedding_dim: usize,

    /// Ceiling in seconds on a single LLM or embedding call.
    #[validate(range(min = 1))]
    pub request_timeout_secs: u64,
}

fn nonzero_embedding_dim(dim: usize) -> Result<(), validator::ValidationError> {
    if dim > 0 {
        Ok(())
    } else {
        Err(validator::ValidationError::new("embedding_dim must be positive"))
    }
}

impl Default for MemoriaConfig {
    fn default() -> Self {
        Self {
            database_url: "postgres://localhost/memoria".to_string(),
            openai_api_key: String::new(),
            api_base: None,
            model_name: DEFAULT_MODEL.to_string(),
            small_model_name: DEFAULT_SMALL_MODEL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            embedding_dim: DEFAULT_EMBEDDING_DIM,
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl MemoriaConfig {
    /// Reads configuration from the environment, honoring a `.env` file when
    /// one is present, then validates the result.
    ///
    /// Missing required variables and unparseable numeric ones surface as
    /// [`crate::MemoriaError::Validation`].
    pub fn from_env() -> crate::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: required("DATABASE_URL")?,
            openai_api_key: required("OPENAI_API_KEY")?,
            api_base: std::env::var("OPENAI_BASE_URL").ok(),
            model_name: text_or("MODEL_NAME", DEFAULT_MODEL),
            small_model_name: text_or("SMALL_MODEL_NAME", DEFAULT_SMALL_MODEL),
            embedding_model: text_or("EMBEDDING_MODEL", DEFAULT_EMBEDDING_MODEL),
            embedding_dim: integer_or("EMBEDDING_DIM", DEFAULT_EMBEDDING_DIM)?,
            request_timeout_secs: integer_or("LLM_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?,
        };

        config
            .validate()
            .map_err(|e| crate::MemoriaError::Validation(e.to_string()))?;

        Ok(config)
    }
}

fn required(name: &str) -> crate::Result<String> {
    std::env::var(name)
        .map_err(|_| crate::MemoriaError::Validation(format!("{} is required", name)))
}

fn text_or(name: &str, fallback: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| fallback.to_string())
}

fn integer_or<T: std::str::FromStr>(name: &str, fallback: T) -> crate::Result<T> {
    match std::env::var(name) {
        Ok(raw) => raw.parse().map_err(|_| {
            crate::MemoriaError::Validation(format!("{} must be a positive integer", name))
        }),
        Err(_) => Ok(fallback),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, MutexGuard};

    /// Every variable `from_env` reads.
    const CONFIG_VARS: &[&str] = &[
        "DATABASE_URL",
        "OPENAI_API_KEY",
        "OPENAI_BASE_URL",
        "MODEL_NAME",
        "SMALL_MODEL_NAME",
        "EMBEDDING_MODEL",
        "EMBEDDING_DIM",
        "LLM_TIMEOUT_SECS",
    ];

    const REQUIRED_VARS: &[(&str, &str)] = &[
        ("DATABASE_URL", "postgres://localhost/memoria_test"),
        ("OPENAI_API_KEY", "sk-test"),
    ];

    // The process environment is shared across test threads.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    /// Wipes all config variables, applies `overrides`, and restores the prior
    /// environment on drop so parallel tests never observe each other.
    struct EnvSandbox {
        previous: Vec<(&'static str, Option<String>)>,
        _lock: MutexGuard<'static, ()>,
    }

    impl EnvSandbox {
        fn with(overrides: &[(&str, &str)]) -> Self {
            let lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
            let previous: Vec<(&'static str, Option<String>)> = CONFIG_VARS
                .iter()
                .map(|&name| {
                    let old = env::var(name).ok();
                    env::remove_var(name);
                    (name, old)
                })
                .collect();
            for (name, value) in overrides {
                env::set_var(name, value);
            }
            Self { previous, _lock: lock }
        }
    }

    impl Drop for EnvSandbox {
        fn drop(&mut self) {
            for (name, old) in &self.previous {
                match old {
                    Some(value) => env::set_var(name, value),
                    None => env::remove_var(name),
                }
            }
        }
    }

    #[test]
    fn test_minimal_env_yields_defaults() {
        let _env = EnvSandbox::with(REQUIRED_VARS);

        let config = MemoriaConfig::from_env().expect("config should load");
        assert_eq!(config.database_url, "postgres://localhost/memoria_test");
        assert_eq!(config.openai_api_key, "sk-test");
        assert!(config.api_base.is_none());
        assert_eq!(config.model_name, DEFAULT_MODEL);
        assert_eq!(config.small_model_name, DEFAULT_SMALL_MODEL);
        assert_eq!(config.embedding_model, DEFAULT_EMBEDDING_MODEL);
        assert_eq!(config.embedding_dim, DEFAULT_EMBEDDING_DIM);
        assert_eq!(config.request_timeout_secs, DEFAULT_TIMEOUT_SECS);
    }

    #[test]
    fn test_every_variable_overrides_its_default() {
        let _env = EnvSandbox::with(&[
            ("DATABASE_URL", "postgres://db.internal:5433/memories"),
            ("OPENAI_API_KEY", "sk-live"),
            ("OPENAI_BASE_URL", "http://127.0.0.1:8080/v1"),
            ("MODEL_NAME", "gpt-4.1"),
            ("SMALL_MODEL_NAME", "gpt-4o-mini"),
            ("EMBEDDING_MODEL", "text-embedding-3-large"),
            ("EMBEDDING_DIM", "3072"),
            ("LLM_TIMEOUT_SECS", "15"),
        ]);

        let config = MemoriaConfig::from_env().expect("config should load");
        assert_eq!(config.database_url, "postgres://db.internal:5433/memories");
        assert_eq!(config.openai_api_key, "sk-live");
        assert_eq!(config.api_base.as_deref(), Some("http://127.0.0.1:8080/v1"));
        assert_eq!(config.model_name, "gpt-4.1");
        assert_eq!(config.small_model_name, "gpt-4o-mini");
        assert_eq!(config.embedding_model, "text-embedding-3-large");
        assert_eq!(config.embedding_dim, 3072);
        assert_eq!(config.request_timeout_secs, 15);
    }

    #[test]
    fn test_missing_database_url_is_rejected() {
        let _env = EnvSandbox::with(&[("OPENAI_API_KEY", "sk-test")]);

        match MemoriaConfig::from_env().unwrap_err() {
            crate::MemoriaError::Validation(msg) => assert!(msg.contains("DATABASE_URL")),
            other => panic!("expected Validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_api_key_is_rejected() {
        let _env = EnvSandbox::with(&[("DATABASE_URL", "postgres://localhost/memoria_test")]);

        match MemoriaConfig::from_env().unwrap_err() {
            crate::MemoriaError::Validation(msg) => assert!(msg.contains("OPENAI_API_KEY")),
            other => panic!("expected Validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_api_key_fails_validation() {
        let _env = EnvSandbox::with(&[
            ("DATABASE_URL", "postgres://localhost/memoria_test"),
            ("OPENAI_API_KEY", ""),
        ]);

        assert!(MemoriaConfig::from_env().is_err());
    }

    #[test]
    fn test_unparseable_dimension_is_rejected() {
        let _env = EnvSandbox::with(&[
            ("DATABASE_URL", "postgres://localhost/memoria_test"),
            ("OPENAI_API_KEY", "sk-test"),
            ("EMBEDDING_DIM", "wide"),
        ]);

        match MemoriaConfig::from_env().unwrap_err() {
            crate::MemoriaError::Validation(msg) => assert!(msg.contains("EMBEDDING_DIM")),
            other => panic!("expected Validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_dimension_is_rejected() {
        let _env = EnvSandbox::with(&[
            ("DATABASE_URL", "postgres://localhost/memoria_test"),
            ("OPENAI_API_KEY", "sk-test"),
            ("EMBEDDING_DIM", "0"),
        ]);

        assert!(MemoriaConfig::from_env().is_err());
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        let _env = EnvSandbox::with(&[
            ("DATABASE_URL", "postgres://localhost/memoria_test"),
            ("OPENAI_API_KEY", "sk-test"),
            ("LLM_TIMEOUT_SECS", "0"),
        ]);

        assert!(MemoriaConfig::from_env().is_err());
    }

    #[test]
    fn test_default_struct_agrees_with_env_fallbacks() {
        let _env = EnvSandbox::with(REQUIRED_VARS);

        let loaded = MemoriaConfig::from_env().expect("config should load");
        let defaults = MemoriaConfig::default();
        assert_eq!(loaded.model_name, defaults.model_name);
        assert_eq!(loaded.small_model_name, defaults.small_model_name);
        assert_eq!(loaded.embedding_model, defaults.embedding_model);
        assert_eq!(loaded.embedding_dim, defaults.embedding_dim);
        assert_eq!(loaded.request_timeout_secs, defaults.request_timeout_secs);
    }
}
