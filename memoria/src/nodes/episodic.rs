//! Ingested episodes, the raw material facts are extracted from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How an episode's content should be read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EpisodeType {
    Message,
    Json,
    Text,
}

impl EpisodeType {
    /// String form used in storage and prompt rendering.
    pub fn as_str(&self) -> &'static str {
        match self {
            EpisodeType::Message => "message",
            EpisodeType::Json => "json",
            EpisodeType::Text => "text",
        }
    }

    /// Parse the storage string form.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "message" => Some(EpisodeType::Message),
            "json" => Some(EpisodeType::Json),
            "text" => Some(EpisodeType::Text),
            _ => None,
        }
    }
}

/// One ingested record: a chat message, a document, or a JSON payload.
///
/// `created_at` doubles as the episode's reference time: extracted facts with
/// no explicit date in the source text become valid as of this instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodicNode {
    pub uuid: Uuid,
    pub name: String,
    pub group_id: String,
    pub labels: Vec<String>,
    pub source: EpisodeType,
    pub source_description: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl EpisodicNode {
    /// Episode with a fresh uuid, stamped at `reference_time`.
    pub fn new(
        group_id: impl Into<String>,
        name: impl Into<String>,
        source: EpisodeType,
        content: impl Into<String>,
        source_description: impl Into<String>,
        reference_time: DateTime<Utc>,
    ) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            name: name.into(),
            group_id: group_id.into(),
            labels: Vec::new(),
            source,
            source_description: source_description.into(),
            content: content.into(),
            created_at: reference_time,
        }
    }
}
