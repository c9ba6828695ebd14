//! Fact edges between entity nodes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A fact connecting two entity nodes, carrying its own validity interval.
///
/// `valid_at`/`invalid_at` track when the fact held in the real world;
/// `created_at` tracks when the edge entered the graph. Edges are never
/// deleted: a contradicted fact keeps its row and gains an `invalid_at`
/// timestamp, so the full assertion history stays queryable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityEdge {
    pub uuid: Uuid,
    /// Tenant partition; always matches both endpoint nodes.
    pub group_id: String,
    /// Subject entity.
    pub source_node_uuid: Uuid,
    /// Object entity.
    pub target_node_uuid: Uuid,
    /// SCREAMING_SNAKE_CASE relation predicate, e.g. `WORKS_AT`.
    pub name: String,
    /// The fact as a single line of prose, the unit search ranks and returns.
    pub fact: String,
    /// Episodes that asserted this fact, oldest first.
    pub episodes: Vec<Uuid>,
    /// Start of real-world validity.
    pub valid_at: DateTime<Utc>,
    /// End of real-world validity; `None` while the fact still holds.
    pub invalid_at: Option<DateTime<Utc>>,
    /// Embedding of `fact`, filled during enrichment.
    pub fact_embedding: Option<Vec<f32>>,
    /// When the edge entered the graph.
    pub created_at: DateTime<Utc>,
}

impl EntityEdge {
    /// Edge first asserted by `episode_uuid`, valid from `valid_at`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        group_id: impl Into<String>,
        source_node_uuid: Uuid,
        target_node_uuid: Uuid,
        name: impl Into<String>,
        fact: impl Into<String>,
        episode_uuid: Uuid,
        valid_at: DateTime<Utc>,
        invalid_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            group_id: group_id.into(),
            source_node_uuid,
            target_node_uuid,
            name: name.into(),
            fact: fact.into(),
            episodes: vec![episode_uuid],
            valid_at,
            invalid_at,
            fact_embedding: None,
            created_at: Utc::now(),
        }
    }

    /// True while the fact has no end of validity.
    pub fn is_currently_valid(&self) -> bool {
        self.invalid_at.is_none()
    }

    /// Close this fact's validity at `at`, clamped so the interval never
    /// ends before it starts. A later invalidation never reopens the fact.
    pub fn invalidate(&mut self, at: DateTime<Utc>) {
        let end = at.max(self.valid_at);
        match self.invalid_at {
            Some(existing) if existing <= end => {}
            _ => self.invalid_at = Some(end),
        }
    }

    /// Record that `episode_uuid` also asserted this fact.
    pub fn attest(&mut self, episode_uuid: Uuid) {
        if !self.episodes.contains(&episode_uuid) {
            self.episodes.push(episode_uuid);
        }
    }
}
