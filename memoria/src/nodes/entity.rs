//! A deduplicated real-world entity in the tenant's graph.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A person, organization, place or concept mentioned by episodes.
///
/// Within one tenant the exact `name` string is the identity: two mentions of
/// "Fernando" in the same group always resolve to one node. The `summary` is
/// rewritten and `name_embedding` recomputed every time an episode mentions
/// the entity again; nodes are never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityNode {
    pub uuid: Uuid,
    pub name: String,
    pub group_id: String,
    pub labels: Vec<String>,
    pub summary: String,
    pub name_embedding: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
}

impl EntityNode {
    /// Fresh node for a first mention: empty summary, no embedding yet.
    pub fn new(group_id: impl Into<String>, name: impl Into<String>, labels: Vec<String>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            name: name.into(),
            group_id: group_id.into(),
            labels,
            summary: String::new(),
            name_embedding: None,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person() -> EntityNode {
        let mut node = EntityNode::new("org_acme", "Fernando", vec!["Person".to_string()]);
        node.summary = "Fernando is the CEO of Acme.".to_string();
        node.name_embedding = Some(vec![0.6, 0.8]);
        node
    }

    #[test]
    fn test_new_node_starts_unenriched() {
        let node = EntityNode::new("org_acme", "Acme", vec!["Organization".to_string()]);

        assert_eq!(node.name, "Acme");
        assert_eq!(node.group_id, "org_acme");
        assert_eq!(node.labels, vec!["Organization".to_string()]);
        assert!(node.summary.is_empty());
        assert!(node.name_embedding.is_none());
        assert!(!node.uuid.is_nil());
    }

    #[test]
    fn test_each_node_gets_its_own_uuid() {
        let a = EntityNode::new("g", "Fernando", vec![]);
        let b = EntityNode::new("g", "Fernando", vec![]);
        assert_ne!(a.uuid, b.uuid);
    }

    #[test]
    fn test_serde_roundtrip_preserves_every_field() {
        let original = person();

        let encoded = serde_json::to_string(&original).expect("serialize");
        let restored: EntityNode = serde_json::from_str(&encoded).expect("deserialize");

        assert_eq!(restored, original);
    }

    #[test]
    fn test_deserializes_stored_representation() {
        let node: EntityNode = serde_json::from_value(serde_json::json!({
            "uuid": "8f9e6b47-0000-4000-8000-000000000042",
            "name": "Lisbon",
            "group_id": "travel",
            "labels": ["Place"],
            "summary": "Lisbon is where Fernando lives.",
            "name_embedding": null,
            "created_at": "2025-04-30T00:00:00Z"
        }))
        .expect("deserialize literal");

        assert_eq!(node.name, "Lisbon");
        assert_eq!(node.labels, vec!["Place".to_string()]);
        assert!(node.name_embedding.is_none());
    }

    #[test]
    fn test_equality_covers_enrichment_fields() {
        let a = person();
        let mut b = a.clone();
        assert_eq!(a, b);

        b.summary = "Fernando left Acme.".to_string();
        assert_ne!(a, b);
    }
}
