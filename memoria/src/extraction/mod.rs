//! Oracle-backed extraction of entities, facts, and summaries.
//!
//! Each extractor runs a bounded reflexion loop: extract, ask the oracle what
//! was missed, re-extract with the missed items as a hint. The loop runs at
//! most [`MAX_REFLEXION_ITERATIONS`] extraction passes and always keeps the
//! result of the latest pass.
//!
//! All response types here are oracle contracts: the JSON schema derived from
//! them (via `schemars`) is sent with the request, and the reply is parsed
//! back into them. Field names stay camelCase on the wire.

pub mod edges;
pub mod entities;
pub mod summaries;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub use edges::extract_edges;
pub use entities::extract_entities;
pub use summaries::refresh_summaries;

/// Maximum extraction passes per reflexion loop.
///
/// A reflexion probe runs after every pass except the last, so the worst case
/// is 3 extraction calls and 2 probe calls before the loop terminates.
pub const MAX_REFLEXION_ITERATIONS: usize = 3;

/// An entity type the oracle may classify extractions into.
///
/// Rendered verbatim (as JSON) into the extraction prompt; `entity_type_id`
/// is the integer the oracle echoes back in [`ExtractedEntity`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityTypeDescriptor {
    pub entity_type_id: i64,
    pub entity_type_name: String,
    pub entity_type_description: String,
}

impl EntityTypeDescriptor {
    pub fn new(
        entity_type_id: i64,
        entity_type_name: impl Into<String>,
        entity_type_description: impl Into<String>,
    ) -> Self {
        Self {
            entity_type_id,
            entity_type_name: entity_type_name.into(),
            entity_type_description: entity_type_description.into(),
        }
    }

    /// The catch-all type set used when no custom types are configured.
    pub fn default_set() -> Vec<Self> {
        vec![Self::new(
            0,
            "Entity",
            "Default entity classification. Use this entity type if the entity is not one of the other listed types.",
        )]
    }
}

/// A fact (edge) type the oracle may use as a relation predicate.
///
/// Rendered as JSON into the edge extraction prompt. When none are
/// configured the oracle free-forms SCREAMING_SNAKE_CASE predicates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FactTypeDescriptor {
    pub fact_type_name: String,
    /// Entity type names the source and target are expected to carry.
    pub fact_type_signature: Vec<String>,
    pub fact_type_description: String,
}

impl FactTypeDescriptor {
    pub fn new(
        fact_type_name: impl Into<String>,
        fact_type_signature: Vec<String>,
        fact_type_description: impl Into<String>,
    ) -> Self {
        Self {
            fact_type_name: fact_type_name.into(),
            fact_type_signature,
            fact_type_description: fact_type_description.into(),
        }
    }
}

/// One entity reported by the extraction oracle.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedEntity {
    /// Name of the extracted entity.
    pub name: String,
    /// ID of the classified entity type. Must be one of the provided entityTypeId integers.
    pub entity_type_id: i64,
}

/// Entity extraction response envelope.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedEntities {
    /// List of extracted entities.
    pub extracted_entities: Vec<ExtractedEntity>,
}

/// Entity reflexion probe response.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MissedEntities {
    /// Names of entities that weren't extracted.
    pub missed_entities: Vec<String>,
}

/// One fact triple reported by the edge extraction oracle.
///
/// Entity ids index into the resolved entity list sent with the prompt;
/// assembly range-checks them before building an edge.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedEdge {
    /// FACT_PREDICATE_IN_SCREAMING_SNAKE_CASE
    pub relation_type: String,
    /// The id of the source entity of the fact.
    pub source_entity_id: i64,
    /// The id of the target entity of the fact.
    pub target_entity_id: i64,
    /// Concise natural-language statement of the relationship.
    pub fact: String,
    /// The date and time when the relationship described by the edge fact became true or was established. Use ISO 8601 format (YYYY-MM-DDTHH:MM:SS.SSSSSSZ)
    pub valid_at: Option<String>,
    /// The date and time when the relationship described by the edge fact stopped being true or ended. Use ISO 8601 format (YYYY-MM-DDTHH:MM:SS.SSSSSSZ)
    pub invalid_at: Option<String>,
}

/// Edge extraction response envelope.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedEdges {
    /// List of extracted fact triples.
    pub edges: Vec<ExtractedEdge>,
}

/// Fact reflexion probe response.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MissingFacts {
    /// Facts that weren't extracted.
    pub missing_facts: Vec<String>,
}

/// Entity summary rewrite response.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdatedSummary {
    /// Summary containing the important information about the entity. Under 250 words.
    pub summary: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracted_entities_camel_case_wire_format() {
        let parsed: ExtractedEntities = serde_json::from_str(
            r#"{"extractedEntities": [{"name": "Fernando", "entityTypeId": 0}]}"#,
        )
        .expect("parse failed");
        assert_eq!(parsed.extracted_entities.len(), 1);
        assert_eq!(parsed.extracted_entities[0].name, "Fernando");
        assert_eq!(parsed.extracted_entities[0].entity_type_id, 0);
    }

    #[test]
    fn test_extracted_edge_nullable_timestamps() {
        let parsed: ExtractedEdges = serde_json::from_str(
            r#"{"edges": [{
                "relationType": "WORKS_AT",
                "sourceEntityId": 0,
                "targetEntityId": 1,
                "fact": "Fernando works at Doxa Code",
                "validAt": "2025-04-30T00:00:00Z",
                "invalidAt": null
            }]}"#,
        )
        .expect("parse failed");
        let edge = &parsed.edges[0];
        assert_eq!(edge.relation_type, "WORKS_AT");
        assert_eq!(edge.valid_at.as_deref(), Some("2025-04-30T00:00:00Z"));
        assert!(edge.invalid_at.is_none());
    }

    #[test]
    fn test_schema_describes_fields() {
        let schema = schemars::schema_for!(ExtractedEntities);
        let json = serde_json::to_string(&schema).expect("schema serialization failed");
        assert!(json.contains("extractedEntities"));
        assert!(json.contains("entityTypeId"));
    }

    #[test]
    fn test_default_entity_type_set() {
        let types = EntityTypeDescriptor::default_set();
        assert_eq!(types.len(), 1);
        assert_eq!(types[0].entity_type_id, 0);
        assert_eq!(types[0].entity_type_name, "Entity");
    }

    #[test]
    fn test_descriptor_prompt_json_is_camel_case() {
        let json = serde_json::to_string(&EntityTypeDescriptor::default_set())
            .expect("serialization failed");
        assert!(json.contains("entityTypeId"));
        assert!(json.contains("entityTypeName"));
        assert!(json.contains("entityTypeDescription"));
    }
}
