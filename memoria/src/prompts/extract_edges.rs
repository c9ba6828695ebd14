//! Fact triple extraction and fact reflexion prompts.

use serde::Serialize;

use crate::errors::Result;
use crate::extraction::FactTypeDescriptor;
use crate::llm_client::Message;
use crate::nodes::{EntityNode, EpisodicNode};
use crate::utils::format_timestamp;

use super::join_contents;

const EXTRACTION_SYSTEM: &str = "You are an expert fact extractor that extracts fact triples from text. \
Your goal is to capture relationships as edges in a knowledge graph.
1. Extracted fact triples should also be extracted with relevant date information.
2. Treat the CURRENT TIME as the time the CURRENT MESSAGE was sent. All temporal information should be extracted relative to this time.";

const REFLEXION_SYSTEM: &str =
    "You are an AI assistant that determines which facts have not been extracted from the given context";

/// An entity as shown to the oracle: `id` is the position in the resolved
/// entity list and is what the oracle echoes back as source/target ids.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EntityRef<'a> {
    id: usize,
    name: &'a str,
    entity_types: &'a [String],
}

fn entity_refs(nodes: &[EntityNode]) -> Vec<EntityRef<'_>> {
    nodes
        .iter()
        .enumerate()
        .map(|(id, node)| EntityRef {
            id,
            name: &node.name,
            entity_types: &node.labels,
        })
        .collect()
}

/// Build the fact extraction request for `episode` against the resolved
/// entity list `nodes`.
///
/// `missed` carries fact statements a previous reflexion probe reported as
/// overlooked; when non-empty they are appended as an explicit hint.
pub fn edge_extraction(
    episode: &EpisodicNode,
    history: &[EpisodicNode],
    nodes: &[EntityNode],
    fact_types: &[FactTypeDescriptor],
    missed: &[String],
) -> Result<Vec<Message>> {
    let fact_types_json = serde_json::to_string_pretty(fact_types)?;
    let entities_json = serde_json::to_string_pretty(&entity_refs(nodes))?;
    let previous = join_contents(history);
    let reference_time = format_timestamp(&episode.created_at);

    let mut user = format!(
        r#"<FACT TYPES>
{fact_types_json}
</FACT TYPES>

<PREVIOUS_MESSAGES>
{previous}
</PREVIOUS_MESSAGES>

<CURRENT_MESSAGE>
{content}
</CURRENT_MESSAGE>

<ENTITIES>
{entities_json}
</ENTITIES>

<REFERENCE_TIME>
{reference_time}
</REFERENCE_TIME>

# TASK
Extract all factual relationships between the given ENTITIES based on the CURRENT MESSAGE.
- A relationship should connect two DISTINCT ENTITIES from the ENTITIES list.
- The `fact` field should be a concise description of the relationship (e.g., "Fernando is the CEO of Doxa Code").
- Use the `sourceEntityId` and `targetEntityId` to link the entities.

Example:
- Message: "Fernando is the CEO at Doxa Code."
- Entities: [{{id: 0, name: "Fernando"}}, {{id: 1, name: "Doxa Code"}}, {{id: 2, name: "CEO"}}]
- Expected output:
  - Edge 1: {{ relationType: "HAS_ROLE", sourceEntityId: 0, targetEntityId: 2, fact: "Fernando has the role of CEO" }}
  - Edge 2: {{ relationType: "WORKS_AT", sourceEntityId: 0, targetEntityId: 1, fact: "Fernando works at Doxa Code" }}

# EXTRACTION RULES

1. Only emit facts where both the subject and object match IDs in ENTITIES.
2. Each fact must involve two **distinct** entities.
3. Use a SCREAMING_SNAKE_CASE predicate as the `relationType`, preferring one listed in FACT TYPES when any are given.
4. Do not emit duplicate or semantically redundant facts.
5. The `fact` should quote or closely paraphrase the original source sentence(s).
6. Use `REFERENCE_TIME` to resolve vague or relative temporal expressions (e.g., "last week").
7. Do **not** hallucinate or infer temporal bounds from unrelated events.

# DATETIME RULES

- Use ISO 8601 with a "Z" suffix (UTC) (e.g., 2025-04-30T00:00:00Z).
- If the fact is ongoing (present tense), set `validAt` to REFERENCE_TIME.
- If a change/termination is expressed, set `invalidAt` to the relevant timestamp.
- Leave both fields `null` if no explicit or resolvable time is stated.
- If only a date is mentioned (no time), assume 00:00:00.
- If only a year is mentioned, use January 1st at 00:00:00.
"#,
        fact_types_json = fact_types_json,
        previous = previous,
        content = episode.content,
        entities_json = entities_json,
        reference_time = reference_time,
    );

    if !missed.is_empty() {
        user.push_str("\nThe following facts were missed in a previous extraction:\n");
        for fact in missed {
            user.push_str(fact);
            user.push('\n');
        }
    }

    Ok(vec![Message::system(EXTRACTION_SYSTEM), Message::user(user)])
}

/// Build the reflexion probe asking which facts the extraction missed.
pub fn fact_reflexion(
    episode: &EpisodicNode,
    history: &[EpisodicNode],
    nodes: &[EntityNode],
    extracted_facts: &[String],
) -> Result<Vec<Message>> {
    let entities_json = serde_json::to_string_pretty(&entity_refs(nodes))?;
    let previous = join_contents(history);
    let facts = extracted_facts.join("\n");

    let user = format!(
        r#"<PREVIOUS MESSAGES>
{previous}
</PREVIOUS MESSAGES>

<CURRENT MESSAGE>
{content}
</CURRENT MESSAGE>

<EXTRACTED ENTITIES>
{entities_json}
</EXTRACTED ENTITIES>

<EXTRACTED FACTS>
{facts}
</EXTRACTED FACTS>

Given the above MESSAGES, the list of EXTRACTED ENTITIES, and the list of EXTRACTED FACTS; determine if any facts haven't been extracted."#,
        previous = previous,
        content = episode.content,
        entities_json = entities_json,
        facts = facts,
    );

    Ok(vec![Message::system(REFLEXION_SYSTEM), Message::user(user)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::EpisodeType;
    use chrono::{TimeZone, Utc};

    fn episode(content: &str) -> EpisodicNode {
        EpisodicNode::new(
            "group",
            "ep",
            EpisodeType::Message,
            content,
            "unit test",
            Utc.with_ymd_and_hms(2025, 4, 30, 12, 0, 0).unwrap(),
        )
    }

    fn entity(name: &str) -> EntityNode {
        EntityNode::new("group", name, vec!["Entity".to_string()])
    }

    #[test]
    fn test_edge_extraction_renders_entity_ids_in_order() {
        let ep = episode("Fernando is the CEO at Doxa Code.");
        let nodes = vec![entity("Fernando"), entity("Doxa Code"), entity("CEO")];
        let messages = edge_extraction(&ep, &[], &nodes, &[], &[]).expect("prompt build failed");

        let user = &messages[1].content;
        assert!(user.contains(r#""id": 0"#));
        assert!(user.contains(r#""id": 2"#));
        assert!(user.contains(r#""name": "Fernando""#));
        assert!(user.contains(r#""name": "Doxa Code""#));
        assert!(user.contains("<REFERENCE_TIME>\n2025-04-30T12:00:00Z\n</REFERENCE_TIME>"));
        assert!(!user.contains("missed in a previous extraction"));
    }

    #[test]
    fn test_edge_extraction_renders_fact_types() {
        let ep = episode("hello");
        let fact_types = vec![FactTypeDescriptor::new(
            "WORKS_AT",
            vec!["Person".to_string(), "Organization".to_string()],
            "Employment relationship between a person and an organization.",
        )];
        let messages =
            edge_extraction(&ep, &[], &[], &fact_types, &[]).expect("prompt build failed");

        let user = &messages[1].content;
        assert!(user.contains(r#""factTypeName": "WORKS_AT""#));
        assert!(user.contains("Employment relationship"));
    }

    #[test]
    fn test_edge_extraction_appends_missed_facts() {
        let ep = episode("hello");
        let missed = vec!["Fernando works at Doxa Code".to_string()];
        let messages =
            edge_extraction(&ep, &[], &[], &[], &missed).expect("prompt build failed");

        let user = &messages[1].content;
        assert!(user.contains("The following facts were missed in a previous extraction:"));
        assert!(user.contains("Fernando works at Doxa Code"));
    }

    #[test]
    fn test_fact_reflexion_lists_facts() {
        let ep = episode("current");
        let nodes = vec![entity("Fernando")];
        let facts = vec!["Fernando is the CEO".to_string()];
        let messages =
            fact_reflexion(&ep, &[], &nodes, &facts).expect("prompt build failed");

        let user = &messages[1].content;
        assert!(user.contains("<EXTRACTED FACTS>\nFernando is the CEO\n</EXTRACTED FACTS>"));
        assert!(user.contains("determine if any facts haven't been extracted"));
    }
}
