//! Fact triple extraction with bounded reflexion and strict assembly.

use std::time::Duration;

use tracing::{debug, warn};

use crate::edges::EntityEdge;
use crate::errors::Result;
use crate::llm_client::{complete_bounded, LlmClient};
use crate::nodes::{EntityNode, EpisodicNode};
use crate::prompts;
use crate::utils::{normalize_label, normalize_whitespace, parse_flexible_datetime};

use super::{
    ExtractedEdge, ExtractedEdges, FactTypeDescriptor, MissingFacts, MAX_REFLEXION_ITERATIONS,
};

/// Extract fact edges between the resolved `nodes` from `episode`.
///
/// Same bounded reflexion shape as entity extraction: at most
/// [`MAX_REFLEXION_ITERATIONS`] passes, a probe between passes, missed facts
/// fed back as a hint, latest pass kept.
///
/// Assembly is strict: a reported triple only becomes an edge if both entity
/// ids are in range, the endpoints differ, and the relation label and fact
/// statement survive normalization. Anything else is dropped with a warning
/// rather than failing the whole episode.
pub async fn extract_edges<L>(
    llm: &L,
    limit: Duration,
    episode: &EpisodicNode,
    history: &[EpisodicNode],
    nodes: &[EntityNode],
    fact_types: &[FactTypeDescriptor],
) -> Result<Vec<EntityEdge>>
where
    L: LlmClient + ?Sized,
{
    let mut extracted: Vec<ExtractedEdge> = Vec::new();
    let mut missed: Vec<String> = Vec::new();

    for pass in 0..MAX_REFLEXION_ITERATIONS {
        let messages = prompts::edge_extraction(episode, history, nodes, fact_types, &missed)?;
        let response: ExtractedEdges =
            complete_bounded(llm, limit, "fact extraction", &messages).await?;
        extracted = response.edges;
        debug!(pass, count = extracted.len(), "fact extraction pass");

        if pass + 1 == MAX_REFLEXION_ITERATIONS {
            break;
        }

        let facts: Vec<String> = extracted.iter().map(|e| e.fact.clone()).collect();
        let probe = prompts::fact_reflexion(episode, history, nodes, &facts)?;
        let reflexion: MissingFacts =
            complete_bounded(llm, limit, "fact reflexion", &probe).await?;
        if reflexion.missing_facts.is_empty() {
            break;
        }
        debug!(
            missing = reflexion.missing_facts.len(),
            "reflexion reported missing facts"
        );
        missed = reflexion.missing_facts;
    }

    Ok(assemble(episode, nodes, extracted))
}

fn entity_at(nodes: &[EntityNode], id: i64) -> Option<&EntityNode> {
    usize::try_from(id).ok().and_then(|idx| nodes.get(idx))
}

/// Validate raw triples and build edges attributed to `episode`.
///
/// A missing or unparseable `validAt` falls back to the episode's reference
/// time, never to wall-clock now. An `invalidAt` earlier than `validAt`
/// drops the triple.
fn assemble(
    episode: &EpisodicNode,
    nodes: &[EntityNode],
    extracted: Vec<ExtractedEdge>,
) -> Vec<EntityEdge> {
    let mut edges = Vec::new();

    for raw in extracted {
        let name = normalize_label(&raw.relation_type);
        if name.is_empty() {
            warn!(relation = %raw.relation_type, "dropping fact with blank relation label");
            continue;
        }
        // Facts render as single lines in search context.
        let fact = normalize_whitespace(&raw.fact);
        if fact.is_empty() {
            warn!(relation = %name, "dropping fact with blank statement");
            continue;
        }

        let (source, target) = match (
            entity_at(nodes, raw.source_entity_id),
            entity_at(nodes, raw.target_entity_id),
        ) {
            (Some(source), Some(target)) => (source, target),
            _ => {
                warn!(
                    source = raw.source_entity_id,
                    target = raw.target_entity_id,
                    "dropping fact with out-of-range entity id"
                );
                continue;
            }
        };
        if source.uuid == target.uuid {
            warn!(entity = %source.name, "dropping self-referential fact");
            continue;
        }

        let valid_at = match raw.valid_at.as_deref() {
            Some(s) => match parse_flexible_datetime(s) {
                Some(dt) => dt,
                None => {
                    warn!(value = %s, "unparseable validAt, using episode reference time");
                    episode.created_at
                }
            },
            None => episode.created_at,
        };
        let invalid_at = match raw.invalid_at.as_deref() {
            Some(s) => {
                let parsed = parse_flexible_datetime(s);
                if parsed.is_none() {
                    warn!(value = %s, "unparseable invalidAt, treating fact as open-ended");
                }
                parsed
            }
            None => None,
        };
        if let Some(end) = invalid_at {
            if end < valid_at {
                warn!(fact = %raw.fact, "dropping fact whose validity ends before it starts");
                continue;
            }
        }

        edges.push(EntityEdge::new(
            episode.group_id.as_str(),
            source.uuid,
            target.uuid,
            name,
            fact,
            episode.uuid,
            valid_at,
            invalid_at,
        ));
    }

    edges
}
