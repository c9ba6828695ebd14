//! Entity extraction with bounded reflexion.

use std::time::Duration;

use tracing::{debug, warn};

use crate::errors::Result;
use crate::llm_client::{complete_bounded, LlmClient};
use crate::nodes::{EntityNode, EpisodicNode};
use crate::prompts;
use crate::utils::normalize_whitespace;

use super::{
    EntityTypeDescriptor, ExtractedEntities, ExtractedEntity, MissedEntities,
    MAX_REFLEXION_ITERATIONS,
};

/// Extract entity nodes from `episode`, re-prompting with reflexion hints.
///
/// Runs up to [`MAX_REFLEXION_ITERATIONS`] extraction passes. After every
/// pass except the last, a reflexion probe asks which entities were missed;
/// an empty answer ends the loop early, otherwise the missed names feed the
/// next pass as an explicit reminder. The latest pass always wins.
///
/// The returned nodes are in extraction order and may repeat names. Exact-name
/// resolution dedupes them against the batch and the stored graph.
pub async fn extract_entities<L>(
    llm: &L,
    limit: Duration,
    episode: &EpisodicNode,
    history: &[EpisodicNode],
    entity_types: &[EntityTypeDescriptor],
) -> Result<Vec<EntityNode>>
where
    L: LlmClient + ?Sized,
{
    let mut extracted: Vec<ExtractedEntity> = Vec::new();
    let mut missed: Vec<String> = Vec::new();

    for pass in 0..MAX_REFLEXION_ITERATIONS {
        let messages = prompts::entity_extraction(episode, history, entity_types, &missed)?;
        let response: ExtractedEntities =
            complete_bounded(llm, limit, "entity extraction", &messages).await?;
        extracted = response.extracted_entities;
        debug!(pass, count = extracted.len(), "entity extraction pass");

        if pass + 1 == MAX_REFLEXION_ITERATIONS {
            break;
        }

        let names: Vec<String> = extracted.iter().map(|e| e.name.clone()).collect();
        let probe = prompts::entity_reflexion(episode, history, &names);
        let reflexion: MissedEntities =
            complete_bounded(llm, limit, "entity reflexion", &probe).await?;
        if reflexion.missed_entities.is_empty() {
            break;
        }
        debug!(
            missed = reflexion.missed_entities.len(),
            "reflexion reported missed entities"
        );
        missed = reflexion.missed_entities;
    }

    Ok(assemble(episode, entity_types, extracted))
}

/// Turn raw extraction output into entity nodes for the episode's group.
///
/// Names are whitespace-normalized before they become the dedup key; a name
/// that normalizes to nothing drops the mention. Labels come from the entity
/// type matching the reported id; an id outside the configured set yields an
/// unlabeled node rather than an error.
fn assemble(
    episode: &EpisodicNode,
    entity_types: &[EntityTypeDescriptor],
    extracted: Vec<ExtractedEntity>,
) -> Vec<EntityNode> {
    extracted
        .into_iter()
        .filter_map(|raw| {
            let name = normalize_whitespace(&raw.name);
            if name.is_empty() {
                warn!("dropping extracted entity with blank name");
                return None;
            }
            let labels: Vec<String> = entity_types
                .iter()
                .filter(|t| t.entity_type_id == raw.entity_type_id)
                .map(|t| t.entity_type_name.clone())
                .collect();
            Some(EntityNode::new(episode.group_id.as_str(), name, labels))
        })
        .collect()
}
