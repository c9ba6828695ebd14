//! Entity resolution: deduplication of extracted entities against the graph.
//!
//! Name is the dedup key: within one tenant, at most one node exists per
//! distinct name (case-sensitive). Resolution binds each extracted mention to
//! a persisted node when the name is already known, or keeps the freshly
//! extracted node otherwise; first occurrence wins inside a batch.

use std::collections::HashMap;

use tracing::debug;
use uuid::Uuid;

use crate::errors::Result;
use crate::nodes::EntityNode;
use crate::storage::GraphStorage;

/// Result of resolving one extraction batch.
#[derive(Debug, Clone, Default)]
pub struct ResolvedEntities {
    /// Extraction-local id (list index) → resolved node uuid.
    pub map: HashMap<i64, Uuid>,
    /// Deduplicated nodes to persist and enrich, in first-occurrence order.
    pub nodes: Vec<EntityNode>,
}

/// Resolve extracted entities against the tenant's persisted nodes.
///
/// One batch fetch covers every extracted name; mentions then resolve in
/// order: a name already resolved in this batch reuses its node, a name
/// matching a persisted node binds to it, anything else keeps the extracted
/// node as a new entity.
pub async fn resolve_entities<S>(
    storage: &S,
    group_id: &str,
    extracted: &[EntityNode],
) -> Result<ResolvedEntities>
where
    S: GraphStorage + ?Sized,
{
    if extracted.is_empty() {
        return Ok(ResolvedEntities::default());
    }

    let mut names: Vec<String> = Vec::new();
    for entity in extracted {
        if !names.contains(&entity.name) {
            names.push(entity.name.clone());
        }
    }

    let persisted = storage.nodes_by_names(group_id, &names).await?;
    let persisted_by_name: HashMap<&str, &EntityNode> =
        persisted.iter().map(|n| (n.name.as_str(), n)).collect();

    let mut resolved = ResolvedEntities::default();
    let mut seen: HashMap<&str, Uuid> = HashMap::new();

    for (local_id, entity) in extracted.iter().enumerate() {
        let local_id = local_id as i64;

        if let Some(uuid) = seen.get(entity.name.as_str()) {
            resolved.map.insert(local_id, *uuid);
            continue;
        }

        let node = match persisted_by_name.get(entity.name.as_str()) {
            Some(existing) => (*existing).clone(),
            None => entity.clone(),
        };

        seen.insert(entity.name.as_str(), node.uuid);
        resolved.map.insert(local_id, node.uuid);
        resolved.nodes.push(node);
    }

    debug!(
        group_id,
        mentions = resolved.map.len(),
        nodes = resolved.nodes.len(),
        "resolved extracted entities"
    );

    Ok(resolved)
}
