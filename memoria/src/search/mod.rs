//! Retrieval: embedding-ranked facts assembled into an agent-ready context.
//!
//! The read path: embed the query, score the tenant's currently-valid facts
//! by cosine similarity, keep the top K, pull in the entities those facts
//! reference and a short tail of recent conversation. Reads only committed
//! state, so retrieval never waits on in-flight ingestion.

use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::edges::EntityEdge;
use crate::embedder::{embed_bounded, EmbedderClient};
use crate::errors::Result;
use crate::nodes::{EntityNode, EpisodicNode};
use crate::storage::GraphStorage;
use crate::utils::{format_timestamp, rank_by_similarity};

/// Result cap when the caller does not supply one.
pub const DEFAULT_TOP_K: usize = 10;

/// How many recent episodes the rendered context carries.
pub const SEARCH_HISTORY_WINDOW: usize = 3;

/// A fact scored against the query.
#[derive(Debug, Clone, Serialize)]
pub struct RankedFact {
    pub edge: EntityEdge,
    pub score: f32,
}

/// Everything one retrieval call produced.
///
/// `facts` are in descending score order (ties keep storage order);
/// `entities` are the distinct endpoints of those facts in first-reference
/// order; `history` is chronological.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub query: String,
    pub group_id: String,
    pub facts: Vec<RankedFact>,
    pub entities: Vec<EntityNode>,
    pub history: Vec<EpisodicNode>,
}

impl SearchResult {
    /// True when nothing matched and no history exists.
    pub fn is_empty(&self) -> bool {
        self.facts.is_empty() && self.entities.is_empty() && self.history.is_empty()
    }

    /// Render the result as prompt-ready context.
    ///
    /// Sections in order: ranked facts with their validity window (open
    /// intervals end in `present`), the entities those facts reference, then
    /// recent conversation history. Sections stay present when empty so the
    /// consuming prompt keeps a fixed shape.
    pub fn context(&self) -> String {
        let facts: Vec<String> = self
            .facts
            .iter()
            .map(|ranked| {
                let edge = &ranked.edge;
                let window = match edge.invalid_at {
                    Some(end) => {
                        format!("{} - {}", format_timestamp(&edge.valid_at), format_timestamp(&end))
                    }
                    None => format!("{} - present", format_timestamp(&edge.valid_at)),
                };
                format!("- {} (Date range: {})", edge.fact, window)
            })
            .collect();

        let entities: Vec<String> = self
            .entities
            .iter()
            .map(|node| {
                format!(
                    "<ENTITY>\n- Name: {}\n- Summary: {}\n</ENTITY>",
                    node.name, node.summary
                )
            })
            .collect();

        let history: Vec<String> = self.history.iter().map(|e| e.content.clone()).collect();

        [
            "# Relevant facts".to_string(),
            "<FACTS>".to_string(),
            facts.join("\n"),
            "</FACTS>".to_string(),
            String::new(),
            "# Relevant entities".to_string(),
            "<ENTITIES>".to_string(),
            entities.join("\n"),
            "</ENTITIES>".to_string(),
            String::new(),
            "# Recent conversation history".to_string(),
            "<HISTORY>".to_string(),
            history.join("\n"),
            "</HISTORY>".to_string(),
        ]
        .join("\n")
    }
}

/// Run one retrieval query for a tenant.
///
/// An empty match set yields an explicit empty result, never an error.
pub async fn search<E, S>(
    embedder: &E,
    storage: &S,
    query: &str,
    group_id: &str,
    top_k: usize,
    request_timeout: Duration,
) -> Result<SearchResult>
where
    E: EmbedderClient + ?Sized,
    S: GraphStorage + ?Sized,
{
    let query_embedding =
        embed_bounded(embedder, request_timeout, "query embedding", query).await?;

    let edges = storage.valid_edges(group_id).await?;
    let ranked = rank_by_similarity(
        &query_embedding,
        edges.iter().map(|e| e.fact_embedding.as_deref()),
    );

    let facts: Vec<RankedFact> = ranked
        .into_iter()
        .take(top_k)
        .map(|(index, score)| RankedFact {
            edge: edges[index].clone(),
            score,
        })
        .collect();

    // Distinct endpoints in first-reference order.
    let mut endpoint_uuids: Vec<Uuid> = Vec::new();
    for ranked in &facts {
        for uuid in [ranked.edge.source_node_uuid, ranked.edge.target_node_uuid] {
            if !endpoint_uuids.contains(&uuid) {
                endpoint_uuids.push(uuid);
            }
        }
    }

    let loaded = storage.nodes_by_uuids(&endpoint_uuids).await?;
    let by_uuid: HashMap<Uuid, EntityNode> =
        loaded.into_iter().map(|n| (n.uuid, n)).collect();
    let mut entities = Vec::with_capacity(endpoint_uuids.len());
    for uuid in &endpoint_uuids {
        match by_uuid.get(uuid) {
            Some(node) => entities.push(node.clone()),
            None => warn!(%uuid, group_id, "fact references a missing entity node"),
        }
    }

    let mut history = storage
        .recent_episodes(group_id, SEARCH_HISTORY_WINDOW)
        .await?;
    history.reverse();

    debug!(
        group_id,
        facts = facts.len(),
        entities = entities.len(),
        "search assembled"
    );

    Ok(SearchResult {
        query: query.to_string(),
        group_id: group_id.to_string(),
        facts,
        entities,
        history,
    })
}
