//! In-process storage backend.
//!
//! Backs tests and throwaway sessions. Mirrors the relational backend's
//! constraints (the unique `(group_id, name)` node index and all-or-nothing
//! batch saves) so pipeline behavior matches across backends.

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::edges::EntityEdge;
use crate::errors::{MemoriaError, Result};
use crate::nodes::{EntityNode, EpisodicNode};
use crate::storage::GraphStorage;

#[derive(Debug, Clone, Default)]
struct Inner {
    episodes: Vec<EpisodicNode>,
    nodes: Vec<EntityNode>,
    edges: Vec<EntityEdge>,
}

/// Ephemeral [`GraphStorage`] implementation holding everything in memory.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    inner: RwLock<Inner>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GraphStorage for MemoryStorage {
    async fn upsert_episode(&self, episode: &EpisodicNode) -> Result<()> {
        let mut inner = self.inner.write().await;
        match inner.episodes.iter_mut().find(|e| e.uuid == episode.uuid) {
            Some(existing) => {
                // Identity (uuid, group_id, created_at) stays; content follows.
                existing.name = episode.name.clone();
                existing.labels = episode.labels.clone();
                existing.source = episode.source.clone();
                existing.content = episode.content.clone();
                existing.source_description = episode.source_description.clone();
            }
            None => inner.episodes.push(episode.clone()),
        }
        Ok(())
    }

    async fn recent_episodes(&self, group_id: &str, limit: usize) -> Result<Vec<EpisodicNode>> {
        let inner = self.inner.read().await;
        let mut episodes: Vec<EpisodicNode> = inner
            .episodes
            .iter()
            .filter(|e| e.group_id == group_id)
            .cloned()
            .collect();
        episodes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        episodes.truncate(limit);
        Ok(episodes)
    }

    async fn nodes_by_names(&self, group_id: &str, names: &[String]) -> Result<Vec<EntityNode>> {
        let inner = self.inner.read().await;
        Ok(inner
            .nodes
            .iter()
            .filter(|n| n.group_id == group_id && names.contains(&n.name))
            .cloned()
            .collect())
    }

    async fn nodes_by_uuids(&self, uuids: &[Uuid]) -> Result<Vec<EntityNode>> {
        let inner = self.inner.read().await;
        Ok(inner
            .nodes
            .iter()
            .filter(|n| uuids.contains(&n.uuid))
            .cloned()
            .collect())
    }

    async fn valid_edges(&self, group_id: &str) -> Result<Vec<EntityEdge>> {
        let inner = self.inner.read().await;
        Ok(inner
            .edges
            .iter()
            .filter(|e| e.group_id == group_id && e.is_currently_valid())
            .cloned()
            .collect())
    }

    async fn load_graph(&self, group_id: &str) -> Result<(Vec<EntityNode>, Vec<EntityEdge>)> {
        let inner = self.inner.read().await;
        let nodes = inner
            .nodes
            .iter()
            .filter(|n| n.group_id == group_id)
            .cloned()
            .collect();
        let edges = inner
            .edges
            .iter()
            .filter(|e| e.group_id == group_id)
            .cloned()
            .collect();
        Ok((nodes, edges))
    }

    async fn save_graph(&self, nodes: &[EntityNode], edges: &[EntityEdge]) -> Result<()> {
        let mut inner = self.inner.write().await;

        // Stage the batch against a copy so a constraint violation leaves
        // the store untouched.
        let mut staged = inner.clone();

        for node in nodes {
            match staged.nodes.iter_mut().find(|n| n.uuid == node.uuid) {
                Some(existing) => {
                    existing.name = node.name.clone();
                    existing.summary = node.summary.clone();
                    existing.labels = node.labels.clone();
                    existing.name_embedding = node.name_embedding.clone();
                }
                None => {
                    if staged
                        .nodes
                        .iter()
                        .any(|n| n.group_id == node.group_id && n.name == node.name)
                    {
                        return Err(MemoriaError::Storage(format!(
                            "duplicate node name '{}' in group '{}'",
                            node.name, node.group_id
                        )));
                    }
                    staged.nodes.push(node.clone());
                }
            }
        }

        for edge in edges {
            match staged.edges.iter_mut().find(|e| e.uuid == edge.uuid) {
                // Updating in place keeps the edge's storage order.
                Some(existing) => *existing = edge.clone(),
                None => staged.edges.push(edge.clone()),
            }
        }

        *inner = staged;
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
