//! In-memory working set of one tenant's knowledge graph.
//!
//! [`Graph`] holds nodes keyed by uuid and an append-only edge list. It is the
//! unit the retrieval side loads to render a tenant's full graph and the unit
//! [`Graph::save`] writes back in one atomic batch.

use std::collections::HashMap;

use serde::Serialize;
use uuid::Uuid;

use crate::edges::EntityEdge;
use crate::errors::Result;
use crate::nodes::EntityNode;
use crate::storage::GraphStorage;

/// One tenant's node and edge collections.
///
/// Nodes are addressed by uuid; inserting a uuid that is already present is a
/// no-op, so replaying a batch never clobbers a node another step already
/// placed. Edges are an append-only list whose order is the storage order used
/// as the ranking tie-break.
#[derive(Debug, Clone, Serialize)]
pub struct Graph {
    group_id: String,
    nodes: HashMap<Uuid, EntityNode>,
    edges: Vec<EntityEdge>,
}

impl Graph {
    /// Create an empty working set for `group_id`.
    pub fn new(group_id: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            nodes: HashMap::new(),
            edges: Vec::new(),
        }
    }

    /// Tenant this working set belongs to.
    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    /// Insert a node unless its uuid is already present.
    ///
    /// Returns `true` when the node was inserted.
    pub fn add_node(&mut self, node: EntityNode) -> bool {
        match self.nodes.entry(node.uuid) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(node);
                true
            }
        }
    }

    /// Insert or replace a node by uuid.
    pub fn upsert_node(&mut self, node: EntityNode) {
        self.nodes.insert(node.uuid, node);
    }

    /// Append an edge to the working set.
    pub fn add_edge(&mut self, edge: EntityEdge) {
        self.edges.push(edge);
    }

    /// Look up a node by uuid.
    pub fn node(&self, uuid: &Uuid) -> Option<&EntityNode> {
        self.nodes.get(uuid)
    }

    /// All nodes, in no particular order.
    pub fn nodes(&self) -> impl Iterator<Item = &EntityNode> {
        self.nodes.values()
    }

    /// All edges, in storage order.
    pub fn edges(&self) -> &[EntityEdge] {
        &self.edges
    }

    /// Edges that have `uuid` as either endpoint, in storage order.
    pub fn edges_touching(&self, uuid: &Uuid) -> Vec<&EntityEdge> {
        self.edges
            .iter()
            .filter(|e| e.source_node_uuid == *uuid || e.target_node_uuid == *uuid)
            .collect()
    }

    /// Nodes reachable from `uuid` through one edge, via either endpoint.
    ///
    /// Deduplicated, in first-edge order. The node itself is not included
    /// unless a self-loop edge references it.
    pub fn connected_nodes(&self, uuid: &Uuid) -> Vec<&EntityNode> {
        let mut seen: Vec<Uuid> = Vec::new();
        for edge in self.edges_touching(uuid) {
            let other = if edge.source_node_uuid == *uuid {
                edge.target_node_uuid
            } else {
                edge.source_node_uuid
            };
            if !seen.contains(&other) {
                seen.push(other);
            }
        }
        seen.iter().filter_map(|u| self.nodes.get(u)).collect()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    /// Load a tenant's full graph from storage.
    pub async fn load<S>(storage: &S, group_id: &str) -> Result<Self>
    where
        S: GraphStorage + ?Sized,
    {
        let (nodes, edges) = storage.load_graph(group_id).await?;
        let mut graph = Graph::new(group_id);
        for node in nodes {
            graph.add_node(node);
        }
        for edge in edges {
            graph.add_edge(edge);
        }
        Ok(graph)
    }

    /// Persist the full working set as one atomic batch.
    pub async fn save<S>(&self, storage: &S) -> Result<()>
    where
        S: GraphStorage + ?Sized,
    {
        let nodes: Vec<EntityNode> = self.nodes.values().cloned().collect();
        storage.save_graph(&nodes, &self.edges).await
    }
}
