//! Persistence backends for the knowledge graph.
//!
//! Defines the [`GraphStorage`] trait that all backend implementations must
//! satisfy, plus the two shipped backends:
//! - [`postgres::PostgresStorage`]: durable storage via `sqlx` and a
//!   connection pool, with embedded migrations.
//! - [`memory::MemoryStorage`]: ephemeral in-process storage for tests and
//!   throwaway sessions.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::edges::EntityEdge;
use crate::errors::Result;
use crate::nodes::{EntityNode, EpisodicNode};

pub use memory::MemoryStorage;
pub use postgres::PostgresStorage;

/// Trait representing a persistence backend for episodes, nodes, and edges.
///
/// All methods take `&self`; implementations are expected to be shared behind
/// an `Arc` between the ingestion pipeline and the retrieval path.
#[async_trait]
pub trait GraphStorage: Send + Sync {
    /// Insert an episode, or update its mutable fields if the uuid exists.
    ///
    /// Identity fields (`uuid`, `group_id`, `created_at`) are stable across
    /// re-ingestion; only name, labels, source, content, and the source
    /// description follow the new record.
    async fn upsert_episode(&self, episode: &EpisodicNode) -> Result<()>;

    /// The tenant's most recent episodes, newest first.
    ///
    /// Callers that need chronological order reverse the result.
    async fn recent_episodes(&self, group_id: &str, limit: usize) -> Result<Vec<EpisodicNode>>;

    /// Entity nodes in `group_id` whose name matches any of `names` exactly.
    async fn nodes_by_names(&self, group_id: &str, names: &[String]) -> Result<Vec<EntityNode>>;

    /// Entity nodes with the given uuids, in unspecified order.
    async fn nodes_by_uuids(&self, uuids: &[Uuid]) -> Result<Vec<EntityNode>>;

    /// The tenant's currently-valid edges (`invalid_at` unset), in storage order.
    async fn valid_edges(&self, group_id: &str) -> Result<Vec<EntityEdge>>;

    /// The tenant's full node and edge sets. Edges come back in storage order.
    async fn load_graph(&self, group_id: &str) -> Result<(Vec<EntityNode>, Vec<EntityEdge>)>;

    /// Upsert a batch of nodes and edges in one transaction.
    ///
    /// All-or-nothing: a reader never observes a partially applied batch, and
    /// any constraint violation rolls the whole batch back.
    async fn save_graph(&self, nodes: &[EntityNode], edges: &[EntityEdge]) -> Result<()>;

    /// Verify the backend is reachable.
    async fn ping(&self) -> Result<()>;

    /// Release the backend's resources (connection pool, buffers).
    async fn close(&self) -> Result<()>;
}
