//! PostgreSQL storage backend.
//!
//! Uses `sqlx` with a [`PgPool`] for connection pooling and supports optional
//! migration execution on startup. Embeddings are stored as `REAL[]` columns
//! and ranked in process, so no vector extension is required.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use uuid::Uuid;

use crate::edges::EntityEdge;
use crate::errors::{MemoriaError, Result};
use crate::nodes::{EntityNode, EpisodeType, EpisodicNode};
use crate::storage::GraphStorage;

/// PostgreSQL-backed [`GraphStorage`] using a sqlx connection pool.
pub struct PostgresStorage {
    pool: PgPool,
}

fn db_err(e: sqlx::Error) -> MemoriaError {
    MemoriaError::Storage(e.to_string())
}

impl PostgresStorage {
    /// Connect to the PostgreSQL database at `database_url`.
    ///
    /// Configures a small production pool. If `run_migrations` is true,
    /// pending migrations are applied before the storage is handed out.
    pub async fn connect(database_url: &str, run_migrations: bool) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .min_connections(1)
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(1800))
            .connect(database_url)
            .await
            .map_err(|e| MemoriaError::Storage(format!("failed to connect to database: {}", e)))?;

        if run_migrations {
            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .map_err(|e| MemoriaError::Storage(format!("migration failed: {}", e)))?;
        }

        Ok(Self { pool })
    }

    /// Wrap an existing pool (shared with other components).
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_episode(row: &PgRow) -> Result<EpisodicNode> {
    let source: String = row.try_get("source").map_err(db_err)?;
    let source = EpisodeType::parse(&source)
        .ok_or_else(|| MemoriaError::Storage(format!("unknown episode source '{}'", source)))?;

    Ok(EpisodicNode {
        uuid: row.try_get("id").map_err(db_err)?,
        name: row.try_get("name").map_err(db_err)?,
        group_id: row.try_get("group_id").map_err(db_err)?,
        labels: row.try_get("labels").map_err(db_err)?,
        source,
        source_description: row.try_get("source_description").map_err(db_err)?,
        content: row.try_get("content").map_err(db_err)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
    })
}

fn row_to_node(row: &PgRow) -> Result<EntityNode> {
    Ok(EntityNode {
        uuid: row.try_get("id").map_err(db_err)?,
        name: row.try_get("name").map_err(db_err)?,
        group_id: row.try_get("group_id").map_err(db_err)?,
        labels: row.try_get("labels").map_err(db_err)?,
        summary: row.try_get("summary").map_err(db_err)?,
        name_embedding: row.try_get("name_embedding").map_err(db_err)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
    })
}

fn row_to_edge(row: &PgRow) -> Result<EntityEdge> {
    Ok(EntityEdge {
        uuid: row.try_get("id").map_err(db_err)?,
        group_id: row.try_get("group_id").map_err(db_err)?,
        source_node_uuid: row.try_get("source_id").map_err(db_err)?,
        target_node_uuid: row.try_get("target_id").map_err(db_err)?,
        name: row.try_get("label").map_err(db_err)?,
        fact: row.try_get("fact").map_err(db_err)?,
        episodes: row.try_get("episodes").map_err(db_err)?,
        valid_at: row.try_get("valid_at").map_err(db_err)?,
        invalid_at: row.try_get("invalid_at").map_err(db_err)?,
        fact_embedding: row.try_get("fact_embedding").map_err(db_err)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
    })
}

const EPISODE_COLUMNS: &str =
    "id, group_id, name, labels, source, content, source_description, created_at";
const NODE_COLUMNS: &str = "id, group_id, name, summary, labels, name_embedding, created_at";
const EDGE_COLUMNS: &str = "id, group_id, source_id, target_id, label, fact, episodes, \
     valid_at, invalid_at, fact_embedding, created_at";

#[async_trait]
impl GraphStorage for PostgresStorage {
    async fn upsert_episode(&self, episode: &EpisodicNode) -> Result<()> {
        sqlx::query(
            "INSERT INTO episodes \
                 (id, group_id, name, labels, source, content, source_description, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (id) DO UPDATE SET \
                 name = EXCLUDED.name, \
                 labels = EXCLUDED.labels, \
                 source = EXCLUDED.source, \
                 content = EXCLUDED.content, \
                 source_description = EXCLUDED.source_description",
        )
        .bind(episode.uuid)
        .bind(&episode.group_id)
        .bind(&episode.name)
        .bind(&episode.labels)
        .bind(episode.source.as_str())
        .bind(&episode.content)
        .bind(&episode.source_description)
        .bind(episode.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| MemoriaError::Storage(format!("failed to upsert episode: {}", e)))?;

        Ok(())
    }

    async fn recent_episodes(&self, group_id: &str, limit: usize) -> Result<Vec<EpisodicNode>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM episodes \
             WHERE group_id = $1 ORDER BY created_at DESC LIMIT $2",
            EPISODE_COLUMNS
        ))
        .bind(group_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(row_to_episode).collect()
    }

    async fn nodes_by_names(&self, group_id: &str, names: &[String]) -> Result<Vec<EntityNode>> {
        if names.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(&format!(
            "SELECT {} FROM nodes WHERE group_id = $1 AND name = ANY($2)",
            NODE_COLUMNS
        ))
        .bind(group_id)
        .bind(names)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(row_to_node).collect()
    }

    async fn nodes_by_uuids(&self, uuids: &[Uuid]) -> Result<Vec<EntityNode>> {
        if uuids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(&format!(
            "SELECT {} FROM nodes WHERE id = ANY($1)",
            NODE_COLUMNS
        ))
        .bind(uuids)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(row_to_node).collect()
    }

    async fn valid_edges(&self, group_id: &str) -> Result<Vec<EntityEdge>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM edges \
             WHERE group_id = $1 AND invalid_at IS NULL ORDER BY seq",
            EDGE_COLUMNS
        ))
        .bind(group_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(row_to_edge).collect()
    }

    async fn load_graph(&self, group_id: &str) -> Result<(Vec<EntityNode>, Vec<EntityEdge>)> {
        let node_rows = sqlx::query(&format!(
            "SELECT {} FROM nodes WHERE group_id = $1 ORDER BY created_at",
            NODE_COLUMNS
        ))
        .bind(group_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let edge_rows = sqlx::query(&format!(
            "SELECT {} FROM edges WHERE group_id = $1 ORDER BY seq",
            EDGE_COLUMNS
        ))
        .bind(group_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let nodes = node_rows.iter().map(row_to_node).collect::<Result<_>>()?;
        let edges = edge_rows.iter().map(row_to_edge).collect::<Result<_>>()?;
        Ok((nodes, edges))
    }

    async fn save_graph(&self, nodes: &[EntityNode], edges: &[EntityEdge]) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| MemoriaError::Storage(format!("failed to begin transaction: {}", e)))?;

        // Nodes first: edges reference them.
        for node in nodes {
            sqlx::query(
                "INSERT INTO nodes \
                     (id, group_id, name, summary, labels, name_embedding, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7) \
                 ON CONFLICT (id) DO UPDATE SET \
                     name = EXCLUDED.name, \
                     summary = EXCLUDED.summary, \
                     labels = EXCLUDED.labels, \
                     name_embedding = EXCLUDED.name_embedding",
            )
            .bind(node.uuid)
            .bind(&node.group_id)
            .bind(&node.name)
            .bind(&node.summary)
            .bind(&node.labels)
            .bind(&node.name_embedding)
            .bind(node.created_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| MemoriaError::Storage(format!("failed to upsert node: {}", e)))?;
        }

        for edge in edges {
            sqlx::query(
                "INSERT INTO edges \
                     (id, group_id, source_id, target_id, label, fact, episodes, \
                      valid_at, invalid_at, fact_embedding, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
                 ON CONFLICT (id) DO UPDATE SET \
                     label = EXCLUDED.label, \
                     fact = EXCLUDED.fact, \
                     episodes = EXCLUDED.episodes, \
                     invalid_at = EXCLUDED.invalid_at, \
                     fact_embedding = EXCLUDED.fact_embedding",
            )
            .bind(edge.uuid)
            .bind(&edge.group_id)
            .bind(edge.source_node_uuid)
            .bind(edge.target_node_uuid)
            .bind(&edge.name)
            .bind(&edge.fact)
            .bind(&edge.episodes)
            .bind(edge.valid_at)
            .bind(edge.invalid_at)
            .bind(&edge.fact_embedding)
            .bind(edge.created_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| MemoriaError::Storage(format!("failed to upsert edge: {}", e)))?;
        }

        tx.commit()
            .await
            .map_err(|e| MemoriaError::Storage(format!("failed to commit graph batch: {}", e)))?;

        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}
