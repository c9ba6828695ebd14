//! Episode ingestion.
//!
//! [`MemoryGraph`] is the engine facade. `add_episode` records the episode
//! durably and returns; enrichment (extraction, resolution, summaries,
//! embeddings, contradiction invalidation, commit) runs in a background
//! task whose progress and terminal state are observable through the
//! returned [`IngestionHandle`].
//!
//! Stages, in order:
//! 1. **Received**: request fields validated, nothing written yet
//! 2. **Persisted**: episode durably recorded; the caller's future resolves
//! 3. **Extracting**: entity pass with reflection against recent history
//! 4. **Resolving**: extracted entities deduplicated against the graph
//! 5. **Enriching**: edge extraction and summary rewrites, concurrently
//! 6. **Embedding**: fact strings and entity names embedded in batches
//! 7. **Invalidating**: newest-wins contradiction resolution
//! 8. **Committed**: nodes and edges upserted in one transaction

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::embedder::{embed_batch_bounded, EmbedderClient};
use crate::errors::{MemoriaError, Result};
use crate::extraction::{
    extract_edges, extract_entities, refresh_summaries, EntityTypeDescriptor, FactTypeDescriptor,
};
use crate::graph::Graph;
use crate::llm_client::LlmClient;
use crate::nodes::{EpisodeType, EpisodicNode};
use crate::resolution::resolve_entities;
use crate::search::{self, SearchResult, DEFAULT_TOP_K};
use crate::storage::GraphStorage;
use crate::temporal::resolve_contradictions;

/// How many prior episodes extraction sees as conversation context.
pub const INGEST_HISTORY_WINDOW: usize = 10;

/// Enrichment progress for one episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Received,
    Persisted,
    Extracting,
    Resolving,
    Enriching,
    Embedding,
    Invalidating,
    Committed,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Received => "received",
            PipelineStage::Persisted => "persisted",
            PipelineStage::Extracting => "extracting",
            PipelineStage::Resolving => "resolving",
            PipelineStage::Enriching => "enriching",
            PipelineStage::Embedding => "embedding",
            PipelineStage::Invalidating => "invalidating",
            PipelineStage::Committed => "committed",
        }
    }
}

/// What one committed enrichment wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitStats {
    /// Entity mentions the oracle reported (before deduplication).
    pub entities_extracted: usize,
    /// Distinct nodes written (new or re-enriched).
    pub nodes_committed: usize,
    /// New fact edges written.
    pub edges_created: usize,
    /// Facts this ingestion invalidated.
    pub edges_invalidated: usize,
}

/// Terminal state of one episode's enrichment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestionOutcome {
    Committed(CommitStats),
    Failed {
        stage: PipelineStage,
        message: String,
    },
}

/// Handle to an in-flight enrichment task.
///
/// Dropping the handle detaches the task (it keeps running); [`abort`]
/// cancels it. The episode itself is already durable either way.
///
/// [`abort`]: IngestionHandle::abort
#[derive(Debug)]
pub struct IngestionHandle {
    episode_uuid: Uuid,
    stage: watch::Receiver<PipelineStage>,
    task: JoinHandle<IngestionOutcome>,
}

impl IngestionHandle {
    /// Uuid of the episode this enrichment belongs to.
    pub fn episode_uuid(&self) -> Uuid {
        self.episode_uuid
    }

    /// The stage the enrichment task most recently entered.
    pub fn stage(&self) -> PipelineStage {
        *self.stage.borrow()
    }

    /// Cancel the enrichment task. No partial state is committed; the
    /// episode stays recorded.
    pub fn abort(&self) {
        self.task.abort();
    }

    /// Wait for the enrichment task's terminal state.
    pub async fn outcome(self) -> IngestionOutcome {
        let last_stage = *self.stage.borrow();
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_cancelled() => IngestionOutcome::Failed {
                stage: last_stage,
                message: "enrichment aborted".to_string(),
            },
            Err(e) => IngestionOutcome::Failed {
                stage: last_stage,
                message: format!("enrichment task panicked: {}", e),
            },
        }
    }
}

/// Parameters for one `add_episode` call.
///
/// `name`, `group_id`, `content`, and `source_description` are required and
/// must be non-blank. `uuid` re-ingests (upserts) an existing episode;
/// `reference_time` anchors fact validity and defaults to now.
#[derive(Debug, Clone)]
pub struct AddEpisodeParams {
    pub name: String,
    pub group_id: String,
    pub content: String,
    pub source_description: String,
    pub source: EpisodeType,
    pub labels: Vec<String>,
    pub uuid: Option<Uuid>,
    pub reference_time: Option<DateTime<Utc>>,
}

impl AddEpisodeParams {
    pub fn new(
        name: impl Into<String>,
        group_id: impl Into<String>,
        content: impl Into<String>,
        source_description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            group_id: group_id.into(),
            content: content.into(),
            source_description: source_description.into(),
            source: EpisodeType::Message,
            labels: Vec::new(),
            uuid: None,
            reference_time: None,
        }
    }

    fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("name", &self.name),
            ("group_id", &self.group_id),
            ("content", &self.content),
            ("source_description", &self.source_description),
        ] {
            if value.trim().is_empty() {
                return Err(MemoriaError::Validation(format!(
                    "{} must not be empty",
                    field
                )));
            }
        }
        Ok(())
    }
}

/// Per-tenant async locks serializing the resolution→commit section.
///
/// Two concurrent enrichments for one tenant would otherwise both miss each
/// other's new node for the same name and create duplicates.
#[derive(Debug, Default)]
struct TenantLocks {
    inner: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl TenantLocks {
    fn for_group(&self, group_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        locks
            .entry(group_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}

/// The temporal knowledge-graph memory engine.
///
/// Generic over the three collaborators so tests can script them; production
/// wiring uses the OpenAI-backed clients and Postgres storage.
pub struct MemoryGraph<L, E, S> {
    llm: Arc<L>,
    embedder: Arc<E>,
    storage: Arc<S>,
    request_timeout: Duration,
    entity_types: Vec<EntityTypeDescriptor>,
    fact_types: Vec<FactTypeDescriptor>,
    tenant_locks: Arc<TenantLocks>,
}

impl<L, E, S> MemoryGraph<L, E, S>
where
    L: LlmClient + 'static,
    E: EmbedderClient + 'static,
    S: GraphStorage + 'static,
{
    pub fn new(llm: Arc<L>, embedder: Arc<E>, storage: Arc<S>, request_timeout: Duration) -> Self {
        Self {
            llm,
            embedder,
            storage,
            request_timeout,
            entity_types: EntityTypeDescriptor::default_set(),
            fact_types: Vec::new(),
            tenant_locks: Arc::new(TenantLocks::default()),
        }
    }

    /// Replace the default entity type descriptors offered to the oracle.
    pub fn with_entity_types(mut self, entity_types: Vec<EntityTypeDescriptor>) -> Self {
        self.entity_types = entity_types;
        self
    }

    /// Constrain relation predicates to the given fact types.
    pub fn with_fact_types(mut self, fact_types: Vec<FactTypeDescriptor>) -> Self {
        self.fact_types = fact_types;
        self
    }

    /// Record an episode and kick off its enrichment.
    ///
    /// Returns after the episode is durably written; everything else happens
    /// in a background task observable through the returned handle. Failures
    /// after this point are logged, never re-raised; the episode stays
    /// recorded and serves as context for later ingestions.
    pub async fn add_episode(&self, params: AddEpisodeParams) -> Result<IngestionHandle> {
        params.validate()?;

        let mut episode = EpisodicNode::new(
            params.group_id,
            params.name,
            params.source,
            params.content,
            params.source_description,
            params.reference_time.unwrap_or_else(Utc::now),
        );
        if let Some(uuid) = params.uuid {
            episode.uuid = uuid;
        }
        episode.labels = params.labels;

        self.storage.upsert_episode(&episode).await?;
        debug!(episode = %episode.uuid, group_id = %episode.group_id, "episode persisted");

        let (stage_tx, stage_rx) = watch::channel(PipelineStage::Persisted);
        let episode_uuid = episode.uuid;

        let worker = EnrichmentWorker {
            llm: Arc::clone(&self.llm),
            embedder: Arc::clone(&self.embedder),
            storage: Arc::clone(&self.storage),
            request_timeout: self.request_timeout,
            entity_types: self.entity_types.clone(),
            fact_types: self.fact_types.clone(),
            lock: self.tenant_locks.for_group(&episode.group_id),
        };

        let task = tokio::spawn(async move {
            let group_id = episode.group_id.clone();
            match worker.run(episode, &stage_tx).await {
                Ok(stats) => {
                    stage_tx.send_replace(PipelineStage::Committed);
                    info!(
                        episode = %episode_uuid,
                        group_id = %group_id,
                        nodes = stats.nodes_committed,
                        edges = stats.edges_created,
                        invalidated = stats.edges_invalidated,
                        "episode enrichment committed"
                    );
                    IngestionOutcome::Committed(stats)
                }
                Err(e) => {
                    let stage = *stage_tx.borrow();
                    error!(
                        episode = %episode_uuid,
                        group_id = %group_id,
                        stage = stage.as_str(),
                        error = %e,
                        "episode enrichment failed"
                    );
                    IngestionOutcome::Failed {
                        stage,
                        message: e.to_string(),
                    }
                }
            }
        });

        Ok(IngestionHandle {
            episode_uuid,
            stage: stage_rx,
            task,
        })
    }

    /// Rank the tenant's facts against `query` and assemble a context.
    pub async fn search(
        &self,
        query: &str,
        group_id: &str,
        top_k: Option<usize>,
    ) -> Result<SearchResult> {
        search::search(
            self.embedder.as_ref(),
            self.storage.as_ref(),
            query,
            group_id,
            top_k.unwrap_or(DEFAULT_TOP_K),
            self.request_timeout,
        )
        .await
    }

    /// Load a tenant's full committed graph.
    pub async fn graph(&self, group_id: &str) -> Result<Graph> {
        Graph::load(self.storage.as_ref(), group_id).await
    }
}

/// Everything one enrichment task needs, cloned out of the facade so the
/// task owns its state.
struct EnrichmentWorker<L, E, S> {
    llm: Arc<L>,
    embedder: Arc<E>,
    storage: Arc<S>,
    request_timeout: Duration,
    entity_types: Vec<EntityTypeDescriptor>,
    fact_types: Vec<FactTypeDescriptor>,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl<L, E, S> EnrichmentWorker<L, E, S>
where
    L: LlmClient,
    E: EmbedderClient,
    S: GraphStorage,
{
    async fn run(
        &self,
        episode: EpisodicNode,
        stage: &watch::Sender<PipelineStage>,
    ) -> Result<CommitStats> {
        let group_id = episode.group_id.as_str();
        let timeout = self.request_timeout;

        stage.send_replace(PipelineStage::Extracting);
        let mut history = self
            .storage
            .recent_episodes(group_id, INGEST_HISTORY_WINDOW)
            .await?;
        // The just-persisted episode is in the window; extraction wants
        // prior context only, in chronological order.
        history.retain(|e| e.uuid != episode.uuid);
        history.reverse();

        let extracted = extract_entities(
            self.llm.as_ref(),
            timeout,
            &episode,
            &history,
            &self.entity_types,
        )
        .await?;
        if extracted.is_empty() {
            debug!(episode = %episode.uuid, "no entities extracted, nothing to enrich");
            return Ok(CommitStats::default());
        }

        stage.send_replace(PipelineStage::Resolving);
        // Serialize resolution→commit per tenant: closes the race where two
        // concurrent ingestions both create a node for the same new name.
        let _guard = self.lock.lock().await;
        let mut resolved = resolve_entities(self.storage.as_ref(), group_id, &extracted).await?;

        stage.send_replace(PipelineStage::Enriching);
        let nodes_for_edges = resolved.nodes.clone();
        let (edges_result, summaries_result) = tokio::join!(
            extract_edges(
                self.llm.as_ref(),
                timeout,
                &episode,
                &history,
                &nodes_for_edges,
                &self.fact_types,
            ),
            refresh_summaries(
                self.llm.as_ref(),
                timeout,
                &episode,
                &history,
                &mut resolved.nodes,
            ),
        );
        let mut new_edges = edges_result?;
        summaries_result?;

        stage.send_replace(PipelineStage::Embedding);
        let (fact_vectors, name_vectors) = {
            let fact_texts: Vec<&str> = new_edges.iter().map(|e| e.fact.as_str()).collect();
            let name_texts: Vec<&str> = resolved.nodes.iter().map(|n| n.name.as_str()).collect();
            tokio::try_join!(
                embed_batch_bounded(
                    self.embedder.as_ref(),
                    timeout,
                    "fact embeddings",
                    &fact_texts
                ),
                embed_batch_bounded(
                    self.embedder.as_ref(),
                    timeout,
                    "entity name embeddings",
                    &name_texts
                ),
            )?
        };
        if fact_vectors.len() != new_edges.len() || name_vectors.len() != resolved.nodes.len() {
            return Err(MemoriaError::Embedder(
                "embedding count does not match request count".to_string(),
            ));
        }
        for (edge, vector) in new_edges.iter_mut().zip(fact_vectors) {
            edge.fact_embedding = Some(vector);
        }
        for (node, vector) in resolved.nodes.iter_mut().zip(name_vectors) {
            node.name_embedding = Some(vector);
        }

        stage.send_replace(PipelineStage::Invalidating);
        // Loaded here, not earlier: the valid set must not be held across
        // oracle calls.
        let existing = self.storage.valid_edges(group_id).await?;
        let edges_created = new_edges.len();
        let outcome = resolve_contradictions(existing, new_edges, Utc::now());

        self.storage
            .save_graph(&resolved.nodes, &outcome.edges)
            .await?;

        Ok(CommitStats {
            entities_extracted: resolved.map.len(),
            nodes_committed: resolved.nodes.len(),
            edges_created,
            edges_invalidated: outcome.invalidated,
        })
    }
}
