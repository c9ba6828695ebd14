//! End-to-end pipeline tests over the public API: a scripted oracle, a
//! keyword embedder, in-memory storage, and a short conversation per
//! scenario.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use uuid::Uuid;

use memoria::embedder::EmbedderClient;
use memoria::errors::{LlmError, MemoriaError, Result};
use memoria::llm_client::{LlmClient, Message};
use memoria::pipeline::{AddEpisodeParams, IngestionOutcome};
use memoria::storage::{GraphStorage, MemoryStorage};
use memoria::MemoryGraph;

// ---------------------------------------------------------------------------
// Stubs
// ---------------------------------------------------------------------------

/// Oracle replaying a scripted sequence of JSON responses.
struct ScriptedLlm {
    responses: Mutex<VecDeque<Value>>,
}

impl ScriptedLlm {
    fn new(responses: Vec<Value>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
        }
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete_structured<T>(&self, _messages: &[Message]) -> Result<T>
    where
        T: DeserializeOwned + schemars::JsonSchema + Send,
    {
        let next = self
            .responses
            .lock()
            .expect("script poisoned")
            .pop_front()
            .ok_or(MemoriaError::Llm(LlmError::EmptyResponse))?;
        Ok(serde_json::from_value(next)?)
    }
}

/// Embeds text onto a fixed two-axis space keyed by its first word, so fact
/// similarity is controlled entirely by how the scripts phrase facts.
struct KeywordEmbedder;

fn keyword_vector(text: &str) -> Vec<f32> {
    match text.split_whitespace().next().unwrap_or("") {
        "employment" => vec![1.0, 0.0],
        "residence" => vec![0.0, 1.0],
        _ => vec![0.6, 0.8],
    }
}

#[async_trait]
impl EmbedderClient for KeywordEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(keyword_vector(text))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| keyword_vector(t)).collect())
    }

    fn dim(&self) -> usize {
        2
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn engine(
    script: Vec<Value>,
    storage: Arc<MemoryStorage>,
) -> MemoryGraph<ScriptedLlm, KeywordEmbedder, MemoryStorage> {
    MemoryGraph::new(
        Arc::new(ScriptedLlm::new(script)),
        Arc::new(KeywordEmbedder),
        storage,
        Duration::from_secs(5),
    )
}

fn at(date: &str) -> DateTime<Utc> {
    date.parse().expect("timestamp")
}

/// Script for one episode mentioning `person` and `other`, asserting a
/// single fact between them.
fn one_fact_script(person: &str, other: &str, relation: &str, fact: &str) -> Vec<Value> {
    vec![
        json!({"extractedEntities": [
            {"name": person, "entityTypeId": 0},
            {"name": other, "entityTypeId": 0},
        ]}),
        json!({"missedEntities": []}),
        json!({"edges": [{
            "relationType": relation,
            "sourceEntityId": 0,
            "targetEntityId": 1,
            "fact": fact,
            "validAt": null,
            "invalidAt": null,
        }]}),
        json!({"missingFacts": []}),
        json!({"summary": format!("{person} summary.")}),
        json!({"summary": format!("{other} summary.")}),
    ]
}

async fn ingest(
    memory: &MemoryGraph<ScriptedLlm, KeywordEmbedder, MemoryStorage>,
    name: &str,
    content: &str,
    reference_time: DateTime<Utc>,
) -> IngestionOutcome {
    let mut params = AddEpisodeParams::new(name, "tenant", content, "user chat message");
    params.reference_time = Some(reference_time);
    memory
        .add_episode(params)
        .await
        .expect("episode should be accepted")
        .outcome()
        .await
}

fn committed(outcome: IngestionOutcome) -> memoria::pipeline::CommitStats {
    match outcome {
        IngestionOutcome::Committed(stats) => stats,
        IngestionOutcome::Failed { stage, message } => {
            panic!("enrichment failed at {}: {}", stage.as_str(), message)
        }
    }
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_conversation_builds_graph_and_search_reads_it() {
    let storage = Arc::new(MemoryStorage::new());

    // First exchange: employer.
    let memory = engine(
        one_fact_script("Fernando", "Acme", "WORKS_AT", "employment Fernando at Acme"),
        Arc::clone(&storage),
    );
    let stats = committed(
        ingest(
            &memory,
            "intro",
            "I'm Fernando, I work at Acme.",
            at("2025-04-30T00:00:00Z"),
        )
        .await,
    );
    assert_eq!(stats.nodes_committed, 2);
    assert_eq!(stats.edges_created, 1);

    // Second exchange: residence.
    let memory = engine(
        one_fact_script("Fernando", "Lisbon", "LIVES_IN", "residence Fernando in Lisbon"),
        Arc::clone(&storage),
    );
    committed(
        ingest(
            &memory,
            "followup",
            "I live in Lisbon these days.",
            at("2025-05-01T00:00:00Z"),
        )
        .await,
    );

    // A work-related query ranks the employment fact first.
    let result = memory
        .search("employment details", "tenant", None)
        .await
        .expect("search");
    assert_eq!(result.facts.len(), 2);
    assert_eq!(result.facts[0].edge.fact, "employment Fernando at Acme");
    assert!(result.facts[0].score > result.facts[1].score);

    // Entities follow the facts in first-reference order.
    let names: Vec<&str> = result.entities.iter().map(|n| n.name.as_str()).collect();
    assert_eq!(names, vec!["Fernando", "Acme", "Lisbon"]);

    // History is chronological and the context carries every section.
    let contents: Vec<&str> = result.history.iter().map(|e| e.content.as_str()).collect();
    assert_eq!(
        contents,
        vec!["I'm Fernando, I work at Acme.", "I live in Lisbon these days."]
    );
    let context = result.context();
    assert!(context
        .contains("- employment Fernando at Acme (Date range: 2025-04-30T00:00:00Z - present)"));
    assert!(context.contains("- Name: Fernando"));
    assert!(context.contains("I live in Lisbon these days."));
}

#[tokio::test]
async fn test_employer_change_supersedes_old_fact() {
    let storage = Arc::new(MemoryStorage::new());

    let memory = engine(
        one_fact_script("Fernando", "Acme", "WORKS_AT", "employment Fernando at Acme"),
        Arc::clone(&storage),
    );
    committed(ingest(&memory, "intro", "I work at Acme.", at("2025-04-30T00:00:00Z")).await);

    // Same leading keyword, so the stub embedder reports the facts as
    // near-identical and the engine treats them as contradictory.
    let memory = engine(
        one_fact_script("Fernando", "Beta", "WORKS_AT", "employment Fernando at Beta"),
        Arc::clone(&storage),
    );
    let stats = committed(
        ingest(&memory, "job change", "I moved to Beta.", at("2025-06-01T00:00:00Z")).await,
    );
    assert_eq!(stats.edges_invalidated, 1);

    // Retrieval only sees the current employer.
    let result = memory
        .search("employment query", "tenant", None)
        .await
        .expect("search");
    assert_eq!(result.facts.len(), 1);
    assert_eq!(result.facts[0].edge.fact, "employment Fernando at Beta");

    // The superseded fact stays in the graph with a closed window.
    let graph = memory.graph("tenant").await.expect("graph");
    assert_eq!(graph.edge_count(), 2);
    let old = graph
        .edges()
        .iter()
        .find(|e| e.fact == "employment Fernando at Acme")
        .expect("superseded edge kept");
    let end = old.invalid_at.expect("closed window");
    assert!(end >= old.valid_at);
}

#[tokio::test]
async fn test_repeat_mention_reuses_node_across_episodes() {
    let storage = Arc::new(MemoryStorage::new());

    let memory = engine(
        one_fact_script("Fernando", "Acme", "WORKS_AT", "employment Fernando at Acme"),
        Arc::clone(&storage),
    );
    committed(ingest(&memory, "intro", "I work at Acme.", at("2025-04-30T00:00:00Z")).await);

    let graph = memory.graph("tenant").await.expect("graph");
    let fernando_uuid = graph
        .nodes()
        .find(|n| n.name == "Fernando")
        .expect("node")
        .uuid;

    // Second episode mentions only Fernando; no new facts.
    let script = vec![
        json!({"extractedEntities": [{"name": "Fernando", "entityTypeId": 0}]}),
        json!({"missedEntities": []}),
        json!({"edges": []}),
        json!({"missingFacts": []}),
        json!({"summary": "Fernando works at Acme as CEO."}),
    ];
    let memory = engine(script, Arc::clone(&storage));
    committed(ingest(&memory, "followup", "I'm the CEO there.", at("2025-05-01T00:00:00Z")).await);

    let graph = memory.graph("tenant").await.expect("graph");
    assert_eq!(graph.node_count(), 2);
    let fernando = graph
        .nodes()
        .find(|n| n.name == "Fernando")
        .expect("node survives");
    assert_eq!(fernando.uuid, fernando_uuid);
    assert_eq!(fernando.summary, "Fernando works at Acme as CEO.");
}

#[tokio::test]
async fn test_episode_upsert_keeps_identity() {
    let storage = Arc::new(MemoryStorage::new());
    let uuid = Uuid::new_v4();
    let no_entity_script = || {
        vec![
            json!({"extractedEntities": []}),
            json!({"missedEntities": []}),
        ]
    };

    let memory = engine(no_entity_script(), Arc::clone(&storage));
    let mut params = AddEpisodeParams::new("draft", "tenant", "first wording", "chat");
    params.uuid = Some(uuid);
    params.reference_time = Some(at("2025-04-30T00:00:00Z"));
    memory
        .add_episode(params)
        .await
        .expect("add")
        .outcome()
        .await;

    let memory = engine(no_entity_script(), Arc::clone(&storage));
    let mut params = AddEpisodeParams::new("final", "tenant", "second wording", "chat");
    params.uuid = Some(uuid);
    memory
        .add_episode(params)
        .await
        .expect("add")
        .outcome()
        .await;

    let episodes = storage
        .recent_episodes("tenant", 10)
        .await
        .expect("episodes");
    assert_eq!(episodes.len(), 1);
    assert_eq!(episodes[0].uuid, uuid);
    assert_eq!(episodes[0].content, "second wording");
    assert_eq!(episodes[0].created_at, at("2025-04-30T00:00:00Z"));
}

#[tokio::test]
async fn test_search_on_empty_tenant_is_explicitly_empty() {
    let storage = Arc::new(MemoryStorage::new());
    let memory = engine(vec![], storage);

    let result = memory
        .search("anything at all", "tenant", None)
        .await
        .expect("search");

    assert!(result.is_empty());
    let context = result.context();
    assert!(context.contains("<FACTS>"));
    assert!(context.contains("<ENTITIES>"));
    assert!(context.contains("<HISTORY>"));
}
