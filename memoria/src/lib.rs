//! # memoria
//!
//! A temporal knowledge-graph memory engine for conversational agents.
//! Episodes enter as raw messages, documents, or JSON records; an LLM oracle
//! extracts entities and facts from them; the engine resolves entities against
//! the existing graph, invalidates contradicted facts, and serves
//! embedding-ranked retrieval over what remains.
//!
//! ## Design
//!
//! - **Temporal facts**: every relation carries a validity window; newer
//!   contradicting facts close older ones instead of deleting them
//! - **Incremental ingestion**: episodes integrate one at a time, enriched in
//!   the background against a short window of conversation history
//! - **Exact-name resolution**: entity mentions merge into existing nodes by
//!   `(group_id, name)`, so a tenant's graph never grows duplicate entities
//! - **Embedding-ranked retrieval**: facts are scored by cosine similarity
//!   and rendered into an agent-ready context block

pub mod edges;
pub mod errors;
pub mod nodes;
pub mod types;

pub mod embedder;
pub mod llm_client;

pub mod extraction;
pub mod prompts;
pub mod resolution;
pub mod temporal;

pub mod graph;
pub mod search;
pub mod storage;

pub mod pipeline;
pub mod utils;

pub use errors::{MemoriaError, Result};
pub use pipeline::MemoryGraph;
