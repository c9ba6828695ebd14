//! Prompt templates for oracle interactions.
//!
//! Each submodule builds the message list for one extraction stage.
//! Structured context (entity types, resolved entities) is rendered into the
//! prompt as pretty-printed JSON so the oracle sees the same ids it must echo
//! back in its response.

pub mod extract_edges;
pub mod extract_nodes;
pub mod summarize;

pub use extract_edges::{edge_extraction, fact_reflexion};
pub use extract_nodes::{entity_extraction, entity_reflexion};
pub use summarize::entity_summary;

use crate::nodes::EpisodicNode;

/// Render episode history as one content line per episode, oldest first.
fn join_contents(history: &[EpisodicNode]) -> String {
    history
        .iter()
        .map(|ep| ep.content.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}
