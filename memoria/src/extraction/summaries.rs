//! Entity summary rewrites.

use std::time::Duration;

use futures::future::try_join_all;
use tracing::debug;

use crate::errors::{MemoriaError, Result};
use crate::llm_client::{complete_bounded, LlmClient};
use crate::nodes::{EntityNode, EpisodicNode};
use crate::prompts;

use super::UpdatedSummary;

/// Rewrite every node's summary to fold in what `episode` says about it.
///
/// The rewrites run concurrently; any single failure fails the batch, so a
/// partially summarized working set is never committed.
pub async fn refresh_summaries<L>(
    llm: &L,
    limit: Duration,
    episode: &EpisodicNode,
    history: &[EpisodicNode],
    nodes: &mut [EntityNode],
) -> Result<()>
where
    L: LlmClient + ?Sized,
{
    let rewrites = nodes.iter().map(|node| {
        let messages = prompts::entity_summary(node, episode, history);
        async move {
            let messages = messages?;
            let response: UpdatedSummary =
                complete_bounded(llm, limit, "entity summary", &messages).await?;
            Ok::<_, MemoriaError>(response.summary)
        }
    });

    let summaries = try_join_all(rewrites).await?;
    for (node, summary) in nodes.iter_mut().zip(summaries) {
        node.summary = summary;
    }
    debug!(count = nodes.len(), "entity summaries refreshed");
    Ok(())
}
