//! Entity summary rewrite prompt.

use serde::Serialize;

use crate::errors::Result;
use crate::llm_client::Message;
use crate::nodes::{EntityNode, EpisodicNode};

use super::join_contents;

const SUMMARY_SYSTEM: &str =
    "You are a helpful assistant that extracts entity summaries from the provided text.";

/// The slice of an entity the summary oracle sees: its name, the summary
/// accumulated so far, and its type labels.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EntityContext<'a> {
    name: &'a str,
    summary: &'a str,
    entity_type: &'a [String],
}

/// Build the request asking the oracle to fold `episode` into the entity's
/// running summary.
pub fn entity_summary(
    node: &EntityNode,
    episode: &EpisodicNode,
    history: &[EpisodicNode],
) -> Result<Vec<Message>> {
    let entity_json = serde_json::to_string_pretty(&EntityContext {
        name: &node.name,
        summary: &node.summary,
        entity_type: &node.labels,
    })?;
    let previous = join_contents(history);

    let user = format!(
        r#"<MESSAGES>
{previous}
{content}
</MESSAGES>

Given the above MESSAGES and the following ENTITY, update the summary that combines relevant information about the entity from the messages and relevant information from the existing summary.

Guidelines:
1. Do not hallucinate entity summary information if it cannot be found in the current context.
2. Only use the provided MESSAGES and ENTITY to set attribute values.
3. The summary attribute represents a summary of the ENTITY, and should be updated with new information about the Entity from the MESSAGES. Summaries must be no longer than 250 words.

<ENTITY>
{entity_json}
</ENTITY>"#,
        previous = previous,
        content = episode.content,
        entity_json = entity_json,
    );

    Ok(vec![Message::system(SUMMARY_SYSTEM), Message::user(user)])
}
