//! Entity extraction and entity reflexion prompts.

use crate::errors::Result;
use crate::extraction::EntityTypeDescriptor;
use crate::llm_client::Message;
use crate::nodes::EpisodicNode;

use super::join_contents;

const EXTRACTION_SYSTEM: &str = "You are an AI assistant that extracts entity nodes from conversational messages. \
Your primary task is to extract and classify the speaker and other significant entities mentioned in the conversation.";

const REFLEXION_SYSTEM: &str =
    "You are an AI assistant that determines which entities have not been extracted from the given context";

/// Build the entity extraction request for `episode`.
///
/// `missed` carries names a previous reflexion probe reported as overlooked;
/// when non-empty an explicit reminder is appended to the prompt.
pub fn entity_extraction(
    episode: &EpisodicNode,
    history: &[EpisodicNode],
    entity_types: &[EntityTypeDescriptor],
    missed: &[String],
) -> Result<Vec<Message>> {
    let types_json = serde_json::to_string_pretty(entity_types)?;
    let previous = join_contents(history);

    let mut user = format!(
        r#"<ENTITY TYPES>
{types_json}
</ENTITY TYPES>

<PREVIOUS MESSAGES>
{previous}
</PREVIOUS MESSAGES>

<CURRENT MESSAGE>
{content}
</CURRENT MESSAGE>

Instructions:

You are given a conversation context and a CURRENT MESSAGE. Your task is to extract **entity nodes** mentioned **explicitly or implicitly** in the CURRENT MESSAGE.
Pronoun references such as he/she/they or this/that/those should be disambiguated to the names of the reference entities. Only extract distinct entities from the CURRENT MESSAGE. Don't extract pronouns like you, me, he/she/they, we/us as entities.

1. **Speaker Identification and Merging**:
   - First, identify the speaker of the CURRENT MESSAGE (e.g., the name before the colon).
   - If the message contains a role or classification for the speaker (e.g., "I am the CEO", "I am a client"), merge this information: extract **one single node** for the speaker with their name and the appropriate `entityTypeId`, instead of a separate node for "CEO" or "client".
     For example, if "Fernando" says "I am the CEO", extract one entity: {{ "name": "Fernando", "entityTypeId": 0 }}. The role relationship is captured separately as a fact.

2. **Entity Identification**:
   - Extract all other significant entities, concepts, or actors that are **explicitly or implicitly** mentioned in the CURRENT MESSAGE.
   - **Exclude** entities mentioned only in the PREVIOUS MESSAGES (they are for context only).

3. **Entity Classification**:
   - Use the descriptions in ENTITY TYPES to classify each extracted entity.
   - Assign the appropriate `entityTypeId` for each one.

4. **Exclusions**:
   - Do NOT extract entities representing relationships or actions; those are captured separately as facts.
   - Do NOT extract dates, times, or other temporal information.

5. **Formatting**:
   - Be **explicit and unambiguous** in naming entities (e.g., use full names when available).
"#,
        types_json = types_json,
        previous = previous,
        content = episode.content,
    );

    if !missed.is_empty() {
        user.push_str("\nMake sure that the following entities are extracted:\n");
        for name in missed {
            user.push_str("- ");
            user.push_str(name);
            user.push('\n');
        }
    }

    Ok(vec![Message::system(EXTRACTION_SYSTEM), Message::user(user)])
}

/// Build the reflexion probe asking which entities the extraction missed.
pub fn entity_reflexion(
    episode: &EpisodicNode,
    history: &[EpisodicNode],
    extracted_names: &[String],
) -> Vec<Message> {
    let previous = join_contents(history);
    let extracted = extracted_names.join("\n");

    let user = format!(
        r#"<PREVIOUS MESSAGES>
{previous}
</PREVIOUS MESSAGES>

<CURRENT MESSAGE>
{content}
</CURRENT MESSAGE>

<EXTRACTED ENTITIES>
{extracted}
</EXTRACTED ENTITIES>

Given the above previous messages, current message, and list of extracted entities; determine if any entities haven't been extracted."#,
        previous = previous,
        content = episode.content,
        extracted = extracted,
    );

    vec![Message::system(REFLEXION_SYSTEM), Message::user(user)]
}
