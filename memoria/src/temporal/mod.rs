//! Temporal contradiction resolution.
//!
//! Explicit fact validity comes out of extraction (`valid_at` defaults to the
//! episode reference time, `invalid_at` stays unset for currently-true facts).
//! This module handles the other half: when a new fact is semantically close
//! to a stored fact that is still open, the stored fact is superseded;
//! newest wins on semantic collision.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::edges::EntityEdge;
use crate::utils::cosine_similarity;

/// Cosine similarity above which two facts are treated as contradictory.
pub const CONTRADICTION_THRESHOLD: f32 = 0.7;

/// Result of contradiction resolution for one ingestion batch.
#[derive(Debug, Clone)]
pub struct ContradictionOutcome {
    /// Edges to persist: every new edge, plus each previously stored edge
    /// whose validity this batch closed. Untouched stored edges are omitted.
    pub edges: Vec<EntityEdge>,
    /// Number of facts this batch invalidated.
    pub invalidated: usize,
}

/// Apply newest-wins contradiction invalidation.
///
/// Each new fact is compared, in batch order, against every currently-valid
/// fact in the working set; a similarity above [`CONTRADICTION_THRESHOLD`]
/// closes the older fact at `now` (clamped so the interval never ends before
/// it starts). The new fact then joins the working set, so later facts in the
/// same batch can supersede earlier ones. Facts without an embedding on
/// either side are never considered contradictory.
///
/// Only currently-valid facts are candidates, so an `invalid_at` that was set
/// explicitly, by extraction or by an earlier pass, is never overwritten.
pub fn resolve_contradictions(
    existing: Vec<EntityEdge>,
    new_edges: Vec<EntityEdge>,
    now: DateTime<Utc>,
) -> ContradictionOutcome {
    let mut invalidated = 0usize;

    // Working set entries are (edge, needs-save). Stored edges start clean;
    // new edges always need saving.
    let mut working: Vec<(EntityEdge, bool)> =
        existing.into_iter().map(|edge| (edge, false)).collect();

    for incoming in new_edges {
        if let Some(query) = incoming.fact_embedding.as_deref() {
            for (edge, dirty) in working.iter_mut() {
                if !edge.is_currently_valid() {
                    continue;
                }
                let Some(candidate) = edge.fact_embedding.as_deref() else {
                    continue;
                };

                let score = cosine_similarity(query, candidate);
                if score > CONTRADICTION_THRESHOLD {
                    debug!(
                        superseded = %edge.fact,
                        by = %incoming.fact,
                        score,
                        "invalidating contradicted fact"
                    );
                    edge.invalidate(now);
                    *dirty = true;
                    invalidated += 1;
                }
            }
        }
        working.push((incoming, true));
    }

    let edges = working
        .into_iter()
        .filter_map(|(edge, dirty)| dirty.then_some(edge))
        .collect();

    ContradictionOutcome { edges, invalidated }
}
