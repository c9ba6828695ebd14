//! Embedding-space scoring.

use ndarray::ArrayView1;

/// Cosine similarity of two vectors, in `[-1.0, 1.0]`.
///
/// Degenerate inputs (length mismatch, empty, or zero magnitude) score `0.0`
/// instead of erroring.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let (a, b) = (ArrayView1::from(a), ArrayView1::from(b));
    let denom = a.dot(&a).sqrt() * b.dot(&b).sqrt();
    if denom == 0.0 {
        0.0
    } else {
        a.dot(&b) / denom
    }
}

/// Rank candidates by cosine similarity to `query`, most similar first.
///
/// Returns `(input_index, score)` pairs. Candidates without an embedding
/// score `0.0`. The sort is stable, so equal scores keep input order.
pub fn rank_by_similarity<'a, I>(query: &[f32], candidates: I) -> Vec<(usize, f32)>
where
    I: IntoIterator<Item = Option<&'a [f32]>>,
{
    let mut scored: Vec<(usize, f32)> = candidates
        .into_iter()
        .enumerate()
        .map(|(i, embedding)| {
            let score = embedding
                .map(|e| cosine_similarity(query, e))
                .unwrap_or(0.0);
            (i, score)
        })
        .collect();

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored
}
