//! Maximal Marginal Relevance re-ranking.
//!
//! score = λ × relevance(query, doc) − (1 − λ) × max(similarity(doc, picked))
//!
//! λ = 1.0 is pure relevance, λ = 0.0 pure diversity.

/// A similarity candidate. `relevance` must use the same scale the caller
/// ranks by so that λ = 1 reproduces the similarity order.
#[derive(Debug, Clone)]
pub struct MmrCandidate<'a> {
    pub relevance: f32,
    pub vector: &'a [f32],
}

/// Pick up to `k` candidate positions in MMR order.
///
/// `candidates` must be sorted most relevant first; ties keep the earliest
/// candidate, so the result is stable with respect to the input order.
pub fn mmr_select(candidates: &[MmrCandidate<'_>], k: usize, lambda: f32) -> Vec<usize> {
    let k = k.min(candidates.len());
    let mut picked: Vec<usize> = Vec::with_capacity(k);
    let mut remaining: Vec<usize> = (0..candidates.len()).collect();

    while picked.len() < k {
        let mut best_pos = 0;
        let mut best_score = f32::NEG_INFINITY;
        for (pos, &idx) in remaining.iter().enumerate() {
            let candidate = &candidates[idx];
            let redundancy = picked
                .iter()
                .map(|&p| cosine_similarity(candidate.vector, candidates[p].vector))
                .fold(f32::NEG_INFINITY, f32::max);
            let redundancy = if picked.is_empty() { 0.0 } else { redundancy };
            let score = lambda * candidate.relevance - (1.0 - lambda) * redundancy;
            if score > best_score {
                best_score = score;
                best_pos = pos;
            }
        }
        picked.push(remaining.remove(best_pos));
    }
    picked
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut na = 0.0f32;
    let mut nb = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na.sqrt() * nb.sqrt())
}
