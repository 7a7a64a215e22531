use crate::models::{RankedCandidate, RankingOptions, VectorHit};
use std::collections::HashSet;

/// Lowercased maximal alphanumeric runs. Pure-vector retrieval misses exact
/// keyword matches (acronyms, reported numbers); these tokens feed the
/// lexical half of the hybrid score.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();

    for ch in text.chars() {
        if ch.is_ascii_alphanumeric() {
            current.push(ch.to_ascii_lowercase());
        } else if !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }

    tokens
}

/// |unique(query) ∩ unique(doc)| / |unique(query)|, zero when either side
/// has no tokens.
pub fn lexical_overlap(query_tokens: &[String], doc_text: &str) -> f64 {
    if query_tokens.is_empty() || doc_text.is_empty() {
        return 0.0;
    }

    let doc_tokens: HashSet<String> = tokenize(doc_text).into_iter().collect();
    if doc_tokens.is_empty() {
        return 0.0;
    }

    let unique_query: HashSet<&String> = query_tokens.iter().collect();
    let overlap = unique_query
        .iter()
        .filter(|token| doc_tokens.contains(**token))
        .count();

    overlap as f64 / unique_query.len() as f64
}

/// Re-scores vector hits with the combined relevance score and re-orders
/// them descending. The sort is stable, so ties keep the candidates'
/// original (distance) order; recomputation over the same inputs yields the
/// same order.
pub fn rank(query: &str, hits: &[VectorHit], options: &RankingOptions) -> Vec<RankedCandidate> {
    let query_tokens = tokenize(query);

    let mut ranked: Vec<RankedCandidate> = hits
        .iter()
        .map(|hit| {
            let vector_similarity = match hit.distance {
                Some(distance) => 1.0 / (1.0 + distance),
                None => 0.0,
            };
            let lexical = lexical_overlap(&query_tokens, &hit.chunk.text);

            RankedCandidate {
                score: options.vector_weight * vector_similarity
                    + options.lexical_weight * lexical,
                vector_similarity,
                lexical_overlap: lexical,
                chunk: hit.chunk.clone(),
            }
        })
        .collect();

    ranked.sort_by(|left, right| right.score.total_cmp(&left.score));
    ranked
}
