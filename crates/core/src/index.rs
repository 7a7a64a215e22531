use crate::embeddings::{embed_or_zero, Embedder};
use crate::models::{Chunk, VectorHit};

/// The queryable collection of chunks and embeddings for exactly one
/// document. Immutable once built; a reload builds a fresh index and the
/// engine swaps the shared handle, so concurrent readers always observe a
/// fully-old or fully-new collection.
#[derive(Debug, Default)]
pub struct VectorIndex {
    entries: Vec<IndexedChunk>,
}

#[derive(Debug, Clone)]
struct IndexedChunk {
    chunk: Chunk,
    embedding: Vec<f32>,
}

impl VectorIndex {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Nearest neighbors by Euclidean distance. An empty index returns an
    /// empty result set, never an error.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<VectorHit> {
        if self.entries.is_empty() || k == 0 {
            return Vec::new();
        }

        let mut scored: Vec<(f64, &IndexedChunk)> = self
            .entries
            .iter()
            .map(|entry| (euclidean_distance(query, &entry.embedding), entry))
            .collect();
        scored.sort_by(|left, right| left.0.total_cmp(&right.0));

        scored
            .into_iter()
            .take(k)
            .map(|(distance, entry)| VectorHit {
                chunk: entry.chunk.clone(),
                distance: Some(distance),
            })
            .collect()
    }
}

/// Embeds every chunk and assembles the collection. Embedding failures are
/// downgraded to zero vectors per chunk, so a build always succeeds.
pub async fn build_index<E: Embedder + ?Sized>(chunks: Vec<Chunk>, embedder: &E) -> VectorIndex {
    let mut entries = Vec::with_capacity(chunks.len());

    for chunk in chunks {
        let embedding = embed_or_zero(embedder, &chunk.text).await;
        entries.push(IndexedChunk { chunk, embedding });
    }

    tracing::debug!(chunks = entries.len(), "vector index built");
    VectorIndex { entries }
}

fn euclidean_distance(left: &[f32], right: &[f32]) -> f64 {
    left.iter()
        .zip(right.iter())
        .map(|(a, b)| {
            let diff = (*a - *b) as f64;
            diff * diff
        })
        .sum::<f64>()
        .sqrt()
}
