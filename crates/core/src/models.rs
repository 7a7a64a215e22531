use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// A bounded window of document text, the unit of retrieval.
///
/// `page` is `None` for chunks produced by the coarse section fallback,
/// where no per-page provenance exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub text: String,
    pub page: Option<u32>,
    pub source: String,
    pub sequence_index: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub source_id: String,
    pub file_name: String,
    pub local_path: PathBuf,
    pub checksum: String,
    pub page_count: usize,
    pub chunk_count: usize,
    pub loaded_at: DateTime<Utc>,
}

/// The response to one question. `page == None` means no relevant passage
/// was found; the route layer serializes this as-is.
#[derive(Debug, Clone, Serialize)]
pub struct AnswerResult {
    pub text: String,
    pub page: Option<u32>,
    pub snippet: Option<String>,
    pub anchors: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct VectorHit {
    pub chunk: Chunk,
    pub distance: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct RankedCandidate {
    pub score: f64,
    pub vector_similarity: f64,
    pub lexical_overlap: f64,
    pub chunk: Chunk,
}

#[derive(Debug, Clone, Copy)]
pub struct ChunkingOptions {
    pub chunk_chars: usize,
    pub overlap_chars: usize,
    /// A non-final window whose trimmed length falls below this is merged
    /// backward instead of being emitted.
    pub min_trailing_chars: usize,
}

impl Default for ChunkingOptions {
    fn default() -> Self {
        Self {
            chunk_chars: 900,
            overlap_chars: 150,
            min_trailing_chars: 40,
        }
    }
}

/// Weights and pool sizes for hybrid ranking. The 0.65/0.35 mix is a stable
/// default, not a learned value.
#[derive(Debug, Clone, Copy)]
pub struct RankingOptions {
    pub vector_weight: f64,
    pub lexical_weight: f64,
    /// Candidates pulled from the vector index before re-ranking.
    pub candidate_pool: usize,
    /// Top candidates concatenated into the grounding prompt.
    pub context_chunks: usize,
}

impl Default for RankingOptions {
    fn default() -> Self {
        Self {
            vector_weight: 0.65,
            lexical_weight: 0.35,
            candidate_pool: 12,
            context_chunks: 4,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AnchorOptions {
    pub snippet_chars: usize,
    pub max_anchors: usize,
    pub min_token_chars: usize,
    pub window: usize,
}

impl Default for AnchorOptions {
    fn default() -> Self {
        Self {
            snippet_chars: 220,
            max_anchors: 6,
            min_token_chars: 3,
            window: 3,
        }
    }
}

/// Bounded-attempt retry for the external embedding and completion calls.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(400),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub chunking: ChunkingOptions,
    pub ranking: RankingOptions,
    pub anchors: AnchorOptions,
    pub not_found_answer: String,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            chunking: ChunkingOptions::default(),
            ranking: RankingOptions::default(),
            anchors: AnchorOptions::default(),
            not_found_answer: "Sorry, I couldn't find that in the document.".to_string(),
        }
    }
}
