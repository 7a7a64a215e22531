pub mod chunking;
pub mod citations;
pub mod embeddings;
pub mod engine;
pub mod error;
pub mod extractor;
pub mod fetch;
pub mod index;
pub mod llm;
pub mod models;
pub mod ranking;
pub mod sweeper;

pub use chunking::{make_chunk_id, section_chunks, PageWindows};
pub use citations::{anchors, snippet};
pub use embeddings::{
    embed_or_zero, Embedder, EmbeddingServiceConfig, HashEmbedder, RemoteEmbedder,
    DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use engine::AnswerEngine;
pub use error::{AskError, CompletionError, EmbedError, IngestError};
pub use extractor::{detect_sections, LopdfExtractor, PageText, PdfExtractor, Section};
pub use fetch::{DocumentSource, HttpDocumentSource};
pub use index::{build_index, VectorIndex};
pub use llm::{
    answer_prompt, lookup_prompt, CompletionModel, CompletionServiceConfig, RemoteCompletionModel,
};
pub use models::{
    AnchorOptions, AnswerResult, Chunk, ChunkingOptions, DocumentInfo, EngineOptions,
    RankedCandidate, RankingOptions, RetryPolicy, VectorHit,
};
pub use ranking::{lexical_overlap, rank, tokenize};
