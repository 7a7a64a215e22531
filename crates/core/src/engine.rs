use crate::chunking::{section_chunks, PageWindows};
use crate::citations::{anchors, snippet};
use crate::embeddings::{embed_or_zero, Embedder};
use crate::error::{AskError, IngestError};
use crate::extractor::{detect_sections, PdfExtractor};
use crate::fetch::DocumentSource;
use crate::index::{build_index, VectorIndex};
use crate::llm::{answer_prompt, lookup_prompt, CompletionModel};
use crate::models::{AnswerResult, Chunk, DocumentInfo, EngineOptions};
use crate::ranking::rank;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tracing::{info, warn};

/// Load lifecycle for the one current document. All fields live behind a
/// single lock; the generation counter makes completions of superseded
/// ingestion tasks detectable without comparing source strings.
#[derive(Debug, Default)]
struct LoadState {
    generation: u64,
    current_source: Option<String>,
    loading: bool,
    document: Option<DocumentInfo>,
}

/// The answering engine: owns the background load state machine, the
/// swap-on-rebuild vector index handle, and the ask/lookup query paths.
///
/// Cloning is cheap and shares state, so one engine can serve a route layer
/// and its own background ingestion tasks.
pub struct AnswerEngine<S, E, L> {
    inner: Arc<Inner<S, E, L>>,
}

impl<S, E, L> Clone for AnswerEngine<S, E, L> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<S, E, L> {
    source: S,
    extractor: Box<dyn PdfExtractor + Send + Sync>,
    embedder: E,
    model: L,
    options: EngineOptions,
    state: Mutex<LoadState>,
    index: RwLock<Arc<VectorIndex>>,
}

impl<S, E, L> AnswerEngine<S, E, L>
where
    S: DocumentSource + 'static,
    E: Embedder + 'static,
    L: CompletionModel + 'static,
{
    pub fn new(
        source: S,
        extractor: Box<dyn PdfExtractor + Send + Sync>,
        embedder: E,
        model: L,
        options: EngineOptions,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                source,
                extractor,
                embedder,
                model,
                options,
                state: Mutex::new(LoadState::default()),
                index: RwLock::new(Arc::new(VectorIndex::empty())),
            }),
        }
    }

    /// Fire-and-forget load: returns immediately and ingests in the
    /// background. Re-requesting the current source is a no-op, whether the
    /// load is still in flight or already done; a request for a different
    /// source supersedes any in-flight one. Must be called from within a
    /// tokio runtime.
    pub fn ensure_loaded(&self, source_ref: &str) {
        let generation = {
            let mut state = self.inner.lock_state();
            if state.current_source.as_deref() == Some(source_ref) {
                return;
            }
            state.generation += 1;
            state.current_source = Some(source_ref.to_string());
            state.loading = true;
            state.generation
        };

        info!(source = source_ref, generation, "background load started");
        let inner = Arc::clone(&self.inner);
        let source_ref = source_ref.to_string();
        tokio::spawn(async move {
            let outcome = inner.ingest(&source_ref).await;
            inner.finish_load(generation, &source_ref, outcome);
        });
    }

    /// Synchronous replacement for explicit user-driven reloads: ingests
    /// inline and reports failure to the caller instead of degrading
    /// silently.
    pub async fn update_and_reload(&self, source_ref: &str) -> Result<DocumentInfo, IngestError> {
        let generation = {
            let mut state = self.inner.lock_state();
            state.generation += 1;
            state.current_source = Some(source_ref.to_string());
            state.loading = true;
            state.generation
        };

        match self.inner.ingest(source_ref).await {
            Ok((index, document)) => {
                let mut state = self.inner.lock_state();
                if state.generation != generation {
                    return Err(IngestError::Superseded(source_ref.to_string()));
                }
                state.loading = false;
                self.inner.install_index(index);
                state.document = Some(document.clone());
                info!(source = source_ref, chunks = document.chunk_count, "document reloaded");
                Ok(document)
            }
            Err(error) => {
                let mut state = self.inner.lock_state();
                if state.generation == generation {
                    state.loading = false;
                }
                Err(error)
            }
        }
    }

    pub fn is_loading(&self) -> bool {
        self.inner.lock_state().loading
    }

    /// The most recently requested source, which may still be loading or may
    /// have failed; `document_info` describes what is actually queryable.
    pub fn current_source(&self) -> Option<String> {
        self.inner.lock_state().current_source.clone()
    }

    pub fn document_info(&self) -> Option<DocumentInfo> {
        self.inner.lock_state().document.clone()
    }

    /// Snapshot of the currently installed index. The snapshot is immutable;
    /// a concurrent rebuild swaps the handle without touching it.
    pub fn current_index(&self) -> Arc<VectorIndex> {
        Arc::clone(&self.inner.index.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Answers a question from the loaded document, citing the top-ranked
    /// chunk's page. Never blocks on ingestion: it reads whatever index is
    /// currently installed, and an empty or non-matching index produces the
    /// fixed "not found" answer rather than an error.
    pub async fn ask(&self, question: &str) -> Result<AnswerResult, AskError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(AskError::EmptyQuery);
        }

        let index = self.current_index();
        let query_vector = embed_or_zero(&self.inner.embedder, question).await;
        let hits = index.search(&query_vector, self.inner.options.ranking.candidate_pool);

        let ranked = rank(question, &hits, &self.inner.options.ranking);
        let Some(top) = ranked.first() else {
            return Ok(self.inner.not_found_answer());
        };

        let context_len = ranked.len().min(self.inner.options.ranking.context_chunks);
        let prompt = answer_prompt(question, &ranked[..context_len]);
        let text = self.inner.model.complete(&prompt).await?;

        Ok(AnswerResult {
            text,
            page: top.chunk.page,
            snippet: Some(snippet(&top.chunk.text, self.inner.options.anchors.snippet_chars)),
            anchors: anchors(&top.chunk.text, &self.inner.options.anchors),
        })
    }

    /// Explains a highlighted term from its single best-matching passage.
    pub async fn lookup(&self, term: &str) -> Result<String, AskError> {
        let term = term.trim();
        if term.is_empty() {
            return Err(AskError::EmptyQuery);
        }

        let index = self.current_index();
        let query_vector = embed_or_zero(&self.inner.embedder, term).await;
        let hits = index.search(&query_vector, 1);

        let Some(hit) = hits.first() else {
            return Ok(format!(
                "No relevant passage found for '{term}'. Try a more specific phrase."
            ));
        };

        let prompt = lookup_prompt(term, &hit.chunk.text);
        Ok(self.inner.model.complete(&prompt).await?)
    }
}

impl<S, E, L> Inner<S, E, L>
where
    S: DocumentSource,
    E: Embedder,
    L: CompletionModel,
{
    fn lock_state(&self) -> MutexGuard<'_, LoadState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn install_index(&self, index: Arc<VectorIndex>) {
        *self.index.write().unwrap_or_else(PoisonError::into_inner) = index;
    }

    fn not_found_answer(&self) -> AnswerResult {
        AnswerResult {
            text: self.options.not_found_answer.clone(),
            page: None,
            snippet: None,
            anchors: Vec::new(),
        }
    }

    /// Applies a finished background ingestion. A completion whose
    /// generation no longer matches belongs to a superseded request and is
    /// discarded without touching state; on failure the previously installed
    /// index stays queryable.
    fn finish_load(
        &self,
        generation: u64,
        source_ref: &str,
        outcome: Result<(Arc<VectorIndex>, DocumentInfo), IngestError>,
    ) {
        let mut state = self.lock_state();
        if state.generation != generation {
            info!(source = source_ref, "discarding stale ingestion result");
            return;
        }

        state.loading = false;
        match outcome {
            Ok((index, document)) => {
                info!(source = source_ref, chunks = document.chunk_count, "document index installed");
                self.install_index(index);
                state.document = Some(document);
            }
            Err(error) => {
                warn!(source = source_ref, %error, "background load failed, keeping previous index");
            }
        }
    }

    /// Fetch → extract pages → window into chunks → embed → fresh index.
    /// A document from which no page text can be recovered falls back to
    /// section-based chunks; if that is also empty the index is rebuilt
    /// empty and queries degrade to "not found".
    async fn ingest(
        &self,
        source_ref: &str,
    ) -> Result<(Arc<VectorIndex>, DocumentInfo), IngestError> {
        let local_path = self.source.fetch(source_ref).await?;
        let file_name = local_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());

        let pages = match self.extractor.extract_pages(&local_path) {
            Ok(pages) => pages,
            Err(error) => {
                warn!(source = source_ref, %error, "page extraction failed");
                Vec::new()
            }
        };
        let page_count = pages.len();

        let mut chunks: Vec<Chunk> =
            PageWindows::new(file_name.clone(), pages, self.options.chunking).collect();
        if chunks.is_empty() {
            chunks = self.section_fallback(&local_path, &file_name);
        }
        if chunks.is_empty() {
            warn!(source = source_ref, "no text recovered, index will be empty");
        }

        let checksum = digest_document(&local_path).await?;
        let index = build_index(chunks, &self.embedder).await;

        let document = DocumentInfo {
            source_id: source_ref.to_string(),
            file_name,
            local_path,
            checksum,
            page_count,
            chunk_count: index.len(),
            loaded_at: Utc::now(),
        };

        Ok((Arc::new(index), document))
    }

    fn section_fallback(&self, path: &Path, file_name: &str) -> Vec<Chunk> {
        let text = match self.extractor.extract_full_text(path) {
            Ok(text) => text,
            Err(error) => {
                warn!(%error, "section fallback extraction failed");
                return Vec::new();
            }
        };
        if text.trim().is_empty() {
            return Vec::new();
        }

        match detect_sections(&text) {
            Ok(sections) => {
                let chunks = section_chunks(&sections, file_name);
                info!(sections = chunks.len(), "using section-based fallback chunks");
                chunks
            }
            Err(error) => {
                warn!(%error, "section detection failed");
                Vec::new()
            }
        }
    }
}

async fn digest_document(path: &Path) -> Result<String, IngestError> {
    let bytes = tokio::fs::read(path).await?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashEmbedder;
    use crate::error::CompletionError;
    use crate::extractor::PageText;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    struct RoutingSource {
        routes: HashMap<String, (Duration, PathBuf)>,
        fetches: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl DocumentSource for RoutingSource {
        async fn fetch(&self, source_ref: &str) -> Result<PathBuf, IngestError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            match self.routes.get(source_ref) {
                Some((delay, path)) => {
                    tokio::time::sleep(*delay).await;
                    Ok(path.clone())
                }
                None => Err(IngestError::Fetch(format!("unknown source {source_ref}"))),
            }
        }
    }

    struct PagesByFile {
        pages: HashMap<String, Vec<PageText>>,
    }

    impl PdfExtractor for PagesByFile {
        fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError> {
            let name = path
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or_default();
            Ok(self.pages.get(name).cloned().unwrap_or_default())
        }
    }

    struct RecordingCompletion {
        reply: String,
        last_prompt: Mutex<Option<String>>,
    }

    impl RecordingCompletion {
        fn new(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                last_prompt: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl CompletionModel for RecordingCompletion {
        async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
            *self.last_prompt.lock().unwrap() = Some(prompt.to_string());
            Ok(self.reply.clone())
        }
    }

    struct TestHarness {
        _dir: TempDir,
        fetches: Arc<AtomicUsize>,
        engine: AnswerEngine<RoutingSource, HashEmbedder, Arc<RecordingCompletion>>,
        completion: Arc<RecordingCompletion>,
    }

    #[async_trait]
    impl CompletionModel for Arc<RecordingCompletion> {
        async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
            self.as_ref().complete(prompt).await
        }
    }

    fn paper_pages() -> Vec<PageText> {
        vec![
            PageText {
                number: 1,
                text: "Backpropagation is a method for training neural networks by \
                       propagating gradients backward through the layers."
                    .to_string(),
            },
            PageText {
                number: 2,
                text: "Results show 92% accuracy on the held-out benchmark, well above \
                       the strongest baseline."
                    .to_string(),
            },
        ]
    }

    /// Engine over two fake documents: "a" resolves slowly to alpha.pdf,
    /// "b" quickly to bravo.pdf; anything else fails to fetch.
    fn harness(reply: &str) -> TestHarness {
        let dir = TempDir::new().unwrap();
        let alpha = dir.path().join("alpha.pdf");
        let bravo = dir.path().join("bravo.pdf");
        std::fs::write(&alpha, b"%PDF-alpha").unwrap();
        std::fs::write(&bravo, b"%PDF-bravo").unwrap();

        let fetches = Arc::new(AtomicUsize::new(0));
        let source = RoutingSource {
            routes: HashMap::from([
                ("a".to_string(), (Duration::from_millis(150), alpha)),
                ("b".to_string(), (Duration::from_millis(10), bravo)),
            ]),
            fetches: Arc::clone(&fetches),
        };

        let extractor = PagesByFile {
            pages: HashMap::from([
                ("alpha.pdf".to_string(), paper_pages()),
                (
                    "bravo.pdf".to_string(),
                    vec![PageText {
                        number: 1,
                        text: "Entirely different replacement vocabulary throughout."
                            .to_string(),
                    }],
                ),
            ]),
        };

        let completion = Arc::new(RecordingCompletion::new(reply));
        let engine = AnswerEngine::new(
            source,
            Box::new(extractor),
            HashEmbedder::default(),
            Arc::clone(&completion),
            EngineOptions::default(),
        );

        TestHarness {
            _dir: dir,
            fetches,
            engine,
            completion,
        }
    }

    async fn wait_until_idle<S, E, L>(engine: &AnswerEngine<S, E, L>)
    where
        S: DocumentSource + 'static,
        E: Embedder + 'static,
        L: CompletionModel + 'static,
    {
        for _ in 0..400 {
            if !engine.is_loading() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("engine never finished loading");
    }

    #[tokio::test]
    async fn repeated_requests_for_the_same_source_ingest_once() {
        let harness = harness("ok");

        harness.engine.ensure_loaded("b");
        harness.engine.ensure_loaded("b");
        wait_until_idle(&harness.engine).await;
        harness.engine.ensure_loaded("b");
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(harness.fetches.load(Ordering::SeqCst), 1);
        assert_eq!(harness.engine.current_source().as_deref(), Some("b"));
        assert!(harness.engine.document_info().is_some());
    }

    #[tokio::test]
    async fn stale_completion_does_not_stomp_a_newer_load() {
        let harness = harness("ok");

        harness.engine.ensure_loaded("a");
        tokio::time::sleep(Duration::from_millis(20)).await;
        harness.engine.ensure_loaded("b");

        // Long enough for both the fast "b" ingest and the slow, superseded
        // "a" ingest to complete.
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert!(!harness.engine.is_loading());
        assert_eq!(harness.engine.current_source().as_deref(), Some("b"));
        let document = harness.engine.document_info().unwrap();
        assert_eq!(document.file_name, "bravo.pdf");
        assert_eq!(harness.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_background_load_keeps_the_previous_index() {
        let harness = harness("grounded answer");

        harness.engine.update_and_reload("a").await.unwrap();
        harness.engine.ensure_loaded("missing");
        wait_until_idle(&harness.engine).await;

        assert_eq!(harness.engine.current_source().as_deref(), Some("missing"));
        // The installed document and index still belong to "a".
        let document = harness.engine.document_info().unwrap();
        assert_eq!(document.file_name, "alpha.pdf");

        let answer = harness.engine.ask("what accuracy is reported?").await.unwrap();
        assert_eq!(answer.page, Some(2));
    }

    #[tokio::test]
    async fn synchronous_reload_surfaces_fetch_errors() {
        let harness = harness("ok");

        let result = harness.engine.update_and_reload("missing").await;
        assert!(matches!(result, Err(IngestError::Fetch(_))));
        assert!(!harness.engine.is_loading());
    }

    #[tokio::test]
    async fn ask_against_an_empty_index_returns_the_not_found_answer() {
        let harness = harness("should never be called");

        let answer = harness.engine.ask("anything at all?").await.unwrap();
        assert_eq!(answer.text, EngineOptions::default().not_found_answer);
        assert_eq!(answer.page, None);
        assert!(answer.snippet.is_none());
        assert!(answer.anchors.is_empty());
        assert!(harness.completion.last_prompt.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn answers_cite_the_top_ranked_page() {
        let harness = harness("The model reaches 92% accuracy.");

        harness.engine.update_and_reload("a").await.unwrap();
        let answer = harness.engine.ask("accuracy").await.unwrap();

        assert_eq!(answer.text, "The model reaches 92% accuracy.");
        assert_eq!(answer.page, Some(2));
        let snippet = answer.snippet.unwrap();
        assert!(snippet.starts_with("Results show 92%"));
        assert!(snippet.chars().count() <= 220);
        assert!(!answer.anchors.is_empty() && answer.anchors.len() <= 6);

        let prompt = harness.completion.last_prompt.lock().unwrap().clone().unwrap();
        assert!(prompt.contains("[Page 2]"));
        assert!(prompt.contains("Question: accuracy"));
    }

    #[tokio::test]
    async fn lookup_grounds_on_the_single_best_passage() {
        let harness = harness("**Operational Context** ...");

        harness.engine.update_and_reload("a").await.unwrap();
        let explanation = harness.engine.lookup("backpropagation").await.unwrap();
        assert_eq!(explanation, "**Operational Context** ...");

        let prompt = harness.completion.last_prompt.lock().unwrap().clone().unwrap();
        assert!(prompt.contains("'backpropagation'"));
        assert!(prompt.contains("propagating gradients backward"));
    }

    #[tokio::test]
    async fn lookup_without_an_index_returns_the_fallback_text() {
        let harness = harness("unused");

        let explanation = harness.engine.lookup("entropy").await.unwrap();
        assert!(explanation.contains("No relevant passage found for 'entropy'"));
    }

    #[tokio::test]
    async fn queries_observe_all_old_or_all_new_chunks_during_rebuilds() {
        let harness = harness("ok");
        harness.engine.update_and_reload("a").await.unwrap();

        let reader = {
            let engine = harness.engine.clone();
            tokio::spawn(async move {
                let embedder = HashEmbedder::default();
                let query = embedder.embed("replacement accuracy").await.unwrap();
                for _ in 0..50 {
                    let index = engine.current_index();
                    let hits = index.search(&query, 12);
                    if let Some(first) = hits.first() {
                        assert!(
                            hits.iter().all(|hit| hit.chunk.source == first.chunk.source),
                            "observed chunks from two different rebuilds"
                        );
                    }
                    tokio::time::sleep(Duration::from_millis(2)).await;
                }
            })
        };

        for source in ["b", "a", "b"] {
            harness.engine.update_and_reload(source).await.unwrap();
        }
        reader.await.unwrap();
    }

    #[tokio::test]
    async fn unextractable_documents_degrade_to_an_empty_index() {
        let dir = TempDir::new().unwrap();
        let blank = dir.path().join("blank.pdf");
        std::fs::write(&blank, b"%PDF-blank").unwrap();

        let source = RoutingSource {
            routes: HashMap::from([(
                "blank".to_string(),
                (Duration::from_millis(1), blank),
            )]),
            fetches: Arc::new(AtomicUsize::new(0)),
        };
        let extractor = PagesByFile {
            pages: HashMap::new(),
        };
        let engine = AnswerEngine::new(
            source,
            Box::new(extractor),
            HashEmbedder::default(),
            Arc::new(RecordingCompletion::new("unused")),
            EngineOptions::default(),
        );

        let document = engine.update_and_reload("blank").await.unwrap();
        assert_eq!(document.chunk_count, 0);

        let answer = engine.ask("anything?").await.unwrap();
        assert_eq!(answer.page, None);
        assert_eq!(answer.text, EngineOptions::default().not_found_answer);
    }
}
