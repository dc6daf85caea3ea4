//! Semantic index manager.
//!
//! Owns the lifecycle of the vector index over workspace documents:
//!
//! | State | Meaning |
//! |-------|---------|
//! | `Unloaded` | nothing attempted yet |
//! | `Unavailable(reason)` | no provider, no documents, or the build failed |
//! | `Ready(index)` | loaded from disk or freshly built; shared by queries |
//!
//! The first access resolves `Unloaded` exactly once, under an async mutex,
//! so concurrent callers wait for the in-flight build instead of starting
//! their own. Resolution tries the persisted SQLite file first and falls back
//! to scanning, chunking, and embedding the workspace. Only
//! [`IndexManager::rebuild`] resolves again.
//!
//! Queries never fail: an unusable index yields an advisory message.

use anyhow::{bail, Context, Result};
use sqlx::{Row, SqlitePool};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError};
use tokio::sync::Mutex;

use crate::chunk::{chunk_text, content_hash};
use crate::config::{EmbeddingConfig, WorkspaceConfig};
use crate::db;
use crate::embedding::{blob_to_vec, cosine_similarity, embed_one, vec_to_blob, EmbeddingProvider};
use crate::llm::{synthesize_answer, CompletionProvider};
use crate::migrate;
use crate::models::{IndexStatus, Passage, SemanticAnswer, SemanticOutcome};
use crate::scan::scan_documents;

/// File name of the index database inside `workspace.index_dir`.
pub const INDEX_FILE: &str = "index.sqlite";

pub const DEFAULT_TOP_K: usize = 5;

#[derive(Debug, Clone)]
pub struct IndexedDocument {
    pub path: String,
    pub hash: String,
    pub chunk_count: usize,
}

#[derive(Debug, Clone)]
struct IndexedChunk {
    id: String,
    file: String,
    chunk_index: i64,
    text: String,
    hash: String,
    vector: Vec<f32>,
}

/// In-memory vector index. Ranking is brute-force cosine similarity.
#[derive(Debug)]
pub struct SemanticIndex {
    model: String,
    dims: usize,
    documents: Vec<IndexedDocument>,
    chunks: Vec<IndexedChunk>,
}

impl SemanticIndex {
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Top `top_k` chunks by similarity to `query`, best first.
    pub fn rank(&self, query: &[f32], top_k: usize) -> Vec<Passage> {
        let mut scored: Vec<(f32, &IndexedChunk)> = self
            .chunks
            .iter()
            .map(|c| (cosine_similarity(query, &c.vector), c))
            .collect();
        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.1.file.cmp(&b.1.file))
                .then_with(|| a.1.chunk_index.cmp(&b.1.chunk_index))
        });
        scored
            .into_iter()
            .take(top_k)
            .map(|(score, c)| Passage {
                file: c.file.clone(),
                chunk_index: c.chunk_index,
                score,
                text: c.text.clone(),
            })
            .collect()
    }
}

enum IndexState {
    Unloaded,
    Unavailable(String),
    Ready(Arc<SemanticIndex>),
}

pub struct IndexManager {
    root: PathBuf,
    index_path: PathBuf,
    embedding: EmbeddingConfig,
    max_entries: usize,
    embedder: Result<Arc<dyn EmbeddingProvider>, String>,
    completer: Option<Arc<dyn CompletionProvider>>,
    state: Mutex<IndexState>,
    /// Set while a load or build runs under `state`.
    resolving: AtomicBool,
    /// Last settled state, readable while `state` is held by a query.
    published: std::sync::Mutex<IndexStatus>,
}

/// Clears the resolving flag even when the resolving future is dropped.
struct ResolvingGuard<'a>(&'a AtomicBool);

impl Drop for ResolvingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl IndexManager {
    /// `embedder` carries either the provider or the reason there is none.
    pub fn new(
        root: &Path,
        workspace: &WorkspaceConfig,
        embedding: &EmbeddingConfig,
        embedder: Result<Arc<dyn EmbeddingProvider>, String>,
        completer: Option<Arc<dyn CompletionProvider>>,
    ) -> Self {
        Self {
            root: root.to_path_buf(),
            index_path: root.join(&workspace.index_dir).join(INDEX_FILE),
            embedding: embedding.clone(),
            max_entries: workspace.max_walk_entries,
            embedder,
            completer,
            state: Mutex::new(IndexState::Unloaded),
            resolving: AtomicBool::new(false),
            published: std::sync::Mutex::new(IndexStatus::Unloaded),
        }
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    /// Resolve the index on first use and return it, or the reason it is
    /// unavailable.
    pub async fn get_index(&self) -> Result<Arc<SemanticIndex>, String> {
        let mut state = self.state.lock().await;
        if matches!(*state, IndexState::Unloaded) {
            self.transition(&mut state, false).await;
        }
        match &*state {
            IndexState::Ready(index) => Ok(index.clone()),
            IndexState::Unavailable(reason) => Err(reason.clone()),
            IndexState::Unloaded => Err("semantic index was not resolved".to_string()),
        }
    }

    pub async fn query(&self, text: &str, top_k: usize) -> SemanticOutcome {
        let index = match self.get_index().await {
            Ok(index) => index,
            Err(reason) => {
                tracing::debug!(%reason, "semantic query against unavailable index");
                return SemanticOutcome::Advisory {
                    message: self.advisory(),
                };
            }
        };
        let provider = match &self.embedder {
            Ok(provider) => provider.clone(),
            Err(_) => {
                return SemanticOutcome::Advisory {
                    message: self.advisory(),
                }
            }
        };

        let query_vec = match embed_one(provider.as_ref(), text).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "query embedding failed");
                return SemanticOutcome::Advisory {
                    message: format!("Semantic search error: {}", e),
                };
            }
        };

        let passages = index.rank(&query_vec, top_k.max(1));
        let response = match &self.completer {
            Some(completer) if !passages.is_empty() => {
                match synthesize_answer(completer.as_ref(), text, &passages).await {
                    Ok(answer) => Some(answer),
                    Err(e) => {
                        tracing::warn!(error = %e, "answer synthesis failed; returning passages only");
                        None
                    }
                }
            }
            _ => None,
        };

        SemanticOutcome::Answer(SemanticAnswer { passages, response })
    }

    /// Current state without triggering resolution. Never waits on a
    /// running load, build or query.
    pub fn status(&self) -> IndexStatus {
        if self.resolving.load(Ordering::SeqCst) {
            return IndexStatus::Building;
        }
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Discard the current index and build a fresh one from the workspace,
    /// ignoring any persisted copy.
    pub async fn rebuild(&self) -> IndexStatus {
        let mut state = self.state.lock().await;
        self.transition(&mut state, true).await;
        describe(&state)
    }

    /// Deterministic explanation returned in place of results.
    pub fn advisory(&self) -> String {
        let exts: Vec<String> = self
            .embedding
            .extensions
            .iter()
            .map(|e| format!(".{}", e.trim_start_matches('.')))
            .collect();
        format!(
            "Semantic search is unavailable. Please ensure:\n\
             - OPENAI_API_KEY is set correctly (or another embedding provider is configured)\n\
             - The workspace contains supported files ({})\n\
             - Index creation succeeded (check `devassist index status`).",
            exts.join(", ")
        )
    }

    /// Resolve into `state` (whose lock the caller holds) and publish the
    /// outcome before the resolving flag drops.
    async fn transition(&self, state: &mut IndexState, skip_load: bool) {
        self.resolving.store(true, Ordering::SeqCst);
        let _guard = ResolvingGuard(&self.resolving);
        *state = self.resolve(skip_load).await;
        *self
            .published
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = describe(state);
    }

    async fn resolve(&self, skip_load: bool) -> IndexState {
        let provider = match &self.embedder {
            Ok(provider) => provider.clone(),
            Err(reason) => {
                tracing::warn!(%reason, "semantic search disabled");
                return IndexState::Unavailable(reason.clone());
            }
        };

        if !skip_load && self.index_path.exists() {
            match load_index(&self.index_path, provider.model_name(), provider.dims()).await {
                Ok(index) => {
                    tracing::info!(
                        chunks = index.chunk_count(),
                        documents = index.document_count(),
                        "semantic index loaded"
                    );
                    return IndexState::Ready(Arc::new(index));
                }
                Err(e) => {
                    tracing::warn!(error = %format!("{:#}", e), "persisted index unusable; rebuilding");
                }
            }
        }

        match self.build(provider.as_ref()).await {
            Ok(Some(index)) => {
                if let Err(e) = persist_index(&self.index_path, &index).await {
                    tracing::warn!(error = %format!("{:#}", e), "failed to persist semantic index");
                }
                tracing::info!(
                    chunks = index.chunk_count(),
                    documents = index.document_count(),
                    "semantic index built"
                );
                IndexState::Ready(Arc::new(index))
            }
            Ok(None) => IndexState::Unavailable(format!(
                "no documents with extensions [{}] found for indexing",
                self.embedding.extensions.join(", ")
            )),
            Err(e) => {
                tracing::warn!(error = %format!("{:#}", e), "semantic index creation failed");
                IndexState::Unavailable(format!("index creation failed: {:#}", e))
            }
        }
    }

    async fn build(&self, provider: &dyn EmbeddingProvider) -> Result<Option<SemanticIndex>> {
        let root = self.root.clone();
        let extensions = self.embedding.extensions.clone();
        let max_entries = self.max_entries;
        let sources =
            tokio::task::spawn_blocking(move || scan_documents(&root, &extensions, max_entries))
                .await??;
        if sources.is_empty() {
            return Ok(None);
        }

        let mut documents = Vec::with_capacity(sources.len());
        let mut pending = Vec::new();
        for source in &sources {
            let chunks = chunk_text(&source.path, &source.body, self.embedding.max_tokens);
            documents.push(IndexedDocument {
                path: source.path.clone(),
                hash: content_hash(&source.body),
                chunk_count: chunks.len(),
            });
            pending.extend(chunks);
        }
        if pending.is_empty() {
            return Ok(None);
        }

        let mut chunks = Vec::with_capacity(pending.len());
        for batch in pending.chunks(self.embedding.batch_size.max(1)) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = provider.embed(&texts).await?;
            if vectors.len() != texts.len() {
                bail!(
                    "provider returned {} vectors for {} inputs",
                    vectors.len(),
                    texts.len()
                );
            }
            for (chunk, vector) in batch.iter().zip(vectors) {
                chunks.push(IndexedChunk {
                    id: chunk.id.clone(),
                    file: chunk.document_path.clone(),
                    chunk_index: chunk.chunk_index,
                    text: chunk.text.clone(),
                    hash: chunk.hash.clone(),
                    vector,
                });
            }
        }

        Ok(Some(SemanticIndex {
            model: provider.model_name().to_string(),
            dims: provider.dims(),
            documents,
            chunks,
        }))
    }
}

fn describe(state: &IndexState) -> IndexStatus {
    match state {
        IndexState::Unloaded => IndexStatus::Unloaded,
        IndexState::Unavailable(reason) => IndexStatus::Unavailable {
            reason: reason.clone(),
        },
        IndexState::Ready(index) => IndexStatus::Ready {
            model: index.model.clone(),
            documents: index.document_count(),
            chunks: index.chunk_count(),
        },
    }
}

// ============ Persistence ============

async fn load_index(path: &Path, model: &str, dims: usize) -> Result<SemanticIndex> {
    let pool = db::connect(path, false).await?;
    let result = read_index(&pool, model, dims).await;
    pool.close().await;
    result
}

async fn read_index(pool: &SqlitePool, model: &str, dims: usize) -> Result<SemanticIndex> {
    let stored_model: Option<String> =
        sqlx::query_scalar("SELECT value FROM index_meta WHERE key = 'model'")
            .fetch_optional(pool)
            .await?;
    match stored_model {
        Some(stored) if stored == model => {}
        Some(stored) => bail!("index built with model '{}', configured '{}'", stored, model),
        None => bail!("index has no model metadata"),
    }

    let documents = sqlx::query("SELECT path, hash, chunk_count FROM documents ORDER BY path")
        .fetch_all(pool)
        .await?
        .iter()
        .map(|row| IndexedDocument {
            path: row.get("path"),
            hash: row.get("hash"),
            chunk_count: row.get::<i64, _>("chunk_count") as usize,
        })
        .collect::<Vec<_>>();

    let rows = sqlx::query(
        r#"
        SELECT c.id, c.document_path, c.chunk_index, c.text, c.hash, cv.embedding
        FROM chunks c
        JOIN chunk_vectors cv ON cv.chunk_id = c.id
        ORDER BY c.document_path, c.chunk_index
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut chunks = Vec::with_capacity(rows.len());
    for row in &rows {
        let blob: Vec<u8> = row.get("embedding");
        let vector = blob_to_vec(&blob);
        if vector.len() != dims {
            bail!(
                "stored vector has {} dimensions, expected {}",
                vector.len(),
                dims
            );
        }
        chunks.push(IndexedChunk {
            id: row.get("id"),
            file: row.get("document_path"),
            chunk_index: row.get("chunk_index"),
            text: row.get("text"),
            hash: row.get("hash"),
            vector,
        });
    }

    if documents.is_empty() || chunks.is_empty() {
        bail!("persisted index is empty");
    }

    Ok(SemanticIndex {
        model: model.to_string(),
        dims,
        documents,
        chunks,
    })
}

async fn persist_index(path: &Path, index: &SemanticIndex) -> Result<()> {
    remove_index_files(path)?;
    let pool = db::connect(path, true).await?;
    let result = write_index(&pool, index).await;
    pool.close().await;
    result
}

async fn write_index(pool: &SqlitePool, index: &SemanticIndex) -> Result<()> {
    migrate::run_migrations(pool).await?;
    let mut tx = pool.begin().await?;

    let meta = [
        ("model", index.model.clone()),
        ("dims", index.dims.to_string()),
        ("built_at", chrono::Utc::now().to_rfc3339()),
    ];
    for (key, value) in meta {
        sqlx::query("INSERT INTO index_meta (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await?;
    }

    for doc in &index.documents {
        sqlx::query("INSERT INTO documents (path, hash, chunk_count) VALUES (?, ?, ?)")
            .bind(&doc.path)
            .bind(&doc.hash)
            .bind(doc.chunk_count as i64)
            .execute(&mut *tx)
            .await?;
    }

    for chunk in &index.chunks {
        sqlx::query(
            "INSERT INTO chunks (id, document_path, chunk_index, text, hash) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&chunk.id)
        .bind(&chunk.file)
        .bind(chunk.chunk_index)
        .bind(&chunk.text)
        .bind(&chunk.hash)
        .execute(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO chunk_vectors (chunk_id, dims, embedding) VALUES (?, ?, ?)")
            .bind(&chunk.id)
            .bind(chunk.vector.len() as i64)
            .bind(vec_to_blob(&chunk.vector))
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Delete the database file and its WAL companions.
fn remove_index_files(path: &Path) -> Result<()> {
    for suffix in ["", "-wal", "-shm"] {
        let mut name = OsString::from(path.as_os_str());
        name.push(suffix);
        let file = PathBuf::from(name);
        if file.exists() {
            std::fs::remove_file(&file)
                .with_context(|| format!("Failed to remove {}", file.display()))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::llm::ChatMessage;
    use async_trait::async_trait;
    use std::fs;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::Semaphore;

    const VOCAB: [&str; 3] = ["apple", "banana", "cherry"];

    /// Bag-of-words embedder over a three-word vocabulary.
    struct FakeEmbedder {
        model: String,
        texts_embedded: AtomicUsize,
        fail: bool,
    }

    impl FakeEmbedder {
        fn new(model: &str) -> Arc<Self> {
            Arc::new(Self {
                model: model.to_string(),
                texts_embedded: AtomicUsize::new(0),
                fail: false,
            })
        }

        fn embedded(&self) -> usize {
            self.texts_embedded.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl EmbeddingProvider for FakeEmbedder {
        fn model_name(&self) -> &str {
            &self.model
        }

        fn dims(&self) -> usize {
            VOCAB.len()
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            tokio::time::sleep(Duration::from_millis(20)).await;
            if self.fail {
                bail!("provider exploded");
            }
            self.texts_embedded.fetch_add(texts.len(), Ordering::SeqCst);
            Ok(texts
                .iter()
                .map(|t| {
                    let lower = t.to_lowercase();
                    VOCAB
                        .iter()
                        .map(|w| lower.matches(w).count() as f32)
                        .collect()
                })
                .collect())
        }
    }

    /// Embeds only as far as the gate lets it.
    struct GatedEmbedder {
        inner: Arc<FakeEmbedder>,
        gate: Arc<Semaphore>,
    }

    #[async_trait]
    impl EmbeddingProvider for GatedEmbedder {
        fn model_name(&self) -> &str {
            self.inner.model_name()
        }

        fn dims(&self) -> usize {
            self.inner.dims()
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.gate.acquire().await?.forget();
            self.inner.embed(texts).await
        }
    }

    struct FixedAnswer;

    #[async_trait]
    impl CompletionProvider for FixedAnswer {
        fn model_name(&self) -> &str {
            "fixed"
        }

        async fn complete(&self, _messages: &[ChatMessage], _temperature: f32) -> Result<String> {
            Ok("bananas live in b.md".into())
        }
    }

    fn workspace() -> TempDir {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.py"), "apple apple\n").unwrap();
        fs::write(tmp.path().join("b.md"), "banana split\n").unwrap();
        fs::write(tmp.path().join("c.ts"), "cherry pie\n").unwrap();
        fs::write(tmp.path().join("ignored.txt"), "banana banana\n").unwrap();
        tmp
    }

    fn manager(
        root: &Path,
        embedder: Result<Arc<dyn EmbeddingProvider>, String>,
        completer: Option<Arc<dyn CompletionProvider>>,
    ) -> IndexManager {
        let config = Config::minimal(root);
        IndexManager::new(
            root,
            &config.workspace,
            &config.embedding,
            embedder,
            completer,
        )
    }

    fn top_file(outcome: &SemanticOutcome) -> String {
        match outcome {
            SemanticOutcome::Answer(answer) => answer.passages[0].file.clone(),
            SemanticOutcome::Advisory { message } => panic!("unexpected advisory: {}", message),
        }
    }

    #[tokio::test]
    async fn test_no_provider_gives_advisory() {
        let tmp = workspace();
        let mgr = manager(tmp.path(), Err("OPENAI_API_KEY environment variable not set".into()), None);
        assert_eq!(mgr.status(), IndexStatus::Unloaded);

        match mgr.query("banana", 5).await {
            SemanticOutcome::Advisory { message } => {
                assert!(message.starts_with("Semantic search is unavailable."));
                assert!(message.contains(".py, .js, .ts, .md"));
            }
            other => panic!("expected advisory, got {:?}", other),
        }
        assert!(matches!(mgr.status(), IndexStatus::Unavailable { .. }));
        assert!(!mgr.index_path().exists());
    }

    #[tokio::test]
    async fn test_no_documents_unavailable() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("notes.txt"), "banana\n").unwrap();
        let embedder = FakeEmbedder::new("fake");
        let mgr = manager(tmp.path(), Ok(embedder.clone()), None);

        assert!(matches!(mgr.query("banana", 5).await, SemanticOutcome::Advisory { .. }));
        match mgr.status() {
            IndexStatus::Unavailable { reason } => assert!(reason.contains("no documents")),
            other => panic!("unexpected status {:?}", other),
        }
        assert_eq!(embedder.embedded(), 0);
    }

    #[tokio::test]
    async fn test_build_failure_unavailable() {
        let tmp = workspace();
        let embedder = Arc::new(FakeEmbedder {
            model: "fake".into(),
            texts_embedded: AtomicUsize::new(0),
            fail: true,
        });
        let mgr = manager(tmp.path(), Ok(embedder), None);
        assert!(mgr.get_index().await.unwrap_err().contains("provider exploded"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_queries_build_once() {
        let tmp = workspace();
        let embedder = FakeEmbedder::new("fake");
        let mgr = Arc::new(manager(tmp.path(), Ok(embedder.clone()), None));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let mgr = mgr.clone();
            handles.push(tokio::spawn(async move { mgr.query("banana", 2).await }));
        }
        for handle in handles {
            assert_eq!(top_file(&handle.await.unwrap()), "b.md");
        }

        // three document chunks, then one embedding per query
        assert_eq!(embedder.embedded(), 3 + 8);
        assert_eq!(
            mgr.status(),
            IndexStatus::Ready {
                model: "fake".into(),
                documents: 3,
                chunks: 3
            }
        );
    }

    #[tokio::test]
    async fn test_status_reports_building_during_resolution() {
        let tmp = workspace();
        let gate = Arc::new(Semaphore::new(0));
        let embedder = Arc::new(GatedEmbedder {
            inner: FakeEmbedder::new("fake"),
            gate: gate.clone(),
        });
        let mgr = Arc::new(manager(tmp.path(), Ok(embedder), None));

        let task = {
            let mgr = mgr.clone();
            tokio::spawn(async move { mgr.get_index().await.map(|_| ()) })
        };
        let mut seen = mgr.status();
        for _ in 0..200 {
            if seen == IndexStatus::Building {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
            seen = mgr.status();
        }
        assert_eq!(seen, IndexStatus::Building);

        gate.add_permits(100);
        task.await.unwrap().unwrap();
        assert!(matches!(mgr.status(), IndexStatus::Ready { documents: 3, .. }));
    }

    #[tokio::test]
    async fn test_ready_status_while_state_lock_held() {
        let tmp = workspace();
        let mgr = manager(tmp.path(), Ok(FakeEmbedder::new("fake")), None);
        mgr.get_index().await.unwrap();

        let _held = mgr.state.lock().await;
        assert_eq!(
            mgr.status(),
            IndexStatus::Ready {
                model: "fake".into(),
                documents: 3,
                chunks: 3
            }
        );
    }

    #[tokio::test]
    async fn test_loads_persisted_index() {
        let tmp = workspace();
        let first = FakeEmbedder::new("fake");
        let mgr = manager(tmp.path(), Ok(first.clone()), None);
        mgr.get_index().await.unwrap();
        assert!(mgr.index_path().exists());
        assert!(mgr.index_path().starts_with(tmp.path().join(".devassist_index")));

        let second = FakeEmbedder::new("fake");
        let mgr = manager(tmp.path(), Ok(second.clone()), None);
        assert_eq!(top_file(&mgr.query("cherry", 1).await), "c.ts");
        assert_eq!(second.embedded(), 1);
    }

    #[tokio::test]
    async fn test_model_change_rebuilds() {
        let tmp = workspace();
        let mgr = manager(tmp.path(), Ok(FakeEmbedder::new("fake")), None);
        mgr.get_index().await.unwrap();

        let other = FakeEmbedder::new("other-model");
        let mgr = manager(tmp.path(), Ok(other.clone()), None);
        mgr.get_index().await.unwrap();
        assert_eq!(other.embedded(), 3);
    }

    #[tokio::test]
    async fn test_corrupt_index_file_rebuilds() {
        let tmp = workspace();
        let embedder = FakeEmbedder::new("fake");
        let mgr = manager(tmp.path(), Ok(embedder.clone()), None);
        fs::create_dir_all(mgr.index_path().parent().unwrap()).unwrap();
        fs::write(mgr.index_path(), b"definitely not sqlite").unwrap();

        assert_eq!(top_file(&mgr.query("apple", 1).await), "a.py");
        assert_eq!(embedder.embedded(), 3 + 1);
    }

    #[tokio::test]
    async fn test_rebuild_picks_up_new_files() {
        let tmp = workspace();
        let mgr = manager(tmp.path(), Ok(FakeEmbedder::new("fake")), None);
        mgr.get_index().await.unwrap();

        fs::write(tmp.path().join("d.md"), "apple banana cherry\n").unwrap();
        match mgr.status() {
            IndexStatus::Ready { documents, .. } => assert_eq!(documents, 3),
            other => panic!("unexpected status {:?}", other),
        }
        match mgr.rebuild().await {
            IndexStatus::Ready { documents, .. } => assert_eq!(documents, 4),
            other => panic!("unexpected status {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_completion_synthesizes_response() {
        let tmp = workspace();
        let mgr = manager(
            tmp.path(),
            Ok(FakeEmbedder::new("fake")),
            Some(Arc::new(FixedAnswer)),
        );
        match mgr.query("banana", 5).await {
            SemanticOutcome::Answer(answer) => {
                assert_eq!(answer.passages.len(), 3);
                assert_eq!(answer.response.as_deref(), Some("bananas live in b.md"));
            }
            other => panic!("expected answer, got {:?}", other),
        }
    }
}
