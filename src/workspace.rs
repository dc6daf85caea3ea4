//! One workspace, fully wired.
//!
//! [`Workspace`] canonicalizes the root once and owns one instance of every
//! engine: sandbox, crawler, keyword search, semantic index, test runner and
//! static analyzer. The CLI, the tool registry and the HTTP server all go
//! through it. Nothing here is global; two workspaces in one process share no
//! state.

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;

use crate::config::Config;
use crate::crawler::ProjectContext;
use crate::embedding::{create_provider, EmbeddingProvider};
use crate::error::CoreResult;
use crate::files;
use crate::index::{IndexManager, DEFAULT_TOP_K};
use crate::keyword::{KeywordQuery, KeywordSearch};
use crate::llm::{create_completion, CompletionProvider};
use crate::models::{
    AnalysisResult, ContextSnapshot, DirListing, ExecutionResult, FileView, IndexStatus,
    SearchHit, SemanticOutcome,
};
use crate::process::ProcessRunner;
use crate::sandbox::Sandbox;
use crate::static_analysis::StaticAnalyzer;
use crate::test_runner::TestRunner;

pub struct Workspace {
    config: Config,
    sandbox: Sandbox,
    context: ProjectContext,
    keyword: KeywordSearch,
    index: IndexManager,
    tests: TestRunner,
    analyzer: StaticAnalyzer,
}

impl Workspace {
    /// Open with providers built from `config` and the environment. Missing
    /// credentials leave the matching feature degraded, never an error.
    pub fn open(config: Config) -> Result<Self> {
        let embedder = create_provider(&config.embedding).map_err(|e| {
            tracing::debug!(error = %e, "embedding provider unavailable");
            e.to_string()
        });
        let completer = match create_completion(&config.completion) {
            Ok(completer) => Some(completer),
            Err(e) => {
                tracing::debug!(error = %e, "completion provider unavailable");
                None
            }
        };
        Self::with_providers(config, embedder, completer)
    }

    /// Open with explicitly supplied providers. `embedder` is either a
    /// provider or the reason semantic search is unavailable.
    pub fn with_providers(
        config: Config,
        embedder: Result<Arc<dyn EmbeddingProvider>, String>,
        completer: Option<Arc<dyn CompletionProvider>>,
    ) -> Result<Self> {
        config.validate()?;
        let sandbox = Sandbox::new(&config.workspace.root)?;
        let root = sandbox.root().to_path_buf();
        let ws = &config.workspace;

        let runner = ProcessRunner::new(&root, config.execution.serialize_runs);

        let workspace = Self {
            context: ProjectContext::new(&root, ws.max_walk_entries),
            keyword: KeywordSearch::new(&root, ws.max_walk_entries, ws.max_search_hits),
            index: IndexManager::new(&root, ws, &config.embedding, embedder, completer.clone()),
            tests: TestRunner::new(
                sandbox.clone(),
                config.tools.clone(),
                config.execution.clone(),
                runner.clone(),
                completer,
            ),
            analyzer: StaticAnalyzer::new(
                sandbox.clone(),
                config.tools.clone(),
                config.execution.clone(),
                runner,
            ),
            sandbox,
            config,
        };
        tracing::info!(root = %workspace.root().display(), "workspace opened");
        Ok(workspace)
    }

    pub fn root(&self) -> &Path {
        self.sandbox.root()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sandbox(&self) -> &Sandbox {
        &self.sandbox
    }

    // ============ Files ============

    pub fn list_dir(&self, path: &str) -> CoreResult<DirListing> {
        files::list_dir(&self.sandbox, path)
    }

    pub fn read_file(&self, path: &str) -> CoreResult<FileView> {
        files::read_file(&self.sandbox, path)
    }

    // ============ Search ============

    pub async fn search_keyword(&self, query: KeywordQuery) -> CoreResult<Vec<SearchHit>> {
        self.keyword.search(query).await
    }

    pub async fn search_semantic(&self, query: &str, top_k: Option<usize>) -> SemanticOutcome {
        self.index
            .query(query, top_k.unwrap_or(DEFAULT_TOP_K))
            .await
    }

    pub fn index_status(&self) -> IndexStatus {
        self.index.status()
    }

    pub async fn rebuild_index(&self) -> IndexStatus {
        self.index.rebuild().await
    }

    // ============ Execution ============

    pub async fn run_tests(
        &self,
        path: &str,
        framework: &str,
        timeout_secs: Option<u64>,
    ) -> CoreResult<ExecutionResult> {
        self.tests.run(path, framework, timeout_secs).await
    }

    pub async fn analyze(
        &self,
        path: &str,
        tool: &str,
        timeout_secs: Option<u64>,
    ) -> CoreResult<AnalysisResult> {
        self.analyzer.analyze(path, tool, timeout_secs).await
    }

    // ============ Project context ============

    /// Cached snapshot; `refresh` forces a new crawl first.
    pub async fn project_context(&self, refresh: bool) -> Result<Arc<ContextSnapshot>> {
        if refresh {
            self.context.refresh().await
        } else {
            self.context.snapshot().await
        }
    }

    pub async fn project_summary(&self) -> Result<String> {
        self.context.summary().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_open_requires_existing_root() {
        let tmp = TempDir::new().unwrap();
        let config = Config::minimal(tmp.path().join("missing"));
        assert!(Workspace::open(config).is_err());
    }

    #[test]
    fn test_open_rejects_invalid_config() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::minimal(tmp.path());
        config.workspace.index_dir = "../escape".into();
        assert!(Workspace::open(config).is_err());
    }

    #[tokio::test]
    async fn test_workspaces_do_not_share_state() {
        let a = TempDir::new().unwrap();
        let b = TempDir::new().unwrap();
        fs::write(a.path().join("a.py"), "import os\n").unwrap();
        fs::write(b.path().join("b.py"), "import sys\n").unwrap();

        let wa = Workspace::open(Config::minimal(a.path())).unwrap();
        let wb = Workspace::open(Config::minimal(b.path())).unwrap();
        assert_eq!(wa.project_context(false).await.unwrap().files, vec!["a.py"]);
        assert_eq!(wb.project_context(false).await.unwrap().files, vec!["b.py"]);
    }

    #[tokio::test]
    async fn test_semantic_without_provider_is_advisory() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.py"), "x = 1\n").unwrap();
        let ws = Workspace::open(Config::minimal(tmp.path())).unwrap();
        assert!(matches!(
            ws.search_semantic("anything", None).await,
            SemanticOutcome::Advisory { .. }
        ));
        assert!(matches!(ws.index_status(), IndexStatus::Unavailable { .. }));
    }
}
