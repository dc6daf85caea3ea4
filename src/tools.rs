//! Tool registry exposed to agents.
//!
//! Every consumer-facing workspace operation is wrapped as a [`Tool`]: a
//! name, a one-line description, a JSON Schema for its parameters, and an
//! async `execute` taking JSON in and returning JSON out. The HTTP server
//! serves the registry (`GET /tools/list`, `POST /tools/{name}`); custom
//! tools can be registered next to the built-ins.
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │              ToolRegistry                │
//! │  files · search · index · exec · context │
//! └──────────────┬───────────────────────────┘
//!                ▼
//!          ToolContext → Workspace
//! ```
//!
//! Failures from the workspace keep their [`CoreError`] inside the returned
//! `anyhow::Error`, so callers can recover the error class by downcasting.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::error::CoreError;
use crate::keyword::KeywordQuery;
use crate::workspace::Workspace;

#[async_trait]
pub trait Tool: Send + Sync {
    /// Route name (`POST /tools/{name}`); lowercase with underscores.
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn is_builtin(&self) -> bool {
        false
    }

    /// JSON Schema (`type: object`) describing accepted parameters.
    fn parameters_schema(&self) -> Value;

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value>;
}

/// Handle to the workspace a tool runs against.
#[derive(Clone)]
pub struct ToolContext {
    workspace: Arc<Workspace>,
}

impl ToolContext {
    pub fn new(workspace: Arc<Workspace>) -> Self {
        Self { workspace }
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }
}

fn required_str<'a>(params: &'a Value, key: &str) -> Result<&'a str, CoreError> {
    match params.get(key).and_then(|v| v.as_str()) {
        Some(s) if !s.trim().is_empty() => Ok(s),
        _ => Err(CoreError::InvalidArgument(format!(
            "{} must be a non-empty string",
            key
        ))),
    }
}

fn optional_str<'a>(params: &'a Value, key: &str, default: &'a str) -> &'a str {
    params.get(key).and_then(|v| v.as_str()).unwrap_or(default)
}

fn optional_u64(params: &Value, key: &str) -> Option<u64> {
    params.get(key).and_then(|v| v.as_u64())
}

// ============ Files ============

pub struct ListFilesTool;

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &str {
        "list_files"
    }

    fn description(&self) -> &str {
        "List the entries of a workspace directory"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Workspace-relative directory", "default": "" }
            }
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let listing = ctx.workspace().list_dir(optional_str(&params, "path", ""))?;
        Ok(serde_json::to_value(listing)?)
    }
}

pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a workspace file with function, class, TODO and deprecation hints"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Workspace-relative file path" }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let view = ctx.workspace().read_file(required_str(&params, "path")?)?;
        Ok(serde_json::to_value(view)?)
    }
}

// ============ Search ============

pub struct SearchKeywordTool;

#[async_trait]
impl Tool for SearchKeywordTool {
    fn name(&self) -> &str {
        "search_keyword"
    }

    fn description(&self) -> &str {
        "Case-insensitive search across workspace files with surrounding context"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "keyword": { "type": "string", "description": "Term to find" },
                "file_pattern": { "type": "string", "description": "Glob on file names", "default": "*" },
                "context_lines": { "type": "integer", "minimum": 0, "default": 2 },
                "regex": { "type": "boolean", "description": "Treat keyword as a regular expression", "default": false }
            },
            "required": ["keyword"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let query = KeywordQuery {
            term: required_str(&params, "keyword")?.to_string(),
            file_pattern: optional_str(&params, "file_pattern", "*").to_string(),
            context_lines: optional_u64(&params, "context_lines").unwrap_or(2) as usize,
            regex: params.get("regex").and_then(|v| v.as_bool()).unwrap_or(false),
        };
        let hits = ctx.workspace().search_keyword(query).await?;
        Ok(json!({ "results": hits }))
    }
}

pub struct SearchSemanticTool;

#[async_trait]
impl Tool for SearchSemanticTool {
    fn name(&self) -> &str {
        "search_semantic"
    }

    fn description(&self) -> &str {
        "Find the workspace passages most similar in meaning to a query"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string" },
                "top_k": { "type": "integer", "minimum": 1, "default": 5 }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let query = required_str(&params, "query")?;
        let top_k = optional_u64(&params, "top_k").map(|k| k as usize);
        let outcome = ctx.workspace().search_semantic(query, top_k).await;
        Ok(serde_json::to_value(outcome)?)
    }
}

pub struct IndexStatusTool;

#[async_trait]
impl Tool for IndexStatusTool {
    fn name(&self) -> &str {
        "index_status"
    }

    fn description(&self) -> &str {
        "Report the semantic index state without building it"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _params: Value, ctx: &ToolContext) -> Result<Value> {
        Ok(serde_json::to_value(ctx.workspace().index_status())?)
    }
}

pub struct RebuildIndexTool;

#[async_trait]
impl Tool for RebuildIndexTool {
    fn name(&self) -> &str {
        "rebuild_index"
    }

    fn description(&self) -> &str {
        "Discard the semantic index and build it again from the workspace"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _params: Value, ctx: &ToolContext) -> Result<Value> {
        Ok(serde_json::to_value(ctx.workspace().rebuild_index().await)?)
    }
}

// ============ Execution ============

pub struct RunTestsTool;

#[async_trait]
impl Tool for RunTestsTool {
    fn name(&self) -> &str {
        "run_tests"
    }

    fn description(&self) -> &str {
        "Run pytest, jest or mocha on a workspace path and summarize the results"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Workspace-relative test file or directory" },
                "framework": { "type": "string", "enum": ["pytest", "jest", "mocha"], "default": "pytest" },
                "timeout_secs": { "type": "integer", "minimum": 1 }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let result = ctx
            .workspace()
            .run_tests(
                required_str(&params, "path")?,
                optional_str(&params, "framework", "pytest"),
                optional_u64(&params, "timeout_secs"),
            )
            .await?;
        Ok(serde_json::to_value(result)?)
    }
}

pub struct AnalyzeCodeTool;

#[async_trait]
impl Tool for AnalyzeCodeTool {
    fn name(&self) -> &str {
        "analyze_code"
    }

    fn description(&self) -> &str {
        "Run flake8, pylint or mypy on a workspace path"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string" },
                "tool": { "type": "string", "enum": ["flake8", "pylint", "mypy"], "default": "flake8" },
                "timeout_secs": { "type": "integer", "minimum": 1 }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let result = ctx
            .workspace()
            .analyze(
                required_str(&params, "path")?,
                optional_str(&params, "tool", "flake8"),
                optional_u64(&params, "timeout_secs"),
            )
            .await?;
        Ok(serde_json::to_value(result)?)
    }
}

// ============ Project context ============

pub struct ProjectContextTool;

#[async_trait]
impl Tool for ProjectContextTool {
    fn name(&self) -> &str {
        "project_context"
    }

    fn description(&self) -> &str {
        "Files, folders and per-file imports of the workspace"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "refresh": { "type": "boolean", "description": "Crawl again instead of using the cache", "default": false }
            }
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let refresh = params
            .get("refresh")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        let snapshot = ctx.workspace().project_context(refresh).await?;
        Ok(serde_json::to_value(&*snapshot)?)
    }
}

pub struct ProjectSummaryTool;

#[async_trait]
impl Tool for ProjectSummaryTool {
    fn name(&self) -> &str {
        "project_summary"
    }

    fn description(&self) -> &str {
        "Short text digest of the project structure and its key imports"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _params: Value, ctx: &ToolContext) -> Result<Value> {
        Ok(json!({ "summary": ctx.workspace().project_summary().await? }))
    }
}

// ============ Registry ============

pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(ListFilesTool));
        registry.register(Box::new(ReadFileTool));
        registry.register(Box::new(SearchKeywordTool));
        registry.register(Box::new(SearchSemanticTool));
        registry.register(Box::new(IndexStatusTool));
        registry.register(Box::new(RebuildIndexTool));
        registry.register(Box::new(RunTestsTool));
        registry.register(Box::new(AnalyzeCodeTool));
        registry.register(Box::new(ProjectContextTool));
        registry.register(Box::new(ProjectSummaryTool));
        registry
    }

    /// Later registrations with a taken name are ignored by [`find`](Self::find).
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.push(tool);
    }

    pub fn tools(&self) -> &[Box<dyn Tool>] {
        &self.tools
    }

    pub fn into_tools(self) -> Vec<Box<dyn Tool>> {
        self.tools
    }

    pub fn find(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::fs;
    use tempfile::TempDir;

    fn ctx() -> (TempDir, ToolContext) {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join("a.py"),
            "import os\n\ndef foo():\n    return os.sep\n",
        )
        .unwrap();
        let ws = Workspace::open(Config::minimal(tmp.path())).unwrap();
        (tmp, ToolContext::new(Arc::new(ws)))
    }

    #[test]
    fn test_builtins_registered() {
        let registry = ToolRegistry::with_builtins();
        assert_eq!(registry.len(), 10);
        for tool in registry.tools() {
            assert!(tool.is_builtin());
            assert_eq!(tool.parameters_schema()["type"], "object");
        }
        assert!(registry.find("run_tests").is_some());
        assert!(registry.find("nope").is_none());
        assert!(ToolRegistry::new().is_empty());
    }

    #[tokio::test]
    async fn test_read_file_tool() {
        let (_tmp, ctx) = ctx();
        let out = ReadFileTool
            .execute(json!({ "path": "a.py" }), &ctx)
            .await
            .unwrap();
        assert_eq!(out["analysis"]["functions"][0]["name"], "foo");
        assert_eq!(out["analysis"]["functions"][0]["line"], 3);
    }

    #[tokio::test]
    async fn test_missing_param_is_invalid_argument() {
        let (_tmp, ctx) = ctx();
        let err = ReadFileTool.execute(json!({}), &ctx).await.unwrap_err();
        let core = err.downcast_ref::<CoreError>().unwrap();
        assert_eq!(core.code(), "invalid_argument");
    }

    #[tokio::test]
    async fn test_sandbox_error_survives_downcast() {
        let (_tmp, ctx) = ctx();
        let err = ListFilesTool
            .execute(json!({ "path": "../.." }), &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.downcast_ref::<CoreError>().unwrap().code(), "access_denied");
    }

    #[tokio::test]
    async fn test_keyword_and_summary_tools() {
        let (_tmp, ctx) = ctx();
        let out = SearchKeywordTool
            .execute(json!({ "keyword": "RETURN", "context_lines": 0 }), &ctx)
            .await
            .unwrap();
        assert_eq!(out["results"][0]["line"], 4);

        let out = ProjectSummaryTool.execute(json!({}), &ctx).await.unwrap();
        assert!(out["summary"].as_str().unwrap().contains("- Key Imports: os"));
    }

    #[tokio::test]
    async fn test_semantic_tool_advisory() {
        let (_tmp, ctx) = ctx();
        let out = SearchSemanticTool
            .execute(json!({ "query": "where is foo" }), &ctx)
            .await
            .unwrap();
        assert_eq!(out["kind"], "advisory");
        let status = IndexStatusTool.execute(json!({}), &ctx).await.unwrap();
        assert_eq!(status["state"], "unavailable");
    }
}
