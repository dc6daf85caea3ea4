//! TOML configuration parsing and validation.
//!
//! Every section has defaults so a workspace can be opened with nothing more
//! than a root directory. Credentials are never read from the file; the
//! embedding and completion providers pull API keys from the environment.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub workspace: WorkspaceConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WorkspaceConfig {
    pub root: PathBuf,
    #[serde(default = "default_index_dir")]
    pub index_dir: PathBuf,
    #[serde(default = "default_max_walk_entries")]
    pub max_walk_entries: usize,
    #[serde(default = "default_max_search_hits")]
    pub max_search_hits: usize,
}

fn default_index_dir() -> PathBuf {
    PathBuf::from(".devassist_index")
}
fn default_max_walk_entries() -> usize {
    50_000
}
fn default_max_search_hits() -> usize {
    1_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for Ollama (default `http://localhost:11434`) or an
    /// OpenAI-compatible endpoint.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_index_extensions")]
    pub extensions: Vec<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            extensions: default_index_extensions(),
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_index_extensions() -> Vec<String> {
    ["py", "js", "ts", "md"].iter().map(|s| s.to_string()).collect()
}
fn default_max_tokens() -> usize {
    700
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CompletionConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_completion_url")]
    pub url: String,
    #[serde(default = "default_completion_model")]
    pub model: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_completion_timeout")]
    pub timeout_secs: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            url: default_completion_url(),
            model: default_completion_model(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_completion_timeout(),
        }
    }
}

fn default_completion_url() -> String {
    "https://api.groq.com/openai/v1/chat/completions".to_string()
}
fn default_completion_model() -> String {
    "llama-3.3-70b-versatile".to_string()
}
fn default_api_key_env() -> String {
    "GROK_API_KEY".to_string()
}
fn default_completion_timeout() -> u64 {
    45
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExecutionConfig {
    #[serde(default = "default_test_timeout")]
    pub test_timeout_secs: u64,
    #[serde(default = "default_analysis_timeout")]
    pub analysis_timeout_secs: u64,
    #[serde(default)]
    pub serialize_runs: bool,
    #[serde(default = "default_snippet_chars")]
    pub snippet_chars: usize,
    #[serde(default = "default_max_issues")]
    pub max_issues: usize,
    #[serde(default = "default_suggest_fixes")]
    pub suggest_fixes: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            test_timeout_secs: default_test_timeout(),
            analysis_timeout_secs: default_analysis_timeout(),
            serialize_runs: false,
            snippet_chars: default_snippet_chars(),
            max_issues: default_max_issues(),
            suggest_fixes: default_suggest_fixes(),
        }
    }
}

fn default_test_timeout() -> u64 {
    60
}
fn default_analysis_timeout() -> u64 {
    30
}
fn default_snippet_chars() -> usize {
    2000
}
fn default_max_issues() -> usize {
    20
}
fn default_suggest_fixes() -> bool {
    true
}

/// Launcher prefix for each external tool. The target path and the
/// tool-specific flags are appended after these arguments.
#[derive(Debug, Deserialize, Clone)]
pub struct ToolsConfig {
    #[serde(default = "default_pytest")]
    pub pytest: Vec<String>,
    #[serde(default = "default_jest")]
    pub jest: Vec<String>,
    #[serde(default = "default_mocha")]
    pub mocha: Vec<String>,
    #[serde(default = "default_flake8")]
    pub flake8: Vec<String>,
    #[serde(default = "default_pylint")]
    pub pylint: Vec<String>,
    #[serde(default = "default_mypy")]
    pub mypy: Vec<String>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            pytest: default_pytest(),
            jest: default_jest(),
            mocha: default_mocha(),
            flake8: default_flake8(),
            pylint: default_pylint(),
            mypy: default_mypy(),
        }
    }
}

fn launcher(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}
fn default_pytest() -> Vec<String> {
    launcher(&["pytest"])
}
fn default_jest() -> Vec<String> {
    launcher(&["npx", "jest"])
}
fn default_mocha() -> Vec<String> {
    launcher(&["npx", "mocha"])
}
fn default_flake8() -> Vec<String> {
    launcher(&["flake8"])
}
fn default_pylint() -> Vec<String> {
    launcher(&["pylint"])
}
fn default_mypy() -> Vec<String> {
    launcher(&["mypy"])
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

impl Config {
    /// All-defaults configuration rooted at `root`.
    pub fn minimal(root: impl Into<PathBuf>) -> Self {
        Self {
            workspace: WorkspaceConfig {
                root: root.into(),
                index_dir: default_index_dir(),
                max_walk_entries: default_max_walk_entries(),
                max_search_hits: default_max_search_hits(),
            },
            embedding: EmbeddingConfig::default(),
            completion: CompletionConfig::default(),
            execution: ExecutionConfig::default(),
            tools: ToolsConfig::default(),
            server: ServerConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let index_dir = &self.workspace.index_dir;
        if index_dir.is_absolute()
            || index_dir
                .components()
                .any(|c| !matches!(c, Component::Normal(_)))
        {
            bail!("workspace.index_dir must be a plain relative path inside the workspace");
        }
        let hidden = index_dir
            .components()
            .next()
            .map(|c| c.as_os_str().to_string_lossy().starts_with('.'))
            .unwrap_or(false);
        if !hidden {
            bail!("workspace.index_dir must start with a hidden directory (e.g. '.devassist_index')");
        }

        if self.workspace.max_walk_entries == 0 {
            bail!("workspace.max_walk_entries must be > 0");
        }

        if self.embedding.batch_size == 0 {
            bail!("embedding.batch_size must be > 0");
        }
        if self.embedding.max_tokens == 0 {
            bail!("embedding.max_tokens must be > 0");
        }
        match self.embedding.provider.as_str() {
            "disabled" | "openai" | "ollama" => {}
            other => bail!(
                "Unknown embedding provider: '{}'. Must be disabled, openai, or ollama.",
                other
            ),
        }
        if self.embedding.is_enabled() {
            if self.embedding.model.is_none() {
                bail!(
                    "embedding.model must be specified when provider is '{}'",
                    self.embedding.provider
                );
            }
            if self.embedding.dims == Some(0) {
                bail!("embedding.dims must be > 0 when set");
            }
        }

        match self.completion.provider.as_str() {
            "disabled" | "openai" => {}
            other => bail!(
                "Unknown completion provider: '{}'. Must be disabled or openai.",
                other
            ),
        }

        if self.execution.test_timeout_secs == 0 || self.execution.analysis_timeout_secs == 0 {
            bail!("execution timeouts must be > 0");
        }

        for (name, argv) in [
            ("pytest", &self.tools.pytest),
            ("jest", &self.tools.jest),
            ("mocha", &self.tools.mocha),
            ("flake8", &self.tools.flake8),
            ("pylint", &self.tools.pylint),
            ("mypy", &self.tools.mypy),
        ] {
            if argv.is_empty() || argv[0].trim().is_empty() {
                bail!("tools.{} must name an executable", name);
            }
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // A relative root is taken relative to the config file's directory.
    if config.workspace.root.is_relative() {
        if let Some(parent) = path.parent() {
            config.workspace.root = parent.join(&config.workspace.root);
        }
    }

    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_defaults() {
        let cfg = Config::minimal("/tmp/ws");
        assert_eq!(cfg.execution.test_timeout_secs, 60);
        assert_eq!(cfg.execution.analysis_timeout_secs, 30);
        assert_eq!(cfg.execution.max_issues, 20);
        assert_eq!(cfg.tools.jest, vec!["npx", "jest"]);
        assert!(!cfg.embedding.is_enabled());
        cfg.validate().unwrap();
    }

    #[test]
    fn test_parse_partial_file() {
        let cfg: Config = toml::from_str(
            r#"
            [workspace]
            root = "/srv/project"

            [execution]
            test_timeout_secs = 5

            [tools]
            pylint = ["/opt/bin/pylint"]
            "#,
        )
        .unwrap();
        assert_eq!(cfg.execution.test_timeout_secs, 5);
        assert_eq!(cfg.execution.analysis_timeout_secs, 30);
        assert_eq!(cfg.tools.pylint, vec!["/opt/bin/pylint"]);
        assert_eq!(cfg.tools.flake8, vec!["flake8"]);
        assert_eq!(cfg.workspace.index_dir, PathBuf::from(".devassist_index"));
    }

    #[test]
    fn test_example_file_parses() {
        let cfg: Config = toml::from_str(include_str!("../devassist.example.toml")).unwrap();
        assert_eq!(cfg.server.bind, "127.0.0.1:7341");
        assert_eq!(cfg.tools.mocha, vec!["npx", "mocha"]);
        cfg.validate().unwrap();
    }

    #[test]
    fn test_rejects_escaping_index_dir() {
        let mut cfg = Config::minimal("/tmp/ws");
        cfg.workspace.index_dir = PathBuf::from("../elsewhere");
        assert!(cfg.validate().is_err());

        cfg.workspace.index_dir = PathBuf::from("visible_index");
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_enabled_embedding_requires_model() {
        let mut cfg = Config::minimal("/tmp/ws");
        cfg.embedding.provider = "openai".to_string();
        assert!(cfg.validate().is_err());
        cfg.embedding.model = Some("text-embedding-3-small".to_string());
        cfg.validate().unwrap();
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let mut cfg = Config::minimal("/tmp/ws");
        cfg.embedding.provider = "bogus".to_string();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("Unknown embedding provider"));
    }

    #[test]
    fn test_empty_launcher_rejected() {
        let mut cfg = Config::minimal("/tmp/ws");
        cfg.tools.mypy = Vec::new();
        assert!(cfg.validate().is_err());
    }
}
