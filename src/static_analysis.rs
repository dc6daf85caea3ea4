//! Lint and type-check runner.
//!
//! Shares the spawn and timeout path with the test orchestrator. Output is
//! read as `file:line[:col]:message` diagnostics, one per line.

use std::str::FromStr;

use crate::config::{ExecutionConfig, ToolsConfig};
use crate::error::{CoreError, CoreResult};
use crate::models::{AnalysisResult, Issue};
use crate::process::ProcessRunner;
use crate::sandbox::Sandbox;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisTool {
    Flake8,
    Pylint,
    Mypy,
}

impl AnalysisTool {
    pub const ALL: [AnalysisTool; 3] = [Self::Flake8, Self::Pylint, Self::Mypy];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Flake8 => "flake8",
            Self::Pylint => "pylint",
            Self::Mypy => "mypy",
        }
    }

    pub fn command_line(&self, tools: &ToolsConfig, target: &str) -> Vec<String> {
        let (launcher, trailing): (&[String], &[&str]) = match self {
            Self::Flake8 => (&tools.flake8, &[]),
            Self::Pylint => (&tools.pylint, &["--output-format=text"]),
            Self::Mypy => (&tools.mypy, &["--ignore-missing-imports"]),
        };
        let mut argv = launcher.to_vec();
        argv.push(target.to_string());
        argv.extend(trailing.iter().map(|a| a.to_string()));
        argv
    }
}

impl FromStr for AnalysisTool {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CoreError::UnsupportedTool {
                kind: "tool",
                name: s.to_string(),
            })
    }
}

/// Parse diagnostics. Returns the true issue count and at most `max_issues`
/// issues in output order.
pub fn parse_diagnostics(output: &str, max_issues: usize) -> (usize, Vec<Issue>) {
    let mut count = 0;
    let mut issues = Vec::new();

    for line in output.lines() {
        if !line.contains(':') {
            continue;
        }
        let parts: Vec<&str> = line.splitn(4, ':').collect();
        if parts.len() < 3 {
            continue;
        }
        count += 1;
        if issues.len() < max_issues {
            issues.push(Issue {
                location: format!("Line {}", parts[1].trim()),
                message: parts[parts.len() - 1].trim().to_string(),
            });
        }
    }

    (count, issues)
}

pub struct StaticAnalyzer {
    sandbox: Sandbox,
    tools: ToolsConfig,
    execution: ExecutionConfig,
    runner: ProcessRunner,
}

impl StaticAnalyzer {
    pub fn new(
        sandbox: Sandbox,
        tools: ToolsConfig,
        execution: ExecutionConfig,
        runner: ProcessRunner,
    ) -> Self {
        Self {
            sandbox,
            tools,
            execution,
            runner,
        }
    }

    /// Run `tool` on `path`. `timeout_secs` overrides
    /// `execution.analysis_timeout_secs`.
    pub async fn analyze(
        &self,
        path: &str,
        tool: &str,
        timeout_secs: Option<u64>,
    ) -> CoreResult<AnalysisResult> {
        let target = self.sandbox.resolve_existing(path)?;
        let tool: AnalysisTool = tool.parse()?;
        let timeout = timeout_secs.unwrap_or(self.execution.analysis_timeout_secs);

        let argv = tool.command_line(&self.tools, &target.to_string_lossy());
        let output = self.runner.run(tool.name(), &argv, timeout).await?;

        let (issue_count, issues) = parse_diagnostics(&output.combined(), self.execution.max_issues);
        tracing::info!(tool = tool.name(), issue_count, "analysis finished");

        Ok(AnalysisResult {
            tool: tool.name().to_string(),
            target: self.sandbox.relative(&target),
            issue_count,
            issues,
            summary: format!("Found {} issues using {}", issue_count, tool.name()),
        })
    }
}
