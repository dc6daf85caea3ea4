//! Test execution orchestrator.
//!
//! Resolves the target through the sandbox, spawns the framework's runner
//! from the workspace root, and folds the output into an
//! [`ExecutionResult`]. The exit code is recorded but status comes from
//! parsing: a runner that exits non-zero still reports its counts.
//!
//! | Framework | Command line |
//! |-----------|--------------|
//! | `pytest` | `<launcher> <path> -v` |
//! | `jest` | `<launcher> <path> --json` |
//! | `mocha` | `<launcher> <path> --reporter json` |

use std::str::FromStr;
use std::sync::Arc;

use crate::config::{ExecutionConfig, ToolsConfig};
use crate::error::{CoreError, CoreResult};
use crate::llm::{suggest_test_fix, CompletionProvider};
use crate::models::{ExecutionResult, TestCounts, TestStatus};
use crate::process::{ProcessOutput, ProcessRunner};
use crate::sandbox::Sandbox;
use crate::test_report::{parse_jest, parse_mocha, parse_pytest, tail_chars};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestFramework {
    Pytest,
    Jest,
    Mocha,
}

impl TestFramework {
    pub const ALL: [TestFramework; 3] = [Self::Pytest, Self::Jest, Self::Mocha];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Pytest => "pytest",
            Self::Jest => "jest",
            Self::Mocha => "mocha",
        }
    }

    fn trailing_args(&self) -> &'static [&'static str] {
        match self {
            Self::Pytest => &["-v"],
            Self::Jest => &["--json"],
            Self::Mocha => &["--reporter", "json"],
        }
    }

    fn launcher<'a>(&self, tools: &'a ToolsConfig) -> &'a [String] {
        match self {
            Self::Pytest => &tools.pytest,
            Self::Jest => &tools.jest,
            Self::Mocha => &tools.mocha,
        }
    }

    /// Full argv for running `target`.
    pub fn command_line(&self, tools: &ToolsConfig, target: &str) -> Vec<String> {
        let mut argv = self.launcher(tools).to_vec();
        argv.push(target.to_string());
        argv.extend(self.trailing_args().iter().map(|a| a.to_string()));
        argv
    }

    pub fn parse(&self, output: &ProcessOutput) -> TestCounts {
        let combined = output.combined();
        match self {
            Self::Pytest => parse_pytest(&combined),
            Self::Jest => parse_jest(&output.stdout, &combined),
            Self::Mocha => parse_mocha(&output.stdout, &combined),
        }
    }
}

impl FromStr for TestFramework {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|f| f.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CoreError::UnsupportedTool {
                kind: "framework",
                name: s.to_string(),
            })
    }
}

pub struct TestRunner {
    sandbox: Sandbox,
    tools: ToolsConfig,
    execution: ExecutionConfig,
    runner: ProcessRunner,
    completer: Option<Arc<dyn CompletionProvider>>,
}

impl TestRunner {
    pub fn new(
        sandbox: Sandbox,
        tools: ToolsConfig,
        execution: ExecutionConfig,
        runner: ProcessRunner,
        completer: Option<Arc<dyn CompletionProvider>>,
    ) -> Self {
        Self {
            sandbox,
            tools,
            execution,
            runner,
            completer,
        }
    }

    /// Run the tests at `path` with `framework`.
    ///
    /// `timeout_secs` overrides `execution.test_timeout_secs`.
    pub async fn run(
        &self,
        path: &str,
        framework: &str,
        timeout_secs: Option<u64>,
    ) -> CoreResult<ExecutionResult> {
        let target = self.sandbox.resolve_existing(path)?;
        let framework: TestFramework = framework.parse()?;
        let timeout = timeout_secs.unwrap_or(self.execution.test_timeout_secs);

        let argv = framework.command_line(&self.tools, &target.to_string_lossy());
        let output = self.runner.run(framework.name(), &argv, timeout).await?;

        let counts = framework.parse(&output);
        let status = counts.status();
        let full_logs = output.combined();
        tracing::info!(
            framework = framework.name(),
            status = ?status,
            total = counts.total,
            "test run finished"
        );

        let suggestion = if status == TestStatus::Failed && self.execution.suggest_fixes {
            self.suggest(&full_logs).await
        } else {
            None
        };

        Ok(ExecutionResult {
            framework: framework.name().to_string(),
            status,
            counts,
            output_snippet: tail_chars(&full_logs, self.execution.snippet_chars).to_string(),
            full_logs,
            suggestion,
            exit_code: output.exit_code,
            duration_ms: output.duration_ms,
        })
    }

    async fn suggest(&self, logs: &str) -> Option<String> {
        let completer = self.completer.as_ref()?;
        match suggest_test_fix(completer.as_ref(), logs).await {
            Ok(text) => Some(text),
            Err(e) => {
                tracing::warn!(error = %e, "fix suggestion unavailable");
                None
            }
        }
    }
}
