//! Error taxonomy shared by every workspace operation.
//!
//! Boundary failures (sandbox escapes, unknown tools) are rejected before any
//! side effect. Execution failures (timeouts, tool crashes) are returned as
//! values so callers can render them next to partial output. Provider
//! problems never surface here as hard errors; the semantic index degrades to
//! an advisory instead.

use std::path::PathBuf;
use thiserror::Error;

pub type CoreResult<T> = std::result::Result<T, CoreError>;

#[derive(Error, Debug)]
pub enum CoreError {
    /// The requested path resolves outside the workspace root.
    #[error("Access denied: '{0}' resolves outside the workspace")]
    SandboxViolation(String),

    #[error("Path not found: {0}")]
    NotFound(String),

    /// Unknown test framework or analysis tool identifier.
    #[error("Unsupported {kind}: {name}")]
    UnsupportedTool { kind: &'static str, name: String },

    #[error("{tool} timed out after {secs} seconds")]
    ExecutionTimeout { tool: String, secs: u64 },

    #[error("{tool} failed: {message}")]
    ToolFailure { tool: String, message: String },

    /// Malformed caller input such as an invalid search pattern.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CoreError {
    /// Machine-readable code used by the HTTP and CLI surfaces.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::SandboxViolation(_) => "access_denied",
            CoreError::NotFound(_) => "not_found",
            CoreError::UnsupportedTool { .. } => "unsupported",
            CoreError::ExecutionTimeout { .. } => "timeout",
            CoreError::ToolFailure { .. } => "tool_failure",
            CoreError::InvalidArgument(_) => "invalid_argument",
            CoreError::ProviderUnavailable(_) => "provider_unavailable",
            CoreError::Io { .. } => "io",
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CoreError::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(
            CoreError::SandboxViolation("../x".into()).code(),
            "access_denied"
        );
        assert_eq!(
            CoreError::ExecutionTimeout {
                tool: "pytest".into(),
                secs: 60
            }
            .code(),
            "timeout"
        );
        assert_eq!(
            CoreError::UnsupportedTool {
                kind: "framework",
                name: "nose".into()
            }
            .to_string(),
            "Unsupported framework: nose"
        );
    }
}
