//! Error types for tool registration and execution.

use crate::security::SecurityLevel;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Errors raised by the registry before or around tool execution.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ToolError {
    /// Arguments did not satisfy the tool's parameter specs.
    #[error("Invalid parameter '{parameter}': {message}")]
    Validation { parameter: String, message: String },

    /// No tool (or alias) with this name is registered.
    #[error("Tool '{0}' not found in registry")]
    NotFound(String),

    /// The active security level denies one of the tool's tags.
    #[error("Tool '{tool}' blocked by security policy at level {level} (denied tags: {})", .denied.join(", "))]
    SecurityDenied {
        tool: String,
        level: SecurityLevel,
        denied: Vec<String>,
    },

    /// A tool or alias with this name already exists.
    #[error("Tool '{0}' already registered")]
    AlreadyRegistered(String),

    /// The tool spec itself is malformed.
    #[error("Invalid tool spec for '{tool}': {reason}")]
    InvalidSpec { tool: String, reason: String },

    /// The tool body failed.
    #[error("Tool '{tool}' execution failed: {message}")]
    Execution { tool: String, message: String },

    /// The tool ran past its deadline.
    #[error("Tool '{tool}' timed out after {}ms", .elapsed.as_millis())]
    Timeout { tool: String, elapsed: Duration },
}

impl ToolError {
    pub fn validation(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    pub fn invalid_spec(tool: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSpec {
            tool: tool.into(),
            reason: reason.into(),
        }
    }

    /// The failure kind reported in a failed `ToolResult`.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Validation { .. } | Self::InvalidSpec { .. } => FailureKind::Validation,
            Self::NotFound(_) => FailureKind::NotFound,
            Self::SecurityDenied { .. } => FailureKind::SecurityDenied,
            Self::AlreadyRegistered(_) | Self::Execution { .. } => FailureKind::Execution,
            Self::Timeout { .. } => FailureKind::Timeout,
        }
    }
}

/// Why a `ToolResult` failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Validation,
    NotFound,
    SecurityDenied,
    Execution,
    Timeout,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::NotFound => "not_found",
            Self::SecurityDenied => "security_denied",
            Self::Execution => "execution",
            Self::Timeout => "timeout",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "validation" => Some(Self::Validation),
            "not_found" => Some(Self::NotFound),
            "security_denied" => Some(Self::SecurityDenied),
            "execution" => Some(Self::Execution),
            "timeout" => Some(Self::Timeout),
            _ => None,
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            ToolError::validation("x", "missing").kind(),
            FailureKind::Validation
        );
        assert_eq!(ToolError::NotFound("t".into()).kind(), FailureKind::NotFound);
        assert_eq!(
            ToolError::Timeout {
                tool: "t".into(),
                elapsed: Duration::from_millis(5)
            }
            .kind(),
            FailureKind::Timeout
        );
    }

    #[test]
    fn test_security_denied_message() {
        let err = ToolError::SecurityDenied {
            tool: "rm".into(),
            level: SecurityLevel::Safe,
            denied: vec!["dangerous".into()],
        };
        assert_eq!(
            err.to_string(),
            "Tool 'rm' blocked by security policy at level safe (denied tags: dangerous)"
        );
    }

    #[test]
    fn test_failure_kind_roundtrip_names() {
        for kind in [
            FailureKind::Validation,
            FailureKind::NotFound,
            FailureKind::SecurityDenied,
            FailureKind::Execution,
            FailureKind::Timeout,
        ] {
            assert_eq!(FailureKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(FailureKind::parse("bogus"), None);
    }
}
