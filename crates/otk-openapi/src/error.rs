//! Error types for OpenAPI tool generation and execution.
//!
//! Every failure that reaches a consumer is one of the four variants of
//! [`OpenApiError`]. Lower-level failures (parameter validation, HTTP
//! status, transport) are wrapped into [`OpenApiError::ToolExecution`] at
//! the tool-invocation boundary.

use thiserror::Error;

/// Result type for OpenAPI operations.
pub type Result<T> = std::result::Result<T, OpenApiError>;

/// Errors surfaced by the spec loader, parser, auth manager and executor.
#[derive(Error, Debug)]
pub enum OpenApiError {
    /// The spec is unreachable, unreadable or unparsable. Fatal to startup.
    #[error("Failed to load OpenAPI spec from '{location}': {reason}")]
    SpecLoad {
        location: String,
        /// HTTP status when the spec was fetched from a URL
        status: Option<u16>,
        reason: String,
    },

    /// A schema node uses a feature outside the supported subset.
    #[error("Unsupported schema at '{path}': {reason}")]
    UnsupportedSchema { path: String, reason: String },

    /// Credential acquisition failed. The caller may retry.
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// A single tool invocation failed.
    #[error("Tool '{tool}' execution failed: {source}")]
    ToolExecution {
        tool: String,
        #[source]
        source: anyhow::Error,
    },
}

impl OpenApiError {
    pub(crate) fn spec_load(location: impl Into<String>, reason: impl ToString) -> Self {
        Self::SpecLoad {
            location: location.into(),
            status: None,
            reason: reason.to_string(),
        }
    }

    pub(crate) fn unsupported(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnsupportedSchema {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn auth(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    pub(crate) fn tool(tool: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::ToolExecution {
            tool: tool.into(),
            source: source.into(),
        }
    }
}

impl From<OpenApiError> for otk_core::Error {
    fn from(err: OpenApiError) -> Self {
        match err {
            OpenApiError::ToolExecution { tool, source } => {
                otk_core::Error::ToolFailed { tool, source }
            }
            OpenApiError::Authentication(msg) => otk_core::Error::Auth(msg),
            other => otk_core::Error::Other(other.into()),
        }
    }
}
