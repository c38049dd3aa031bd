//! Error types for the webbook pipeline.
//!
//! Stage-level failures are carried by [`WebBookError`] and always surface to
//! the caller. Field-level failures are [`ExtractionFieldError`]s: they are
//! recorded on the debug channel and never abort a stage.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, WebBookError>;

/// The main error type for stage operations.
#[derive(Debug, Error)]
pub enum WebBookError {
    /// A request template could not be resolved.
    #[error("{0}")]
    Template(#[from] TemplateError),

    /// The network call failed or returned a non-success status.
    #[error("{0}")]
    Network(#[from] NetworkError),

    /// A post-processing script raised, ran out of budget or timed out.
    #[error("{0}")]
    Script(#[from] ScriptError),

    /// A required extraction found nothing in an otherwise successful response.
    #[error("No content: {0}")]
    NoContent(String),

    /// The source profile itself is unusable (bad regex, bad record).
    #[error("Invalid source profile: {0}")]
    Profile(String),

    /// The run was cancelled.
    #[error("Stage cancelled: {0}")]
    Cancelled(String),

    /// A blocking stage call was made from inside an async runtime.
    #[error("Blocking stage call made from inside an async runtime; use the awaitable variant")]
    BlockingInAsyncContext,

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification of a [`WebBookError`], attached to failed stage outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Template resolution failed.
    Template,
    /// Connection, timeout or status failure.
    Network,
    /// Script failure.
    Script,
    /// Required content missing.
    NoContent,
    /// Broken source profile.
    Profile,
    /// Cancelled run.
    Cancelled,
    /// Anything else.
    Internal,
}

impl ErrorKind {
    /// Whether a caller-level retry can reasonably succeed.
    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Network)
    }

    /// Stable string form used in trace lines.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Template => "template",
            Self::Network => "network",
            Self::Script => "script",
            Self::NoContent => "no_content",
            Self::Profile => "profile",
            Self::Cancelled => "cancelled",
            Self::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl WebBookError {
    /// Returns the error kind.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Template(_) => ErrorKind::Template,
            Self::Network(_) => ErrorKind::Network,
            Self::Script(_) => ErrorKind::Script,
            Self::NoContent(_) => ErrorKind::NoContent,
            Self::Profile(_) => ErrorKind::Profile,
            Self::Cancelled(_) => ErrorKind::Cancelled,
            Self::BlockingInAsyncContext | Self::Internal(_) | Self::Io(_) => ErrorKind::Internal,
        }
    }

    /// Creates a no-content error.
    #[must_use]
    pub fn no_content(message: impl Into<String>) -> Self {
        Self::NoContent(message.into())
    }

    /// Creates a profile error.
    #[must_use]
    pub fn profile(message: impl Into<String>) -> Self {
        Self::Profile(message.into())
    }
}

/// Error raised when a request template cannot be resolved.
#[derive(Debug, Clone, Error)]
#[error("Template error in '{template}': {message}")]
pub struct TemplateError {
    /// What went wrong.
    pub message: String,
    /// The template being resolved.
    pub template: String,
}

impl TemplateError {
    /// Creates a new template error.
    #[must_use]
    pub fn new(template: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            template: template.into(),
        }
    }
}

/// Error raised when a network call fails.
#[derive(Debug, Clone, Error)]
#[error("Network error for {url}: {message}")]
pub struct NetworkError {
    /// The requested URL.
    pub url: String,
    /// HTTP status, when a response was received.
    pub status: Option<u16>,
    /// What went wrong.
    pub message: String,
}

impl NetworkError {
    /// Creates a new network error.
    #[must_use]
    pub fn new(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status: None,
            message: message.into(),
        }
    }

    /// Creates an error for a non-success status.
    #[must_use]
    pub fn status(url: impl Into<String>, status: u16) -> Self {
        Self {
            url: url.into(),
            status: Some(status),
            message: format!("HTTP status {status}"),
        }
    }

    /// Wraps a reqwest error.
    #[must_use]
    pub fn from_reqwest(url: impl Into<String>, err: &reqwest::Error) -> Self {
        Self {
            url: url.into(),
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}

/// Error raised by the script sandbox.
#[derive(Debug, Clone, Error)]
#[error("Script error: {message}")]
pub struct ScriptError {
    /// What went wrong.
    pub message: String,
    /// Whether the script hit its time or operation budget.
    pub exhausted: bool,
}

impl ScriptError {
    /// Creates a new script error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            exhausted: false,
        }
    }

    /// Creates an error for a script that ran out of budget.
    #[must_use]
    pub fn exhausted(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            exhausted: true,
        }
    }
}

/// Non-fatal failure of a single rule inside an extractor.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("field '{field}' failed ({rule}): {message}")]
pub struct ExtractionFieldError {
    /// The field being extracted.
    pub field: String,
    /// The rule string.
    pub rule: String,
    /// What went wrong.
    pub message: String,
}

impl ExtractionFieldError {
    /// Creates a new field error.
    #[must_use]
    pub fn new(field: impl Into<String>, rule: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            rule: rule.into(),
            message: message.into(),
        }
    }
}
