//! Error types for directory operations.
//!
//! Every failure carries the [`Operation`] that produced it. Rejected
//! responses keep the raw body so callers can report exactly what the
//! remote said, and are categorized so reconcilers can tell "already
//! exists" and "not found" apart from genuine failures.

use crate::types::Operation;
use std::fmt;

/// Result type alias for directory operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Categories of directory errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The request never got a response (DNS, connection, timeout).
    Transport,
    /// The addressed group or identity does not exist.
    NotFound,
    /// The entity already exists, or the edge is already present.
    Conflict,
    /// The credential was refused.
    Unauthorized,
    /// Any other non-success response.
    Rejected,
    /// The response could not be decoded into the expected shape.
    Format,
    /// Local configuration problem (missing token, bad URL).
    Config,
}

impl ErrorCategory {
    /// Whether this error category is typically transient and worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport)
    }

    /// Get a user-friendly description of this error category.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Transport => "Network connectivity issue",
            Self::NotFound => "Entity not found",
            Self::Conflict => "Entity already exists",
            Self::Unauthorized => "Credential rejected",
            Self::Rejected => "Request rejected",
            Self::Format => "Unexpected response format",
            Self::Config => "Invalid configuration",
        }
    }

    /// Get actionable advice for resolving this error category.
    #[must_use]
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Transport => "Check your internet connection and try again",
            Self::NotFound => "Run 'roster refresh' to drop entities removed outside roster",
            Self::Conflict => "Import the existing entity with 'roster import'",
            Self::Unauthorized => "Check the API token and its permissions on the group",
            Self::Rejected => "Check the error details returned by the server",
            Self::Format => "The server may be running an incompatible API version",
            Self::Config => "Set OMEGAUP_API_TOKEN or pass --api-token",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors that can occur while talking to the directory.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// Network or transport failure; no response was received.
    #[error("{operation}: transport failure: {message}")]
    Transport {
        /// Operation being executed.
        operation: Operation,
        /// Error message from the HTTP client.
        message: String,
    },

    /// The server answered with a non-success status.
    #[error("{operation}: HTTP {status}: {body}")]
    Rejected {
        /// Operation being executed.
        operation: Operation,
        /// HTTP status code.
        status: u16,
        /// Raw response body.
        body: String,
    },

    /// A success response did not match the expected shape.
    #[error("{operation}: invalid response: {message}")]
    Decode {
        /// Operation being executed.
        operation: Operation,
        /// Decoder error message.
        message: String,
    },

    /// A request could not be encoded into form fields.
    #[error("{operation}: could not encode request: {message}")]
    Encode {
        /// Operation being executed.
        operation: Operation,
        /// Encoder error message.
        message: String,
    },

    /// No API token was configured.
    #[error("missing API token: set OMEGAUP_API_TOKEN or pass --api-token")]
    MissingCredential,

    /// The configured base URL is unusable.
    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(String),
}

impl Error {
    /// Create a rejected-response error.
    pub fn rejected(operation: Operation, status: u16, body: impl Into<String>) -> Self {
        Self::Rejected {
            operation,
            status,
            body: body.into(),
        }
    }

    /// The operation this error belongs to, if any.
    #[must_use]
    pub fn operation(&self) -> Option<Operation> {
        match self {
            Self::Transport { operation, .. }
            | Self::Rejected { operation, .. }
            | Self::Decode { operation, .. }
            | Self::Encode { operation, .. } => Some(*operation),
            Self::MissingCredential | Self::InvalidBaseUrl(_) => None,
        }
    }

    /// Get the error category.
    ///
    /// Rejected responses are classified by status first, then by the
    /// error name the server puts in the body.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Transport { .. } => ErrorCategory::Transport,
            Self::Rejected { status, body, .. } => classify_rejection(*status, body),
            Self::Decode { .. } | Self::Encode { .. } => ErrorCategory::Format,
            Self::MissingCredential | Self::InvalidBaseUrl(_) => ErrorCategory::Config,
        }
    }

    /// Whether this error is typically transient and worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    /// Whether the addressed entity does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.category() == ErrorCategory::NotFound
    }

    /// Whether the entity or edge already exists.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        self.category() == ErrorCategory::Conflict
    }
}

fn classify_rejection(status: u16, body: &str) -> ErrorCategory {
    match status {
        404 => return ErrorCategory::NotFound,
        409 => return ErrorCategory::Conflict,
        401 | 403 => return ErrorCategory::Unauthorized,
        _ => {}
    }

    let body = body.to_lowercase();

    if body.contains("notfound")
        || body.contains("not found")
        || body.contains("notexist")
        || body.contains("does not exist")
        || body.contains("not a member")
    {
        return ErrorCategory::NotFound;
    }

    if body.contains("inuse")
        || body.contains("in use")
        || body.contains("alreadyexists")
        || body.contains("already exists")
        || body.contains("duplicate")
        || body.contains("identityingroup")
        || body.contains("already a member")
    {
        return ErrorCategory::Conflict;
    }

    ErrorCategory::Rejected
}
