//! Reconciliation errors
//!
//! Gateway failures are rewrapped with the entity key they happened on, so
//! a failed batch or a parallel apply still says which entity broke.

use crate::recovery::RecoveryStep;
use crate::types::{Address, Kind};
use directory::{ErrorCategory, Operation};
use std::fmt;

/// Result type alias for reconciliation
pub type Result<T> = std::result::Result<T, ReconcileError>;

/// A per-key failure inside a batch
#[derive(Debug, Clone)]
pub struct KeyFailure {
    /// Key (username) the failure belongs to
    pub key: String,
    /// What went wrong
    pub error: ReconcileError,
}

impl fmt::Display for KeyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.key, self.error)
    }
}

/// Errors raised by reconcilers
#[derive(Debug, Clone, thiserror::Error)]
pub enum ReconcileError {
    /// No response was received
    #[error("{key}: {operation}: transport failure: {message}")]
    Transport {
        operation: Operation,
        key: String,
        message: String,
    },

    /// The remote answered with a non-success status
    #[error("{key}: {operation} rejected (HTTP {status}): {body}")]
    RemoteRejected {
        operation: Operation,
        key: String,
        status: u16,
        body: String,
    },

    /// A response (or request) did not have the expected shape
    #[error("{key}: {operation}: {message}")]
    Decode {
        operation: Operation,
        key: String,
        message: String,
    },

    /// The gateway is misconfigured
    #[error("{0}")]
    Config(String),

    /// A declared change touches an immutable key
    #[error(
        "{address}: cannot change {field} from '{from}' to '{to}'; remove the entry and declare a new one"
    )]
    ImmutableKeyViolation {
        address: Address,
        field: &'static str,
        from: String,
        to: String,
    },

    /// Observed state contradicts previously confirmed state
    #[error("{address}: drift detected: {detail}")]
    DriftDetected { address: Address, detail: String },

    /// An identity create failed and could not be repaired.
    ///
    /// Reported as the create error; the failing recovery step is kept
    /// alongside for diagnostics.
    #[error("{create_error}")]
    RecoveryExhausted {
        key: String,
        step: RecoveryStep,
        create_error: Box<ReconcileError>,
        step_error: Box<ReconcileError>,
    },

    /// Malformed composite import id
    #[error("invalid import id '{0}': expected '<group_alias>,<username>'")]
    InvalidImportId(String),

    /// Some keys of a batch failed
    #[error("{address}: {} of the batch failed: {}", plural(.failures.len()), join(.failures))]
    Batch {
        address: Address,
        failures: Vec<KeyFailure>,
    },

    /// The entity to import does not exist
    #[error("{kind} '{key}' not found")]
    NotFound { kind: Kind, key: String },
}

fn plural(n: usize) -> String {
    if n == 1 {
        "1 entry".to_string()
    } else {
        format!("{n} entries")
    }
}

fn join(failures: &[KeyFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ReconcileError {
    /// Attach an entity key to a gateway error
    pub fn gateway(key: impl Into<String>, error: directory::Error) -> Self {
        let key = key.into();
        match error {
            directory::Error::Transport { operation, message } => Self::Transport {
                operation,
                key,
                message,
            },
            directory::Error::Rejected {
                operation,
                status,
                body,
            } => Self::RemoteRejected {
                operation,
                key,
                status,
                body,
            },
            directory::Error::Decode { operation, message } => Self::Decode {
                operation,
                key,
                message: format!("invalid response: {message}"),
            },
            directory::Error::Encode { operation, message } => Self::Decode {
                operation,
                key,
                message: format!("could not encode request: {message}"),
            },
            other @ (directory::Error::MissingCredential | directory::Error::InvalidBaseUrl(_)) => {
                Self::Config(other.to_string())
            }
        }
    }

    /// Get the error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Transport { .. } => ErrorCategory::Transport,
            Self::RemoteRejected {
                operation,
                status,
                body,
                ..
            } => directory::Error::rejected(*operation, *status, body.as_str()).category(),
            Self::Decode { .. } => ErrorCategory::Format,
            Self::Config(_) | Self::ImmutableKeyViolation { .. } | Self::InvalidImportId(_) => {
                ErrorCategory::Config
            }
            Self::DriftDetected { .. } | Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::RecoveryExhausted { create_error, .. } => create_error.category(),
            Self::Batch { failures, .. } => failures
                .first()
                .map_or(ErrorCategory::Rejected, |f| f.error.category()),
        }
    }

    /// Whether re-running the reconciliation may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Batch { failures, .. } => failures.iter().any(|f| f.error.is_retryable()),
            _ => self.category().is_retryable(),
        }
    }
}
