//! Conflict recovery for identity creation
//!
//! `identity.create` is not idempotent: re-running it for an identity that
//! already exists (say, after a partial run) fails. The machine below turns
//! that into a convergent operation:
//!
//! ```text
//! Absent -> CreateAttempted -> Present
//!                           \-> Recovering(ProbeUpdate) -> Recovering(EnsureMembership) -> Present
//!                                        \                            \
//!                                         +----------------------------+-> Exhausted
//! ```
//!
//! The probe is an update addressed at the declared username; if it
//! succeeds the identity existed and its attributes are now correct, and
//! all that may be missing is the membership edge.

use crate::error::{ReconcileError, Result};
use std::fmt;

/// Remote steps the machine drives
pub trait RecoveryOps {
    /// Key used in logs and errors
    fn key(&self) -> &str;

    /// Attempt to create the identity
    fn create(&self) -> Result<()>;

    /// Update the identity addressed by its declared username
    fn probe_update(&self) -> Result<()>;

    /// Attach the identity to its group, tolerating an existing edge
    fn ensure_membership(&self) -> Result<()>;
}

/// Recovery step that can fail after a failed create
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryStep {
    /// Update addressed at the declared username
    ProbeUpdate,
    /// Group attach
    EnsureMembership,
}

impl fmt::Display for RecoveryStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProbeUpdate => f.write_str("probe update"),
            Self::EnsureMembership => f.write_str("ensure membership"),
        }
    }
}

/// State of one create
#[derive(Debug, Clone)]
pub enum CreateState {
    /// Nothing attempted yet
    Absent,
    /// `create` is about to run
    CreateAttempted,
    /// `create` failed; a recovery step is about to run
    Recovering {
        step: RecoveryStep,
        create_error: ReconcileError,
    },
    /// Identity exists in its group
    Present { recovered: bool },
    /// Recovery failed
    Exhausted(ReconcileError),
}

impl CreateState {
    /// Whether no further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Present { .. } | Self::Exhausted(_))
    }

    /// Perform one transition, issuing at most one remote step
    pub fn advance(self, ops: &dyn RecoveryOps) -> Self {
        match self {
            Self::Absent => Self::CreateAttempted,
            Self::CreateAttempted => match ops.create() {
                Ok(()) => Self::Present { recovered: false },
                Err(create_error) => {
                    log::debug!("{}: create failed, probing for an existing identity", ops.key());
                    Self::Recovering {
                        step: RecoveryStep::ProbeUpdate,
                        create_error,
                    }
                }
            },
            Self::Recovering { step, create_error } => {
                let outcome = match step {
                    RecoveryStep::ProbeUpdate => ops.probe_update(),
                    RecoveryStep::EnsureMembership => ops.ensure_membership(),
                };
                match (step, outcome) {
                    (RecoveryStep::ProbeUpdate, Ok(())) => Self::Recovering {
                        step: RecoveryStep::EnsureMembership,
                        create_error,
                    },
                    (RecoveryStep::EnsureMembership, Ok(())) => {
                        log::warn!(
                            "{}: create failed ({create_error}); recovered existing identity",
                            ops.key()
                        );
                        Self::Present { recovered: true }
                    }
                    (step, Err(step_error)) => {
                        log::warn!("{}: recovery failed at {step}: {step_error}", ops.key());
                        Self::Exhausted(ReconcileError::RecoveryExhausted {
                            key: ops.key().to_string(),
                            step,
                            create_error: Box::new(create_error),
                            step_error: Box::new(step_error),
                        })
                    }
                }
            }
            terminal @ (Self::Present { .. } | Self::Exhausted(_)) => terminal,
        }
    }
}

/// How a create ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    /// `create` succeeded directly
    Created,
    /// `create` failed and the existing identity was repaired
    Recovered,
}

/// Run the machine to completion
pub fn run(ops: &dyn RecoveryOps) -> Result<CreateOutcome> {
    let mut state = CreateState::Absent;
    loop {
        state = match state.advance(ops) {
            CreateState::Present { recovered: false } => return Ok(CreateOutcome::Created),
            CreateState::Present { recovered: true } => return Ok(CreateOutcome::Recovered),
            CreateState::Exhausted(error) => return Err(error),
            next => next,
        };
    }
}
