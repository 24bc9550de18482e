//! Resource trait for reconciliation
//!
//! A Resource pairs one declared entity with its previously observed
//! record (either may be missing) and knows how to converge them.

use crate::error::ReconcileError;
use crate::types::{Action, Address, ApplyResult, Record};
use std::fmt;

/// Core trait for reconciled resources
///
/// Implementations must not touch the remote in [`action`](Resource::action)
/// or [`changes`](Resource::changes): planning is local.
pub trait Resource: Send + Sync + fmt::Debug {
    /// Config address of the resource
    fn address(&self) -> &Address;

    /// Human-readable description
    fn description(&self) -> String;

    /// Group alias the resource lives in.
    ///
    /// Resources in one partition are applied sequentially, in plan order.
    fn partition(&self) -> &str;

    /// What applying would do, judged from declared and recorded state
    fn action(&self) -> Action;

    /// Attribute-level changes for display
    fn changes(&self) -> Vec<String> {
        Vec::new()
    }

    /// Converge the remote and report the new record
    fn apply(&self) -> Applied;
}

/// A boxed resource for type-erased storage
pub type BoxedResource = Box<dyn Resource>;

/// What to do with the tracked record after an apply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordUpdate {
    /// Keep whatever is tracked
    Unchanged,
    /// Track this record
    Set(Record),
    /// Stop tracking the address
    Remove,
}

/// Outcome of applying one resource
#[derive(Debug, Clone)]
pub struct Applied {
    /// Address of the resource
    pub address: Address,
    /// What happened
    pub result: ApplyResult,
    /// New tracked state; set even on partial failure
    pub record: RecordUpdate,
    /// Error behind a failed result
    pub error: Option<ReconcileError>,
}

impl Applied {
    /// A successful apply
    pub fn done(address: Address, result: ApplyResult, record: RecordUpdate) -> Self {
        Self {
            address,
            result,
            record,
            error: None,
        }
    }

    /// A failed apply that leaves the tracked record alone
    pub fn failed(address: Address, error: ReconcileError) -> Self {
        Self::partial(address, RecordUpdate::Unchanged, error)
    }

    /// A failed apply that still changed part of the tracked record
    pub fn partial(address: Address, record: RecordUpdate, error: ReconcileError) -> Self {
        log::error!("{address}: {error}");
        Self {
            address,
            result: ApplyResult::Failed {
                error: error.to_string(),
            },
            record,
            error: Some(error),
        }
    }

    /// A resource that was not applied
    pub fn skipped(address: Address, reason: impl Into<String>) -> Self {
        Self::done(
            address,
            ApplyResult::Skipped {
                reason: reason.into(),
            },
            RecordUpdate::Unchanged,
        )
    }

    /// Build from a reconciler result
    pub fn from_result(
        address: &Address,
        result: crate::Result<(ApplyResult, Record)>,
    ) -> Self {
        match result {
            Ok((result, record)) => {
                Self::done(address.clone(), result, RecordUpdate::Set(record))
            }
            Err(error) => Self::failed(address.clone(), error),
        }
    }
}

/// Describe a field change for plan output
pub(crate) fn change(field: &str, from: &str, to: &str) -> Option<String> {
    (from != to).then(|| format!("{field}: {from:?} -> {to:?}"))
}
