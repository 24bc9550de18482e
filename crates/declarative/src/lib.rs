//! # Declarative
//!
//! Reconciliation of declared directory entities against the remote.
//!
//! This crate compares what configuration declares with what was last
//! observed and issues the minimal calls that make the remote match.
//!
//! ## Core Concepts
//!
//! - **Spec / Record**: a declared entity and its last observed state
//! - **Reconciler**: per-kind convergence (`plan`, `converge`, `refresh`,
//!   `destroy`, `import`) over a [`directory::Client`]
//! - **Resource**: a reconciler bound to one address, as the executor sees it
//! - **ExecutionPlan**: resources ordered into phases
//! - **Executor**: applies phases with one task per group partition
//!
//! ## Example
//!
//! ```
//! use declarative::{
//!     Address, ExecuteOptions, ExecutionPlan, GroupResource, GroupSpec, Kind, execute_simple,
//! };
//! use directory::{Client, MemoryGateway};
//! use std::sync::Arc;
//!
//! let remote = MemoryGateway::new();
//! let client = Arc::new(Client::with_gateway(Box::new(remote.clone())));
//!
//! let mut plan = ExecutionPlan::new();
//! plan.add(Box::new(GroupResource::new(
//!     Address::new(Kind::Group, "admins"),
//!     client,
//!     None,
//!     Some(GroupSpec {
//!         alias: "admins".into(),
//!         description: "d".into(),
//!         name: None,
//!     }),
//! )));
//!
//! let report = execute_simple(plan, ExecuteOptions::default()).unwrap();
//! assert_eq!(report.summary.created, 1);
//! assert!(remote.group("admins").is_some());
//! ```
//!
//! ## Provider Traits
//!
//! - [`ProgressCallback`]: receives progress updates
//! - [`ConfirmCallback`]: handles user confirmations
//!
//! This allows the crate to be used without hard dependencies on
//! specific UI frameworks.

pub mod context;
pub mod diff;
pub mod error;
pub mod executor;
pub mod group;
pub mod identity;
pub mod identity_set;
pub mod key;
pub mod membership;
pub mod observe;
pub mod planner;
pub mod recovery;
pub mod resource;
pub mod types;
pub mod username;

pub use context::{AutoConfirm, AutoDecline, ConfirmCallback, NoProgress, ProgressCallback};
pub use diff::{CollectionDiff, DiffSummary, ResourceDiff, compute_diffs, group_by_kind};
pub use error::{KeyFailure, ReconcileError, Result};
pub use executor::{ExecuteReport, execute, execute_simple};
pub use group::{GroupReconciler, GroupResource};
pub use identity::{IdentityReconciler, IdentityResource};
pub use identity_set::{BatchOutcome, IdentitySetReconciler, IdentitySetResource};
pub use key::CompositeKey;
pub use membership::{MembershipReconciler, MembershipResource};
pub use planner::{ExecutionPlan, Phase, Target};
pub use recovery::{CreateOutcome, CreateState, RecoveryOps, RecoveryStep};
pub use resource::{Applied, BoxedResource, RecordUpdate, Resource};
pub use types::{
    Action, Address, ApplyResult, ExecuteOptions, ExecuteSummary, GroupRecord, GroupSpec,
    IdentityEntry, IdentityRecord, IdentitySetRecord, IdentitySetSpec, IdentitySpec, Kind,
    MembershipRecord, MembershipSpec, Observed, Record,
};
