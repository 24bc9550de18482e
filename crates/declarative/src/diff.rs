//! Diff computation
//!
//! [`CollectionDiff`] is the set arithmetic used by bulk identity sets.
//! [`ResourceDiff`] and [`DiffSummary`] describe a whole plan for display.

use crate::resource::Resource;
use crate::types::{Action, Kind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Set difference between previously confirmed and declared keys
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionDiff {
    /// Declared but not previously confirmed
    pub to_add: BTreeSet<String>,
    /// Previously confirmed but no longer declared
    pub to_remove: BTreeSet<String>,
    /// Both confirmed and declared
    pub to_update: BTreeSet<String>,
}

impl CollectionDiff {
    /// Compute the diff of `previous` against `declared`
    pub fn compute<'a>(
        previous: impl IntoIterator<Item = &'a str>,
        declared: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        let previous: BTreeSet<String> = previous.into_iter().map(str::to_string).collect();
        let declared: BTreeSet<String> = declared.into_iter().map(str::to_string).collect();

        Self {
            to_add: declared.difference(&previous).cloned().collect(),
            to_remove: previous.difference(&declared).cloned().collect(),
            to_update: declared.intersection(&previous).cloned().collect(),
        }
    }

    /// Whether membership of the collection changes
    pub fn changes_membership(&self) -> bool {
        !self.to_add.is_empty() || !self.to_remove.is_empty()
    }
}

/// A planned change to one resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDiff {
    /// Address of the resource
    pub address: String,
    /// Kind of the resource
    pub kind: Kind,
    /// Human-readable description
    pub description: String,
    /// What will happen
    pub action: Action,
    /// Attribute-level changes, `field: from -> to`
    pub changes: Vec<String>,
}

impl ResourceDiff {
    /// Create a diff from a resource, returning None if no changes needed
    pub fn from_resource(resource: &dyn Resource) -> Option<Self> {
        let action = resource.action();
        if !action.is_change() {
            return None;
        }
        Some(Self {
            address: resource.address().to_string(),
            kind: resource.address().kind,
            description: resource.description(),
            action,
            changes: resource.changes(),
        })
    }
}

/// Compute diffs for a list of resources
///
/// Returns only resources that need changes.
pub fn compute_diffs(resources: &[Box<dyn Resource>]) -> Vec<ResourceDiff> {
    resources
        .iter()
        .filter_map(|r| ResourceDiff::from_resource(r.as_ref()))
        .collect()
}

/// Diff summary statistics
#[derive(Debug, Clone, Default)]
pub struct DiffSummary {
    /// Number of resources to create
    pub additions: usize,
    /// Number of resources to remove
    pub removals: usize,
    /// Number of resources to update in place
    pub modifications: usize,
    /// Number of resources to replace
    pub replacements: usize,
}

impl DiffSummary {
    /// Create a summary from a list of diffs
    pub fn from_diffs(diffs: &[ResourceDiff]) -> Self {
        let mut summary = Self::default();
        for diff in diffs {
            match diff.action {
                Action::Create => summary.additions += 1,
                Action::Remove => summary.removals += 1,
                Action::Update => summary.modifications += 1,
                Action::Replace => summary.replacements += 1,
                Action::NoChange => {}
            }
        }
        summary
    }

    /// Total number of changes
    pub fn total(&self) -> usize {
        self.additions + self.removals + self.modifications + self.replacements
    }

    /// Check if there are any changes
    pub fn has_changes(&self) -> bool {
        self.total() > 0
    }
}

/// Group diffs by kind
pub fn group_by_kind(diffs: &[ResourceDiff]) -> BTreeMap<Kind, Vec<&ResourceDiff>> {
    let mut groups: BTreeMap<Kind, Vec<&ResourceDiff>> = BTreeMap::new();
    for diff in diffs {
        groups.entry(diff.kind).or_default().push(diff);
    }
    groups
}
