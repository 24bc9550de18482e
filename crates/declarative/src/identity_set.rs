//! Bulk identity set reconciler
//!
//! A set owns every identity it declares in one group. Convergence removes
//! what is no longer declared, then re-submits everything declared: one
//! `identity.bulkCreate` first, falling back to the per-identity
//! create/recover path when the batch is rejected. Per-key failures never
//! abort the batch and are reported together.

use crate::diff::CollectionDiff;
use crate::error::{KeyFailure, ReconcileError, Result};
use crate::identity::{CreateSteps, change_password};
use crate::membership::{detach, find_member, list_members};
use crate::recovery::{self, CreateOutcome};
use crate::resource::{Applied, RecordUpdate, Resource};
use crate::types::{
    Action, Address, ApplyResult, IdentityEntry, IdentitySetRecord, IdentitySetSpec, Observed,
    Record,
};
use directory::{BulkCreateRequest, Client};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Result of a batch operation
///
/// `record` reflects everything that succeeded, even when `failures` is
/// not empty.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    /// Overall result when no key failed
    pub result: ApplyResult,
    /// Identities confirmed in the group afterwards
    pub record: IdentitySetRecord,
    /// Keys that failed
    pub failures: Vec<KeyFailure>,
}

impl BatchOutcome {
    /// Per-key failures as one error, if any
    pub fn error(&self, address: &Address) -> Option<ReconcileError> {
        (!self.failures.is_empty()).then(|| ReconcileError::Batch {
            address: address.clone(),
            failures: self.failures.clone(),
        })
    }
}

/// Converges a bulk identity set
pub struct IdentitySetReconciler<'a> {
    client: &'a Client,
}

impl<'a> IdentitySetReconciler<'a> {
    /// Create a reconciler over `client`
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    /// Decide what converging would do, without remote calls
    pub fn plan(previous: Option<&IdentitySetRecord>, declared: &IdentitySetSpec) -> Action {
        let Some(previous) = previous else {
            return Action::Create;
        };
        if previous.group_alias != declared.group_alias {
            return Action::Update;
        }

        let diff = CollectionDiff::compute(previous.usernames(), declared_usernames(declared));
        let entry_changed = declared.identities.iter().any(|entry| {
            previous
                .get(&entry.username)
                .is_some_and(|p| p.attributes_differ(entry) || p.password != entry.password)
        });

        if diff.changes_membership() || entry_changed {
            Action::Update
        } else {
            Action::NoChange
        }
    }

    /// Converge the set to `declared`
    ///
    /// Only an immutable key violation is returned as an error; everything
    /// else is collected per key in the outcome.
    pub fn converge(
        &self,
        address: &Address,
        previous: Option<&IdentitySetRecord>,
        declared: &IdentitySetSpec,
    ) -> Result<BatchOutcome> {
        if let Some(previous) = previous {
            if previous.group_alias != declared.group_alias {
                return Err(ReconcileError::ImmutableKeyViolation {
                    address: address.clone(),
                    field: "group_alias",
                    from: previous.group_alias.clone(),
                    to: declared.group_alias.clone(),
                });
            }
        }

        let group_alias = declared.group_alias.as_str();
        let empty = IdentitySetRecord {
            group_alias: group_alias.to_string(),
            identities: Vec::new(),
        };
        let previous = previous.unwrap_or(&empty);
        let diff = CollectionDiff::compute(previous.usernames(), declared_usernames(declared));
        log::debug!(
            "{address}: {} to add, {} to remove, {} to update",
            diff.to_add.len(),
            diff.to_remove.len(),
            diff.to_update.len()
        );

        let mut confirmed: BTreeMap<String, IdentityEntry> = BTreeMap::new();
        let mut failures = Vec::new();

        for username in &diff.to_remove {
            match detach(self.client, group_alias, username) {
                Ok(_) => log::info!("{address}: removed {username}"),
                Err(error) => {
                    failures.push(KeyFailure {
                        key: username.clone(),
                        error,
                    });
                    if let Some(entry) = previous.get(username) {
                        confirmed.insert(username.clone(), entry.clone());
                    }
                }
            }
        }

        let submitted = self.submit(address, group_alias, &declared.identities, &mut failures);

        for entry in &declared.identities {
            let Some(outcome) = submitted.get(entry.username.as_str()) else {
                // The create failed; an identity that was confirmed before
                // still exists with its previous attributes.
                if let Some(previous_entry) = previous.get(&entry.username) {
                    confirmed.insert(entry.username.clone(), previous_entry.clone());
                }
                continue;
            };

            let needs_password = match previous.get(&entry.username) {
                Some(previous_entry) => previous_entry.password != entry.password,
                None => *outcome == CreateOutcome::Recovered,
            };
            if needs_password {
                if let Err(error) = change_password(self.client, group_alias, entry) {
                    failures.push(KeyFailure {
                        key: entry.username.clone(),
                        error,
                    });
                    let mut kept = entry.clone();
                    kept.password = previous
                        .get(&entry.username)
                        .map(|p| p.password.clone())
                        .unwrap_or_default();
                    confirmed.insert(entry.username.clone(), kept);
                    continue;
                }
            }

            confirmed.insert(entry.username.clone(), entry.clone());
        }

        let result = if previous.identities.is_empty() && diff.to_remove.is_empty() {
            ApplyResult::Created
        } else {
            ApplyResult::Modified
        };

        Ok(BatchOutcome {
            result,
            record: IdentitySetRecord {
                group_alias: group_alias.to_string(),
                identities: confirmed.into_values().collect(),
            },
            failures,
        })
    }

    /// Create every entry, by batch or one by one.
    ///
    /// Returns the usernames that now exist in the group.
    fn submit<'e>(
        &self,
        address: &Address,
        group_alias: &str,
        entries: &'e [IdentityEntry],
        failures: &mut Vec<KeyFailure>,
    ) -> BTreeMap<&'e str, CreateOutcome> {
        if entries.is_empty() {
            return BTreeMap::new();
        }

        let request = BulkCreateRequest {
            group_alias: group_alias.to_string(),
            identities: entries
                .iter()
                .map(|entry| entry.create_request(group_alias))
                .collect(),
        };
        match self.client.identity_bulk_create(&request) {
            Ok(()) => {
                log::info!("{address}: created {} identities in one batch", entries.len());
                return entries
                    .iter()
                    .map(|entry| (entry.username.as_str(), CreateOutcome::Created))
                    .collect();
            }
            Err(e) => {
                log::warn!("{address}: batch create rejected ({e}); submitting one by one");
            }
        }

        let mut submitted = BTreeMap::new();
        for entry in entries {
            match recovery::run(&CreateSteps::new(self.client, group_alias, entry)) {
                Ok(outcome) => {
                    submitted.insert(entry.username.as_str(), outcome);
                }
                Err(error) => failures.push(KeyFailure {
                    key: entry.username.clone(),
                    error,
                }),
            }
        }
        submitted
    }

    /// Keep only the identities the group still lists
    pub fn refresh(&self, record: &IdentitySetRecord) -> Result<Observed<IdentitySetRecord>> {
        let Some(members) = list_members(self.client, &record.group_alias)? else {
            return Ok(Observed::Absent);
        };

        let mut kept = Vec::with_capacity(record.identities.len());
        let mut dropped = Vec::new();
        for entry in &record.identities {
            match find_member(&members, &entry.username) {
                Some(member) => {
                    let mut entry = entry.clone();
                    entry.absorb_attributes(member);
                    kept.push(entry);
                }
                None => dropped.push(entry.username.as_str()),
            }
        }
        kept.sort_by(|a, b| a.username.cmp(&b.username));

        let observed = IdentitySetRecord {
            group_alias: record.group_alias.clone(),
            identities: kept,
        };
        if dropped.is_empty() {
            return Ok(Observed::Present(observed));
        }

        let detail = format!(
            "no longer in group {}: {}",
            record.group_alias,
            dropped.join(", ")
        );
        log::warn!("{detail}");
        Ok(Observed::Drifted {
            kept: Some(observed),
            detail,
        })
    }

    /// Detach every tracked identity; accounts stay
    ///
    /// The outcome record holds the identities whose removal failed.
    pub fn destroy(&self, record: &IdentitySetRecord) -> BatchOutcome {
        let mut remaining = Vec::new();
        let mut failures = Vec::new();

        for entry in &record.identities {
            if let Err(error) = detach(self.client, &record.group_alias, &entry.username) {
                failures.push(KeyFailure {
                    key: entry.username.clone(),
                    error,
                });
                remaining.push(entry.clone());
            }
        }
        log::info!(
            "Removed {} identities from {}",
            record.identities.len() - remaining.len(),
            record.group_alias
        );

        BatchOutcome {
            result: ApplyResult::Removed,
            record: IdentitySetRecord {
                group_alias: record.group_alias.clone(),
                identities: remaining,
            },
            failures,
        }
    }
}

fn declared_usernames(declared: &IdentitySetSpec) -> impl Iterator<Item = &str> {
    declared.identities.iter().map(|i| i.username.as_str())
}

/// Identity set as a plan resource
#[derive(Debug)]
pub struct IdentitySetResource {
    address: Address,
    client: Arc<Client>,
    previous: Option<IdentitySetRecord>,
    declared: Option<IdentitySetSpec>,
}

impl IdentitySetResource {
    /// Create a resource; `declared` is `None` when the entry was removed
    pub fn new(
        address: Address,
        client: Arc<Client>,
        previous: Option<IdentitySetRecord>,
        declared: Option<IdentitySetSpec>,
    ) -> Self {
        Self {
            address,
            client,
            previous,
            declared,
        }
    }

    fn batch_applied(&self, outcome: BatchOutcome, record: RecordUpdate) -> Applied {
        match outcome.error(&self.address) {
            None => Applied::done(self.address.clone(), outcome.result, record),
            Some(error) => Applied::partial(self.address.clone(), record, error),
        }
    }
}

impl Resource for IdentitySetResource {
    fn address(&self) -> &Address {
        &self.address
    }

    fn description(&self) -> String {
        match (&self.declared, &self.previous) {
            (Some(d), _) => format!(
                "Identity set of {} in {}",
                d.identities.len(),
                d.group_alias
            ),
            (None, Some(p)) => format!(
                "Identity set of {} in {}",
                p.identities.len(),
                p.group_alias
            ),
            (None, None) => "Identity set".to_string(),
        }
    }

    fn partition(&self) -> &str {
        match (&self.declared, &self.previous) {
            (Some(declared), _) => &declared.group_alias,
            (None, Some(previous)) => &previous.group_alias,
            (None, None) => "",
        }
    }

    fn action(&self) -> Action {
        match (&self.previous, &self.declared) {
            (previous, Some(declared)) => IdentitySetReconciler::plan(previous.as_ref(), declared),
            (Some(_), None) => Action::Remove,
            (None, None) => Action::NoChange,
        }
    }

    fn changes(&self) -> Vec<String> {
        let Some(declared) = &self.declared else {
            return Vec::new();
        };
        let previous_usernames: Vec<&str> = self
            .previous
            .iter()
            .flat_map(|p| p.usernames())
            .collect();
        let diff = CollectionDiff::compute(previous_usernames, declared_usernames(declared));

        let mut changes: Vec<String> = diff.to_add.iter().map(|u| format!("+ {u}")).collect();
        changes.extend(diff.to_remove.iter().map(|u| format!("- {u}")));
        if let Some(previous) = &self.previous {
            changes.extend(
                declared
                    .identities
                    .iter()
                    .filter(|entry| {
                        previous.get(&entry.username).is_some_and(|p| {
                            p.attributes_differ(entry) || p.password != entry.password
                        })
                    })
                    .map(|entry| format!("~ {}", entry.username)),
            );
        }
        changes
    }

    fn apply(&self) -> Applied {
        let reconciler = IdentitySetReconciler::new(&self.client);
        match (&self.previous, &self.declared) {
            (previous, Some(declared)) => {
                match reconciler.converge(&self.address, previous.as_ref(), declared) {
                    Ok(outcome) => {
                        let record =
                            RecordUpdate::Set(Record::IdentitySet(outcome.record.clone()));
                        self.batch_applied(outcome, record)
                    }
                    Err(error) => Applied::failed(self.address.clone(), error),
                }
            }
            (Some(previous), None) => {
                let outcome = reconciler.destroy(previous);
                let record = if outcome.failures.is_empty() {
                    RecordUpdate::Remove
                } else {
                    RecordUpdate::Set(Record::IdentitySet(outcome.record.clone()))
                };
                self.batch_applied(outcome, record)
            }
            (None, None) => Applied::done(
                self.address.clone(),
                ApplyResult::NoChange,
                RecordUpdate::Unchanged,
            ),
        }
    }
}
