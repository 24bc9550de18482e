//! Membership reconciler
//!
//! One edge between a group and a username. Adding an edge that exists or
//! removing one that does not both count as success.

use crate::error::{ReconcileError, Result};
use crate::key::CompositeKey;
use crate::resource::{Applied, RecordUpdate, Resource, change};
use crate::types::{
    Action, Address, ApplyResult, Kind, MembershipRecord, MembershipSpec, Observed, Record,
};
use crate::username;
use directory::{Client, Member, MemberRequest};
use std::sync::Arc;

fn edge_key(group_alias: &str, username: &str) -> String {
    format!("{group_alias},{username}")
}

/// Attach `username` to `group_alias`.
///
/// Returns `false` when the edge already existed.
pub fn attach(client: &Client, group_alias: &str, username: &str) -> Result<bool> {
    match client.group_add_user(&MemberRequest::new(group_alias, username)) {
        Ok(()) => Ok(true),
        Err(e) if e.is_conflict() => {
            log::debug!("{username} is already a member of {group_alias}");
            Ok(false)
        }
        Err(e) => Err(ReconcileError::gateway(edge_key(group_alias, username), e)),
    }
}

/// Detach `username` from `group_alias`.
///
/// Returns `false` when the edge was already gone.
pub fn detach(client: &Client, group_alias: &str, username: &str) -> Result<bool> {
    match client.group_remove_user(&MemberRequest::new(group_alias, username)) {
        Ok(()) => Ok(true),
        Err(e) if e.is_not_found() => {
            log::debug!("{username} is already not a member of {group_alias}");
            Ok(false)
        }
        Err(e) => Err(ReconcileError::gateway(edge_key(group_alias, username), e)),
    }
}

/// List a group's members; `None` when the group does not exist
pub fn list_members(client: &Client, group_alias: &str) -> Result<Option<Vec<Member>>> {
    match client.group_members(group_alias) {
        Ok(members) => Ok(Some(members)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(ReconcileError::gateway(group_alias, e)),
    }
}

/// Find a member by username equivalence
pub fn find_member<'m>(members: &'m [Member], username: &str) -> Option<&'m Member> {
    members
        .iter()
        .find(|m| username::equivalent(&m.username, username))
}

/// Converges one membership edge
pub struct MembershipReconciler<'a> {
    client: &'a Client,
}

impl<'a> MembershipReconciler<'a> {
    /// Create a reconciler over `client`
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    /// Decide what converging would do, without remote calls
    pub fn plan(previous: Option<&MembershipRecord>, declared: &MembershipSpec) -> Action {
        match previous {
            None => Action::Create,
            Some(previous) if previous.matches(declared) => Action::NoChange,
            Some(_) => Action::Replace,
        }
    }

    /// Make the declared edge exist; a changed edge is replaced
    pub fn converge(
        &self,
        previous: Option<&MembershipRecord>,
        declared: &MembershipSpec,
    ) -> Result<(ApplyResult, MembershipRecord)> {
        match previous {
            Some(previous) if previous.matches(declared) => {
                Ok((ApplyResult::NoChange, previous.clone()))
            }
            Some(previous) => {
                self.remove(previous)?;
                self.add(declared)?;
                Ok((ApplyResult::Modified, declared.into()))
            }
            None => Ok((self.add(declared)?, declared.into())),
        }
    }

    /// Add the edge
    pub fn add(&self, declared: &MembershipSpec) -> Result<ApplyResult> {
        if attach(self.client, &declared.group_alias, &declared.username)? {
            log::info!("Added {} to {}", declared.username, declared.group_alias);
            Ok(ApplyResult::Created)
        } else {
            Ok(ApplyResult::NoChange)
        }
    }

    /// Remove the edge
    pub fn remove(&self, record: &MembershipRecord) -> Result<ApplyResult> {
        detach(self.client, &record.group_alias, &record.username)?;
        log::info!("Removed {} from {}", record.username, record.group_alias);
        Ok(ApplyResult::Removed)
    }

    /// Check that the edge still exists.
    ///
    /// A vanished edge is drift: it is reported, not re-added.
    pub fn refresh(&self, record: &MembershipRecord) -> Result<Observed<MembershipRecord>> {
        let Some(members) = list_members(self.client, &record.group_alias)? else {
            log::debug!("Group {} not found", record.group_alias);
            return Ok(Observed::Absent);
        };

        match find_member(&members, &record.username) {
            Some(member) => Ok(Observed::Present(MembershipRecord {
                group_alias: record.group_alias.clone(),
                username: member.username.clone(),
            })),
            None => {
                let detail = format!(
                    "{} is no longer a member of {}",
                    record.username, record.group_alias
                );
                log::warn!("{detail}");
                Ok(Observed::Drifted { kept: None, detail })
            }
        }
    }

    /// Adopt an existing edge given `<group_alias>,<username>`
    pub fn import(&self, id: &str) -> Result<MembershipRecord> {
        let key: CompositeKey = id.parse()?;
        let record = MembershipRecord {
            group_alias: key.group_alias,
            username: key.username,
        };
        self.refresh(&record)?
            .into_kept()
            .ok_or_else(|| ReconcileError::NotFound {
                kind: Kind::Member,
                key: id.to_string(),
            })
    }
}

/// Membership as a plan resource
#[derive(Debug)]
pub struct MembershipResource {
    address: Address,
    client: Arc<Client>,
    previous: Option<MembershipRecord>,
    declared: Option<MembershipSpec>,
}

impl MembershipResource {
    /// Create a resource; `declared` is `None` when the entry was removed
    pub fn new(
        address: Address,
        client: Arc<Client>,
        previous: Option<MembershipRecord>,
        declared: Option<MembershipSpec>,
    ) -> Self {
        Self {
            address,
            client,
            previous,
            declared,
        }
    }
}

impl Resource for MembershipResource {
    fn address(&self) -> &Address {
        &self.address
    }

    fn description(&self) -> String {
        match (&self.declared, &self.previous) {
            (Some(d), _) => format!("Member {} of {}", d.username, d.group_alias),
            (None, Some(p)) => format!("Member {} of {}", p.username, p.group_alias),
            (None, None) => "Member".to_string(),
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
            (previous, Some(declared)) => MembershipReconciler::plan(previous.as_ref(), declared),
            (Some(_), None) => Action::Remove,
            (None, None) => Action::NoChange,
        }
    }

    fn changes(&self) -> Vec<String> {
        let (Some(previous), Some(declared)) = (&self.previous, &self.declared) else {
            return Vec::new();
        };
        if previous.matches(declared) {
            return Vec::new();
        }
        [
            change("group_alias", &previous.group_alias, &declared.group_alias),
            change("username", &previous.username, &declared.username),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    fn apply(&self) -> Applied {
        let reconciler = MembershipReconciler::new(&self.client);
        match (&self.previous, &self.declared) {
            (previous, Some(declared)) => Applied::from_result(
                &self.address,
                reconciler
                    .converge(previous.as_ref(), declared)
                    .map(|(result, record)| (result, Record::Member(record))),
            ),
            (Some(previous), None) => match reconciler.remove(previous) {
                Ok(result) => Applied::done(self.address.clone(), result, RecordUpdate::Remove),
                Err(error) => Applied::failed(self.address.clone(), error),
            },
            (None, None) => Applied::done(
                self.address.clone(),
                ApplyResult::NoChange,
                RecordUpdate::Unchanged,
            ),
        }
    }
}
