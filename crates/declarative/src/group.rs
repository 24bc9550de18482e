//! Group reconciler
//!
//! Groups go `absent -> present` and never back: the API has no group
//! deletion, so destroying a group only stops tracking it.

use crate::error::{ReconcileError, Result};
use crate::resource::{Applied, RecordUpdate, Resource, change};
use crate::types::{Action, Address, ApplyResult, GroupRecord, GroupSpec, Kind, Observed, Record};
use directory::{Client, GroupRequest};
use std::sync::Arc;

/// Converges one group
pub struct GroupReconciler<'a> {
    client: &'a Client,
}

impl<'a> GroupReconciler<'a> {
    /// Create a reconciler over `client`
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    /// Decide what converging would do, without remote calls
    pub fn plan(previous: Option<&GroupRecord>, declared: &GroupSpec) -> Action {
        match previous {
            None => Action::Create,
            Some(previous) if previous.alias != declared.alias || differs(previous, declared) => {
                Action::Update
            }
            Some(_) => Action::NoChange,
        }
    }

    /// Create or update the group so it matches `declared`
    pub fn converge(
        &self,
        address: &Address,
        previous: Option<&GroupRecord>,
        declared: &GroupSpec,
    ) -> Result<(ApplyResult, GroupRecord)> {
        let request = GroupRequest {
            alias: declared.alias.clone(),
            description: declared.description.clone(),
            name: declared.effective_name().to_string(),
        };

        let Some(previous) = previous else {
            self.client
                .group_create(&request)
                .map_err(|e| ReconcileError::gateway(&declared.alias, e))?;
            log::info!("Created group {}", declared.alias);
            return Ok((ApplyResult::Created, self.read_back(&declared.alias)?));
        };

        if previous.alias != declared.alias {
            return Err(ReconcileError::ImmutableKeyViolation {
                address: address.clone(),
                field: "alias",
                from: previous.alias.clone(),
                to: declared.alias.clone(),
            });
        }

        if !differs(previous, declared) {
            return Ok((ApplyResult::NoChange, previous.clone()));
        }

        self.client
            .group_update(&request)
            .map_err(|e| ReconcileError::gateway(&declared.alias, e))?;
        log::info!("Updated group {}", declared.alias);
        Ok((ApplyResult::Modified, self.read_back(&declared.alias)?))
    }

    /// Read the group; a missing group is absent, not an error
    pub fn refresh(&self, alias: &str) -> Result<Observed<GroupRecord>> {
        match self.client.group_details(alias) {
            Ok(details) => Ok(Observed::Present(details.into())),
            Err(e) if e.is_not_found() => {
                log::debug!("Group {alias} not found");
                Ok(Observed::Absent)
            }
            Err(e) => Err(ReconcileError::gateway(alias, e)),
        }
    }

    /// Stop tracking a group.
    ///
    /// The API exposes no deletion, so the remote group stays in place.
    pub fn destroy(&self, record: &GroupRecord) -> ApplyResult {
        log::warn!(
            "Group {} cannot be deleted through the API; it is only dropped from state",
            record.alias
        );
        ApplyResult::Dropped {
            reason: "the API has no group deletion; remote group left in place".to_string(),
        }
    }

    /// Adopt an existing group
    pub fn import(&self, alias: &str) -> Result<GroupRecord> {
        self.refresh(alias)?
            .into_kept()
            .ok_or_else(|| ReconcileError::NotFound {
                kind: Kind::Group,
                key: alias.to_string(),
            })
    }

    fn read_back(&self, alias: &str) -> Result<GroupRecord> {
        self.import(alias)
    }
}

fn differs(previous: &GroupRecord, declared: &GroupSpec) -> bool {
    previous.description != declared.description || previous.name != declared.effective_name()
}

/// Group as a plan resource
#[derive(Debug)]
pub struct GroupResource {
    address: Address,
    client: Arc<Client>,
    previous: Option<GroupRecord>,
    declared: Option<GroupSpec>,
}

impl GroupResource {
    /// Create a resource; `declared` is `None` when the entry was removed
    pub fn new(
        address: Address,
        client: Arc<Client>,
        previous: Option<GroupRecord>,
        declared: Option<GroupSpec>,
    ) -> Self {
        Self {
            address,
            client,
            previous,
            declared,
        }
    }
}

impl Resource for GroupResource {
    fn address(&self) -> &Address {
        &self.address
    }

    fn description(&self) -> String {
        let alias = self
            .declared
            .as_ref()
            .map(|d| d.alias.as_str())
            .or_else(|| self.previous.as_ref().map(|p| p.alias.as_str()))
            .unwrap_or_default();
        format!("Group {alias}")
    }

    fn partition(&self) -> &str {
        match (&self.declared, &self.previous) {
            (Some(declared), _) => &declared.alias,
            (None, Some(previous)) => &previous.alias,
            (None, None) => "",
        }
    }

    fn action(&self) -> Action {
        match (&self.previous, &self.declared) {
            (previous, Some(declared)) => GroupReconciler::plan(previous.as_ref(), declared),
            (Some(_), None) => Action::Remove,
            (None, None) => Action::NoChange,
        }
    }

    fn changes(&self) -> Vec<String> {
        let (Some(previous), Some(declared)) = (&self.previous, &self.declared) else {
            return Vec::new();
        };
        [
            change("alias", &previous.alias, &declared.alias),
            change("description", &previous.description, &declared.description),
            change("name", &previous.name, declared.effective_name()),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    fn apply(&self) -> Applied {
        let reconciler = GroupReconciler::new(&self.client);
        match (&self.previous, &self.declared) {
            (previous, Some(declared)) => Applied::from_result(
                &self.address,
                reconciler
                    .converge(&self.address, previous.as_ref(), declared)
                    .map(|(result, record)| (result, Record::Group(record))),
            ),
            (Some(previous), None) => Applied::done(
                self.address.clone(),
                reconciler.destroy(previous),
                RecordUpdate::Remove,
            ),
            (None, None) => Applied::done(
                self.address.clone(),
                ApplyResult::NoChange,
                RecordUpdate::Unchanged,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use directory::{MemoryGateway, Operation};

    fn setup() -> (Client, MemoryGateway) {
        let remote = MemoryGateway::new();
        (Client::with_gateway(Box::new(remote.clone())), remote)
    }

    fn spec(alias: &str, description: &str) -> GroupSpec {
        GroupSpec {
            alias: alias.into(),
            description: description.into(),
            name: None,
        }
    }

    fn address() -> Address {
        Address::new(Kind::Group, "admins")
    }

    #[test]
    fn test_create_defaults_name_to_alias() {
        let (client, remote) = setup();
        let reconciler = GroupReconciler::new(&client);

        let (result, record) = reconciler
            .converge(&address(), None, &spec("admins", "d"))
            .unwrap();

        assert_eq!(result, ApplyResult::Created);
        assert_eq!(record.alias, "admins");
        assert_eq!(record.description, "d");
        assert_eq!(record.name, "admins");
        assert_eq!(remote.group("admins").unwrap().name, "admins");
    }

    #[test]
    fn test_converge_is_idempotent() {
        let (client, remote) = setup();
        let reconciler = GroupReconciler::new(&client);
        let declared = spec("admins", "d");

        let (_, first) = reconciler.converge(&address(), None, &declared).unwrap();
        remote.clear_calls();

        let (result, second) = reconciler
            .converge(&address(), Some(&first), &declared)
            .unwrap();

        assert_eq!(result, ApplyResult::NoChange);
        assert_eq!(first, second);
        assert!(remote.mutating_calls().is_empty());
    }

    #[test]
    fn test_update_description() {
        let (client, remote) = setup();
        let reconciler = GroupReconciler::new(&client);
        let (_, record) = reconciler
            .converge(&address(), None, &spec("admins", "d"))
            .unwrap();

        let declared = spec("admins", "d2");
        assert_eq!(
            GroupReconciler::plan(Some(&record), &declared),
            Action::Update
        );
        let (result, record) = reconciler
            .converge(&address(), Some(&record), &declared)
            .unwrap();

        assert_eq!(result, ApplyResult::Modified);
        assert_eq!(record.description, "d2");
        assert_eq!(record.alias, "admins");
        assert_eq!(record.name, "admins");
        assert_eq!(remote.group("admins").unwrap().description, "d2");
    }

    #[test]
    fn test_alias_change_fails_without_calls() {
        let (client, remote) = setup();
        let reconciler = GroupReconciler::new(&client);
        let (_, record) = reconciler
            .converge(&address(), None, &spec("admins", "d"))
            .unwrap();
        remote.clear_calls();

        let err = reconciler
            .converge(&address(), Some(&record), &spec("staff", "d"))
            .unwrap_err();

        assert!(matches!(
            err,
            ReconcileError::ImmutableKeyViolation { field: "alias", .. }
        ));
        assert!(!err.is_retryable());
        assert!(remote.calls().is_empty());
    }

    #[test]
    fn test_refresh_missing_is_absent() {
        let (client, _remote) = setup();
        let observed = GroupReconciler::new(&client).refresh("ghost").unwrap();
        assert_eq!(observed, Observed::Absent);
    }

    #[test]
    fn test_refresh_propagates_other_errors() {
        let (client, remote) = setup();
        remote.fail_next(Operation::GroupDetails, 500, "internal error");
        let err = GroupReconciler::new(&client).refresh("admins").unwrap_err();
        assert!(matches!(err, ReconcileError::RemoteRejected { status: 500, .. }));
    }

    #[test]
    fn test_create_conflict_surfaces() {
        let (client, remote) = setup();
        remote.insert_group("admins", "", "admins");
        let err = GroupReconciler::new(&client)
            .converge(&address(), None, &spec("admins", "d"))
            .unwrap_err();
        assert_eq!(err.category(), directory::ErrorCategory::Conflict);
    }

    #[test]
    fn test_destroy_is_acknowledged_noop() {
        let (client, remote) = setup();
        remote.insert_group("admins", "d", "admins");
        let record = GroupReconciler::new(&client).import("admins").unwrap();
        remote.clear_calls();

        let resource = GroupResource::new(address(), Arc::new(client), Some(record), None);
        assert_eq!(resource.action(), Action::Remove);
        let applied = resource.apply();

        assert!(matches!(applied.result, ApplyResult::Dropped { .. }));
        assert_eq!(applied.record, RecordUpdate::Remove);
        assert!(remote.calls().is_empty());
        assert!(remote.group("admins").is_some());
    }

    #[test]
    fn test_import_missing_group() {
        let (client, _remote) = setup();
        let err = GroupReconciler::new(&client).import("ghost").unwrap_err();
        assert!(matches!(err, ReconcileError::NotFound { kind: Kind::Group, .. }));
    }

    #[test]
    fn test_resource_changes() {
        let (client, _remote) = setup();
        let previous = GroupRecord {
            alias: "admins".into(),
            description: "d".into(),
            name: "admins".into(),
            create_time: None,
        };
        let resource = GroupResource::new(
            address(),
            Arc::new(client),
            Some(previous),
            Some(spec("admins", "d2")),
        );
        assert_eq!(resource.changes(), vec![r#"description: "d" -> "d2""#.to_string()]);
    }
}
