//! Identity reconciler
//!
//! Creation goes through the recovery machine in [`crate::recovery`].
//! Updates always send the old and the new username; password changes go
//! through their own operation and are judged against the recorded
//! password, since the remote never returns it.

use crate::error::{ReconcileError, Result};
use crate::key::CompositeKey;
use crate::membership::{attach, detach, find_member, list_members};
use crate::recovery::{self, CreateOutcome, RecoveryOps};
use crate::resource::{Applied, RecordUpdate, Resource, change};
use crate::types::{
    Action, Address, ApplyResult, IdentityEntry, IdentityRecord, IdentitySpec, Kind, Observed,
    Record,
};
use directory::{ChangePasswordRequest, Client};
use std::sync::Arc;

/// Recovery steps for one identity in one group
pub(crate) struct CreateSteps<'a> {
    client: &'a Client,
    group_alias: &'a str,
    entry: &'a IdentityEntry,
}

impl<'a> CreateSteps<'a> {
    pub(crate) fn new(client: &'a Client, group_alias: &'a str, entry: &'a IdentityEntry) -> Self {
        Self {
            client,
            group_alias,
            entry,
        }
    }
}

impl RecoveryOps for CreateSteps<'_> {
    fn key(&self) -> &str {
        &self.entry.username
    }

    fn create(&self) -> Result<()> {
        self.client
            .identity_create(&self.entry.create_request(self.group_alias))
            .map(drop)
            .map_err(|e| ReconcileError::gateway(self.key(), e))
    }

    fn probe_update(&self) -> Result<()> {
        let request = self
            .entry
            .update_request(self.group_alias, &self.entry.username);
        self.client
            .identity_update(&request)
            .map_err(|e| ReconcileError::gateway(self.key(), e))
    }

    fn ensure_membership(&self) -> Result<()> {
        attach(self.client, self.group_alias, &self.entry.username).map(drop)
    }
}

/// Send a new password
pub(crate) fn change_password(
    client: &Client,
    group_alias: &str,
    entry: &IdentityEntry,
) -> Result<()> {
    client
        .identity_change_password(&ChangePasswordRequest {
            group_alias: group_alias.to_string(),
            username: entry.username.clone(),
            password: entry.password.clone(),
        })
        .map_err(|e| ReconcileError::gateway(&entry.username, e))
}

/// Converges one identity
pub struct IdentityReconciler<'a> {
    client: &'a Client,
}

impl<'a> IdentityReconciler<'a> {
    /// Create a reconciler over `client`
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    /// Decide what converging would do, without remote calls
    pub fn plan(previous: Option<&IdentityRecord>, declared: &IdentitySpec) -> Action {
        match previous {
            None => Action::Create,
            Some(previous)
                if previous.group_alias != declared.group_alias
                    || previous.entry.attributes_differ(&declared.entry)
                    || previous.entry.password != declared.entry.password =>
            {
                Action::Update
            }
            Some(_) => Action::NoChange,
        }
    }

    /// Create or update the identity so it matches `declared`
    pub fn converge(
        &self,
        address: &Address,
        previous: Option<&IdentityRecord>,
        declared: &IdentitySpec,
    ) -> Result<(ApplyResult, IdentityRecord)> {
        match previous {
            None => self.create(declared),
            Some(previous) => self.update(address, previous, declared),
        }
    }

    /// Create the identity, recovering when it already exists
    pub fn create(&self, declared: &IdentitySpec) -> Result<(ApplyResult, IdentityRecord)> {
        let steps = CreateSteps::new(self.client, &declared.group_alias, &declared.entry);
        let result = match recovery::run(&steps)? {
            CreateOutcome::Created => {
                log::info!("Created identity {}", declared.entry.username);
                ApplyResult::Created
            }
            CreateOutcome::Recovered => ApplyResult::Recovered,
        };
        Ok((result, self.read_back(IdentityRecord::from(declared))?))
    }

    /// Update attributes and password of an existing identity
    pub fn update(
        &self,
        address: &Address,
        previous: &IdentityRecord,
        declared: &IdentitySpec,
    ) -> Result<(ApplyResult, IdentityRecord)> {
        if previous.group_alias != declared.group_alias {
            return Err(ReconcileError::ImmutableKeyViolation {
                address: address.clone(),
                field: "group_alias",
                from: previous.group_alias.clone(),
                to: declared.group_alias.clone(),
            });
        }

        let mut changed = false;

        if previous.entry.attributes_differ(&declared.entry) {
            let request = declared
                .entry
                .update_request(&declared.group_alias, &previous.entry.username);
            self.client
                .identity_update(&request)
                .map_err(|e| ReconcileError::gateway(&previous.entry.username, e))?;
            log::info!("Updated identity {}", declared.entry.username);
            changed = true;
        }

        if previous.entry.password != declared.entry.password {
            change_password(self.client, &declared.group_alias, &declared.entry)?;
            log::info!("Changed password of {}", declared.entry.username);
            changed = true;
        }

        if !changed {
            return Ok((ApplyResult::NoChange, previous.clone()));
        }

        Ok((
            ApplyResult::Modified,
            self.read_back(IdentityRecord::from(declared))?,
        ))
    }

    /// Look the identity up among its group's members.
    ///
    /// A missing identity is drift and yields no record. Password and school
    /// are not reported by the remote and keep their recorded values.
    pub fn read(&self, record: &IdentityRecord) -> Result<Observed<IdentityRecord>> {
        let Some(members) = list_members(self.client, &record.group_alias)? else {
            return Ok(Observed::Absent);
        };

        match find_member(&members, &record.entry.username) {
            Some(member) => {
                let mut observed = record.clone();
                observed.entry.absorb(member);
                Ok(Observed::Present(observed))
            }
            None => {
                let detail = format!(
                    "identity {} is no longer in group {}",
                    record.entry.username, record.group_alias
                );
                log::warn!("{detail}");
                Ok(Observed::Drifted { kept: None, detail })
            }
        }
    }

    /// Detach the identity from its group; the account itself stays
    pub fn destroy(&self, record: &IdentityRecord) -> Result<ApplyResult> {
        detach(self.client, &record.group_alias, &record.entry.username)?;
        log::info!(
            "Removed identity {} from {} (accounts cannot be deleted)",
            record.entry.username,
            record.group_alias
        );
        Ok(ApplyResult::Removed)
    }

    /// Adopt an existing identity given `<group_alias>,<username>`
    ///
    /// The password is unknown, so the next apply sets it.
    pub fn import(&self, id: &str) -> Result<IdentityRecord> {
        let key: CompositeKey = id.parse()?;
        let skeleton = IdentityRecord {
            group_alias: key.group_alias,
            entry: IdentityEntry {
                username: key.username,
                name: String::new(),
                gender: String::new(),
                password: String::new(),
                school_name: String::new(),
                country_id: String::new(),
                state_id: String::new(),
            },
        };
        self.read(&skeleton)?
            .into_kept()
            .ok_or_else(|| ReconcileError::NotFound {
                kind: Kind::Identity,
                key: id.to_string(),
            })
    }

    fn read_back(&self, expected: IdentityRecord) -> Result<IdentityRecord> {
        let username = expected.entry.username.clone();
        self.read(&expected)?
            .into_kept()
            .ok_or(ReconcileError::NotFound {
                kind: Kind::Identity,
                key: username,
            })
    }
}

/// Identity as a plan resource
#[derive(Debug)]
pub struct IdentityResource {
    address: Address,
    client: Arc<Client>,
    previous: Option<IdentityRecord>,
    declared: Option<IdentitySpec>,
}

impl IdentityResource {
    /// Create a resource; `declared` is `None` when the entry was removed
    pub fn new(
        address: Address,
        client: Arc<Client>,
        previous: Option<IdentityRecord>,
        declared: Option<IdentitySpec>,
    ) -> Self {
        Self {
            address,
            client,
            previous,
            declared,
        }
    }
}

impl Resource for IdentityResource {
    fn address(&self) -> &Address {
        &self.address
    }

    fn description(&self) -> String {
        match (&self.declared, &self.previous) {
            (Some(d), _) => format!("Identity {} in {}", d.entry.username, d.group_alias),
            (None, Some(p)) => format!("Identity {} in {}", p.entry.username, p.group_alias),
            (None, None) => "Identity".to_string(),
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
            (previous, Some(declared)) => IdentityReconciler::plan(previous.as_ref(), declared),
            (Some(_), None) => Action::Remove,
            (None, None) => Action::NoChange,
        }
    }

    fn changes(&self) -> Vec<String> {
        let (Some(previous), Some(declared)) = (&self.previous, &self.declared) else {
            return Vec::new();
        };
        let (p, d) = (&previous.entry, &declared.entry);
        let mut changes: Vec<String> = [
            change("group_alias", &previous.group_alias, &declared.group_alias),
            change("name", &p.name, &d.name),
            change("gender", &p.gender, &d.gender),
            change("school_name", &p.school_name, &d.school_name),
            change("country_id", &p.country_id, &d.country_id),
            change("state_id", &p.state_id, &d.state_id),
        ]
        .into_iter()
        .flatten()
        .collect();
        if p.attributes_differ(d) {
            changes.extend(change("username", &p.username, &d.username));
        }
        if p.password != d.password {
            changes.push("password: (changed)".to_string());
        }
        changes
    }

    fn apply(&self) -> Applied {
        let reconciler = IdentityReconciler::new(&self.client);
        match (&self.previous, &self.declared) {
            (previous, Some(declared)) => Applied::from_result(
                &self.address,
                reconciler
                    .converge(&self.address, previous.as_ref(), declared)
                    .map(|(result, record)| (result, Record::Identity(record))),
            ),
            (Some(previous), None) => match reconciler.destroy(previous) {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recovery::RecoveryStep;
    use directory::backend::memory::Account;
    use directory::{MemoryGateway, Operation};

    fn setup() -> (Client, MemoryGateway) {
        let remote = MemoryGateway::new();
        remote.insert_group("g", "", "g");
        (Client::with_gateway(Box::new(remote.clone())), remote)
    }

    fn entry(username: &str) -> IdentityEntry {
        IdentityEntry {
            username: username.into(),
            name: "User".into(),
            gender: "female".into(),
            password: "secret".into(),
            school_name: "School".into(),
            country_id: "MX".into(),
            state_id: "AGU".into(),
        }
    }

    fn spec(username: &str) -> IdentitySpec {
        IdentitySpec {
            group_alias: "g".into(),
            entry: entry(username),
        }
    }

    fn address() -> Address {
        Address::new(Kind::Identity, "u")
    }

    #[test]
    fn test_create() {
        let (client, remote) = setup();
        let (result, record) = IdentityReconciler::new(&client)
            .converge(&address(), None, &spec("g:u"))
            .unwrap();

        assert_eq!(result, ApplyResult::Created);
        assert_eq!(record.entry.username, "g:u");
        assert_eq!(record.entry.password, "secret");
        assert_eq!(remote.members("g"), vec!["g:u".to_string()]);
        assert_eq!(
            remote.operations(),
            vec![Operation::IdentityCreate, Operation::GroupMembers]
        );
    }

    #[test]
    fn test_recovers_existing_identity_without_membership() {
        let (client, remote) = setup();
        remote.insert_account(Account {
            username: "g:u".into(),
            name: "Old".into(),
            gender: "male".into(),
            password: "old".into(),
            school_name: "Old School".into(),
            country_id: "US".into(),
            state_id: "CA".into(),
        });

        let (result, record) = IdentityReconciler::new(&client)
            .converge(&address(), None, &spec("g:u"))
            .unwrap();

        assert_eq!(result, ApplyResult::Recovered);
        assert_eq!(
            remote.operations(),
            vec![
                Operation::IdentityCreate,
                Operation::IdentityUpdate,
                Operation::GroupAddUser,
                Operation::GroupMembers,
            ]
        );
        assert_eq!(remote.members("g"), vec!["g:u".to_string()]);
        assert_eq!(record.entry.name, "User");
        assert_eq!(remote.account("g:u").unwrap().country_id, "MX");
    }

    #[test]
    fn test_recovery_failure_reports_create_error() {
        let (client, remote) = setup();
        remote.fail_next(Operation::IdentityCreate, 500, "create exploded");

        // The probe fails too: the identity does not exist.
        let err = IdentityReconciler::new(&client)
            .converge(&address(), None, &spec("g:u"))
            .unwrap_err();

        assert!(err.to_string().contains("create exploded"));
        match err {
            ReconcileError::RecoveryExhausted { step, .. } => {
                assert_eq!(step, RecoveryStep::ProbeUpdate);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(remote.members("g").is_empty());
    }

    #[test]
    fn test_converge_is_idempotent() {
        let (client, remote) = setup();
        let reconciler = IdentityReconciler::new(&client);
        let declared = spec("g:u");
        let (_, record) = reconciler.converge(&address(), None, &declared).unwrap();
        remote.clear_calls();

        assert_eq!(
            IdentityReconciler::plan(Some(&record), &declared),
            Action::NoChange
        );
        let (result, again) = reconciler
            .converge(&address(), Some(&record), &declared)
            .unwrap();

        assert_eq!(result, ApplyResult::NoChange);
        assert_eq!(record, again);
        assert!(remote.calls().is_empty());
    }

    #[test]
    fn test_rename_sends_original_username() {
        let (client, remote) = setup();
        let reconciler = IdentityReconciler::new(&client);
        let (_, record) = reconciler.converge(&address(), None, &spec("g:u")).unwrap();
        remote.clear_calls();

        let (result, record) = reconciler
            .converge(&address(), Some(&record), &spec("g:v"))
            .unwrap();

        assert_eq!(result, ApplyResult::Modified);
        assert_eq!(record.entry.username, "g:v");
        let update = &remote.mutating_calls()[0];
        assert_eq!(update.operation, Operation::IdentityUpdate);
        assert_eq!(update.fields["original_username"], "g:u");
        assert_eq!(update.fields["username"], "g:v");
        assert_eq!(remote.members("g"), vec!["g:v".to_string()]);
    }

    #[test]
    fn test_password_only_change() {
        let (client, remote) = setup();
        let reconciler = IdentityReconciler::new(&client);
        let (_, record) = reconciler.converge(&address(), None, &spec("g:u")).unwrap();
        remote.clear_calls();

        let mut declared = spec("g:u");
        declared.entry.password = "new".into();
        let (result, record) = reconciler
            .converge(&address(), Some(&record), &declared)
            .unwrap();

        assert_eq!(result, ApplyResult::Modified);
        assert_eq!(record.entry.password, "new");
        let ops: Vec<_> = remote.mutating_calls().iter().map(|c| c.operation).collect();
        assert_eq!(ops, vec![Operation::IdentityChangePassword]);
        assert_eq!(remote.account("g:u").unwrap().password, "new");
    }

    #[test]
    fn test_group_change_fails_without_calls() {
        let (client, remote) = setup();
        let reconciler = IdentityReconciler::new(&client);
        let (_, record) = reconciler.converge(&address(), None, &spec("g:u")).unwrap();
        remote.clear_calls();

        let mut declared = spec("g:u");
        declared.group_alias = "other".into();
        let err = reconciler
            .converge(&address(), Some(&record), &declared)
            .unwrap_err();

        assert!(matches!(
            err,
            ReconcileError::ImmutableKeyViolation {
                field: "group_alias",
                ..
            }
        ));
        assert!(remote.calls().is_empty());
    }

    #[test]
    fn test_read_tolerates_bare_username() {
        let (client, _remote) = setup();
        let reconciler = IdentityReconciler::new(&client);
        reconciler.converge(&address(), None, &spec("g:u")).unwrap();

        let observed = reconciler.read(&IdentityRecord::from(&spec("U"))).unwrap();
        let record = observed.into_kept().unwrap();
        assert_eq!(record.entry.username, "g:u");
        assert_eq!(
            IdentityReconciler::plan(Some(&record), &spec("U")),
            Action::NoChange
        );
    }

    #[test]
    fn test_read_drift_drops_record() {
        let (client, remote) = setup();
        let reconciler = IdentityReconciler::new(&client);
        let (_, record) = reconciler.converge(&address(), None, &spec("g:u")).unwrap();

        remote.detach_member("g", "g:u");
        let observed = reconciler.read(&record).unwrap();
        assert!(observed.is_drifted());
        assert!(observed.into_kept().is_none());
    }

    #[test]
    fn test_destroy_keeps_account() {
        let (client, remote) = setup();
        let reconciler = IdentityReconciler::new(&client);
        let (_, record) = reconciler.converge(&address(), None, &spec("g:u")).unwrap();

        assert_eq!(reconciler.destroy(&record).unwrap(), ApplyResult::Removed);
        assert!(remote.members("g").is_empty());
        assert!(remote.account("g:u").is_some());

        // Declaring it again goes through recovery.
        let (result, _) = reconciler.converge(&address(), None, &spec("g:u")).unwrap();
        assert_eq!(result, ApplyResult::Recovered);
    }

    #[test]
    fn test_import() {
        let (client, _remote) = setup();
        let reconciler = IdentityReconciler::new(&client);
        reconciler.converge(&address(), None, &spec("g:u")).unwrap();

        let record = reconciler.import("g,g:u").unwrap();
        assert_eq!(record.entry.name, "User");
        assert_eq!(record.entry.password, "");

        assert!(matches!(
            reconciler.import("g,g:nobody").unwrap_err(),
            ReconcileError::NotFound { kind: Kind::Identity, .. }
        ));
        assert!(matches!(
            reconciler.import("g,a,b").unwrap_err(),
            ReconcileError::InvalidImportId(_)
        ));
    }
}
