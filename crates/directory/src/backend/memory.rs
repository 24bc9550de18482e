//! In-memory directory.
//!
//! [`MemoryGateway`] answers operations the way the real server does
//! (including its error names), records every call, and can be told to
//! fail specific operations. Clones share the same directory.

use crate::backend::Gateway;
use crate::error::{Error, Result};
use crate::types::{
    Fields, GroupDetails, GroupDetailsResponse, IdentityCreateRequest, IdentityCreated, Member,
    MembersResponse, Operation,
};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// One recorded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    /// Operation executed.
    pub operation: Operation,
    /// Fields sent.
    pub fields: Fields,
}

/// An account stored in the directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    /// Username.
    pub username: String,
    /// Full name.
    pub name: String,
    /// Gender.
    pub gender: String,
    /// Current password.
    pub password: String,
    /// School name.
    pub school_name: String,
    /// Country id.
    pub country_id: String,
    /// State id.
    pub state_id: String,
}

impl From<&IdentityCreateRequest> for Account {
    fn from(req: &IdentityCreateRequest) -> Self {
        Self {
            username: req.username.clone(),
            name: req.name.clone(),
            gender: req.gender.clone(),
            password: req.password.clone(),
            school_name: req.school_name.clone(),
            country_id: req.country_id.clone(),
            state_id: req.state_id.clone(),
        }
    }
}

#[derive(Debug, Default)]
struct Directory {
    groups: BTreeMap<String, GroupDetails>,
    members: BTreeMap<String, BTreeSet<String>>,
    accounts: BTreeMap<String, Account>,
    calls: Vec<Call>,
    failures: HashMap<Operation, VecDeque<(u16, String)>>,
    clock: i64,
}

/// Gateway that emulates the directory in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryGateway {
    inner: Arc<Mutex<Directory>>,
}

impl MemoryGateway {
    /// Create an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Directory> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // =========================================================================
    // Seeding and inspection
    // =========================================================================

    /// Insert a group without recording a call.
    pub fn insert_group(&self, alias: &str, description: &str, name: &str) {
        let mut dir = self.lock();
        dir.clock += 1;
        let create_time = dir.clock;
        dir.groups.insert(
            alias.to_string(),
            GroupDetails {
                alias: alias.to_string(),
                description: description.to_string(),
                name: name.to_string(),
                create_time: Some(create_time),
            },
        );
        dir.members.entry(alias.to_string()).or_default();
    }

    /// Insert an account that belongs to no group.
    pub fn insert_account(&self, account: Account) {
        self.lock()
            .accounts
            .insert(account.username.clone(), account);
    }

    /// Attach a member without recording a call.
    pub fn insert_member(&self, group_alias: &str, username: &str) {
        self.lock()
            .members
            .entry(group_alias.to_string())
            .or_default()
            .insert(username.to_string());
    }

    /// Detach a member without recording a call, as an outside actor would.
    pub fn detach_member(&self, group_alias: &str, username: &str) {
        if let Some(members) = self.lock().members.get_mut(group_alias) {
            members.remove(username);
        }
    }

    /// Get a group.
    pub fn group(&self, alias: &str) -> Option<GroupDetails> {
        self.lock().groups.get(alias).cloned()
    }

    /// Get an account.
    pub fn account(&self, username: &str) -> Option<Account> {
        self.lock().accounts.get(username).cloned()
    }

    /// Usernames attached to a group, sorted.
    pub fn members(&self, group_alias: &str) -> Vec<String> {
        self.lock()
            .members
            .get(group_alias)
            .map(|m| m.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// All recorded calls, oldest first.
    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    /// Operations of all recorded calls, oldest first.
    pub fn operations(&self) -> Vec<Operation> {
        self.lock().calls.iter().map(|c| c.operation).collect()
    }

    /// Recorded calls that change remote state.
    pub fn mutating_calls(&self) -> Vec<Call> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.operation.is_mutating())
            .cloned()
            .collect()
    }

    /// Forget recorded calls.
    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Make the next call of `operation` fail with `status` and `body`.
    ///
    /// Queued failures are consumed in order, one per call.
    pub fn fail_next(&self, operation: Operation, status: u16, body: &str) {
        self.lock()
            .failures
            .entry(operation)
            .or_default()
            .push_back((status, body.to_string()));
    }
}

impl Gateway for MemoryGateway {
    fn execute(&self, operation: Operation, fields: &Fields) -> Result<Vec<u8>> {
        let mut dir = self.lock();
        dir.calls.push(Call {
            operation,
            fields: fields.clone(),
        });

        if let Some((status, body)) = dir
            .failures
            .get_mut(&operation)
            .and_then(VecDeque::pop_front)
        {
            return Err(Error::rejected(operation, status, body));
        }

        dir.handle(operation, fields)
    }
}

fn field<'a>(operation: Operation, fields: &'a Fields, name: &str) -> Result<&'a str> {
    fields
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| reject(operation, 400, "parameterEmpty", name))
}

fn reject(operation: Operation, status: u16, errorname: &str, detail: &str) -> Error {
    let body = serde_json::json!({
        "status": "error",
        "errorname": errorname,
        "error": detail,
    });
    Error::rejected(operation, status, body.to_string())
}

fn respond<T: Serialize>(operation: Operation, value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| Error::Encode {
        operation,
        message: e.to_string(),
    })
}

fn ok() -> Result<Vec<u8>> {
    Ok(br#"{"status":"ok"}"#.to_vec())
}

impl Directory {
    fn handle(&mut self, operation: Operation, fields: &Fields) -> Result<Vec<u8>> {
        match operation {
            Operation::GroupCreate => self.group_create(fields),
            Operation::GroupUpdate => self.group_update(fields),
            Operation::GroupDetails => self.group_details(fields),
            Operation::GroupAddUser => self.group_add_user(fields),
            Operation::GroupRemoveUser => self.group_remove_user(fields),
            Operation::GroupMembers => self.group_members(fields),
            Operation::IdentityCreate => self.identity_create(fields),
            Operation::IdentityUpdate => self.identity_update(fields),
            Operation::IdentityChangePassword => self.identity_change_password(fields),
            Operation::IdentityBulkCreate => self.identity_bulk_create(fields),
        }
    }

    fn require_group(&self, operation: Operation, alias: &str) -> Result<()> {
        if self.groups.contains_key(alias) {
            Ok(())
        } else {
            Err(reject(operation, 404, "groupNotFound", alias))
        }
    }

    fn group_create(&mut self, fields: &Fields) -> Result<Vec<u8>> {
        let op = Operation::GroupCreate;
        let alias = field(op, fields, "alias")?;
        if self.groups.contains_key(alias) {
            return Err(reject(op, 400, "aliasInUse", alias));
        }
        self.clock += 1;
        self.groups.insert(
            alias.to_string(),
            GroupDetails {
                alias: alias.to_string(),
                description: field(op, fields, "description")?.to_string(),
                name: field(op, fields, "name")?.to_string(),
                create_time: Some(self.clock),
            },
        );
        self.members.entry(alias.to_string()).or_default();
        ok()
    }

    fn group_update(&mut self, fields: &Fields) -> Result<Vec<u8>> {
        let op = Operation::GroupUpdate;
        let alias = field(op, fields, "alias")?;
        let description = field(op, fields, "description")?.to_string();
        let name = field(op, fields, "name")?.to_string();
        let group = self
            .groups
            .get_mut(alias)
            .ok_or_else(|| reject(op, 404, "groupNotFound", alias))?;
        group.description = description;
        group.name = name;
        ok()
    }

    fn group_details(&self, fields: &Fields) -> Result<Vec<u8>> {
        let op = Operation::GroupDetails;
        let alias = field(op, fields, "group_alias")?;
        let group = self
            .groups
            .get(alias)
            .ok_or_else(|| reject(op, 404, "groupNotFound", alias))?;
        respond(
            op,
            &GroupDetailsResponse {
                group: group.clone(),
            },
        )
    }

    fn group_add_user(&mut self, fields: &Fields) -> Result<Vec<u8>> {
        let op = Operation::GroupAddUser;
        let alias = field(op, fields, "group_alias")?;
        let username = field(op, fields, "usernameOrEmail")?;
        self.require_group(op, alias)?;
        let members = self.members.entry(alias.to_string()).or_default();
        if !members.insert(username.to_string()) {
            return Err(reject(op, 400, "identityInGroup", username));
        }
        ok()
    }

    fn group_remove_user(&mut self, fields: &Fields) -> Result<Vec<u8>> {
        let op = Operation::GroupRemoveUser;
        let alias = field(op, fields, "group_alias")?;
        let username = field(op, fields, "usernameOrEmail")?;
        self.require_group(op, alias)?;
        let removed = self
            .members
            .get_mut(alias)
            .is_some_and(|m| m.remove(username));
        if !removed {
            return Err(reject(op, 400, "userNotExist", username));
        }
        ok()
    }

    fn group_members(&self, fields: &Fields) -> Result<Vec<u8>> {
        let op = Operation::GroupMembers;
        let alias = field(op, fields, "group_alias")?;
        self.require_group(op, alias)?;
        let identities = self
            .members
            .get(alias)
            .into_iter()
            .flatten()
            .map(|username| match self.accounts.get(username) {
                Some(account) => Member {
                    username: account.username.clone(),
                    name: Some(account.name.clone()),
                    gender: Some(account.gender.clone()),
                    country_id: Some(account.country_id.clone()),
                    state_id: Some(account.state_id.clone()),
                },
                None => Member {
                    username: username.clone(),
                    ..Member::default()
                },
            })
            .collect();
        respond(op, &MembersResponse { identities })
    }

    fn identity_create(&mut self, fields: &Fields) -> Result<Vec<u8>> {
        let op = Operation::IdentityCreate;
        let request = IdentityCreateRequest {
            group_alias: field(op, fields, "group_alias")?.to_string(),
            username: field(op, fields, "username")?.to_string(),
            name: field(op, fields, "name")?.to_string(),
            gender: field(op, fields, "gender")?.to_string(),
            password: field(op, fields, "password")?.to_string(),
            school_name: field(op, fields, "school_name")?.to_string(),
            country_id: field(op, fields, "country_id")?.to_string(),
            state_id: field(op, fields, "state_id")?.to_string(),
        };
        self.require_group(op, &request.group_alias)?;
        if self.accounts.contains_key(&request.username) {
            return Err(reject(op, 400, "usernameInUse", &request.username));
        }
        self.insert_identity(&request);
        respond(
            op,
            &IdentityCreated {
                username: request.username,
            },
        )
    }

    fn insert_identity(&mut self, request: &IdentityCreateRequest) {
        self.accounts
            .insert(request.username.clone(), Account::from(request));
        self.members
            .entry(request.group_alias.clone())
            .or_default()
            .insert(request.username.clone());
    }

    fn identity_update(&mut self, fields: &Fields) -> Result<Vec<u8>> {
        let op = Operation::IdentityUpdate;
        let alias = field(op, fields, "group_alias")?;
        let original = field(op, fields, "original_username")?;
        let username = field(op, fields, "username")?;
        self.require_group(op, alias)?;

        if original != username && self.accounts.contains_key(username) {
            return Err(reject(op, 400, "usernameInUse", username));
        }
        let mut account = self
            .accounts
            .remove(original)
            .ok_or_else(|| reject(op, 404, "userNotExist", original))?;

        account.username = username.to_string();
        account.name = field(op, fields, "name")?.to_string();
        account.gender = field(op, fields, "gender")?.to_string();
        account.school_name = field(op, fields, "school_name")?.to_string();
        account.country_id = field(op, fields, "country_id")?.to_string();
        account.state_id = field(op, fields, "state_id")?.to_string();
        self.accounts.insert(username.to_string(), account);

        if original != username {
            for members in self.members.values_mut() {
                if members.remove(original) {
                    members.insert(username.to_string());
                }
            }
        }
        ok()
    }

    fn identity_change_password(&mut self, fields: &Fields) -> Result<Vec<u8>> {
        let op = Operation::IdentityChangePassword;
        let alias = field(op, fields, "group_alias")?;
        let username = field(op, fields, "username")?;
        let password = field(op, fields, "password")?.to_string();
        self.require_group(op, alias)?;
        let account = self
            .accounts
            .get_mut(username)
            .ok_or_else(|| reject(op, 404, "userNotExist", username))?;
        account.password = password;
        ok()
    }

    fn identity_bulk_create(&mut self, fields: &Fields) -> Result<Vec<u8>> {
        let op = Operation::IdentityBulkCreate;
        let alias = field(op, fields, "group_alias")?;
        self.require_group(op, alias)?;
        let identities: Vec<IdentityCreateRequest> =
            serde_json::from_str(field(op, fields, "identities")?)
                .map_err(|e| reject(op, 400, "invalidParameters", &e.to_string()))?;

        // The whole batch is rejected if any username is taken.
        if let Some(taken) = identities
            .iter()
            .find(|i| self.accounts.contains_key(&i.username))
        {
            return Err(reject(op, 400, "usernameInUse", &taken.username));
        }

        for identity in &identities {
            let mut identity = identity.clone();
            identity.group_alias = alias.to_string();
            self.insert_identity(&identity);
        }
        ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GroupRequest, MemberRequest, group_lookup_fields};

    fn create_group(gateway: &MemoryGateway, alias: &str) {
        let fields = GroupRequest {
            alias: alias.into(),
            description: "d".into(),
            name: alias.into(),
        }
        .to_fields();
        gateway.execute(Operation::GroupCreate, &fields).unwrap();
    }

    #[test]
    fn test_group_lifecycle() {
        let gateway = MemoryGateway::new();
        create_group(&gateway, "admins");

        let body = gateway
            .execute(Operation::GroupDetails, &group_lookup_fields("admins"))
            .unwrap();
        let details: GroupDetailsResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(details.group.alias, "admins");
        assert_eq!(details.group.description, "d");
    }

    #[test]
    fn test_duplicate_group_is_conflict() {
        let gateway = MemoryGateway::new();
        create_group(&gateway, "admins");

        let fields = GroupRequest {
            alias: "admins".into(),
            description: String::new(),
            name: "admins".into(),
        }
        .to_fields();
        let err = gateway.execute(Operation::GroupCreate, &fields).unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn test_unknown_group_is_not_found() {
        let gateway = MemoryGateway::new();
        let err = gateway
            .execute(Operation::GroupMembers, &group_lookup_fields("ghost"))
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_membership_edges() {
        let gateway = MemoryGateway::new();
        create_group(&gateway, "admins");
        let fields = MemberRequest::new("admins", "alice").to_fields();

        gateway.execute(Operation::GroupAddUser, &fields).unwrap();
        assert_eq!(gateway.members("admins"), vec!["alice".to_string()]);

        let again = gateway.execute(Operation::GroupAddUser, &fields).unwrap_err();
        assert!(again.is_conflict());

        gateway.execute(Operation::GroupRemoveUser, &fields).unwrap();
        assert!(gateway.members("admins").is_empty());

        let gone = gateway
            .execute(Operation::GroupRemoveUser, &fields)
            .unwrap_err();
        assert!(gone.is_not_found());
    }

    #[test]
    fn test_fail_next_is_consumed_once() {
        let gateway = MemoryGateway::new();
        gateway.fail_next(Operation::GroupCreate, 500, "boom");

        let fields = GroupRequest {
            alias: "a".into(),
            description: String::new(),
            name: "a".into(),
        }
        .to_fields();
        assert!(gateway.execute(Operation::GroupCreate, &fields).is_err());
        assert!(gateway.execute(Operation::GroupCreate, &fields).is_ok());
        assert_eq!(gateway.calls().len(), 2);
    }

    #[test]
    fn test_calls_are_recorded() {
        let gateway = MemoryGateway::new();
        create_group(&gateway, "admins");
        let _ = gateway.execute(Operation::GroupMembers, &group_lookup_fields("admins"));

        assert_eq!(
            gateway.operations(),
            vec![Operation::GroupCreate, Operation::GroupMembers]
        );
        assert_eq!(gateway.mutating_calls().len(), 1);

        gateway.clear_calls();
        assert!(gateway.calls().is_empty());
    }
}
