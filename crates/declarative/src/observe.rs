//! Reading tracked entities back from the remote, for any kind

use crate::error::{ReconcileError, Result};
use crate::group::GroupReconciler;
use crate::identity::IdentityReconciler;
use crate::identity_set::IdentitySetReconciler;
use crate::membership::MembershipReconciler;
use crate::types::{Kind, Observed, Record};
use directory::Client;

/// Re-read a tracked record
pub fn refresh(client: &Client, record: &Record) -> Result<Observed<Record>> {
    Ok(match record {
        Record::Group(r) => GroupReconciler::new(client)
            .refresh(&r.alias)?
            .map(Record::Group),
        Record::Member(r) => MembershipReconciler::new(client)
            .refresh(r)?
            .map(Record::Member),
        Record::Identity(r) => IdentityReconciler::new(client)
            .read(r)?
            .map(Record::Identity),
        Record::IdentitySet(r) => IdentitySetReconciler::new(client)
            .refresh(r)?
            .map(Record::IdentitySet),
    })
}

/// Adopt an existing remote entity.
///
/// Groups are addressed by alias; members and identities by
/// `<group_alias>,<username>`. Identity sets cannot be imported.
pub fn import(client: &Client, kind: Kind, id: &str) -> Result<Record> {
    match kind {
        Kind::Group => GroupReconciler::new(client).import(id).map(Record::Group),
        Kind::Member => MembershipReconciler::new(client)
            .import(id)
            .map(Record::Member),
        Kind::Identity => IdentityReconciler::new(client)
            .import(id)
            .map(Record::Identity),
        Kind::IdentitySet => Err(ReconcileError::Config(
            "identity sets cannot be imported; import their identities one by one".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MembershipRecord;
    use directory::MemoryGateway;

    #[test]
    fn test_refresh_dispatches_by_kind() {
        let remote = MemoryGateway::new();
        remote.insert_group("admins", "d", "Admins");
        remote.insert_member("admins", "alice");
        let client = Client::with_gateway(Box::new(remote.clone()));

        let group = import(&client, Kind::Group, "admins").unwrap();
        assert!(matches!(
            refresh(&client, &group).unwrap(),
            Observed::Present(Record::Group(_))
        ));

        let edge = Record::Member(MembershipRecord {
            group_alias: "admins".into(),
            username: "alice".into(),
        });
        remote.detach_member("admins", "alice");
        assert!(refresh(&client, &edge).unwrap().is_drifted());
    }

    #[test]
    fn test_import_identity_set_is_rejected() {
        let client = Client::with_gateway(Box::new(MemoryGateway::new()));
        let err = import(&client, Kind::IdentitySet, "admins").unwrap_err();
        assert!(matches!(err, ReconcileError::Config(_)));
    }
}
