//! Execution planner - pairs declared entries with tracked records

use declarative::{
    Address, ExecutionPlan, GroupResource, IdentityResource, IdentitySetResource, Kind,
    MembershipResource,
};
use directory::Client;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::config::RosterConfig;
use crate::state::RosterState;

/// Build a plan covering every entry known to config or state.
///
/// Entries only in state become removals; entries only in config become
/// creations.
pub fn build_plan(
    config: &RosterConfig,
    state: &RosterState,
    client: &Arc<Client>,
) -> ExecutionPlan {
    let mut plan = ExecutionPlan::new();

    for name in names(&config.groups, &state.groups) {
        plan.add(Box::new(GroupResource::new(
            Address::new(Kind::Group, name),
            Arc::clone(client),
            state.groups.get(name).cloned(),
            config.groups.get(name).cloned(),
        )));
    }

    for name in names(&config.members, &state.members) {
        plan.add(Box::new(MembershipResource::new(
            Address::new(Kind::Member, name),
            Arc::clone(client),
            state.members.get(name).cloned(),
            config.members.get(name).cloned(),
        )));
    }

    for name in names(&config.identities, &state.identities) {
        plan.add(Box::new(IdentityResource::new(
            Address::new(Kind::Identity, name),
            Arc::clone(client),
            state.identities.get(name).cloned(),
            config.identities.get(name).cloned(),
        )));
    }

    for name in names(&config.identity_sets, &state.identity_sets) {
        plan.add(Box::new(IdentitySetResource::new(
            Address::new(Kind::IdentitySet, name),
            Arc::clone(client),
            state.identity_sets.get(name).cloned(),
            config.identity_sets.get(name).cloned(),
        )));
    }

    log::debug!("Planned {} resources", plan.total_resources());
    plan
}

/// Config names from both sides, sorted
fn names<'a, D, T>(
    declared: &'a BTreeMap<String, D>,
    tracked: &'a BTreeMap<String, T>,
) -> BTreeSet<&'a str> {
    declared
        .keys()
        .chain(tracked.keys())
        .map(String::as_str)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::{Action, GroupRecord, MembershipRecord};
    use directory::MemoryGateway;

    const CONFIG: &str = r#"
[groups.admins]
alias = "admins"
description = "d"

[groups.staff]
alias = "staff"
description = "new"

[members.alice]
group_alias = "admins"
username = "alice"
"#;

    fn actions(plan: &ExecutionPlan) -> Vec<(String, Action)> {
        plan.resources
            .iter()
            .map(|r| (r.address().to_string(), r.action()))
            .collect()
    }

    #[test]
    fn test_build_plan_pairs_config_and_state() {
        let config = RosterConfig::parse(CONFIG).unwrap();
        let mut state = RosterState::default();
        state.groups.insert(
            "admins".into(),
            GroupRecord {
                alias: "admins".into(),
                description: "d".into(),
                name: "admins".into(),
                create_time: None,
            },
        );
        state.members.insert(
            "bob".into(),
            MembershipRecord {
                group_alias: "admins".into(),
                username: "bob".into(),
            },
        );
        let remote = MemoryGateway::new();
        let client = Arc::new(Client::with_gateway(Box::new(remote.clone())));

        let plan = build_plan(&config, &state, &client);

        assert_eq!(
            actions(&plan),
            vec![
                ("group.admins".to_string(), Action::NoChange),
                ("group.staff".to_string(), Action::Create),
                ("member.alice".to_string(), Action::Create),
                ("member.bob".to_string(), Action::Remove),
            ]
        );
        assert!(remote.calls().is_empty());
    }

    #[test]
    fn test_build_plan_empty() {
        let client = Arc::new(Client::with_gateway(Box::new(MemoryGateway::new())));
        let plan = build_plan(&RosterConfig::default(), &RosterState::default(), &client);
        assert!(plan.is_empty());
    }
}
