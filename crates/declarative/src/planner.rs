//! Execution planner - orders resources into phases

use crate::resource::{BoxedResource, Resource};
use crate::types::{Action, Address, Kind};
use std::fmt;
use std::str::FromStr;

/// Execution phase; phases run strictly in this order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    /// Create and update groups
    Groups,
    /// Create and update identities and identity sets
    Identities,
    /// Attach members
    Memberships,
    /// Detach removed members
    RemoveMemberships,
    /// Detach removed identities
    RemoveIdentities,
    /// Detach removed identity sets
    RemoveIdentitySets,
    /// Stop tracking removed groups
    RemoveGroups,
}

impl Phase {
    /// Phase a resource of `kind` runs in, given its planned action
    pub fn of(kind: Kind, action: Action) -> Self {
        match (kind, action) {
            (Kind::Group, Action::Remove) => Self::RemoveGroups,
            (Kind::Member, Action::Remove) => Self::RemoveMemberships,
            (Kind::Identity, Action::Remove) => Self::RemoveIdentities,
            (Kind::IdentitySet, Action::Remove) => Self::RemoveIdentitySets,
            (Kind::Group, _) => Self::Groups,
            (Kind::Identity | Kind::IdentitySet, _) => Self::Identities,
            (Kind::Member, _) => Self::Memberships,
        }
    }

    /// All phases in execution order
    pub fn all() -> &'static [Phase] {
        &[
            Self::Groups,
            Self::Identities,
            Self::Memberships,
            Self::RemoveMemberships,
            Self::RemoveIdentities,
            Self::RemoveIdentitySets,
            Self::RemoveGroups,
        ]
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Groups => "groups",
            Self::Identities => "identities",
            Self::Memberships => "memberships",
            Self::RemoveMemberships => "membership removals",
            Self::RemoveIdentities => "identity removals",
            Self::RemoveIdentitySets => "identity set removals",
            Self::RemoveGroups => "group removals",
        })
    }
}

/// A `kind` or `kind.name` selector from the command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Kind to select
    pub kind: Kind,
    /// Config name to select; every entry of the kind when unset
    pub name: Option<String>,
}

impl Target {
    /// Whether the resource is selected
    pub fn matches(&self, resource: &dyn Resource) -> bool {
        self.selects(resource.address())
    }

    /// Whether the address is selected
    pub fn selects(&self, address: &Address) -> bool {
        address.kind == self.kind && self.name.as_ref().is_none_or(|n| *n == address.name)
    }
}

impl FromStr for Target {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, name) = parse_target(s);
        let kind = kind.parse()?;
        match name {
            Some("") => Err(format!("invalid target '{s}': empty name")),
            name => Ok(Self {
                kind,
                name: name.map(str::to_string),
            }),
        }
    }
}

/// An execution plan: every resource known to config or state
#[derive(Default)]
pub struct ExecutionPlan {
    /// Resources in insertion order
    pub resources: Vec<BoxedResource>,
}

impl ExecutionPlan {
    /// Create a new empty plan
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a resource to the plan
    pub fn add(&mut self, resource: BoxedResource) {
        self.resources.push(resource);
    }

    /// Filter plan to only include resources matching a predicate
    pub fn filter<F>(self, predicate: F) -> Self
    where
        F: Fn(&dyn Resource) -> bool,
    {
        Self {
            resources: self
                .resources
                .into_iter()
                .filter(|r| predicate(r.as_ref()))
                .collect(),
        }
    }

    /// Filter plan to only include resources matching a target
    pub fn filter_by_target(self, target: Option<&Target>) -> Self {
        match target {
            None => self,
            Some(t) => self.filter(|r| t.matches(r)),
        }
    }

    /// Split into phases, in execution order, dropping empty phases.
    ///
    /// Resources keep their insertion order within a phase.
    pub fn into_phases(self) -> Vec<(Phase, Vec<BoxedResource>)> {
        let mut phases: Vec<(Phase, Vec<BoxedResource>)> =
            Phase::all().iter().map(|p| (*p, Vec::new())).collect();
        for resource in self.resources {
            let phase = Phase::of(resource.address().kind, resource.action());
            if let Some((_, bucket)) = phases.iter_mut().find(|(p, _)| *p == phase) {
                bucket.push(resource);
            }
        }
        phases.retain(|(_, resources)| !resources.is_empty());
        phases
    }

    /// Total number of resources in the plan
    pub fn total_resources(&self) -> usize {
        self.resources.len()
    }

    /// Check if plan is empty
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

/// Split a target like "kind.name" into (kind, name)
fn parse_target(target: &str) -> (&str, Option<&str>) {
    match target.split_once('.') {
        Some((kind, name)) => (kind, Some(name)),
        None => (target, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::Applied;

    #[derive(Debug)]
    struct Stub {
        address: Address,
        action: Action,
    }

    impl Resource for Stub {
        fn address(&self) -> &Address {
            &self.address
        }

        fn description(&self) -> String {
            self.address.to_string()
        }

        fn partition(&self) -> &str {
            "g"
        }

        fn action(&self) -> Action {
            self.action
        }

        fn apply(&self) -> Applied {
            Applied::skipped(self.address.clone(), "stub")
        }
    }

    fn stub(kind: Kind, name: &str, action: Action) -> BoxedResource {
        Box::new(Stub {
            address: Address::new(kind, name),
            action,
        })
    }

    #[test]
    fn test_parse_target() {
        assert_eq!(parse_target("group"), ("group", None));
        assert_eq!(parse_target("group.admins"), ("group", Some("admins")));
        assert_eq!(parse_target("identity.a.b"), ("identity", Some("a.b")));
    }

    #[test]
    fn test_target_from_str() {
        let target: Target = "identity_sets.class".parse().unwrap();
        assert_eq!(target.kind, Kind::IdentitySet);
        assert_eq!(target.name.as_deref(), Some("class"));

        assert!("group.".parse::<Target>().is_err());
        assert!("widgets".parse::<Target>().is_err());
    }

    #[test]
    fn test_filter_by_target() {
        let mut plan = ExecutionPlan::new();
        plan.add(stub(Kind::Group, "admins", Action::Create));
        plan.add(stub(Kind::Group, "staff", Action::Create));
        plan.add(stub(Kind::Member, "alice", Action::Create));

        let target: Target = "group.admins".parse().unwrap();
        let plan = plan.filter_by_target(Some(&target));
        assert_eq!(plan.total_resources(), 1);
        assert_eq!(plan.resources[0].address().name, "admins");
    }

    #[test]
    fn test_target_selects_address() {
        let kind: Target = "member".parse().unwrap();
        assert!(kind.selects(&Address::new(Kind::Member, "alice")));
        assert!(!kind.selects(&Address::new(Kind::Group, "alice")));

        let entry: Target = "member.alice".parse().unwrap();
        assert!(!entry.selects(&Address::new(Kind::Member, "bob")));
    }

    #[test]
    fn test_phase_order() {
        let mut plan = ExecutionPlan::new();
        plan.add(stub(Kind::Group, "old", Action::Remove));
        plan.add(stub(Kind::Member, "alice", Action::Create));
        plan.add(stub(Kind::IdentitySet, "class", Action::Update));
        plan.add(stub(Kind::Member, "bob", Action::Remove));
        plan.add(stub(Kind::Group, "admins", Action::Create));
        plan.add(stub(Kind::Identity, "carol", Action::Create));

        let phases: Vec<(Phase, Vec<String>)> = plan
            .into_phases()
            .into_iter()
            .map(|(phase, resources)| {
                (
                    phase,
                    resources.iter().map(|r| r.address().to_string()).collect(),
                )
            })
            .collect();

        assert_eq!(
            phases,
            vec![
                (Phase::Groups, vec!["group.admins".to_string()]),
                (
                    Phase::Identities,
                    vec![
                        "identity_set.class".to_string(),
                        "identity.carol".to_string()
                    ]
                ),
                (Phase::Memberships, vec!["member.alice".to_string()]),
                (Phase::RemoveMemberships, vec!["member.bob".to_string()]),
                (Phase::RemoveGroups, vec!["group.old".to_string()]),
            ]
        );
    }
}
