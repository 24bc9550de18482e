//! Execution engine - applies resources phase by phase
//!
//! Within a phase, resources are partitioned by group alias. Partitions run
//! concurrently on a bounded pool; resources inside one partition run
//! sequentially in plan order.

use crate::context::{ConfirmCallback, ProgressCallback};
use crate::diff::compute_diffs;
use crate::planner::ExecutionPlan;
use crate::resource::{Applied, BoxedResource, Resource};
use crate::types::{ExecuteOptions, ExecuteSummary};
use anyhow::Result;
use rayon::prelude::*;
use std::collections::BTreeMap;

/// Everything an execution produced
#[derive(Debug, Default)]
pub struct ExecuteReport {
    /// Counts per outcome
    pub summary: ExecuteSummary,
    /// One entry per resource that was applied or skipped
    pub applied: Vec<Applied>,
}

impl ExecuteReport {
    fn record(&mut self, applied: Applied) {
        self.summary.add_result(&applied.result);
        self.applied.push(applied);
    }
}

/// Execute a plan with the given options and callbacks
///
/// Resources whose action is a no-op are counted but never applied.
/// A declined confirmation or a dry run reports every change as skipped.
pub fn execute<P, C>(
    plan: ExecutionPlan,
    opts: ExecuteOptions,
    progress: &mut P,
    confirm: &mut C,
) -> Result<ExecuteReport>
where
    P: ProgressCallback,
    C: ConfirmCallback,
{
    let total_changes = compute_diffs(&plan.resources).len();
    let mut report = ExecuteReport::default();
    report.summary.no_change = plan.total_resources() - total_changes;

    if total_changes == 0 {
        return Ok(report);
    }

    let skip_reason = if opts.dry_run {
        Some("dry run")
    } else if !confirm.confirm("Apply changes?")? {
        Some("not confirmed")
    } else {
        None
    };
    if let Some(reason) = skip_reason {
        for resource in plan.resources.iter().filter(|r| r.action().is_change()) {
            report.record(Applied::skipped(resource.address().clone(), reason));
        }
        return Ok(report);
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(opts.jobs.max(1))
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to create thread pool: {}", e))?;

    for (phase, resources) in plan.into_phases() {
        let changing: Vec<BoxedResource> = resources
            .into_iter()
            .filter(|r| r.action().is_change())
            .collect();
        if changing.is_empty() {
            continue;
        }

        log::debug!("Applying {} resources in phase {phase}", changing.len());
        progress.on_phase_start(phase, changing.len());
        for applied in execute_phase(&pool, &changing, opts.jobs) {
            progress.on_resource_complete(&applied);
            report.record(applied);
        }
        progress.on_phase_complete(phase);
    }

    Ok(report)
}

/// Apply one phase, one partition per task
fn execute_phase(
    pool: &rayon::ThreadPool,
    resources: &[BoxedResource],
    jobs: usize,
) -> Vec<Applied> {
    let partitions = partition(resources);

    if jobs <= 1 || partitions.len() == 1 {
        return partitions.into_values().flat_map(apply_sequential).collect();
    }

    let results: Vec<Vec<Applied>> = pool.install(|| {
        partitions
            .into_par_iter()
            .map(|(_, partition)| apply_sequential(partition))
            .collect()
    });
    results.into_iter().flatten().collect()
}

/// Group resources by partition, keeping plan order inside each
fn partition(resources: &[BoxedResource]) -> BTreeMap<&str, Vec<&dyn Resource>> {
    let mut partitions: BTreeMap<&str, Vec<&dyn Resource>> = BTreeMap::new();
    for resource in resources {
        partitions
            .entry(resource.partition())
            .or_default()
            .push(resource.as_ref());
    }
    partitions
}

fn apply_sequential(resources: Vec<&dyn Resource>) -> Vec<Applied> {
    resources
        .into_iter()
        .map(|resource| {
            log::debug!("Applying {}", resource.address());
            resource.apply()
        })
        .collect()
}

/// Simple execution without callbacks
///
/// For basic use cases where you don't need progress or confirmation.
pub fn execute_simple(plan: ExecutionPlan, opts: ExecuteOptions) -> Result<ExecuteReport> {
    use crate::context::{AutoConfirm, NoProgress};

    execute(plan, opts, &mut NoProgress, &mut AutoConfirm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{AutoConfirm, AutoDecline, NoProgress};
    use crate::group::GroupResource;
    use crate::membership::MembershipResource;
    use crate::planner::Phase;
    use crate::resource::RecordUpdate;
    use crate::types::{
        Address, ApplyResult, GroupRecord, GroupSpec, Kind, MembershipRecord, MembershipSpec,
        Record,
    };
    use directory::{Client, MemoryGateway, Operation};
    use std::sync::Arc;

    fn setup() -> (Arc<Client>, MemoryGateway) {
        let remote = MemoryGateway::new();
        (
            Arc::new(Client::with_gateway(Box::new(remote.clone()))),
            remote,
        )
    }

    fn group(
        client: &Arc<Client>,
        previous: Option<GroupRecord>,
        description: &str,
    ) -> BoxedResource {
        Box::new(GroupResource::new(
            Address::new(Kind::Group, "admins"),
            Arc::clone(client),
            previous,
            Some(GroupSpec {
                alias: "admins".into(),
                description: description.into(),
                name: None,
            }),
        ))
    }

    fn member(
        client: &Arc<Client>,
        group_alias: &str,
        username: &str,
        previous: Option<MembershipRecord>,
        declared: bool,
    ) -> BoxedResource {
        Box::new(MembershipResource::new(
            Address::new(Kind::Member, username),
            Arc::clone(client),
            previous,
            declared.then(|| MembershipSpec {
                group_alias: group_alias.into(),
                username: username.into(),
            }),
        ))
    }

    fn group_record(report: &ExecuteReport) -> GroupRecord {
        report
            .applied
            .iter()
            .find_map(|a| match &a.record {
                RecordUpdate::Set(Record::Group(record)) => Some(record.clone()),
                _ => None,
            })
            .unwrap()
    }

    fn member_record(report: &ExecuteReport) -> MembershipRecord {
        report
            .applied
            .iter()
            .find_map(|a| match &a.record {
                RecordUpdate::Set(Record::Member(record)) => Some(record.clone()),
                _ => None,
            })
            .unwrap()
    }

    #[test]
    fn test_execute_empty_plan() {
        let report = execute_simple(ExecutionPlan::new(), ExecuteOptions::default()).unwrap();
        assert_eq!(report.summary.total(), 0);
        assert!(report.applied.is_empty());
    }

    #[test]
    fn test_end_to_end_lifecycle() {
        let (client, remote) = setup();

        // Create the group and attach alice; the member is listed in plan
        // order before the group but runs in a later phase.
        let mut plan = ExecutionPlan::new();
        plan.add(member(&client, "admins", "alice", None, true));
        plan.add(group(&client, None, "d"));
        let report = execute_simple(plan, ExecuteOptions::default()).unwrap();

        assert!(report.summary.is_success());
        assert_eq!(report.summary.created, 2);
        let created = group_record(&report);
        assert_eq!(
            (created.alias.as_str(), created.description.as_str(), created.name.as_str()),
            ("admins", "d", "admins")
        );
        assert_eq!(remote.members("admins"), vec!["alice".to_string()]);
        let alice = member_record(&report);

        // Update the description.
        let mut plan = ExecutionPlan::new();
        plan.add(group(&client, Some(created), "d2"));
        plan.add(member(&client, "admins", "alice", Some(alice.clone()), true));
        let report = execute_simple(plan, ExecuteOptions::default()).unwrap();

        assert_eq!(report.summary.modified, 1);
        assert_eq!(report.summary.no_change, 1);
        assert_eq!(group_record(&report).description, "d2");
        assert_eq!(remote.group("admins").unwrap().description, "d2");

        // Drop alice from config.
        let mut plan = ExecutionPlan::new();
        plan.add(member(&client, "admins", "alice", Some(alice), false));
        let report = execute_simple(plan, ExecuteOptions::default()).unwrap();

        assert_eq!(report.summary.removed, 1);
        assert_eq!(report.applied[0].record, RecordUpdate::Remove);
        assert!(remote.members("admins").is_empty());
    }

    #[test]
    fn test_dry_run_makes_no_calls() {
        let (client, remote) = setup();
        let mut plan = ExecutionPlan::new();
        plan.add(group(&client, None, "d"));

        let opts = ExecuteOptions {
            dry_run: true,
            ..ExecuteOptions::default()
        };
        let report = execute_simple(plan, opts).unwrap();

        assert_eq!(report.summary.skipped, 1);
        assert!(matches!(
            report.applied[0].result,
            ApplyResult::Skipped { .. }
        ));
        assert!(remote.calls().is_empty());
    }

    #[test]
    fn test_declined_confirmation_skips() {
        let (client, remote) = setup();
        let mut plan = ExecutionPlan::new();
        plan.add(group(&client, None, "d"));

        let report = execute(
            plan,
            ExecuteOptions::default(),
            &mut NoProgress,
            &mut AutoDecline,
        )
        .unwrap();

        assert_eq!(report.summary.skipped, 1);
        assert!(remote.calls().is_empty());
    }

    #[test]
    fn test_failures_do_not_stop_other_partitions() {
        let (client, remote) = setup();
        remote.insert_group("a", "", "a");
        remote.insert_group("b", "", "b");
        remote.fail_next(Operation::GroupAddUser, 500, "internal error");

        let mut plan = ExecutionPlan::new();
        for group_alias in ["a", "b"] {
            plan.add(Box::new(MembershipResource::new(
                Address::new(Kind::Member, group_alias),
                Arc::clone(&client),
                None,
                Some(MembershipSpec {
                    group_alias: group_alias.into(),
                    username: "alice".into(),
                }),
            )));
        }
        let opts = ExecuteOptions {
            dry_run: false,
            jobs: 4,
        };
        let report = execute(plan, opts, &mut NoProgress, &mut AutoConfirm).unwrap();

        assert_eq!(report.summary.failed, 1);
        assert_eq!(report.summary.created, 1);
        assert_eq!(remote.members("a").len() + remote.members("b").len(), 1);
    }

    struct Recorder {
        phases: Vec<Phase>,
        completed: usize,
    }

    impl ProgressCallback for Recorder {
        fn on_phase_start(&mut self, phase: Phase, _count: usize) {
            self.phases.push(phase);
        }

        fn on_resource_complete(&mut self, _applied: &Applied) {
            self.completed += 1;
        }

        fn on_phase_complete(&mut self, _phase: Phase) {}
    }

    #[test]
    fn test_progress_sees_phases_in_order() {
        let (client, _remote) = setup();
        let mut plan = ExecutionPlan::new();
        plan.add(member(&client, "admins", "alice", None, true));
        plan.add(group(&client, None, "d"));

        let mut recorder = Recorder {
            phases: Vec::new(),
            completed: 0,
        };
        execute(
            plan,
            ExecuteOptions::default(),
            &mut recorder,
            &mut AutoConfirm,
        )
        .unwrap();

        assert_eq!(recorder.phases, vec![Phase::Groups, Phase::Memberships]);
        assert_eq!(recorder.completed, 2);
    }
}
