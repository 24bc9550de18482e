//! Declarative commands
//!
//! - `plan` - Show what apply would change
//! - `apply` - Make the remote match the configuration
//! - `refresh` - Re-read tracked entities from the remote

use anyhow::{Context as AnyhowContext, Result};
use colored::Colorize;
use declarative::{
    Address, AutoConfirm, ConfirmCallback, ExecuteOptions, ExecuteReport, Observed,
    ProgressCallback, ReconcileError, Target, compute_diffs, execute, observe,
};
use directory::Client;

use crate::Context;
use crate::cli::{ApplyArgs, PlanArgs, RefreshArgs};
use crate::config::RosterConfig;
use crate::engine::build_plan;
use crate::engine::differ::{display_diff, print_json};
use crate::engine::executor::{PromptConfirm, TerminalProgress, print_summary};
use crate::state::RosterState;
use crate::ui;

// ============================================================================
// Refresh
// ============================================================================

/// A tracked entity that no longer matches the remote
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Drift {
    pub address: Address,
    pub detail: String,
}

impl From<Drift> for ReconcileError {
    fn from(drift: Drift) -> Self {
        Self::DriftDetected {
            address: drift.address,
            detail: drift.detail,
        }
    }
}

/// Re-read every selected tracked record and update `state` in place.
///
/// Vanished entities are dropped; partly vanished ones keep what survived.
pub fn refresh_state(
    client: &Client,
    state: &mut RosterState,
    target: Option<&Target>,
) -> Result<Vec<Drift>> {
    let mut drifts = Vec::new();

    for address in state.addresses() {
        if target.is_some_and(|t| !t.selects(&address)) {
            continue;
        }
        let Some(record) = state.get(&address) else {
            continue;
        };

        let observed = observe::refresh(client, &record)
            .with_context(|| format!("Failed to refresh {address}"))?;
        match observed {
            Observed::Present(current) => {
                if current != record {
                    log::info!("{address}: updated from remote");
                }
                state.set(&address.name, current);
            }
            Observed::Absent => {
                log::warn!("{address}: no longer exists remotely, dropping from state");
                state.remove(&address);
                drifts.push(Drift {
                    address,
                    detail: "no longer exists".to_string(),
                });
            }
            Observed::Drifted { kept, detail } => {
                log::warn!("{address}: {detail}");
                match kept {
                    Some(current) => state.set(&address.name, current),
                    None => {
                        state.remove(&address);
                    }
                }
                drifts.push(Drift { address, detail });
            }
        }
    }

    Ok(drifts)
}

pub fn refresh(ctx: &Context, args: &RefreshArgs) -> Result<()> {
    ui::header("Refreshing State");

    let config = ctx.load_config()?;
    let client = ctx.client(&config)?;
    let (mut state, path) = ctx.load_state()?;

    let drifts = refresh_state(&client, &mut state, args.target.as_ref())?;

    if drifts.is_empty() {
        ui::success("Tracked state matches the remote");
    } else {
        for drift in &drifts {
            println!("  {} {} {}", "~".yellow(), drift.address, drift.detail.dimmed());
        }
    }

    if args.strict
        && let Some(first) = drifts.into_iter().next()
    {
        return Err(ReconcileError::from(first)).context("Refusing to update state in strict mode");
    }

    state.touch(&path)?;
    if ctx.verbose > 0 {
        ui::dim(&format!("State saved to {}", path.display()));
    }
    Ok(())
}

// ============================================================================
// Plan
// ============================================================================

pub fn plan(ctx: &Context, args: &PlanArgs) -> Result<()> {
    let config = ctx.load_config()?;
    let client = ctx.client(&config)?;
    let (mut state, _) = ctx.load_state()?;

    if !args.offline {
        refresh_state(&client, &mut state, args.target.as_ref())?;
    }

    let plan = build_plan(&config, &state, &client).filter_by_target(args.target.as_ref());
    let diffs = compute_diffs(&plan.resources);

    if args.json {
        return print_json(&diffs);
    }

    ui::header("Roster Plan");
    display_diff(&diffs);
    Ok(())
}

// ============================================================================
// Apply
// ============================================================================

/// Refresh (unless offline), plan, execute and record every outcome in `state`
pub fn converge<P, C>(
    client: &std::sync::Arc<Client>,
    config: &RosterConfig,
    state: &mut RosterState,
    args: &ApplyArgs,
    progress: &mut P,
    confirm: &mut C,
) -> Result<ExecuteReport>
where
    P: ProgressCallback,
    C: ConfirmCallback,
{
    if !args.offline {
        refresh_state(client, state, args.target.as_ref())?;
    }

    let plan = build_plan(config, state, client).filter_by_target(args.target.as_ref());
    let diffs = compute_diffs(&plan.resources);
    display_diff(&diffs);

    let opts = ExecuteOptions {
        dry_run: args.dry_run,
        jobs: args.jobs,
    };
    let report = execute(plan, opts, progress, confirm)?;

    for applied in &report.applied {
        state.record(applied);
    }
    Ok(report)
}

pub fn apply(ctx: &Context, args: &ApplyArgs) -> Result<()> {
    ui::header("Applying Roster");

    if args.dry_run {
        ui::warn("Dry run - no changes will be made");
    }

    let config = ctx.load_config()?;
    let client = ctx.client(&config)?;
    let (mut state, path) = ctx.load_state()?;

    let mut progress = TerminalProgress { quiet: ctx.quiet };
    let report = if args.yes {
        converge(&client, &config, &mut state, args, &mut progress, &mut AutoConfirm)
    } else {
        converge(&client, &config, &mut state, args, &mut progress, &mut PromptConfirm)
    }?;

    if args.dry_run {
        println!();
        ui::info("Dry run - no changes made");
        return Ok(());
    }

    state.touch(&path)?;

    let summary = &report.summary;
    if summary.total_changes() == 0 && summary.failed == 0 {
        if summary.skipped > 0 {
            println!();
            println!("  {} Aborted", "✗".red());
        }
        return Ok(());
    }

    print_summary(summary);

    if !summary.is_success() {
        anyhow::bail!("{} of {} resources failed", summary.failed, summary.total());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::{AutoDecline, Kind, NoProgress, Record};
    use directory::MemoryGateway;
    use std::sync::Arc;

    const CONFIG: &str = r#"
[groups.admins]
alias = "admins"
description = "d"

[members.alice]
group_alias = "admins"
username = "alice"
"#;

    fn setup() -> (MemoryGateway, Arc<Client>) {
        let remote = MemoryGateway::new();
        let client = Arc::new(Client::with_gateway(Box::new(remote.clone())));
        (remote, client)
    }

    fn args() -> ApplyArgs {
        ApplyArgs {
            target: None,
            dry_run: false,
            yes: true,
            jobs: 2,
            offline: false,
        }
    }

    #[test]
    fn test_converge_records_outcomes() {
        let (remote, client) = setup();
        let config = RosterConfig::parse(CONFIG).unwrap();
        let mut state = RosterState::default();

        let report = converge(
            &client,
            &config,
            &mut state,
            &args(),
            &mut NoProgress,
            &mut AutoConfirm,
        )
        .unwrap();

        assert_eq!(report.summary.created, 2);
        assert_eq!(state.groups["admins"].description, "d");
        assert_eq!(state.members["alice"].username, "alice");
        assert_eq!(remote.members("admins"), vec!["alice".to_string()]);

        remote.clear_calls();
        let again = converge(
            &client,
            &config,
            &mut state,
            &args(),
            &mut NoProgress,
            &mut AutoConfirm,
        )
        .unwrap();
        assert_eq!(again.summary.total_changes(), 0);
        assert!(remote.mutating_calls().is_empty());
    }

    #[test]
    fn test_converge_removes_undeclared() {
        let (remote, client) = setup();
        let mut state = RosterState::default();
        converge(
            &client,
            &RosterConfig::parse(CONFIG).unwrap(),
            &mut state,
            &args(),
            &mut NoProgress,
            &mut AutoConfirm,
        )
        .unwrap();

        let without_alice = RosterConfig::parse(
            r#"
[groups.admins]
alias = "admins"
description = "d"
"#,
        )
        .unwrap();
        let report = converge(
            &client,
            &without_alice,
            &mut state,
            &args(),
            &mut NoProgress,
            &mut AutoConfirm,
        )
        .unwrap();

        assert_eq!(report.summary.removed, 1);
        assert!(state.members.is_empty());
        assert!(remote.members("admins").is_empty());
    }

    #[test]
    fn test_converge_declined_keeps_state() {
        let (remote, client) = setup();
        let mut state = RosterState::default();

        let report = converge(
            &client,
            &RosterConfig::parse(CONFIG).unwrap(),
            &mut state,
            &args(),
            &mut NoProgress,
            &mut AutoDecline,
        )
        .unwrap();

        assert_eq!(report.summary.skipped, 2);
        assert!(state.is_empty());
        assert!(remote.mutating_calls().is_empty());
    }

    #[test]
    fn test_refresh_drops_vanished_member() {
        let (remote, client) = setup();
        let mut state = RosterState::default();
        converge(
            &client,
            &RosterConfig::parse(CONFIG).unwrap(),
            &mut state,
            &args(),
            &mut NoProgress,
            &mut AutoConfirm,
        )
        .unwrap();

        remote.detach_member("admins", "alice");
        let drifts = refresh_state(&client, &mut state, None).unwrap();

        assert_eq!(drifts.len(), 1);
        assert_eq!(drifts[0].address, Address::new(Kind::Member, "alice"));
        assert!(state.members.is_empty());
        assert!(matches!(
            state.get(&Address::new(Kind::Group, "admins")),
            Some(Record::Group(_))
        ));
    }

    #[test]
    fn test_refresh_respects_target() {
        let (remote, client) = setup();
        let mut state = RosterState::default();
        converge(
            &client,
            &RosterConfig::parse(CONFIG).unwrap(),
            &mut state,
            &args(),
            &mut NoProgress,
            &mut AutoConfirm,
        )
        .unwrap();

        remote.detach_member("admins", "alice");
        let target: Target = "group".parse().unwrap();
        let drifts = refresh_state(&client, &mut state, Some(&target)).unwrap();

        assert!(drifts.is_empty());
        assert_eq!(state.members.len(), 1);
    }

    #[test]
    fn test_apply_recreates_after_drift() {
        let (remote, client) = setup();
        let config = RosterConfig::parse(CONFIG).unwrap();
        let mut state = RosterState::default();
        converge(&client, &config, &mut state, &args(), &mut NoProgress, &mut AutoConfirm)
            .unwrap();

        remote.detach_member("admins", "alice");
        let report =
            converge(&client, &config, &mut state, &args(), &mut NoProgress, &mut AutoConfirm)
                .unwrap();

        assert_eq!(report.summary.created, 1);
        assert_eq!(remote.members("admins"), vec!["alice".to_string()]);
    }

    #[test]
    fn test_drift_converts_to_error() {
        let error = ReconcileError::from(Drift {
            address: Address::new(Kind::Member, "alice"),
            detail: "no longer exists".into(),
        });
        assert_eq!(
            error.to_string(),
            "member.alice: drift detected: no longer exists"
        );
    }
}
