//! Plan display

use anyhow::{Context, Result};
use colored::Colorize;
use declarative::{DiffSummary, ResourceDiff, group_by_kind};

use crate::ui;

/// Display a list of diffs in a user-friendly format
pub fn display_diff(diffs: &[ResourceDiff]) {
    if diffs.is_empty() {
        println!();
        println!("  {} No changes needed", "✓".green());
        return;
    }

    println!();
    println!(
        "┌─ {} ─────────────────────────────────────────┐",
        "Roster Plan".bold()
    );
    println!("│");

    for (kind, kind_diffs) in group_by_kind(diffs) {
        println!("│ {}", ui::kind_title(kind).bold());

        for diff in kind_diffs {
            println!(
                "│   {} {:<30} {}",
                ui::action_symbol(diff.action),
                diff.address,
                diff.description.dimmed()
            );
            for change in &diff.changes {
                println!("│       {}", change.dimmed());
            }
        }
        println!("│");
    }

    let summary = DiffSummary::from_diffs(diffs);
    println!("├─────────────────────────────────────────────────────┤");
    println!("│ Summary: {}", summary_line(&summary));
    println!("└─────────────────────────────────────────────────────┘");
}

/// Print diffs as JSON
pub fn print_json(diffs: &[ResourceDiff]) -> Result<()> {
    let json = serde_json::to_string_pretty(diffs).context("Failed to serialize plan")?;
    println!("{json}");
    Ok(())
}

fn summary_line(summary: &DiffSummary) -> String {
    format!(
        "{} to add, {} to change, {} to replace, {} to remove",
        summary.additions.to_string().green(),
        summary.modifications.to_string().yellow(),
        summary.replacements.to_string().magenta(),
        summary.removals.to_string().red()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::{Action, Kind};

    #[test]
    fn test_summary_line() {
        colored::control::set_override(false);
        let diffs = vec![
            ResourceDiff {
                address: "group.admins".into(),
                kind: Kind::Group,
                description: "Group admins".into(),
                action: Action::Create,
                changes: Vec::new(),
            },
            ResourceDiff {
                address: "member.alice".into(),
                kind: Kind::Member,
                description: "alice in admins".into(),
                action: Action::Remove,
                changes: Vec::new(),
            },
        ];
        assert_eq!(
            summary_line(&DiffSummary::from_diffs(&diffs)),
            "1 to add, 0 to change, 0 to replace, 1 to remove"
        );
    }
}
