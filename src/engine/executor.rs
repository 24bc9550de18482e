//! Terminal integration for the declarative executor

use anyhow::Result;
use colored::Colorize;
use declarative::{Applied, ConfirmCallback, ExecuteSummary, Phase, ProgressCallback};

/// Prints each outcome as it completes
pub struct TerminalProgress {
    pub quiet: bool,
}

impl ProgressCallback for TerminalProgress {
    fn on_phase_start(&mut self, phase: Phase, count: usize) {
        if !self.quiet {
            println!();
            println!("  {} Applying {} ({})...", "→".cyan(), phase, count);
        }
    }

    fn on_resource_complete(&mut self, applied: &Applied) {
        if self.quiet && applied.result.is_success() {
            return;
        }
        println!(
            "    {} {} {}",
            crate::ui::result_symbol(&applied.result),
            applied.address,
            applied.result.to_string().dimmed()
        );
    }

    fn on_phase_complete(&mut self, _phase: Phase) {}
}

/// Asks on the terminal before applying
pub struct PromptConfirm;

impl ConfirmCallback for PromptConfirm {
    fn confirm(&mut self, prompt: &str) -> Result<bool> {
        use dialoguer::Confirm;

        println!();
        let confirmed = Confirm::new()
            .with_prompt(prompt)
            .default(true)
            .interact()?;

        Ok(confirmed)
    }
}

/// Print final summary
pub fn print_summary(summary: &ExecuteSummary) {
    println!();
    if summary.is_success() {
        println!("  {} Roster applied successfully!", "✓".green().bold());
    } else {
        println!("  {} Roster applied with errors", "⚠".yellow().bold());
    }

    for (count, what) in [
        (summary.created, "created"),
        (summary.recovered, "recovered"),
        (summary.modified, "modified"),
        (summary.removed, "removed"),
        (summary.dropped, "dropped from state"),
        (summary.skipped, "skipped"),
    ] {
        if count > 0 {
            println!("    • {count} resources {what}");
        }
    }
    if summary.failed > 0 {
        println!("    • {} {} failed", summary.failed, "resources".red());
    }
}
