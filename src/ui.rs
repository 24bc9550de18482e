use colored::{ColoredString, Colorize};
use declarative::{Action, ApplyResult};

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Colored plan symbol for an action
pub fn action_symbol(action: Action) -> ColoredString {
    match action {
        Action::Create => action.symbol().green(),
        Action::Remove => action.symbol().red(),
        Action::Update => action.symbol().yellow(),
        Action::Replace => action.symbol().magenta(),
        Action::NoChange => action.symbol().dimmed(),
    }
}

/// Colored symbol for an apply outcome
pub fn result_symbol(result: &ApplyResult) -> ColoredString {
    match result {
        ApplyResult::NoChange => "○".dimmed(),
        ApplyResult::Created | ApplyResult::Modified | ApplyResult::Removed => "✓".green(),
        ApplyResult::Recovered | ApplyResult::Dropped { .. } => "✓".yellow(),
        ApplyResult::Failed { .. } => "✗".red(),
        ApplyResult::Skipped { .. } => "⊘".dimmed(),
    }
}

/// Heading for a kind in plan output
pub fn kind_title(kind: declarative::Kind) -> &'static str {
    match kind {
        declarative::Kind::Group => "Groups",
        declarative::Kind::Member => "Members",
        declarative::Kind::Identity => "Identities",
        declarative::Kind::IdentitySet => "Identity sets",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_symbols() {
        colored::control::set_override(false);
        assert_eq!(result_symbol(&ApplyResult::Created).to_string(), "✓");
        assert_eq!(
            result_symbol(&ApplyResult::Failed {
                error: "x".into()
            })
            .to_string(),
            "✗"
        );
        assert_eq!(action_symbol(Action::Remove).to_string(), "-");
    }

    #[test]
    fn test_kind_title() {
        assert_eq!(kind_title(declarative::Kind::IdentitySet), "Identity sets");
    }
}
