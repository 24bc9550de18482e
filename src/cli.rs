use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use declarative::{Address, Kind, Target};
use std::path::PathBuf;

use crate::paths::DEFAULT_CONFIG_FILE;

#[derive(Parser)]
#[command(name = "roster")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Declarative groups, members and identities for omegaUp", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Declared configuration
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    pub config: String,

    /// State file [default: ~/.local/state/roster/state.toml]
    #[arg(long, global = true)]
    pub state: Option<String>,

    /// API token
    #[arg(long, global = true, env = "OMEGAUP_API_TOKEN", hide_env_values = true)]
    pub api_token: Option<String>,

    /// API base URL
    #[arg(long, global = true, env = "OMEGAUP_BASE_URL")]
    pub base_url: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show what apply would change
    Plan(PlanArgs),

    /// Make the remote match the configuration
    Apply(ApplyArgs),

    /// Re-read tracked entities and drop the ones that vanished
    Refresh(RefreshArgs),

    /// Adopt an existing remote entity into state
    Import(ImportArgs),

    /// Inspect or edit tracked state
    #[command(subcommand)]
    State(StateCommand),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Declarative Commands
// ============================================================================

#[derive(Args)]
pub struct PlanArgs {
    /// Only this kind or entry (e.g. `group` or `group.admins`)
    pub target: Option<Target>,

    /// Print the plan as JSON
    #[arg(long)]
    pub json: bool,

    /// Plan against the stored state without refreshing it first
    #[arg(long)]
    pub offline: bool,
}

#[derive(Args)]
pub struct ApplyArgs {
    /// Only this kind or entry (e.g. `group` or `group.admins`)
    pub target: Option<Target>,

    /// Show what would change without calling the API
    #[arg(long)]
    pub dry_run: bool,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Number of groups applied in parallel
    #[arg(short, long, default_value = "4")]
    pub jobs: usize,

    /// Plan against the stored state without refreshing it first
    #[arg(long)]
    pub offline: bool,
}

#[derive(Args)]
pub struct RefreshArgs {
    /// Only this kind or entry (e.g. `group` or `group.admins`)
    pub target: Option<Target>,

    /// Fail when a tracked entity has drifted
    #[arg(long)]
    pub strict: bool,
}

#[derive(Args)]
pub struct ImportArgs {
    /// Kind of entity: group, member or identity
    pub kind: Kind,

    /// Config name to track it under
    pub name: String,

    /// Remote id: the alias for groups, `<group_alias>,<username>` otherwise
    pub id: String,
}

// ============================================================================
// State Commands
// ============================================================================

#[derive(Subcommand)]
pub enum StateCommand {
    /// List tracked addresses
    List,

    /// Show a tracked record
    Show {
        /// Address, e.g. `group.admins`
        address: Address,
    },

    /// Stop tracking an entry without touching the remote
    Rm {
        /// Address, e.g. `group.admins`
        address: Address,
    },
}
