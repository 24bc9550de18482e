mod cli;
mod commands;
mod config;
mod engine;
mod paths;
mod state;
mod ui;

use anyhow::{Context as AnyhowContext, Result};
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command, StateCommand};
use directory::Client;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::RosterConfig;
use crate::state::RosterState;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    pub config_path: PathBuf,
    pub state_path: Option<PathBuf>,
    pub api_token: Option<String>,
    pub base_url: Option<String>,
}

impl Context {
    /// Load and validate the declared configuration
    pub fn load_config(&self) -> Result<RosterConfig> {
        RosterConfig::load(&self.config_path)
    }

    /// Resolved state file path
    pub fn state_path(&self) -> Result<PathBuf> {
        match &self.state_path {
            Some(path) => Ok(path.clone()),
            None => paths::state_file(),
        }
    }

    /// Load tracked state
    pub fn load_state(&self) -> Result<(RosterState, PathBuf)> {
        let path = self.state_path()?;
        let state = RosterState::load(&path)?;
        Ok((state, path))
    }

    /// API client, with credentials resolved once
    pub fn client(&self, config: &RosterConfig) -> Result<Arc<Client>> {
        let gateway = config.gateway_config(self.api_token.as_deref(), self.base_url.as_deref())?;
        log::debug!("Using API at {}", gateway.base_url);
        let client = Client::new(gateway).context("Failed to create API client")?;
        Ok(Arc::new(client))
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
        config_path: paths::expand(&cli.config),
        state_path: cli.state.as_deref().map(paths::expand),
        api_token: cli.api_token,
        base_url: cli.base_url,
    };

    match cli.command {
        Command::Plan(args) => commands::declarative::plan(&ctx, &args),
        Command::Apply(args) => commands::declarative::apply(&ctx, &args),
        Command::Refresh(args) => commands::declarative::refresh(&ctx, &args),
        Command::Import(args) => commands::import::run(&ctx, &args),
        Command::State(cmd) => match cmd {
            StateCommand::List => commands::state::list(&ctx),
            StateCommand::Show { address } => commands::state::show(&ctx, &address),
            StateCommand::Rm { address } => commands::state::rm(&ctx, &address),
        },
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "roster", &mut io::stdout());
            Ok(())
        }
    }
}
