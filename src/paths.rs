//! Path resolution for roster
//!
//! # Environment Variables
//!
//! - `ROSTER_STATE_DIR` - Override state directory
//!
//! # Path Resolution Priority
//!
//! For state_dir():
//! 1. `ROSTER_STATE_DIR` environment variable
//! 2. `XDG_STATE_HOME/roster` (if set)
//! 3. Platform default:
//!    - Windows: `%LOCALAPPDATA%\roster`
//!    - macOS/Linux: `~/.local/state/roster`

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Environment variable for state directory override
pub const ENV_STATE_DIR: &str = "ROSTER_STATE_DIR";

/// Default config file, relative to the working directory
pub const DEFAULT_CONFIG_FILE: &str = "roster.toml";

/// State file name inside the state directory
pub const STATE_FILE: &str = "state.toml";

/// Get the roster state directory path
pub fn state_dir() -> Result<PathBuf> {
    resolve_state_dir(|key| std::env::var(key).ok(), dirs::home_dir())
}

fn resolve_state_dir(
    env: impl Fn(&str) -> Option<String>,
    home: Option<PathBuf>,
) -> Result<PathBuf> {
    // 1. Check environment variable override
    if let Some(dir) = env(ENV_STATE_DIR) {
        let path = expand(&dir);
        log::debug!("Using state dir from {}: {}", ENV_STATE_DIR, path.display());
        return Ok(path);
    }

    // 2. Check XDG_STATE_HOME
    if let Some(xdg_state) = env("XDG_STATE_HOME") {
        let path = PathBuf::from(xdg_state).join("roster");
        log::debug!("Using XDG_STATE_HOME: {}", path.display());
        return Ok(path);
    }

    // 3. Platform default
    #[cfg(windows)]
    {
        if let Some(local_app_data) = dirs::data_local_dir() {
            let path = local_app_data.join("roster");
            log::debug!("Using Windows state dir: {}", path.display());
            return Ok(path);
        }
    }

    let home = home.context("Could not determine home directory")?;
    let path = home.join(".local").join("state").join("roster");
    log::debug!("Using default state dir: {}", path.display());
    Ok(path)
}

/// Default state file path
pub fn state_file() -> Result<PathBuf> {
    Ok(state_dir()?.join(STATE_FILE))
}

/// Expand ~ and environment variables in a path string.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_state_dir_env_override() {
        let result = resolve_state_dir(
            env(&[(ENV_STATE_DIR, "/custom/state"), ("XDG_STATE_HOME", "/xdg")]),
            None,
        )
        .unwrap();
        assert_eq!(result, PathBuf::from("/custom/state"));
    }

    #[test]
    fn test_xdg_state_home() {
        let result = resolve_state_dir(env(&[("XDG_STATE_HOME", "/tmp/xdg")]), None).unwrap();
        assert_eq!(result, PathBuf::from("/tmp/xdg/roster"));
    }

    #[cfg(not(windows))]
    #[test]
    fn test_state_dir_default() {
        let result = resolve_state_dir(env(&[]), Some(PathBuf::from("/home/u"))).unwrap();
        assert_eq!(result, PathBuf::from("/home/u/.local/state/roster"));
    }

    #[cfg(not(windows))]
    #[test]
    fn test_state_dir_without_home_fails() {
        assert!(resolve_state_dir(env(&[]), None).is_err());
    }

    #[test]
    fn test_expand_tilde() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand("~/roster.toml"), home.join("roster.toml"));
        }
        assert_eq!(expand("/abs/path"), PathBuf::from("/abs/path"));
    }
}
