//! Declared configuration (`roster.toml`)

use anyhow::{Context, Result};
use declarative::username;
use declarative::{
    Address, GroupSpec, IdentityEntry, IdentitySetSpec, IdentitySpec, Kind, MembershipSpec,
};
use directory::GatewayConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Server connection settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    /// API base URL; the public server when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// API token; the command line and environment take precedence
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,

    /// Per-request timeout in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

/// Everything declared in the config file, keyed by config name
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RosterConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub groups: BTreeMap<String, GroupSpec>,

    #[serde(default)]
    pub members: BTreeMap<String, MembershipSpec>,

    #[serde(default)]
    pub identities: BTreeMap<String, IdentitySpec>,

    #[serde(default)]
    pub identity_sets: BTreeMap<String, IdentitySetSpec>,
}

/// Invalid declarations
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{address}: {field} must not be empty")]
    EmptyField { address: Address, field: &'static str },

    #[error("group alias '{alias}' is declared by both {first} and {second}")]
    DuplicateGroup {
        alias: String,
        first: Address,
        second: Address,
    },

    #[error("member '{username}' of '{group_alias}' is declared by both {first} and {second}")]
    DuplicateMember {
        group_alias: String,
        username: String,
        first: Address,
        second: Address,
    },

    #[error("identity '{username}' in '{group_alias}' is declared by both {first} and {second}")]
    DuplicateIdentity {
        group_alias: String,
        username: String,
        first: Address,
        second: Address,
    },
}

impl RosterConfig {
    /// Load and validate a config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        let config = Self::parse(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Parse and validate TOML
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).context("Failed to parse TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Check keys are present and unique
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        let mut aliases: BTreeMap<&str, Address> = BTreeMap::new();
        for (name, group) in &self.groups {
            let address = Address::new(Kind::Group, name);
            non_empty(&address, "alias", &group.alias)?;
            if let Some(first) = aliases.insert(&group.alias, address.clone()) {
                return Err(ConfigError::DuplicateGroup {
                    alias: group.alias.clone(),
                    first,
                    second: address,
                });
            }
        }

        let mut edges: Vec<(&MembershipSpec, Address)> = Vec::new();
        for (name, member) in &self.members {
            let address = Address::new(Kind::Member, name);
            non_empty(&address, "group_alias", &member.group_alias)?;
            non_empty(&address, "username", &member.username)?;
            if let Some((_, first)) = edges.iter().find(|(other, _)| {
                other.group_alias == member.group_alias
                    && username::equivalent(&other.username, &member.username)
            }) {
                return Err(ConfigError::DuplicateMember {
                    group_alias: member.group_alias.clone(),
                    username: member.username.clone(),
                    first: first.clone(),
                    second: address,
                });
            }
            edges.push((member, address));
        }

        let mut declared: Vec<(&str, &IdentityEntry, Address)> = Vec::new();
        for (name, identity) in &self.identities {
            let address = Address::new(Kind::Identity, name);
            non_empty(&address, "group_alias", &identity.group_alias)?;
            declared.push((&identity.group_alias, &identity.entry, address));
        }
        for (name, set) in &self.identity_sets {
            let address = Address::new(Kind::IdentitySet, name);
            non_empty(&address, "group_alias", &set.group_alias)?;
            for entry in &set.identities {
                declared.push((&set.group_alias, entry, address.clone()));
            }
        }

        for (i, (group_alias, entry, address)) in declared.iter().enumerate() {
            non_empty(address, "username", &entry.username)?;
            let earlier = declared[..i].iter().find(|(group, other, _)| {
                group == group_alias && username::equivalent(&other.username, &entry.username)
            });
            if let Some((_, _, first)) = earlier {
                return Err(ConfigError::DuplicateIdentity {
                    group_alias: (*group_alias).to_string(),
                    username: entry.username.clone(),
                    first: first.clone(),
                    second: address.clone(),
                });
            }
        }

        Ok(())
    }

    /// Resolve connection settings.
    ///
    /// `api_token` and `base_url` come from the command line (or the
    /// environment through clap) and win over the file.
    pub fn gateway_config(
        &self,
        api_token: Option<&str>,
        base_url: Option<&str>,
    ) -> Result<GatewayConfig> {
        let token = api_token
            .or(self.server.api_token.as_deref())
            .unwrap_or_default();
        let mut config = GatewayConfig::new(token);
        if let Some(url) = base_url.or(self.server.base_url.as_deref()) {
            config = config.base_url(url);
        }
        if let Some(secs) = self.server.timeout_secs {
            config = config.timeout(Duration::from_secs(secs));
        }
        match config.validate() {
            Ok(()) => Ok(config),
            Err(directory::Error::MissingCredential) => anyhow::bail!(
                "No API token: pass --api-token, set OMEGAUP_API_TOKEN, or set [server].api_token"
            ),
            Err(e) => Err(e).context("Invalid [server] settings"),
        }
    }
}

fn non_empty(
    address: &Address,
    field: &'static str,
    value: &str,
) -> std::result::Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::EmptyField {
            address: address.clone(),
            field,
        });
    }
    Ok(())
}
