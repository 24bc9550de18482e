//! State snapshot: the last observed record of every tracked entity

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use declarative::{
    Address, Applied, GroupRecord, IdentityRecord, IdentitySetRecord, Kind, MembershipRecord,
    Record, RecordUpdate,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

// ============================================================================
// State Structures
// ============================================================================

/// Tracked records, keyed by config name per kind
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RosterState {
    /// Last time the state was updated
    pub last_updated: DateTime<Utc>,

    #[serde(default)]
    pub groups: BTreeMap<String, GroupRecord>,

    #[serde(default)]
    pub members: BTreeMap<String, MembershipRecord>,

    #[serde(default)]
    pub identities: BTreeMap<String, IdentityRecord>,

    #[serde(default)]
    pub identity_sets: BTreeMap<String, IdentitySetRecord>,
}

impl Default for RosterState {
    fn default() -> Self {
        Self {
            last_updated: Utc::now(),
            groups: BTreeMap::new(),
            members: BTreeMap::new(),
            identities: BTreeMap::new(),
            identity_sets: BTreeMap::new(),
        }
    }
}

// ============================================================================
// RosterState Implementation
// ============================================================================

impl RosterState {
    /// Load state from disk, or return default if file doesn't exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("State file does not exist, using default state");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read state file: {}", path.display()))?;

        let state: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse state file: {}", path.display()))?;

        log::debug!("Loaded state from {}", path.display());
        Ok(state)
    }

    /// Save state to disk
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create state directory: {}", dir.display()))?;
        }

        let content = toml::to_string_pretty(&self).context("Failed to serialize state to TOML")?;

        fs::write(path, &content)
            .with_context(|| format!("Failed to write state file: {}", path.display()))?;

        log::debug!("Saved state to {}", path.display());
        Ok(())
    }

    /// Update the last_updated timestamp and save
    pub fn touch(&mut self, path: &Path) -> Result<()> {
        self.last_updated = Utc::now();
        self.save(path)
    }

    // ========================================================================
    // Record Helpers
    // ========================================================================

    /// Tracked record at `address`
    pub fn get(&self, address: &Address) -> Option<Record> {
        let name = &address.name;
        match address.kind {
            Kind::Group => self.groups.get(name).cloned().map(Record::Group),
            Kind::Member => self.members.get(name).cloned().map(Record::Member),
            Kind::Identity => self.identities.get(name).cloned().map(Record::Identity),
            Kind::IdentitySet => self
                .identity_sets
                .get(name)
                .cloned()
                .map(Record::IdentitySet),
        }
    }

    /// Track `record` under `name`
    pub fn set(&mut self, name: &str, record: Record) {
        let name = name.to_string();
        match record {
            Record::Group(r) => {
                self.groups.insert(name, r);
            }
            Record::Member(r) => {
                self.members.insert(name, r);
            }
            Record::Identity(r) => {
                self.identities.insert(name, r);
            }
            Record::IdentitySet(r) => {
                self.identity_sets.insert(name, r);
            }
        }
    }

    /// Stop tracking `address`; returns whether it was tracked
    pub fn remove(&mut self, address: &Address) -> bool {
        let name = &address.name;
        match address.kind {
            Kind::Group => self.groups.remove(name).is_some(),
            Kind::Member => self.members.remove(name).is_some(),
            Kind::Identity => self.identities.remove(name).is_some(),
            Kind::IdentitySet => self.identity_sets.remove(name).is_some(),
        }
    }

    /// Record the outcome of one apply, including partial batch records
    pub fn record(&mut self, applied: &Applied) {
        match &applied.record {
            RecordUpdate::Unchanged => {}
            RecordUpdate::Set(record) => self.set(&applied.address.name, record.clone()),
            RecordUpdate::Remove => {
                self.remove(&applied.address);
            }
        }
    }

    /// Every tracked address, sorted by kind then name
    pub fn addresses(&self) -> Vec<Address> {
        let names = |kind: Kind, keys: Vec<&String>| {
            keys.into_iter()
                .map(move |name| Address::new(kind, name.as_str()))
                .collect::<Vec<_>>()
        };
        let mut addresses = names(Kind::Group, self.groups.keys().collect());
        addresses.extend(names(Kind::Member, self.members.keys().collect()));
        addresses.extend(names(Kind::Identity, self.identities.keys().collect()));
        addresses.extend(names(Kind::IdentitySet, self.identity_sets.keys().collect()));
        addresses.sort();
        addresses
    }

    /// Tracked record at `address` as TOML, for display
    pub fn render(&self, address: &Address) -> Result<Option<String>> {
        let name = &address.name;
        let rendered = match address.kind {
            Kind::Group => self.groups.get(name).map(toml::to_string_pretty),
            Kind::Member => self.members.get(name).map(toml::to_string_pretty),
            Kind::Identity => self.identities.get(name).map(toml::to_string_pretty),
            Kind::IdentitySet => self.identity_sets.get(name).map(toml::to_string_pretty),
        };
        rendered
            .transpose()
            .with_context(|| format!("Failed to render {address}"))
    }

    /// Number of tracked entities
    pub fn len(&self) -> usize {
        self.groups.len() + self.members.len() + self.identities.len() + self.identity_sets.len()
    }

    /// Whether nothing is tracked
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// Tests
// ============================================================================
