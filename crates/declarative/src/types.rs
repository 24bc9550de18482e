//! Core types for reconciliation
//!
//! Declared entities (`*Spec`) come from configuration. Observed entities
//! (`*Record`) are only ever built from remote responses and are what the
//! state snapshot stores.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Entity kind managed by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    /// A group
    Group,
    /// A single membership edge
    Member,
    /// A single identity
    Identity,
    /// A bulk-managed set of identities in one group
    IdentitySet,
}

impl Kind {
    /// Name used in addresses and on the command line
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Group => "group",
            Self::Member => "member",
            Self::Identity => "identity",
            Self::IdentitySet => "identity_set",
        }
    }

    /// All kinds
    pub fn all() -> &'static [Kind] {
        &[Self::Group, Self::Member, Self::Identity, Self::IdentitySet]
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Kind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "group" | "groups" => Ok(Self::Group),
            "member" | "members" => Ok(Self::Member),
            "identity" | "identities" => Ok(Self::Identity),
            "identity_set" | "identity_sets" => Ok(Self::IdentitySet),
            other => Err(format!(
                "unknown kind '{other}' (expected group, member, identity or identity_set)"
            )),
        }
    }
}

/// Config address of a tracked entity: `<kind>.<name>`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address {
    /// Entity kind
    pub kind: Kind,
    /// Name of the entry in configuration
    pub name: String,
}

impl Address {
    /// Create an address
    pub fn new(kind: Kind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.kind, self.name)
    }
}

impl FromStr for Address {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, name) = s
            .split_once('.')
            .ok_or_else(|| format!("invalid address '{s}' (expected <kind>.<name>)"))?;
        if name.is_empty() {
            return Err(format!("invalid address '{s}': empty name"));
        }
        Ok(Self::new(kind.parse()?, name))
    }
}

// =============================================================================
// Groups
// =============================================================================

/// Declared group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSpec {
    /// Immutable key
    pub alias: String,
    /// Description
    #[serde(default)]
    pub description: String,
    /// Display name; the alias when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl GroupSpec {
    /// Display name sent to the remote
    pub fn effective_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.alias)
    }
}

/// Observed group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRecord {
    /// Key
    pub alias: String,
    /// Description
    pub description: String,
    /// Display name
    pub name: String,
    /// Creation time reported by the remote (epoch seconds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<i64>,
}

impl From<directory::GroupDetails> for GroupRecord {
    fn from(details: directory::GroupDetails) -> Self {
        Self {
            alias: details.alias,
            description: details.description,
            name: details.name,
            create_time: details.create_time,
        }
    }
}

// =============================================================================
// Memberships
// =============================================================================

/// Declared membership edge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipSpec {
    /// Group key
    pub group_alias: String,
    /// Member username
    pub username: String,
}

/// Observed membership edge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipRecord {
    /// Group key
    pub group_alias: String,
    /// Member username as the remote reports it
    pub username: String,
}

impl MembershipRecord {
    /// Whether this edge is the one declared (by username equivalence)
    pub fn matches(&self, spec: &MembershipSpec) -> bool {
        self.group_alias == spec.group_alias
            && crate::username::equivalent(&self.username, &spec.username)
    }
}

impl From<&MembershipSpec> for MembershipRecord {
    fn from(spec: &MembershipSpec) -> Self {
        Self {
            group_alias: spec.group_alias.clone(),
            username: spec.username.clone(),
        }
    }
}

// =============================================================================
// Identities
// =============================================================================

/// Attributes of one identity, without its group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityEntry {
    /// Username, usually `group_alias:user`
    pub username: String,
    /// Full name
    pub name: String,
    /// Gender
    pub gender: String,
    /// Password; never read back from the remote
    pub password: String,
    /// School name; never read back from the remote
    #[serde(default)]
    pub school_name: String,
    /// Country id
    pub country_id: String,
    /// State id
    pub state_id: String,
}

impl IdentityEntry {
    /// Whether any attribute sent by `identity.update` differs
    ///
    /// Usernames are compared by equivalence, since the remote may report
    /// the compound form of a declared bare name.
    pub fn attributes_differ(&self, other: &IdentityEntry) -> bool {
        !crate::username::equivalent(&self.username, &other.username)
            || self.name != other.name
            || self.gender != other.gender
            || self.school_name != other.school_name
            || self.country_id != other.country_id
            || self.state_id != other.state_id
    }

    /// Request that creates this identity in `group_alias`
    pub fn create_request(&self, group_alias: &str) -> directory::IdentityCreateRequest {
        directory::IdentityCreateRequest {
            group_alias: group_alias.to_string(),
            username: self.username.clone(),
            name: self.name.clone(),
            gender: self.gender.clone(),
            password: self.password.clone(),
            school_name: self.school_name.clone(),
            country_id: self.country_id.clone(),
            state_id: self.state_id.clone(),
        }
    }

    /// Request that updates the identity currently named `original_username`
    pub fn update_request(
        &self,
        group_alias: &str,
        original_username: &str,
    ) -> directory::IdentityUpdateRequest {
        directory::IdentityUpdateRequest {
            group_alias: group_alias.to_string(),
            original_username: original_username.to_string(),
            username: self.username.clone(),
            name: self.name.clone(),
            gender: self.gender.clone(),
            school_name: self.school_name.clone(),
            country_id: self.country_id.clone(),
            state_id: self.state_id.clone(),
        }
    }

    /// Overwrite the attributes the remote reports, username included
    pub fn absorb(&mut self, member: &directory::Member) {
        self.username.clone_from(&member.username);
        self.absorb_attributes(member);
    }

    /// Overwrite the reported attributes but keep the username as recorded.
    ///
    /// Sets key their entries by username, so the remote's spelling of an
    /// equivalent name must not replace the recorded one.
    pub fn absorb_attributes(&mut self, member: &directory::Member) {
        if let Some(name) = &member.name {
            self.name.clone_from(name);
        }
        if let Some(gender) = &member.gender {
            self.gender.clone_from(gender);
        }
        if let Some(country_id) = &member.country_id {
            self.country_id.clone_from(country_id);
        }
        if let Some(state_id) = &member.state_id {
            self.state_id.clone_from(state_id);
        }
    }
}

/// Declared identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentitySpec {
    /// Group the identity is created in (immutable)
    pub group_alias: String,
    /// Identity attributes
    #[serde(flatten)]
    pub entry: IdentityEntry,
}

/// Observed identity
///
/// The password is the last value successfully sent, not remote truth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    /// Group key
    pub group_alias: String,
    /// Identity attributes
    #[serde(flatten)]
    pub entry: IdentityEntry,
}

impl From<&IdentitySpec> for IdentityRecord {
    fn from(spec: &IdentitySpec) -> Self {
        Self {
            group_alias: spec.group_alias.clone(),
            entry: spec.entry.clone(),
        }
    }
}

/// Declared bulk identity set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentitySetSpec {
    /// Group receiving every identity (immutable)
    pub group_alias: String,
    /// Identities in the set
    #[serde(default)]
    pub identities: Vec<IdentityEntry>,
}

/// Observed bulk identity set; identities sorted by username
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentitySetRecord {
    /// Group key
    pub group_alias: String,
    /// Identities confirmed in the group
    #[serde(default)]
    pub identities: Vec<IdentityEntry>,
}

impl IdentitySetRecord {
    /// Usernames in the record
    pub fn usernames(&self) -> impl Iterator<Item = &str> {
        self.identities.iter().map(|i| i.username.as_str())
    }

    /// Find an identity by exact username
    pub fn get(&self, username: &str) -> Option<&IdentityEntry> {
        self.identities.iter().find(|i| i.username == username)
    }
}

// =============================================================================
// Records and outcomes
// =============================================================================

/// Observed state of any kind, as stored in the snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    /// Group
    Group(GroupRecord),
    /// Membership edge
    Member(MembershipRecord),
    /// Identity
    Identity(IdentityRecord),
    /// Identity set
    IdentitySet(IdentitySetRecord),
}

impl Record {
    /// Kind of the record
    pub fn kind(&self) -> Kind {
        match self {
            Self::Group(_) => Kind::Group,
            Self::Member(_) => Kind::Member,
            Self::Identity(_) => Kind::Identity,
            Self::IdentitySet(_) => Kind::IdentitySet,
        }
    }

    /// Group alias the record lives in
    pub fn group_alias(&self) -> &str {
        match self {
            Self::Group(r) => &r.alias,
            Self::Member(r) => &r.group_alias,
            Self::Identity(r) => &r.group_alias,
            Self::IdentitySet(r) => &r.group_alias,
        }
    }
}

/// Result of reading an entity back from the remote
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observed<T> {
    /// Entity is present
    Present(T),
    /// Entity does not exist remotely
    Absent,
    /// Entity vanished (or partly vanished) since it was last confirmed
    Drifted {
        /// What survived, if anything
        kept: Option<T>,
        /// What went missing
        detail: String,
    },
}

impl<T> Observed<T> {
    /// The observed value to keep tracking, if any
    pub fn into_kept(self) -> Option<T> {
        match self {
            Self::Present(value) | Self::Drifted { kept: Some(value), .. } => Some(value),
            Self::Absent | Self::Drifted { kept: None, .. } => None,
        }
    }

    /// Whether drift was detected
    pub fn is_drifted(&self) -> bool {
        matches!(self, Self::Drifted { .. })
    }

    /// Map the observed value
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Observed<U> {
        match self {
            Self::Present(value) => Observed::Present(f(value)),
            Self::Absent => Observed::Absent,
            Self::Drifted { kept, detail } => Observed::Drifted {
                kept: kept.map(f),
                detail,
            },
        }
    }
}

/// Planned change for one resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    /// Nothing to do
    NoChange,
    /// Create the entity
    Create,
    /// Update mutable attributes in place
    Update,
    /// Remove the old entity and create the new one
    Replace,
    /// Stop managing the entity and remove what the API allows
    Remove,
}

impl Action {
    /// Whether the action issues remote calls
    pub fn is_change(&self) -> bool {
        !matches!(self, Self::NoChange)
    }

    /// Plan symbol
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::NoChange => " ",
            Self::Create => "+",
            Self::Update => "~",
            Self::Replace => "±",
            Self::Remove => "-",
        }
    }
}

/// Result of applying a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplyResult {
    /// No changes needed
    NoChange,
    /// Entity was created
    Created,
    /// Create failed but the existing entity was repaired
    Recovered,
    /// Entity was modified or replaced
    Modified,
    /// Entity was removed remotely
    Removed,
    /// Entity was dropped from tracking without a remote call
    Dropped { reason: String },
    /// Apply failed
    Failed { error: String },
    /// Apply was skipped
    Skipped { reason: String },
}

impl ApplyResult {
    /// Check if the result represents success (no failure)
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }

    /// Check if the result represents a change
    pub fn is_change(&self) -> bool {
        matches!(
            self,
            Self::Created | Self::Recovered | Self::Modified | Self::Removed | Self::Dropped { .. }
        )
    }
}

impl fmt::Display for ApplyResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoChange => f.write_str("no change"),
            Self::Created => f.write_str("created"),
            Self::Recovered => f.write_str("recovered"),
            Self::Modified => f.write_str("modified"),
            Self::Removed => f.write_str("removed"),
            Self::Dropped { reason } => write!(f, "dropped ({reason})"),
            Self::Failed { error } => write!(f, "failed: {error}"),
            Self::Skipped { reason } => write!(f, "skipped ({reason})"),
        }
    }
}

/// Summary of execution results
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecuteSummary {
    pub created: usize,
    pub recovered: usize,
    pub modified: usize,
    pub removed: usize,
    pub dropped: usize,
    pub skipped: usize,
    pub failed: usize,
    pub no_change: usize,
}

impl ExecuteSummary {
    /// Total number of actual changes made
    pub fn total_changes(&self) -> usize {
        self.created + self.recovered + self.modified + self.removed + self.dropped
    }

    /// Check if execution was fully successful (no failures)
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Total number of resources processed
    pub fn total(&self) -> usize {
        self.total_changes() + self.skipped + self.failed + self.no_change
    }

    /// Add a result to the summary
    pub fn add_result(&mut self, result: &ApplyResult) {
        match result {
            ApplyResult::NoChange => self.no_change += 1,
            ApplyResult::Created => self.created += 1,
            ApplyResult::Recovered => self.recovered += 1,
            ApplyResult::Modified => self.modified += 1,
            ApplyResult::Removed => self.removed += 1,
            ApplyResult::Dropped { .. } => self.dropped += 1,
            ApplyResult::Failed { .. } => self.failed += 1,
            ApplyResult::Skipped { .. } => self.skipped += 1,
        }
    }
}

/// Options for execution
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Don't make changes, just show what would happen
    pub dry_run: bool,
    /// Number of group partitions applied in parallel
    pub jobs: usize,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            jobs: 4,
        }
    }
}
