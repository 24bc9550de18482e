//! Operations, request payloads and response shapes.
//!
//! The wire format is a flat string-to-string form. Every request type
//! owns an explicit `to_fields` so a renamed field shows up as a compile
//! error here instead of a silent server-side rejection.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Flat form fields sent with every operation.
pub type Fields = BTreeMap<String, String>;

/// Remote operations exposed by the directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Create a group.
    GroupCreate,
    /// Update a group's description and name.
    GroupUpdate,
    /// Read a group.
    GroupDetails,
    /// Attach a user to a group.
    GroupAddUser,
    /// Detach a user from a group.
    GroupRemoveUser,
    /// List a group's members.
    GroupMembers,
    /// Create an identity inside a group.
    IdentityCreate,
    /// Update (and possibly rename) an identity.
    IdentityUpdate,
    /// Change an identity's password.
    IdentityChangePassword,
    /// Create many identities inside a group at once.
    IdentityBulkCreate,
}

impl Operation {
    /// Dotted operation name, e.g. `group.create`.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::GroupCreate => "group.create",
            Self::GroupUpdate => "group.update",
            Self::GroupDetails => "group.details",
            Self::GroupAddUser => "group.addUser",
            Self::GroupRemoveUser => "group.removeUser",
            Self::GroupMembers => "group.members",
            Self::IdentityCreate => "identity.create",
            Self::IdentityUpdate => "identity.update",
            Self::IdentityChangePassword => "identity.changePassword",
            Self::IdentityBulkCreate => "identity.bulkCreate",
        }
    }

    /// API path relative to the base URL.
    #[must_use]
    pub fn path(&self) -> String {
        let (collection, action) = self.name().split_once('.').unwrap_or(("", self.name()));
        format!("/api/{collection}/{action}/")
    }

    /// Whether the operation changes remote state.
    #[must_use]
    pub fn is_mutating(&self) -> bool {
        !matches!(self, Self::GroupDetails | Self::GroupMembers)
    }

    /// All operations.
    #[must_use]
    pub fn all() -> &'static [Operation] {
        &[
            Self::GroupCreate,
            Self::GroupUpdate,
            Self::GroupDetails,
            Self::GroupAddUser,
            Self::GroupRemoveUser,
            Self::GroupMembers,
            Self::IdentityCreate,
            Self::IdentityUpdate,
            Self::IdentityChangePassword,
            Self::IdentityBulkCreate,
        ]
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

fn fields<V: AsRef<str>, const N: usize>(pairs: [(&str, V); N]) -> Fields {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.as_ref().to_string()))
        .collect()
}

// =============================================================================
// Group requests
// =============================================================================

/// Payload for `group.create` and `group.update`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupRequest {
    /// Immutable group key.
    pub alias: String,
    /// Free-form description.
    pub description: String,
    /// Display name.
    pub name: String,
}

impl GroupRequest {
    /// Encode as form fields.
    #[must_use]
    pub fn to_fields(&self) -> Fields {
        fields([
            ("alias", &self.alias),
            ("description", &self.description),
            ("name", &self.name),
        ])
    }
}

/// Payload for `group.addUser` and `group.removeUser`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberRequest {
    /// Group key.
    pub group_alias: String,
    /// Username (or email) of the member.
    pub username: String,
}

impl MemberRequest {
    /// Build a request for one membership edge.
    pub fn new(group_alias: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            group_alias: group_alias.into(),
            username: username.into(),
        }
    }

    /// Encode as form fields.
    #[must_use]
    pub fn to_fields(&self) -> Fields {
        fields([
            ("group_alias", &self.group_alias),
            ("usernameOrEmail", &self.username),
        ])
    }
}

/// Encode the single-field group lookup used by `group.details` and `group.members`.
#[must_use]
pub fn group_lookup_fields(group_alias: &str) -> Fields {
    fields([("group_alias", group_alias)])
}

// =============================================================================
// Identity requests
// =============================================================================

/// Payload for `identity.create`; also one entry of `identity.bulkCreate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityCreateRequest {
    /// Group the identity belongs to.
    pub group_alias: String,
    /// Username, usually `group_alias:user`.
    pub username: String,
    /// Full name.
    pub name: String,
    /// Gender.
    pub gender: String,
    /// Initial password.
    pub password: String,
    /// School name.
    pub school_name: String,
    /// ISO 3166 country id.
    pub country_id: String,
    /// State id within the country.
    pub state_id: String,
}

impl IdentityCreateRequest {
    /// Encode as form fields.
    #[must_use]
    pub fn to_fields(&self) -> Fields {
        fields([
            ("group_alias", &self.group_alias),
            ("username", &self.username),
            ("name", &self.name),
            ("gender", &self.gender),
            ("password", &self.password),
            ("school_name", &self.school_name),
            ("country_id", &self.country_id),
            ("state_id", &self.state_id),
        ])
    }
}

/// Payload for `identity.update`.
///
/// Both the original and the new username are always sent so the server
/// can detect a rename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityUpdateRequest {
    /// Group the identity belongs to.
    pub group_alias: String,
    /// Username the identity currently has.
    pub original_username: String,
    /// Username the identity should have.
    pub username: String,
    /// Full name.
    pub name: String,
    /// Gender.
    pub gender: String,
    /// School name.
    pub school_name: String,
    /// ISO 3166 country id.
    pub country_id: String,
    /// State id within the country.
    pub state_id: String,
}

impl IdentityUpdateRequest {
    /// Encode as form fields.
    #[must_use]
    pub fn to_fields(&self) -> Fields {
        fields([
            ("group_alias", &self.group_alias),
            ("original_username", &self.original_username),
            ("username", &self.username),
            ("name", &self.name),
            ("gender", &self.gender),
            ("school_name", &self.school_name),
            ("country_id", &self.country_id),
            ("state_id", &self.state_id),
        ])
    }
}

/// Payload for `identity.changePassword`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangePasswordRequest {
    /// Group the identity belongs to.
    pub group_alias: String,
    /// Username of the identity.
    pub username: String,
    /// New password.
    pub password: String,
}

impl ChangePasswordRequest {
    /// Encode as form fields.
    #[must_use]
    pub fn to_fields(&self) -> Fields {
        fields([
            ("group_alias", &self.group_alias),
            ("username", &self.username),
            ("password", &self.password),
        ])
    }
}

/// Payload for `identity.bulkCreate`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkCreateRequest {
    /// Group receiving the identities.
    pub group_alias: String,
    /// Identities to create.
    pub identities: Vec<IdentityCreateRequest>,
}

impl BulkCreateRequest {
    /// Encode as form fields; the identities travel as one JSON array field.
    pub fn to_fields(&self) -> serde_json::Result<Fields> {
        let identities = serde_json::to_string(&self.identities)?;
        Ok(fields([
            ("group_alias", self.group_alias.as_str()),
            ("identities", identities.as_str()),
        ]))
    }
}

// =============================================================================
// Responses
// =============================================================================

/// A group as returned by `group.details`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupDetails {
    /// Group key.
    pub alias: String,
    /// Description.
    #[serde(default)]
    pub description: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Creation timestamp (seconds since the epoch).
    #[serde(default)]
    pub create_time: Option<i64>,
}

/// Envelope of `group.details`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupDetailsResponse {
    /// The group.
    pub group: GroupDetails,
}

/// One entry of `group.members`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Member {
    /// Username as reported by the server.
    pub username: String,
    /// Full name, when the member is an identity.
    #[serde(default)]
    pub name: Option<String>,
    /// Gender, when known.
    #[serde(default)]
    pub gender: Option<String>,
    /// Country id, when known.
    #[serde(default)]
    pub country_id: Option<String>,
    /// State id, when known.
    #[serde(default)]
    pub state_id: Option<String>,
}

/// Envelope of `group.members`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MembersResponse {
    /// Members of the group.
    #[serde(default)]
    pub identities: Vec<Member>,
}

/// Response of `identity.create`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityCreated {
    /// Username assigned by the server.
    pub username: String,
}
