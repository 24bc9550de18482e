//! Composite import key: `<group_alias>,<username>`

use crate::error::ReconcileError;
use std::fmt;
use std::str::FromStr;

/// A group-scoped username, as used to import members and identities
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositeKey {
    /// Group key
    pub group_alias: String,
    /// Username inside the group
    pub username: String,
}

impl FromStr for CompositeKey {
    type Err = ReconcileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').collect();
        match parts.as_slice() {
            [group_alias, username] if !group_alias.is_empty() && !username.is_empty() => {
                Ok(Self {
                    group_alias: (*group_alias).to_string(),
                    username: (*username).to_string(),
                })
            }
            _ => Err(ReconcileError::InvalidImportId(s.to_string())),
        }
    }
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.group_alias, self.username)
    }
}
