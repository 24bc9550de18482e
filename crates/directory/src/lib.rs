//! # directory
//!
//! Typed client for the omegaUp group and identity API.
//!
//! This crate provides:
//! - One typed request struct per operation with an explicit form encoding
//! - A [`Gateway`](backend::Gateway) seam with an HTTP and an in-memory
//!   implementation
//! - Error classification so callers can tell "already exists" and
//!   "not found" apart from real failures
//!
//! ## Example
//!
//! ```no_run
//! use directory::{Client, GatewayConfig, MemberRequest};
//!
//! let client = Client::new(GatewayConfig::new("my-token")).expect("token is set");
//! client.group_add_user(&MemberRequest::new("admins", "alice")).unwrap();
//!
//! for member in client.group_members("admins").unwrap() {
//!     println!("{}", member.username);
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod error;
pub mod types;

pub use backend::memory::MemoryGateway;
pub use backend::{Gateway, GatewayConfig};
pub use error::{Error, ErrorCategory, Result};
pub use types::{
    BulkCreateRequest, ChangePasswordRequest, Fields, GroupDetails, GroupRequest,
    IdentityCreateRequest, IdentityUpdateRequest, Member, MemberRequest, Operation,
};

use backend::http::HttpGateway;
use serde::de::DeserializeOwned;
use std::fmt;
use types::{GroupDetailsResponse, IdentityCreated, MembersResponse, group_lookup_fields};

/// High-level client for directory operations.
///
/// Every method issues exactly one gateway call.
pub struct Client {
    gateway: Box<dyn Gateway>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client").finish_non_exhaustive()
    }
}

impl Client {
    /// Create a client talking HTTP to the configured server.
    pub fn new(config: GatewayConfig) -> Result<Self> {
        Ok(Self {
            gateway: Box::new(HttpGateway::new(config)?),
        })
    }

    /// Create a client with a custom gateway (useful for testing).
    #[must_use]
    pub fn with_gateway(gateway: Box<dyn Gateway>) -> Self {
        Self { gateway }
    }

    /// Execute a raw operation.
    pub fn execute(&self, operation: Operation, fields: &Fields) -> Result<Vec<u8>> {
        self.gateway.execute(operation, fields)
    }

    fn call<T: DeserializeOwned>(&self, operation: Operation, fields: &Fields) -> Result<T> {
        let body = self.execute(operation, fields)?;
        serde_json::from_slice(&body).map_err(|e| Error::Decode {
            operation,
            message: e.to_string(),
        })
    }

    // =========================================================================
    // Groups
    // =========================================================================

    /// Create a group.
    pub fn group_create(&self, request: &GroupRequest) -> Result<()> {
        self.execute(Operation::GroupCreate, &request.to_fields())
            .map(drop)
    }

    /// Update a group's description and name.
    pub fn group_update(&self, request: &GroupRequest) -> Result<()> {
        self.execute(Operation::GroupUpdate, &request.to_fields())
            .map(drop)
    }

    /// Read a group.
    pub fn group_details(&self, alias: &str) -> Result<GroupDetails> {
        let response: GroupDetailsResponse =
            self.call(Operation::GroupDetails, &group_lookup_fields(alias))?;
        Ok(response.group)
    }

    /// Attach a user to a group.
    pub fn group_add_user(&self, request: &MemberRequest) -> Result<()> {
        self.execute(Operation::GroupAddUser, &request.to_fields())
            .map(drop)
    }

    /// Detach a user from a group.
    pub fn group_remove_user(&self, request: &MemberRequest) -> Result<()> {
        self.execute(Operation::GroupRemoveUser, &request.to_fields())
            .map(drop)
    }

    /// List a group's members.
    pub fn group_members(&self, alias: &str) -> Result<Vec<Member>> {
        let response: MembersResponse =
            self.call(Operation::GroupMembers, &group_lookup_fields(alias))?;
        Ok(response.identities)
    }

    // =========================================================================
    // Identities
    // =========================================================================

    /// Create an identity; returns the username the server assigned.
    pub fn identity_create(&self, request: &IdentityCreateRequest) -> Result<String> {
        let created: IdentityCreated = self.call(Operation::IdentityCreate, &request.to_fields())?;
        Ok(created.username)
    }

    /// Update (and possibly rename) an identity.
    pub fn identity_update(&self, request: &IdentityUpdateRequest) -> Result<()> {
        self.execute(Operation::IdentityUpdate, &request.to_fields())
            .map(drop)
    }

    /// Change an identity's password.
    pub fn identity_change_password(&self, request: &ChangePasswordRequest) -> Result<()> {
        self.execute(Operation::IdentityChangePassword, &request.to_fields())
            .map(drop)
    }

    /// Create many identities in one group at once.
    pub fn identity_bulk_create(&self, request: &BulkCreateRequest) -> Result<()> {
        let operation = Operation::IdentityBulkCreate;
        let fields = request.to_fields().map_err(|e| Error::Encode {
            operation,
            message: e.to_string(),
        })?;
        self.execute(operation, &fields).map(drop)
    }
}
