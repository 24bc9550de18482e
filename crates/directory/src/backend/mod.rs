//! Gateway trait and implementations.
//!
//! A [`Gateway`] executes one named operation with flat form fields and
//! returns the raw response body. It is the only code in the workspace
//! that touches the network. [`http::HttpGateway`] talks to a real
//! server; [`memory::MemoryGateway`] emulates one in-process.
//!
//! # Testing
//!
//! ```
//! use directory::backend::memory::MemoryGateway;
//! use directory::{Client, GroupRequest};
//!
//! let remote = MemoryGateway::new();
//! let client = Client::with_gateway(Box::new(remote.clone()));
//!
//! client
//!     .group_create(&GroupRequest {
//!         alias: "admins".into(),
//!         description: "d".into(),
//!         name: "admins".into(),
//!     })
//!     .unwrap();
//!
//! assert!(remote.group("admins").is_some());
//! ```

pub mod http;
pub mod memory;

use crate::error::{Error, Result};
use crate::types::{Fields, Operation};
use std::time::Duration;

/// Default omegaUp endpoint.
pub const DEFAULT_BASE_URL: &str = "https://omegaup.com";

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Executes remote operations.
///
/// Implementations must not retry: a non-success status is returned as
/// [`Error::Rejected`] and a transport failure as [`Error::Transport`].
pub trait Gateway: Send + Sync {
    /// Execute one operation and return the raw response body.
    fn execute(&self, operation: Operation, fields: &Fields) -> Result<Vec<u8>>;
}

/// Connection settings for [`http::HttpGateway`].
///
/// Credentials are passed in explicitly; nothing here reads the
/// environment.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Base URL of the API server.
    pub base_url: String,
    /// Bearer token sent with every call.
    pub api_token: String,
    /// Global timeout for a single request.
    pub timeout: Duration,
}

impl GatewayConfig {
    /// Create a config for the default endpoint.
    pub fn new(api_token: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_token: api_token.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Override the base URL.
    #[must_use]
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Override the request timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Check the settings before any request is made.
    pub fn validate(&self) -> Result<()> {
        if self.api_token.trim().is_empty() {
            return Err(Error::MissingCredential);
        }
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(Error::InvalidBaseUrl(self.base_url.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = GatewayConfig::new("token");
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_rejects_empty_token() {
        let config = GatewayConfig::new("  ");
        assert!(matches!(config.validate(), Err(Error::MissingCredential)));
    }

    #[test]
    fn test_config_rejects_bad_url() {
        let config = GatewayConfig::new("token").base_url("omegaup.com");
        assert!(matches!(config.validate(), Err(Error::InvalidBaseUrl(_))));
    }
}
