//! # Terminal Transport
//!
//! The capability every terminal protocol implementation provides.
//!
//! ## Session Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Terminal Session Lifecycle                          │
//! │                                                                         │
//! │   connect(endpoint, timeout) ──► Session                               │
//! │                                     │                                   │
//! │                  ┌──────────────────┼──────────────────┐                │
//! │                  ▼                  ▼                  ▼                │
//! │            fetch_users      fetch_attendance      upsert_user           │
//! │                  │                  │                  │                │
//! │                  └──────────────────┼──────────────────┘                │
//! │                                     ▼                                   │
//! │                          disconnect(Session)                            │
//! │                                                                         │
//! │   The session is moved into disconnect, so a closed session cannot    │
//! │   be used again. Callers go through TerminalLink, which holds the      │
//! │   session and guarantees the disconnect.                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `ZkTransport` in [`crate::zk`] is the production implementation. Tests
//! plug in an in-memory fake.

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;

use primesync_core::validation::validate_comm_key;
use primesync_core::{Device, PunchEvent, TerminalUser};

use crate::error::SyncResult;

// =============================================================================
// Terminal Endpoint
// =============================================================================

/// Network address and comm key of one terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalEndpoint {
    pub address: String,
    pub port: u16,
    pub comm_key: u32,
}

impl TerminalEndpoint {
    /// Creates an endpoint.
    pub fn new(address: impl Into<String>, port: u16, comm_key: u32) -> Self {
        TerminalEndpoint {
            address: address.into(),
            port,
            comm_key,
        }
    }

    /// Builds the endpoint of a registered device.
    ///
    /// ## Errors
    /// `SyncError::Validation` when the stored password is not a numeric
    /// comm key.
    pub fn from_device(device: &Device) -> SyncResult<Self> {
        let comm_key = validate_comm_key(&device.password)?;
        Ok(TerminalEndpoint::new(
            device.ip_address.clone(),
            device.port,
            comm_key,
        ))
    }

    /// `address:port`, as passed to the socket layer.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

impl fmt::Display for TerminalEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

// =============================================================================
// Transport Capability
// =============================================================================

/// Protocol-level access to attendance terminals.
///
/// Implementations report every failure as a `SyncError` value and never
/// panic on bad input from the network.
#[async_trait]
pub trait TerminalTransport: Send + Sync {
    /// An open session with one terminal.
    type Session: Send;

    /// Opens a session. `timeout` bounds the TCP connect and each reply.
    async fn connect(
        &self,
        endpoint: &TerminalEndpoint,
        timeout: Duration,
    ) -> SyncResult<Self::Session>;

    /// Closes a session.
    async fn disconnect(&self, session: Self::Session) -> SyncResult<()>;

    /// Reads every user enrolled on the terminal.
    async fn fetch_users(&self, session: &mut Self::Session) -> SyncResult<Vec<TerminalUser>>;

    /// Reads every punch stored on the terminal.
    async fn fetch_attendance(&self, session: &mut Self::Session) -> SyncResult<Vec<PunchEvent>>;

    /// Creates or replaces a user on the terminal, keyed by uid.
    async fn upsert_user(&self, session: &mut Self::Session, user: &TerminalUser)
        -> SyncResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use primesync_core::DeviceStatus;

    fn device(password: &str) -> Device {
        Device {
            id: "dev-1".into(),
            ip_address: "192.168.1.201".into(),
            port: 4370,
            password: password.into(),
            device_model: None,
            status: DeviceStatus::Offline,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_endpoint_from_device() {
        let endpoint = TerminalEndpoint::from_device(&device("1234")).unwrap();
        assert_eq!(endpoint.comm_key, 1234);
        assert_eq!(endpoint.socket_addr(), "192.168.1.201:4370");
        assert_eq!(endpoint.to_string(), "192.168.1.201:4370");
    }

    #[test]
    fn test_endpoint_rejects_non_numeric_key() {
        assert!(TerminalEndpoint::from_device(&device("secret")).is_err());
    }
}
