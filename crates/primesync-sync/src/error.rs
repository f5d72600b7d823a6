//! # Sync Error Types
//!
//! Error types for terminal sessions and reconciliation.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │   Connection    │  │     Protocol            │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  Connection     │  │  Protocol               │ │
//! │  │  ConfigLoad     │  │  Timeout        │  │  UnexpectedReply        │ │
//! │  │  ConfigSave     │  │  AuthRejected   │  │  InvalidRecord          │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐                              │
//! │  │    Database     │  │   Validation    │                              │
//! │  │                 │  │                 │                              │
//! │  │  DbError        │  │  ValidationError│                              │
//! │  └─────────────────┘  └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Connection and protocol errors never leave a reconciler: they are turned
//! into a failed `DeviceOutcome` at the single-device boundary.

use primesync_core::ValidationError;
use primesync_db::DbError;
use thiserror::Error;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Sync error type covering every terminal and reconciliation failure.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid sync configuration.
    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Connection Errors
    // =========================================================================
    /// TCP connect or handshake failed.
    #[error("Connection to {address} failed: {reason}")]
    ConnectionFailed { address: String, reason: String },

    /// No reply within the connect timeout.
    #[error("Connection timeout after {secs} seconds ({address})")]
    Timeout { address: String, secs: u64 },

    /// Terminal refused the comm key.
    #[error("Terminal {address} rejected the comm key")]
    AuthRejected { address: String },

    // =========================================================================
    // Protocol Errors
    // =========================================================================
    /// Malformed or truncated data mid-session.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Terminal answered with a reply code we did not ask for.
    #[error("Unexpected reply: expected {expected}, got {actual}")]
    UnexpectedReply { expected: String, actual: u16 },

    /// A local record cannot be expressed on the wire.
    #[error("Invalid record for uid {uid}: {reason}")]
    InvalidRecord { uid: u32, reason: String },

    /// Socket read/write failure after the session was established.
    #[error("Terminal I/O error: {0}")]
    Io(String),

    // =========================================================================
    // Store Errors
    // =========================================================================
    /// Local store failure during reconciliation.
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    /// Domain validation failure.
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::Io(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization (for retry logic)
// =============================================================================

impl SyncError {
    /// Returns true if the terminal could not be reached or refused us.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            SyncError::ConnectionFailed { .. }
                | SyncError::Timeout { .. }
                | SyncError::AuthRejected { .. }
        )
    }

    /// Returns true if another connect attempt may succeed.
    ///
    /// A rejected comm key will be rejected again, so it is not retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::ConnectionFailed { .. } | SyncError::Timeout { .. }
        )
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
        )
    }

    /// Returns true if the session broke after it was established.
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            SyncError::Protocol(_) | SyncError::UnexpectedReply { .. } | SyncError::Io(_)
        )
    }
}
