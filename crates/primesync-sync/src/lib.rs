//! # primesync-sync: Device Sync Core for PrimeSync
//!
//! This crate owns every conversation with an attendance terminal and the
//! reconciliation of what terminals report against the local store.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Device Sync Architecture                         │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                   FleetSync (Fleet Orchestrator)                 │  │
//! │  │                                                                  │  │
//! │  │  pull_attendance / pull_users / push_users / sync_after_mutation │  │
//! │  │  One outcome per registered terminal, folded into FleetReport    │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │         ┌─────────────────────┴─────────────────────┐                  │
//! │         ▼                                           ▼                   │
//! │  ┌────────────────────┐                  ┌────────────────────────┐    │
//! │  │  UserReconciler    │                  │  AttendanceReconciler  │    │
//! │  │                    │                  │                        │    │
//! │  │ Pull: merge users  │                  │ Append punches, skip   │    │
//! │  │ Push: create or    │                  │ unknown uids and       │    │
//! │  │ replace on device  │                  │ duplicates             │    │
//! │  └─────────┬──────────┘                  └───────────┬────────────┘    │
//! │            └───────────────────┬─────────────────────┘                  │
//! │                                ▼                                        │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │  TerminalLink                                                    │  │
//! │  │  connect with timeout + backoff, always disconnect               │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               ▼                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │  TerminalTransport (trait)        ZkTransport: TCP port 4370     │  │
//! │  └──────────────────────────────────────────────────────────────────┘  │
//! │                                                                         │
//! │  SettingsService: app settings document + watch-channel notification   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`config`] - Agent configuration (timeouts, retries, concurrency)
//! - [`error`] - Sync error types
//! - [`transport`] - The terminal capability the reconcilers depend on
//! - [`zk`] - Binary TCP protocol spoken by the terminals
//! - [`link`] - Single-terminal session lifecycle
//! - [`users`] - User pull and push
//! - [`attendance`] - Attendance pull
//! - [`fleet`] - Fleet-wide orchestration
//! - [`settings`] - Application settings document
//!
//! ## Usage
//!
//! ```rust,ignore
//! use primesync_sync::{FleetSync, SyncConfig, ZkTransport};
//! use primesync_db::{Database, DbConfig};
//!
//! let config = SyncConfig::load_or_default(None);
//! let db = Database::new(DbConfig::new(config.db_path())).await?;
//!
//! let fleet = FleetSync::new(config, db, ZkTransport::new());
//! let report = fleet.pull_attendance().await?;
//! println!("{}", report.message());
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod attendance;
pub mod config;
pub mod error;
pub mod fleet;
pub mod link;
pub mod settings;
pub mod transport;
pub mod users;
pub mod zk;

#[cfg(test)]
pub(crate) mod testing;

// =============================================================================
// Re-exports
// =============================================================================

pub use attendance::AttendanceReconciler;
pub use config::{DatabaseSettings, FleetSettings, SyncConfig, TerminalSettings};
pub use error::{SyncError, SyncResult};
pub use fleet::{FleetEventEmitter, FleetSync, NoOpEmitter};
pub use link::TerminalLink;
pub use settings::SettingsService;
pub use transport::{TerminalEndpoint, TerminalTransport};
pub use users::UserReconciler;
pub use zk::{ZkSession, ZkTransport};
