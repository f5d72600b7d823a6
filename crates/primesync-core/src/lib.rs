//! # primesync-core: Pure Domain Model for PrimeSync
//!
//! This crate holds the domain types shared by the local store, the device
//! sync core and the driver binary. Everything here is pure: no database, no
//! sockets, no file system.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        PrimeSync Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    apps/agent (primesync)                       │   │
//! │  │   devices add ──► pull-users ──► pull-attendance ──► report    │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    primesync-sync                               │   │
//! │  │   TerminalLink, UserReconciler, AttendanceReconciler, FleetSync │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │             ★ primesync-core (THIS CRATE) ★                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │ terminal  │  │  outcome  │  │ validation│  │   │
//! │  │   │  Device   │  │TerminalUsr│  │DeviceOutc.│  │ address   │  │   │
//! │  │   │  User     │  │PunchEvent │  │FleetReport│  │ uid, key  │  │   │
//! │  │   │Attendance │  │UserUpsert │  │           │  │           │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 primesync-db (Local Store)                      │   │
//! │  │              SQLite queries, migrations, repositories           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Stored entities (Device, User, Attendance, AppSettings)
//! - [`terminal`] - Records as a terminal reports them, plus the merge rules
//! - [`outcome`] - Per-device outcomes and fleet reports
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation for registration and wire encoding
//!
//! ## Example Usage
//!
//! ```rust
//! use primesync_core::terminal::{synthesize_user_id, placeholder_name};
//!
//! assert_eq!(synthesize_user_id(7), "U007");
//! assert_eq!(placeholder_name(7), "User_7");
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod outcome;
pub mod terminal;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use outcome::{AttendanceCounters, DeviceOutcome, FleetOperation, FleetReport};
pub use terminal::{PunchEvent, TerminalUser, UserUpsert};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// TCP port terminals listen on out of the box.
pub const DEFAULT_DEVICE_PORT: u16 = 4370;

/// Comm key a terminal ships with (no password set).
pub const DEFAULT_COMM_KEY: &str = "0";

/// Seconds a single connection attempt may take before it is abandoned.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Largest uid a terminal can store.
///
/// ## Why 65535?
/// The terminal keeps its internal user index in an unsigned 16-bit field,
/// so anything above this cannot round-trip through a device.
pub const MAX_UID: u32 = 65_535;

/// Key of the single settings document in the local store.
pub const APP_SETTINGS_KEY: &str = "app_settings";
