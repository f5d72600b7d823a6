//! # primesync-db: Local Store for PrimeSync
//!
//! This crate provides database access for PrimeSync.
//! It uses SQLite for local storage with sqlx for async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        PrimeSync Data Flow                              │
//! │                                                                         │
//! │  FleetSync / reconcilers (primesync-sync)                              │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   primesync-db (THIS CRATE)                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │               │    │  (embedded)  │  │   │
//! │  │   │               │    │ DeviceRepo    │    │ 001_initial  │  │   │
//! │  │   │ SqlitePool    │◄───│ UserRepo      │    │   _schema    │  │   │
//! │  │   │ Connection    │    │ AttendanceRepo│    │              │  │   │
//! │  │   │ Management    │    │ SettingsRepo  │    │              │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database                             │   │
//! │  │   <platform data dir>/primesync.db                             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use primesync_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("primesync.db")).await?;
//! for device in db.devices().list().await? {
//!     println!("{} {:?}", device.ip_address, device.status);
//! }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::attendance::AttendanceRepository;
pub use repository::device::DeviceRepository;
pub use repository::settings::SettingsRepository;
pub use repository::user::{UpsertOutcome, UserRepository};
