//! # Repository Module
//!
//! Database repository implementations for PrimeSync.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Reconciler (primesync-sync)                                           │
//! │       │                                                                 │
//! │       │  db.users().upsert_from_device(&upsert)                        │
//! │       ▼                                                                 │
//! │  UserRepository                                                        │
//! │  ├── get_by_uid(&self, uid)                                            │
//! │  ├── list_by_device(&self, device_id)                                  │
//! │  └── upsert_from_device(&self, upsert)                                 │
//! │       │                                                                 │
//! │       │  One SQL statement per record                                   │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`DeviceRepository`](device::DeviceRepository) - Registered terminals
//! - [`UserRepository`](user::UserRepository) - Enrolled users, pull upsert
//! - [`AttendanceRepository`](attendance::AttendanceRepository) - Punch ledger with dedup
//! - [`SettingsRepository`](settings::SettingsRepository) - JSON settings documents

pub mod attendance;
pub mod device;
pub mod settings;
pub mod user;
