//! # Domain Types
//!
//! Entities as they live in the local store.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │     Device      │   │      User       │   │   Attendance    │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │◄──│  device_id (FK) │   │  id (rowid)     │       │
//! │  │  ip_address     │   │  uid (PK)       │◄──│  user_uid (FK)  │       │
//! │  │  port           │   │  user_id        │   │  timestamp      │       │
//! │  │  password       │   │  name           │   │  status label   │       │
//! │  │  status         │   │  privilege      │   │  punch          │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │  DeviceStatus   │   │ PunchDirection  │   │  AppSettings    │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  Online         │   │  In             │   │  JSON document  │       │
//! │  │  Offline        │   │  Out            │   │  "app_settings" │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Identity
//! - Device: UUID v4 assigned at registration
//! - User: the terminal-assigned `uid` is the primary key and the join key
//!   between local and device-side records; `user_id` is the human-facing
//!   code and is unique as well
//! - Attendance: store rowid, deduplicated on (user_uid, timestamp, status)

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::{DEFAULT_COMM_KEY, DEFAULT_DEVICE_PORT};

// =============================================================================
// Device Status
// =============================================================================

/// Last-known reachability of a terminal.
///
/// Advisory only: it is refreshed after every connection attempt and never
/// consulted before one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "PascalCase"))]
#[ts(export)]
pub enum DeviceStatus {
    /// The last connection attempt succeeded.
    Online,
    /// The last connection attempt failed, or none was made yet.
    Offline,
}

impl DeviceStatus {
    /// Returns the label stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceStatus::Online => "Online",
            DeviceStatus::Offline => "Offline",
        }
    }
}

impl Default for DeviceStatus {
    fn default() -> Self {
        DeviceStatus::Offline
    }
}

// =============================================================================
// Device
// =============================================================================

/// A registered attendance terminal.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Device {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Network address of the terminal.
    pub ip_address: String,

    /// TCP port (4370 unless the installer changed it).
    pub port: u16,

    /// Numeric comm key, kept as text the way the terminal menu shows it.
    pub password: String,

    /// Free-form model label (e.g., "K40").
    pub device_model: Option<String>,

    /// Last-known reachability.
    pub status: DeviceStatus,

    /// When the device was registered.
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// Fields supplied when registering a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewDevice {
    pub ip_address: String,
    pub port: u16,
    pub password: String,
    pub device_model: Option<String>,
}

impl NewDevice {
    /// Creates a registration with the factory port and comm key.
    pub fn new(ip_address: impl Into<String>) -> Self {
        NewDevice {
            ip_address: ip_address.into(),
            port: DEFAULT_DEVICE_PORT,
            password: DEFAULT_COMM_KEY.to_string(),
            device_model: None,
        }
    }

    /// Sets the TCP port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the comm key.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    /// Sets the model label.
    pub fn device_model(mut self, model: impl Into<String>) -> Self {
        self.device_model = Some(model.into());
        self
    }
}

// =============================================================================
// User
// =============================================================================

/// A person enrolled on one or more terminals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct User {
    /// Terminal-assigned numeric id (primary key).
    pub uid: u32,

    /// Display name.
    pub name: String,

    /// Privilege level as the terminal reports it (0 = normal user).
    pub privilege: u8,

    /// Optional verification password.
    pub password: Option<String>,

    /// Optional access group.
    pub group_id: Option<String>,

    /// Application-level user code (e.g., "U007").
    pub user_id: String,

    /// Optional RFID card number.
    pub card: Option<String>,

    /// Identifier assigned by the cloud service, once uploaded.
    pub user_cloud_id: Option<String>,

    /// Terminal this user was last seen on or assigned to.
    pub device_id: Option<String>,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

/// Fields supplied when enrolling a user locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewUser {
    pub uid: u32,
    pub name: String,
    pub privilege: u8,
    pub password: Option<String>,
    pub group_id: Option<String>,
    pub user_id: String,
    pub card: Option<String>,
    pub device_id: Option<String>,
}

// =============================================================================
// Punch Direction
// =============================================================================

/// Whether a punch records arrival or departure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "UPPERCASE"))]
#[ts(export)]
#[serde(rename_all = "UPPERCASE")]
pub enum PunchDirection {
    In,
    Out,
}

impl PunchDirection {
    /// Maps the terminal's punch code to a direction.
    ///
    /// Only code 0 means check-in; every other code (break, overtime, ...)
    /// is treated as a check-out.
    pub fn from_device_code(code: u8) -> Self {
        if code == 0 {
            PunchDirection::In
        } else {
            PunchDirection::Out
        }
    }

    /// Returns the code written back when a terminal needs one.
    pub fn device_code(&self) -> u8 {
        match self {
            PunchDirection::In => 0,
            PunchDirection::Out => 1,
        }
    }

    /// Human-readable status label stored alongside the punch.
    pub fn status_label(&self) -> &'static str {
        match self {
            PunchDirection::In => "Check-In",
            PunchDirection::Out => "Check-Out",
        }
    }

    /// Stored punch column value.
    pub fn as_str(&self) -> &'static str {
        match self {
            PunchDirection::In => "IN",
            PunchDirection::Out => "OUT",
        }
    }
}

// =============================================================================
// Attendance
// =============================================================================

/// An immutable punch in the local attendance ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Attendance {
    /// Store row id.
    pub id: i64,

    /// Owning user (foreign key to `users.uid`).
    pub user_uid: u32,

    /// Terminal local time of the punch (no zone information).
    #[ts(as = "String")]
    pub timestamp: NaiveDateTime,

    /// "Check-In" or "Check-Out".
    pub status: String,

    pub punch: PunchDirection,

    /// uid exactly as the terminal reported it.
    pub device_uid: u32,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Settings
// =============================================================================

fn default_cloud_api_url() -> String {
    "https://api.primesync.com/v1".to_string()
}

fn default_username() -> String {
    "admin".to_string()
}

fn default_auto_check_interval() -> u32 {
    15
}

fn default_periodic_sync_time() -> String {
    "12:00 PM".to_string()
}

fn default_true() -> bool {
    true
}

/// Application settings, persisted as one JSON document.
///
/// Missing fields fall back to their defaults so older documents keep
/// loading after new settings are introduced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AppSettings {
    /// Base URL of the cloud attendance API.
    #[serde(default = "default_cloud_api_url")]
    pub cloud_api_url: String,

    #[serde(default = "default_username")]
    pub username: String,

    #[serde(default)]
    pub password: String,

    /// Minutes between automatic device health checks.
    #[serde(default = "default_auto_check_interval")]
    pub auto_check_interval: u32,

    #[serde(default = "default_true")]
    pub enable_auto_sync: bool,

    /// Wall-clock time of the daily sync, as shown to the operator.
    #[serde(default = "default_periodic_sync_time")]
    pub periodic_sync_time: String,

    #[serde(default = "default_true")]
    pub enable_periodic_sync: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        AppSettings {
            cloud_api_url: default_cloud_api_url(),
            username: default_username(),
            password: String::new(),
            auto_check_interval: default_auto_check_interval(),
            enable_auto_sync: true,
            periodic_sync_time: default_periodic_sync_time(),
            enable_periodic_sync: true,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_status_default() {
        assert_eq!(DeviceStatus::default(), DeviceStatus::Offline);
        assert_eq!(DeviceStatus::Online.as_str(), "Online");
    }

    #[test]
    fn test_new_device_defaults() {
        let device = NewDevice::new("192.168.1.201");
        assert_eq!(device.port, 4370);
        assert_eq!(device.password, "0");
        assert!(device.device_model.is_none());

        let device = NewDevice::new("10.0.0.5").port(4371).password("1234").device_model("K40");
        assert_eq!(device.port, 4371);
        assert_eq!(device.password, "1234");
        assert_eq!(device.device_model.as_deref(), Some("K40"));
    }

    #[test]
    fn test_punch_direction_from_device_code() {
        assert_eq!(PunchDirection::from_device_code(0), PunchDirection::In);
        assert_eq!(PunchDirection::from_device_code(1), PunchDirection::Out);
        assert_eq!(PunchDirection::from_device_code(4), PunchDirection::Out);
        assert_eq!(PunchDirection::In.status_label(), "Check-In");
        assert_eq!(PunchDirection::Out.status_label(), "Check-Out");
        assert_eq!(PunchDirection::Out.as_str(), "OUT");
    }

    #[test]
    fn test_app_settings_defaults() {
        let settings = AppSettings::default();
        assert_eq!(settings.cloud_api_url, "https://api.primesync.com/v1");
        assert_eq!(settings.username, "admin");
        assert_eq!(settings.auto_check_interval, 15);
        assert_eq!(settings.periodic_sync_time, "12:00 PM");
        assert!(settings.enable_auto_sync);
        assert!(settings.enable_periodic_sync);
    }

    #[test]
    fn test_app_settings_partial_document() {
        let settings: AppSettings =
            serde_json::from_str(r#"{"username":"ops","auto_check_interval":30}"#).unwrap();
        assert_eq!(settings.username, "ops");
        assert_eq!(settings.auto_check_interval, 30);
        assert_eq!(settings.cloud_api_url, "https://api.primesync.com/v1");
        assert!(settings.enable_periodic_sync);
    }
}
