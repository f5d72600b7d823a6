//! # Terminal Records
//!
//! Records exactly as a terminal reports them, and the rules that turn them
//! into local-store writes.
//!
//! ## Merge Rules (pull users)
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  TerminalUser { uid: 7, name: "", privilege: 14, card: Some("99") }    │
//! │       │                                                                 │
//! │       ▼  UserUpsert::from_terminal(.., device_id)                       │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │ blank strings become None ("device has no opinion")            │   │
//! │  │ name: None   privilege: 14   card: Some("99")                  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ├── uid unknown locally ──► insert                               │
//! │       │      name    = "User_7"   (placeholder)                        │
//! │       │      user_id = "U007"     (synthesized)                        │
//! │       │                                                                 │
//! │       └── uid known locally ───► update                                │
//! │              name/password/card only when Some                         │
//! │              privilege always, device_id always, updated_at = now      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::types::{PunchDirection, User};

// =============================================================================
// Terminal User
// =============================================================================

/// A user record as stored on a terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TerminalUser {
    pub uid: u32,
    pub name: String,
    pub privilege: u8,
    pub password: String,
    /// Card number; `None` when the terminal reports no card.
    pub card: Option<String>,
    pub group_id: String,
    pub user_id: String,
}

impl TerminalUser {
    /// Builds the record written to a terminal for a local user.
    ///
    /// Unset password and card are sent as empty values; unset group
    /// falls back to the terminal's default group.
    pub fn from_local(user: &User) -> Self {
        TerminalUser {
            uid: user.uid,
            name: user.name.clone(),
            privilege: user.privilege,
            password: user.password.clone().unwrap_or_default(),
            card: user.card.clone().filter(|c| !c.trim().is_empty()),
            group_id: user.group_id.clone().unwrap_or_default(),
            user_id: user.user_id.clone(),
        }
    }
}

// =============================================================================
// Punch Event
// =============================================================================

/// A raw punch as reported by a terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PunchEvent {
    pub uid: u32,
    #[ts(as = "String")]
    pub timestamp: NaiveDateTime,
    pub punch: PunchDirection,
}

// =============================================================================
// User Upsert
// =============================================================================

/// Normalized pull-users write for one device-reported user.
///
/// `None` means the terminal supplied a blank value, which never
/// overwrites what the local store already holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserUpsert {
    pub uid: u32,
    pub name: Option<String>,
    pub privilege: u8,
    pub password: Option<String>,
    pub card: Option<String>,
    pub user_id: Option<String>,
    pub device_id: String,
}

impl UserUpsert {
    /// Normalizes a terminal record observed on `device_id`.
    pub fn from_terminal(user: &TerminalUser, device_id: &str) -> Self {
        UserUpsert {
            uid: user.uid,
            name: non_blank(&user.name),
            privilege: user.privilege,
            password: non_blank(&user.password),
            card: user.card.as_deref().and_then(non_blank),
            user_id: non_blank(&user.user_id),
            device_id: device_id.to_string(),
        }
    }

    /// Name used when the uid is new to the local store.
    pub fn name_or_placeholder(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| placeholder_name(self.uid))
    }

    /// user_id used when the uid is new to the local store.
    pub fn user_id_or_synthesized(&self) -> String {
        self.user_id
            .clone()
            .unwrap_or_else(|| synthesize_user_id(self.uid))
    }
}

fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

// =============================================================================
// Defaults for Unnamed Users
// =============================================================================

/// Display name for a user the terminal reports without one.
pub fn placeholder_name(uid: u32) -> String {
    format!("User_{}", uid)
}

/// user_id for a user the terminal reports without one: `U` + uid padded
/// to three digits.
///
/// ## Example
/// ```rust
/// use primesync_core::terminal::synthesize_user_id;
///
/// assert_eq!(synthesize_user_id(7), "U007");
/// assert_eq!(synthesize_user_id(1234), "U1234");
/// ```
pub fn synthesize_user_id(uid: u32) -> String {
    format!("U{:03}", uid)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn terminal_user(uid: u32, name: &str) -> TerminalUser {
        TerminalUser {
            uid,
            name: name.to_string(),
            privilege: 0,
            password: String::new(),
            card: None,
            group_id: String::new(),
            user_id: String::new(),
        }
    }

    #[test]
    fn test_blank_fields_become_none() {
        let mut user = terminal_user(7, "  ");
        user.card = Some("".to_string());
        let upsert = UserUpsert::from_terminal(&user, "dev-1");

        assert_eq!(upsert.name, None);
        assert_eq!(upsert.password, None);
        assert_eq!(upsert.card, None);
        assert_eq!(upsert.user_id, None);
        assert_eq!(upsert.device_id, "dev-1");
        assert_eq!(upsert.name_or_placeholder(), "User_7");
        assert_eq!(upsert.user_id_or_synthesized(), "U007");
    }

    #[test]
    fn test_supplied_fields_are_kept() {
        let mut user = terminal_user(42, "Alice");
        user.password = "1234".to_string();
        user.card = Some("998877".to_string());
        user.user_id = "EMP-42".to_string();
        user.privilege = 14;
        let upsert = UserUpsert::from_terminal(&user, "dev-1");

        assert_eq!(upsert.name_or_placeholder(), "Alice");
        assert_eq!(upsert.password.as_deref(), Some("1234"));
        assert_eq!(upsert.card.as_deref(), Some("998877"));
        assert_eq!(upsert.user_id_or_synthesized(), "EMP-42");
        assert_eq!(upsert.privilege, 14);
    }

    #[test]
    fn test_from_local_fills_blanks() {
        let now = Utc::now();
        let local = User {
            uid: 3,
            name: "Bob".to_string(),
            privilege: 0,
            password: None,
            group_id: None,
            user_id: "U003".to_string(),
            card: None,
            user_cloud_id: None,
            device_id: Some("dev-1".to_string()),
            created_at: now,
            updated_at: now,
        };

        let wire = TerminalUser::from_local(&local);
        assert_eq!(wire.uid, 3);
        assert_eq!(wire.password, "");
        assert_eq!(wire.card, None);
        assert_eq!(wire.group_id, "");
        assert_eq!(wire.user_id, "U003");
    }
}
