//! # Validation Module
//!
//! Input validation for device registration, local user enrollment and
//! records about to be written to a terminal.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Registration (agent binary)                                  │
//! │  ├── validate_new_device / validate_new_user                           │
//! │  └── Rejects input before it reaches the store                         │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Wire encoding (primesync-sync)                               │
//! │  ├── Field widths of the terminal user record                          │
//! │  └── A failure here is InvalidRecord for that device only              │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── UNIQUE uid / user_id                                              │
//! │  ├── UNIQUE (user_uid, timestamp, status) on attendance                │
//! │  └── Foreign key constraints                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use primesync_core::validation::{validate_comm_key, validate_uid};
//!
//! assert_eq!(validate_comm_key("1234").unwrap(), 1234);
//! assert!(validate_uid(0).is_err());
//! ```

use std::net::IpAddr;

use crate::error::ValidationError;
use crate::types::{NewDevice, NewUser};
use crate::MAX_UID;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Byte width of the name field in a terminal user record.
pub const MAX_NAME_BYTES: usize = 24;

/// Byte width of the password field in a terminal user record.
pub const MAX_PASSWORD_BYTES: usize = 8;

/// Byte width of the user_id field in a terminal user record.
pub const MAX_USER_ID_BYTES: usize = 24;

/// Byte width of the group field in a terminal user record.
pub const MAX_GROUP_BYTES: usize = 7;

// =============================================================================
// Device Validators
// =============================================================================

/// Validates a terminal address.
///
/// ## Rules
/// - Must not be empty
/// - Either an IP literal or a hostname made of letters, digits, `-` and `.`
pub fn validate_ip_address(address: &str) -> ValidationResult<()> {
    let address = address.trim();

    if address.is_empty() {
        return Err(ValidationError::Required {
            field: "ip_address".to_string(),
        });
    }

    if address.parse::<IpAddr>().is_ok() {
        return Ok(());
    }

    let hostname_ok = address.len() <= 253
        && address
            .split('.')
            .all(|label| {
                !label.is_empty()
                    && !label.starts_with('-')
                    && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
            });

    if !hostname_ok {
        return Err(ValidationError::InvalidFormat {
            field: "ip_address".to_string(),
            reason: "must be an IP address or hostname".to_string(),
        });
    }

    Ok(())
}

/// Validates a TCP port. Port 0 cannot be dialed.
pub fn validate_port(port: u16) -> ValidationResult<()> {
    if port == 0 {
        return Err(ValidationError::OutOfRange {
            field: "port".to_string(),
            min: 1,
            max: u16::MAX as i64,
        });
    }

    Ok(())
}

/// Parses a comm key. Terminals only accept a non-negative integer.
///
/// ## Example
/// ```rust
/// use primesync_core::validation::validate_comm_key;
///
/// assert_eq!(validate_comm_key("0").unwrap(), 0);
/// assert!(validate_comm_key("secret").is_err());
/// ```
pub fn validate_comm_key(password: &str) -> ValidationResult<u32> {
    let password = password.trim();

    if password.is_empty() {
        return Err(ValidationError::Required {
            field: "password".to_string(),
        });
    }

    password
        .parse::<u32>()
        .map_err(|_| ValidationError::InvalidFormat {
            field: "password".to_string(),
            reason: "comm key must be numeric".to_string(),
        })
}

/// Validates a full device registration.
pub fn validate_new_device(device: &NewDevice) -> ValidationResult<()> {
    validate_ip_address(&device.ip_address)?;
    validate_port(device.port)?;
    validate_comm_key(&device.password)?;
    Ok(())
}

// =============================================================================
// User Validators
// =============================================================================

/// Validates a uid against what a terminal can index.
pub fn validate_uid(uid: u32) -> ValidationResult<()> {
    if uid == 0 || uid > MAX_UID {
        return Err(ValidationError::OutOfRange {
            field: "uid".to_string(),
            min: 1,
            max: MAX_UID as i64,
        });
    }

    Ok(())
}

fn validate_width(field: &str, value: &str, max: usize) -> ValidationResult<()> {
    if value.len() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }
    Ok(())
}

/// Validates a display name.
pub fn validate_user_name(name: &str) -> ValidationResult<()> {
    if name.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "name".to_string(),
        });
    }
    validate_width("name", name, MAX_NAME_BYTES)
}

/// Validates a verification password (may be empty).
pub fn validate_user_password(password: &str) -> ValidationResult<()> {
    validate_width("password", password, MAX_PASSWORD_BYTES)
}

/// Validates an access group (may be empty).
pub fn validate_group_id(group_id: &str) -> ValidationResult<()> {
    validate_width("group_id", group_id, MAX_GROUP_BYTES)
}

/// Parses a card number. Blank means "no card".
///
/// ## Example
/// ```rust
/// use primesync_core::validation::validate_card;
///
/// assert_eq!(validate_card("").unwrap(), None);
/// assert_eq!(validate_card("998877").unwrap(), Some(998877));
/// assert!(validate_card("AB12").is_err());
/// ```
pub fn validate_card(card: &str) -> ValidationResult<Option<u32>> {
    let card = card.trim();
    if card.is_empty() {
        return Ok(None);
    }

    card.parse::<u32>()
        .map(Some)
        .map_err(|_| ValidationError::InvalidFormat {
            field: "card".to_string(),
            reason: "must be a number that fits in 32 bits".to_string(),
        })
}

/// Validates a local enrollment before it is stored.
pub fn validate_new_user(user: &NewUser) -> ValidationResult<()> {
    validate_uid(user.uid)?;
    validate_user_name(&user.name)?;

    if user.user_id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "user_id".to_string(),
        });
    }
    validate_width("user_id", &user.user_id, MAX_USER_ID_BYTES)?;

    if let Some(password) = &user.password {
        validate_user_password(password)?;
    }
    if let Some(group_id) = &user.group_id {
        validate_group_id(group_id)?;
    }
    if let Some(card) = &user.card {
        validate_card(card)?;
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(uid: u32, name: &str) -> NewUser {
        NewUser {
            uid,
            name: name.to_string(),
            privilege: 0,
            password: None,
            group_id: None,
            user_id: format!("U{:03}", uid),
            card: None,
            device_id: None,
        }
    }

    #[test]
    fn test_validate_ip_address() {
        assert!(validate_ip_address("192.168.1.201").is_ok());
        assert!(validate_ip_address("fe80::1").is_ok());
        assert!(validate_ip_address("terminal-01.lan").is_ok());

        assert!(validate_ip_address("").is_err());
        assert!(validate_ip_address("   ").is_err());
        assert!(validate_ip_address("bad host").is_err());
        assert!(validate_ip_address("a..b").is_err());
    }

    #[test]
    fn test_validate_port() {
        assert!(validate_port(4370).is_ok());
        assert!(validate_port(0).is_err());
    }

    #[test]
    fn test_validate_comm_key() {
        assert_eq!(validate_comm_key(" 42 ").unwrap(), 42);
        assert!(validate_comm_key("").is_err());
        assert!(validate_comm_key("-1").is_err());
        assert!(validate_comm_key("abc").is_err());
    }

    #[test]
    fn test_validate_new_device() {
        assert!(validate_new_device(&NewDevice::new("10.0.0.5")).is_ok());
        assert!(validate_new_device(&NewDevice::new("10.0.0.5").password("pw")).is_err());
        assert!(validate_new_device(&NewDevice::new("10.0.0.5").port(0)).is_err());
    }

    #[test]
    fn test_validate_uid() {
        assert!(validate_uid(1).is_ok());
        assert!(validate_uid(65_535).is_ok());
        assert!(validate_uid(0).is_err());
        assert!(validate_uid(65_536).is_err());
    }

    #[test]
    fn test_validate_new_user() {
        assert!(validate_new_user(&new_user(7, "Alice")).is_ok());
        assert!(validate_new_user(&new_user(7, "")).is_err());
        assert!(validate_new_user(&new_user(7, &"A".repeat(25))).is_err());

        let mut user = new_user(7, "Alice");
        user.password = Some("123456789".to_string());
        assert!(validate_new_user(&user).is_err());

        let mut user = new_user(7, "Alice");
        user.card = Some("not-a-card".to_string());
        assert!(validate_new_user(&user).is_err());
    }
}
