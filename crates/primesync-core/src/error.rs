//! # Error Types
//!
//! Domain-specific error types for primesync-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  primesync-core errors (this file)                                     │
//! │  ├── CoreError        - General domain errors                          │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  primesync-db errors (separate crate)                                  │
//! │  └── DbError          - Local store failures                           │
//! │                                                                         │
//! │  primesync-sync errors (separate crate)                                │
//! │  └── SyncError        - Terminal conversation failures                 │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError / SyncError → DeviceOutcome        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Domain errors raised outside of a terminal conversation.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Device cannot be found.
    ///
    /// ## When This Occurs
    /// - A command names a device id that was never registered
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// User cannot be found by uid.
    #[error("User not found: uid {0}")]
    UserNotFound(u32),

    /// Settings document could not be decoded.
    ///
    /// ## When This Occurs
    /// - The stored JSON was edited by hand and no longer parses
    /// - A newer build wrote fields with incompatible types
    #[error("Invalid settings document: {0}")]
    InvalidSettings(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised when a device registration, a local user, or a record about to be
/// written to a terminal does not meet the terminal's constraints.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} bytes")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Invalid format (e.g., non-numeric comm key).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::DeviceNotFound("abc".to_string());
        assert_eq!(err.to_string(), "Device not found: abc");

        let err = CoreError::UserNotFound(7);
        assert_eq!(err.to_string(), "User not found: uid 7");
    }

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::Required {
            field: "ip_address".to_string(),
        };
        assert_eq!(err.to_string(), "ip_address is required");

        let err = ValidationError::OutOfRange {
            field: "uid".to_string(),
            min: 1,
            max: 65535,
        };
        assert_eq!(err.to_string(), "uid must be between 1 and 65535");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "name".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
