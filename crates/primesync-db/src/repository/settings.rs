//! # Settings Repository
//!
//! Key/value storage where every value is a JSON document.

use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};

/// Repository for settings database operations.
#[derive(Debug, Clone)]
pub struct SettingsRepository {
    pool: SqlitePool,
}

impl SettingsRepository {
    /// Creates a new SettingsRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SettingsRepository { pool }
    }

    /// Reads and decodes the value stored under `key`.
    ///
    /// ## Returns
    /// * `Ok(None)` - nothing stored yet
    /// * `Err(DbError::InvalidValue)` - stored JSON does not match `T`
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> DbResult<Option<T>> {
        let raw: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        match raw {
            None => Ok(None),
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| DbError::InvalidValue {
                    key: key.to_string(),
                    reason: e.to_string(),
                }),
        }
    }

    /// Encodes and stores `value` under `key`, replacing any previous value.
    pub async fn put<T: Serialize>(&self, key: &str, value: &T) -> DbResult<()> {
        let raw = serde_json::to_string(value).map_err(|e| DbError::InvalidValue {
            key: key.to_string(),
            reason: e.to_string(),
        })?;

        debug!(key = %key, "Saving setting");

        sqlx::query(
            r#"
            INSERT INTO settings (key, value) VALUES (?1, ?2)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(key)
        .bind(raw)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
