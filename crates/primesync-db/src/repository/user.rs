//! # User Repository
//!
//! Enrolled users, keyed by the terminal-assigned `uid`.
//!
//! ## Pull Upsert
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  One statement per device-reported user:                               │
//! │                                                                         │
//! │  INSERT INTO users (...) VALUES (placeholder name, synthesized id ...) │
//! │  ON CONFLICT(uid) DO UPDATE SET                                        │
//! │      name      = COALESCE(<device name or NULL>, users.name)           │
//! │      privilege = <device privilege>                                    │
//! │      password  = COALESCE(<device password or NULL>, users.password)   │
//! │      card      = COALESCE(<device card or NULL>, users.card)           │
//! │      device_id = <source device>                                       │
//! │      updated_at = now                                                  │
//! │                                                                         │
//! │  Two terminals reporting the same uid at once are serialized by        │
//! │  SQLite; neither can observe a half-applied merge.                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, warn};

use crate::error::{DbError, DbResult};
use primesync_core::{NewUser, User, UserUpsert};

/// Whether a pull upsert created or refreshed the local row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
}

const USER_COLUMNS: &str = "uid, name, privilege, password, group_id, user_id, card, \
                            user_cloud_id, device_id, created_at, updated_at";

/// Repository for user database operations.
#[derive(Debug, Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    /// Creates a new UserRepository.
    pub fn new(pool: SqlitePool) -> Self {
        UserRepository { pool }
    }

    /// Enrolls a user locally.
    pub async fn insert(&self, new: &NewUser) -> DbResult<User> {
        let now = Utc::now();
        let user = User {
            uid: new.uid,
            name: new.name.trim().to_string(),
            privilege: new.privilege,
            password: new.password.clone(),
            group_id: new.group_id.clone(),
            user_id: new.user_id.trim().to_string(),
            card: new.card.clone(),
            user_cloud_id: None,
            device_id: new.device_id.clone(),
            created_at: now,
            updated_at: now,
        };

        debug!(uid = user.uid, user_id = %user.user_id, "Inserting user");

        sqlx::query(
            r#"
            INSERT INTO users (
                uid, name, privilege, password, group_id, user_id, card,
                user_cloud_id, device_id, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL, ?8, ?9, ?9)
            "#,
        )
        .bind(user.uid)
        .bind(&user.name)
        .bind(user.privilege)
        .bind(&user.password)
        .bind(&user.group_id)
        .bind(&user.user_id)
        .bind(&user.card)
        .bind(&user.device_id)
        .bind(user.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { field, .. } => {
                let value = if field.ends_with("uid") {
                    user.uid.to_string()
                } else {
                    user.user_id.clone()
                };
                DbError::duplicate(field, value)
            }
            other => other,
        })?;

        Ok(user)
    }

    /// Gets a user by uid.
    pub async fn get_by_uid(&self, uid: u32) -> DbResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE uid = ?1",
            USER_COLUMNS
        ))
        .bind(uid)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// Checks whether a uid is known locally.
    pub async fn exists(&self, uid: u32) -> DbResult<bool> {
        let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM users WHERE uid = ?1")
            .bind(uid)
            .fetch_optional(&self.pool)
            .await?;

        Ok(found.is_some())
    }

    /// Lists the users owned by a device, by uid.
    pub async fn list_by_device(&self, device_id: &str) -> DbResult<Vec<User>> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE device_id = ?1 ORDER BY uid ASC",
            USER_COLUMNS
        ))
        .bind(device_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(users)
    }

    /// Lists all users, by uid.
    pub async fn list(&self) -> DbResult<Vec<User>> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users ORDER BY uid ASC",
            USER_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(users)
    }

    /// Merges one device-reported user into the store in a single statement.
    ///
    /// ## Rules
    /// - New uid: insert with placeholder name and synthesized user_id when
    ///   the device supplied none
    /// - Known uid: name, password and card change only when the device
    ///   supplied a value; privilege and owning device always follow the
    ///   device; user_id, group and cloud id are never touched
    /// - New uid whose user_id is already held by another uid: retried once
    ///   with `<user_id>-<uid>`
    pub async fn upsert_from_device(&self, upsert: &UserUpsert) -> DbResult<UpsertOutcome> {
        let user_id = upsert.user_id_or_synthesized();

        match self.upsert_row(upsert, &user_id).await {
            Err(DbError::UniqueViolation { field, .. }) if field.ends_with("user_id") => {
                let fallback = format!("{}-{}", user_id, upsert.uid);
                warn!(
                    uid = upsert.uid,
                    user_id = %user_id,
                    fallback = %fallback,
                    "user_id already taken by another uid"
                );
                self.upsert_row(upsert, &fallback).await
            }
            other => other,
        }
    }

    async fn upsert_row(&self, upsert: &UserUpsert, user_id: &str) -> DbResult<UpsertOutcome> {
        let now = Utc::now();

        let created: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO users (
                uid, name, privilege, password, group_id, user_id, card,
                user_cloud_id, device_id, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, NULL, ?5, ?6, NULL, ?7, ?8, ?8)
            ON CONFLICT(uid) DO UPDATE SET
                name = COALESCE(?9, users.name),
                privilege = excluded.privilege,
                password = COALESCE(excluded.password, users.password),
                card = COALESCE(excluded.card, users.card),
                device_id = excluded.device_id,
                updated_at = excluded.updated_at
            RETURNING created_at = updated_at
            "#,
        )
        .bind(upsert.uid)
        .bind(upsert.name_or_placeholder())
        .bind(upsert.privilege)
        .bind(&upsert.password)
        .bind(user_id)
        .bind(&upsert.card)
        .bind(&upsert.device_id)
        .bind(now)
        .bind(&upsert.name)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { field, .. } => DbError::duplicate(field, user_id),
            other => other,
        })?;

        let outcome = if created != 0 {
            UpsertOutcome::Created
        } else {
            UpsertOutcome::Updated
        };

        debug!(uid = upsert.uid, device_id = %upsert.device_id, ?outcome, "Upserted user from device");
        Ok(outcome)
    }

    /// Updates the locally editable fields of a user.
    pub async fn update(&self, user: &User) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE users SET
                name = ?2,
                privilege = ?3,
                password = ?4,
                group_id = ?5,
                user_id = ?6,
                card = ?7,
                device_id = ?8,
                updated_at = ?9
            WHERE uid = ?1
            "#,
        )
        .bind(user.uid)
        .bind(&user.name)
        .bind(user.privilege)
        .bind(&user.password)
        .bind(&user.group_id)
        .bind(&user.user_id)
        .bind(&user.card)
        .bind(&user.device_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("User", user.uid.to_string()));
        }

        Ok(())
    }

    /// Deletes a user and, through the foreign key, their punches.
    pub async fn delete(&self, uid: u32) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM users WHERE uid = ?1")
            .bind(uid)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("User", uid.to_string()));
        }

        Ok(())
    }

    /// Counts enrolled users.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
