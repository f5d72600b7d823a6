//! # Attendance Repository
//!
//! The append-only punch ledger.
//!
//! ## Deduplication
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Terminals return their whole log on every pull, so the same punch     │
//! │  arrives again and again:                                              │
//! │                                                                         │
//! │  pull #1: (7, 08:59:12, Check-In) ──► INSERT ... ──► 1 row  (new)      │
//! │  pull #2: (7, 08:59:12, Check-In) ──► INSERT ... ──► 0 rows (dup)      │
//! │                                                                         │
//! │  UNIQUE INDEX idx_attendance_dedup (user_uid, timestamp, status)       │
//! │  + ON CONFLICT DO NOTHING makes the check and the write one step.      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use primesync_core::{Attendance, PunchEvent};

const ATTENDANCE_COLUMNS: &str =
    "id, user_uid, timestamp, status, punch, device_uid, created_at";

/// Repository for attendance database operations.
#[derive(Debug, Clone)]
pub struct AttendanceRepository {
    pool: SqlitePool,
}

impl AttendanceRepository {
    /// Creates a new AttendanceRepository.
    pub fn new(pool: SqlitePool) -> Self {
        AttendanceRepository { pool }
    }

    /// Appends a punch unless an identical one is already stored.
    ///
    /// ## Returns
    /// * `Ok(true)` - the punch was appended
    /// * `Ok(false)` - (uid, timestamp, status) was already present
    ///
    /// The owning user must exist; a missing uid surfaces as a foreign key
    /// violation.
    pub async fn insert_if_absent(&self, event: &PunchEvent) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO attendance_logs (user_uid, timestamp, status, punch, device_uid, created_at)
            VALUES (?1, ?2, ?3, ?4, ?1, ?5)
            ON CONFLICT(user_uid, timestamp, status) DO NOTHING
            "#,
        )
        .bind(event.uid)
        .bind(event.timestamp)
        .bind(event.punch.status_label())
        .bind(event.punch.as_str())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        let inserted = result.rows_affected() == 1;
        debug!(uid = event.uid, timestamp = %event.timestamp, inserted, "Attendance insert");
        Ok(inserted)
    }

    /// Checks whether a punch is already stored under its dedup key.
    pub async fn exists(&self, event: &PunchEvent) -> DbResult<bool> {
        let found: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT 1 FROM attendance_logs
            WHERE user_uid = ?1 AND timestamp = ?2 AND status = ?3
            "#,
        )
        .bind(event.uid)
        .bind(event.timestamp)
        .bind(event.punch.status_label())
        .fetch_optional(&self.pool)
        .await?;

        Ok(found.is_some())
    }

    /// Lists a user's punches, oldest first.
    pub async fn list_for_user(&self, uid: u32) -> DbResult<Vec<Attendance>> {
        let records = sqlx::query_as::<_, Attendance>(&format!(
            "SELECT {} FROM attendance_logs WHERE user_uid = ?1 ORDER BY timestamp ASC, id ASC",
            ATTENDANCE_COLUMNS
        ))
        .bind(uid)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    /// Lists the most recent punches across all users, newest first.
    pub async fn list_recent(&self, limit: u32) -> DbResult<Vec<Attendance>> {
        let records = sqlx::query_as::<_, Attendance>(&format!(
            "SELECT {} FROM attendance_logs ORDER BY timestamp DESC, id DESC LIMIT ?1",
            ATTENDANCE_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    /// Counts stored punches.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM attendance_logs")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
