//! # Device Repository
//!
//! Registered terminals and their last-known status.
//!
//! Devices are listed in registration order (`created_at` ascending); fleet
//! operations visit them in exactly this order.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use primesync_core::{Device, DeviceStatus, NewDevice};

/// Repository for device database operations.
#[derive(Debug, Clone)]
pub struct DeviceRepository {
    pool: SqlitePool,
}

impl DeviceRepository {
    /// Creates a new DeviceRepository.
    pub fn new(pool: SqlitePool) -> Self {
        DeviceRepository { pool }
    }

    /// Registers a terminal. New devices start `Offline`.
    pub async fn insert(&self, new: &NewDevice) -> DbResult<Device> {
        let device = Device {
            id: generate_device_id(),
            ip_address: new.ip_address.trim().to_string(),
            port: new.port,
            password: new.password.trim().to_string(),
            device_model: new.device_model.clone(),
            status: DeviceStatus::Offline,
            created_at: Utc::now(),
        };

        debug!(id = %device.id, address = %device.ip_address, port = device.port, "Registering device");

        sqlx::query(
            r#"
            INSERT INTO devices (id, ip_address, port, password, device_model, status, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&device.id)
        .bind(&device.ip_address)
        .bind(device.port)
        .bind(&device.password)
        .bind(&device.device_model)
        .bind(device.status.as_str())
        .bind(device.created_at)
        .execute(&self.pool)
        .await?;

        Ok(device)
    }

    /// Lists every device in registration order.
    pub async fn list(&self) -> DbResult<Vec<Device>> {
        let devices = sqlx::query_as::<_, Device>(
            r#"
            SELECT id, ip_address, port, password, device_model, status, created_at
            FROM devices
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(devices)
    }

    /// Gets a device by id.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Device>> {
        let device = sqlx::query_as::<_, Device>(
            r#"
            SELECT id, ip_address, port, password, device_model, status, created_at
            FROM devices
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(device)
    }

    /// Records the outcome of the latest connection attempt.
    pub async fn update_status(&self, id: &str, status: DeviceStatus) -> DbResult<()> {
        debug!(id = %id, status = status.as_str(), "Updating device status");

        let result = sqlx::query("UPDATE devices SET status = ?2 WHERE id = ?1")
            .bind(id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Device", id));
        }

        Ok(())
    }

    /// Removes a device. Users it owned keep their records with no owner.
    pub async fn delete(&self, id: &str) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM devices WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Device", id));
        }

        Ok(())
    }

    /// Counts registered devices.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM devices")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

/// Generates a new device ID.
pub fn generate_device_id() -> String {
    Uuid::new_v4().to_string()
}

// =============================================================================
// Unit Tests
// =============================================================================
