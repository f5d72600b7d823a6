//! # Settings Service
//!
//! Loads, saves and broadcasts the operator-facing [`AppSettings`] document.
//!
//! ## Change Notification
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  SettingsService::load(db)                                             │
//! │       │  missing document ──► defaults written back                    │
//! │       ▼                                                                 │
//! │  watch::Sender<AppSettings> ──────┬──────────────┬─────────────         │
//! │       ▲                           ▼              ▼                      │
//! │       │                     subscriber A    subscriber B                │
//! │  save(settings)             (scheduler)     (UI)                        │
//! │    validate ──► settings table ──► send_replace                        │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::NaiveTime;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use primesync_core::{AppSettings, ValidationError, APP_SETTINGS_KEY};
use primesync_db::{Database, DbError};

use crate::error::SyncResult;

/// Accepted format of `periodic_sync_time`, e.g. `12:00 PM`.
pub const SYNC_TIME_FORMAT: &str = "%I:%M %p";

/// Shared access to the settings document.
pub struct SettingsService {
    db: Database,
    tx: watch::Sender<AppSettings>,
}

impl SettingsService {
    /// Loads the stored document, creating it with defaults on first run.
    ///
    /// A stored document that no longer decodes is reported and replaced
    /// in memory by defaults; it is left untouched in the store until the
    /// next save.
    pub async fn load(db: Database) -> SyncResult<Self> {
        let repo = db.settings();

        let settings = match repo.get::<AppSettings>(APP_SETTINGS_KEY).await {
            Ok(Some(settings)) => {
                debug!("Loaded app settings");
                settings
            }
            Ok(None) => {
                let defaults = AppSettings::default();
                repo.put(APP_SETTINGS_KEY, &defaults).await?;
                info!("Created default app settings");
                defaults
            }
            Err(DbError::InvalidValue { reason, .. }) => {
                warn!(reason = %reason, "Stored app settings are unreadable, using defaults");
                AppSettings::default()
            }
            Err(e) => return Err(e.into()),
        };

        let (tx, _rx) = watch::channel(settings);
        Ok(SettingsService { db, tx })
    }

    /// Snapshot of the current settings.
    pub fn current(&self) -> AppSettings {
        self.tx.borrow().clone()
    }

    /// Receiver that observes every successful save.
    pub fn subscribe(&self) -> watch::Receiver<AppSettings> {
        self.tx.subscribe()
    }

    /// Validates, persists and broadcasts `settings`.
    pub async fn save(&self, settings: AppSettings) -> SyncResult<()> {
        validate_settings(&settings)?;
        self.db.settings().put(APP_SETTINGS_KEY, &settings).await?;
        info!("App settings saved");
        self.tx.send_replace(settings);
        Ok(())
    }

    /// Applies `change` to the current settings and saves the result.
    pub async fn update<F>(&self, change: F) -> SyncResult<AppSettings>
    where
        F: FnOnce(&mut AppSettings),
    {
        let mut settings = self.current();
        change(&mut settings);
        self.save(settings.clone()).await?;
        Ok(settings)
    }
}

/// Checks the fields an operator can get wrong.
pub fn validate_settings(settings: &AppSettings) -> Result<(), ValidationError> {
    if settings.auto_check_interval == 0 || settings.auto_check_interval > 24 * 60 {
        return Err(ValidationError::OutOfRange {
            field: "auto_check_interval".to_string(),
            min: 1,
            max: 24 * 60,
        });
    }

    NaiveTime::parse_from_str(settings.periodic_sync_time.trim(), SYNC_TIME_FORMAT).map_err(
        |_| ValidationError::InvalidFormat {
            field: "periodic_sync_time".to_string(),
            reason: "expected a time like 12:00 PM".to_string(),
        },
    )?;

    let url = settings.cloud_api_url.trim();
    if !url.is_empty() && !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(ValidationError::InvalidFormat {
            field: "cloud_api_url".to_string(),
            reason: "must start with http:// or https://".to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use primesync_db::DbConfig;

    #[tokio::test]
    async fn test_first_load_writes_defaults() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let service = SettingsService::load(db.clone()).await.unwrap();

        assert_eq!(service.current(), AppSettings::default());
        let stored: Option<AppSettings> = db.settings().get(APP_SETTINGS_KEY).await.unwrap();
        assert_eq!(stored, Some(AppSettings::default()));
    }

    #[tokio::test]
    async fn test_save_notifies_subscribers() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let service = SettingsService::load(db.clone()).await.unwrap();
        let mut rx = service.subscribe();

        service
            .update(|s| {
                s.auto_check_interval = 30;
                s.enable_auto_sync = false;
            })
            .await
            .unwrap();

        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().auto_check_interval, 30);
        assert!(!rx.borrow().enable_auto_sync);

        let reloaded = SettingsService::load(db).await.unwrap();
        assert_eq!(reloaded.current().auto_check_interval, 30);
    }

    #[tokio::test]
    async fn test_invalid_save_changes_nothing() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let service = SettingsService::load(db).await.unwrap();
        let rx = service.subscribe();

        let result = service
            .update(|s| s.periodic_sync_time = "noon".to_string())
            .await;

        assert!(result.is_err());
        assert!(!rx.has_changed().unwrap());
        assert_eq!(service.current().periodic_sync_time, "12:00 PM");
    }

    #[tokio::test]
    async fn test_unreadable_document_falls_back() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.settings()
            .put(APP_SETTINGS_KEY, &serde_json::json!({"auto_check_interval": "soon"}))
            .await
            .unwrap();

        let service = SettingsService::load(db).await.unwrap();
        assert_eq!(service.current(), AppSettings::default());
    }

    #[test]
    fn test_validate_settings() {
        assert!(validate_settings(&AppSettings::default()).is_ok());

        let mut s = AppSettings::default();
        s.auto_check_interval = 0;
        assert!(validate_settings(&s).is_err());

        let mut s = AppSettings::default();
        s.periodic_sync_time = "07:45 AM".into();
        assert!(validate_settings(&s).is_ok());

        let mut s = AppSettings::default();
        s.cloud_api_url = "ftp://example".into();
        assert!(validate_settings(&s).is_err());
    }
}
