//! # Terminal Link
//!
//! Owns at most one open session with one terminal.
//!
//! ## Connection Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   ┌──────────────┐  connect()   ┌──────────────┐                       │
//! │   │ DISCONNECTED │─────────────►│  CONNECTING  │                       │
//! │   └──────────────┘              └──────┬───────┘                       │
//! │          ▲                             │                                │
//! │          │              ┌──────────────┼──────────────┐                 │
//! │          │              │ success      │ retryable    │ fatal           │
//! │          │              ▼              ▼ error        ▼                 │
//! │          │       ┌──────────┐   ┌─────────────┐  Err(SyncError)        │
//! │          │       │CONNECTED │   │   BACKOFF   │──► retry while          │
//! │          │       └────┬─────┘   │ exp. delay  │    attempts remain      │
//! │          │            │         └─────────────┘                         │
//! │          └────────────┘ disconnect() (no-op when already closed)        │
//! │                                                                         │
//! │   Each attempt is bounded by connect_timeout_secs.                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use primesync_core::{Device, DeviceOutcome, DeviceStatus, PunchEvent, TerminalUser};
use primesync_db::Database;

use crate::config::TerminalSettings;
use crate::error::{SyncError, SyncResult};
use crate::transport::{TerminalEndpoint, TerminalTransport};

/// A single terminal connection.
pub struct TerminalLink<'t, T: TerminalTransport> {
    transport: &'t T,
    endpoint: TerminalEndpoint,
    settings: TerminalSettings,
    session: Option<T::Session>,
}

impl<'t, T: TerminalTransport> TerminalLink<'t, T> {
    /// Creates a disconnected link.
    pub fn new(transport: &'t T, endpoint: TerminalEndpoint, settings: TerminalSettings) -> Self {
        TerminalLink {
            transport,
            endpoint,
            settings,
            session: None,
        }
    }

    /// Creates a disconnected link to a registered device.
    pub fn for_device(
        transport: &'t T,
        device: &Device,
        settings: TerminalSettings,
    ) -> SyncResult<Self> {
        Ok(Self::new(
            transport,
            TerminalEndpoint::from_device(device)?,
            settings,
        ))
    }

    /// The terminal this link talks to.
    pub fn endpoint(&self) -> &TerminalEndpoint {
        &self.endpoint
    }

    /// Returns true while a session is held.
    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Opens the session, retrying retryable failures with exponential
    /// backoff up to `connect_retries` extra times. A no-op when already
    /// connected.
    pub async fn connect(&mut self) -> SyncResult<()> {
        if self.session.is_some() {
            return Ok(());
        }

        let mut backoff = self.create_backoff();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            match self.connect_with_timeout().await {
                Ok(session) => {
                    info!(endpoint = %self.endpoint, attempt, "Connected to terminal");
                    self.session = Some(session);
                    return Ok(());
                }
                Err(e) if e.is_retryable() && attempt <= self.settings.connect_retries => {
                    let delay = backoff
                        .next_backoff()
                        .unwrap_or_else(|| self.settings.max_backoff());
                    warn!(
                        endpoint = %self.endpoint,
                        attempt,
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        "Terminal connect failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    warn!(endpoint = %self.endpoint, attempt, error = %e, "Terminal connect failed");
                    return Err(e);
                }
            }
        }
    }

    /// Releases the session. Safe to call repeatedly; errors while closing
    /// are logged, never returned.
    pub async fn disconnect(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };

        match self.transport.disconnect(session).await {
            Ok(()) => debug!(endpoint = %self.endpoint, "Disconnected from terminal"),
            Err(e) => warn!(endpoint = %self.endpoint, error = %e, "Error disconnecting from terminal"),
        }
    }

    /// One connect attempt bounded by the configured timeout.
    async fn connect_with_timeout(&self) -> SyncResult<T::Session> {
        let limit = self.settings.connect_timeout();
        let attempt = self.transport.connect(&self.endpoint, limit);

        match timeout(limit, attempt).await {
            Ok(result) => result,
            Err(_) => Err(SyncError::Timeout {
                address: self.endpoint.socket_addr(),
                secs: limit.as_secs(),
            }),
        }
    }

    /// Creates the exponential backoff configuration.
    fn create_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.settings.initial_backoff(),
            max_interval: self.settings.max_backoff(),
            multiplier: 2.0,
            max_elapsed_time: None,
            ..Default::default()
        }
    }

    // =========================================================================
    // Session Operations
    // =========================================================================

    fn session(&mut self) -> SyncResult<&mut T::Session> {
        self.session.as_mut().ok_or_else(|| {
            SyncError::Protocol(format!("no open session with {}", self.endpoint))
        })
    }

    /// Reads every user enrolled on the terminal.
    pub async fn fetch_users(&mut self) -> SyncResult<Vec<TerminalUser>> {
        let transport = self.transport;
        transport.fetch_users(self.session()?).await
    }

    /// Reads every punch stored on the terminal.
    pub async fn fetch_attendance(&mut self) -> SyncResult<Vec<PunchEvent>> {
        let transport = self.transport;
        transport.fetch_attendance(self.session()?).await
    }

    /// Creates or replaces one user on the terminal.
    pub async fn upsert_user(&mut self, user: &TerminalUser) -> SyncResult<()> {
        let transport = self.transport;
        transport.upsert_user(self.session()?, user).await
    }
}

// =============================================================================
// Device Status
// =============================================================================

/// Records the outcome of a connect attempt as the device's advisory
/// status. Store failures are logged and swallowed.
pub async fn record_status(db: &Database, device: &Device, connected: bool) {
    let status = if connected {
        DeviceStatus::Online
    } else {
        DeviceStatus::Offline
    };

    if device.status == status {
        return;
    }

    if let Err(e) = db.devices().update_status(&device.id, status).await {
        warn!(device_id = %device.id, error = %e, "Failed to record device status");
    }
}

/// Connects a fresh link to `device` and records the resulting status.
///
/// A failure comes back as the `DeviceOutcome` the caller should report.
pub async fn open_device_link<'a, T: TerminalTransport>(
    db: &Database,
    transport: &'a T,
    settings: &TerminalSettings,
    device: &Device,
) -> Result<TerminalLink<'a, T>, DeviceOutcome> {
    let connected = match TerminalLink::for_device(transport, device, settings.clone()) {
        Ok(mut link) => match link.connect().await {
            Ok(()) => Ok(link),
            Err(e) => Err(e),
        },
        Err(e) => Err(e),
    };

    record_status(db, device, connected.is_ok()).await;

    connected.map_err(|e| {
        error!(address = %device.ip_address, error = %e, "Failed to connect to device");
        DeviceOutcome::failed(format!("Failed to connect to device: {}", e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// Fails the first `failures` connects, then succeeds.
    struct Flaky {
        failures: u32,
        connects: AtomicU32,
        disconnects: AtomicU32,
        hang: bool,
    }

    impl Flaky {
        fn new(failures: u32) -> Self {
            Flaky {
                failures,
                connects: AtomicU32::new(0),
                disconnects: AtomicU32::new(0),
                hang: false,
            }
        }
    }

    #[async_trait]
    impl TerminalTransport for Flaky {
        type Session = ();

        async fn connect(&self, endpoint: &TerminalEndpoint, _: Duration) -> SyncResult<()> {
            let n = self.connects.fetch_add(1, Ordering::SeqCst);
            if self.hang {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            if n < self.failures {
                return Err(SyncError::ConnectionFailed {
                    address: endpoint.socket_addr(),
                    reason: "refused".into(),
                });
            }
            Ok(())
        }

        async fn disconnect(&self, _: ()) -> SyncResult<()> {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn fetch_users(&self, _: &mut ()) -> SyncResult<Vec<TerminalUser>> {
            Ok(Vec::new())
        }

        async fn fetch_attendance(&self, _: &mut ()) -> SyncResult<Vec<PunchEvent>> {
            Ok(Vec::new())
        }

        async fn upsert_user(&self, _: &mut (), _: &TerminalUser) -> SyncResult<()> {
            Ok(())
        }
    }

    fn endpoint() -> TerminalEndpoint {
        TerminalEndpoint::new("10.0.0.9", 4370, 0)
    }

    #[tokio::test]
    async fn test_single_attempt_by_default() {
        let transport = Flaky::new(1);
        let mut link = TerminalLink::new(&transport, endpoint(), TerminalSettings::default());

        assert!(link.connect().await.is_err());
        assert!(!link.is_connected());
        assert_eq!(transport.connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_with_backoff() {
        let transport = Flaky::new(2);
        let settings = TerminalSettings {
            connect_retries: 2,
            ..TerminalSettings::default()
        };
        let mut link = TerminalLink::new(&transport, endpoint(), settings);

        link.connect().await.unwrap();
        assert!(link.is_connected());
        assert_eq!(transport.connects.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_times_out() {
        let mut transport = Flaky::new(0);
        transport.hang = true;
        let mut link = TerminalLink::new(&transport, endpoint(), TerminalSettings::default());

        let err = link.connect().await.unwrap_err();
        assert!(matches!(err, SyncError::Timeout { secs: 5, .. }));
        assert!(err.to_string().contains("timeout"));
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let transport = Flaky::new(0);
        let mut link = TerminalLink::new(&transport, endpoint(), TerminalSettings::default());

        link.disconnect().await;
        link.connect().await.unwrap();
        link.connect().await.unwrap();
        link.disconnect().await;
        link.disconnect().await;

        assert_eq!(transport.connects.load(Ordering::SeqCst), 1);
        assert_eq!(transport.disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_operations_require_session() {
        let transport = Flaky::new(0);
        let mut link = TerminalLink::new(&transport, endpoint(), TerminalSettings::default());
        assert!(link.fetch_users().await.is_err());
    }
}
