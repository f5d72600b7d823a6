//! # Fleet Sync Orchestrator
//!
//! Runs one reconciliation across every registered terminal and folds the
//! per-device outcomes into a single [`FleetReport`].
//!
//! ## Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  devices().list()  (created_at ascending)                              │
//! │       │                                                                 │
//! │       ├── empty ──► FleetReport::NoDevices (nothing contacted)         │
//! │       ▼                                                                 │
//! │  ┌──────────┐  ┌──────────┐  ┌──────────┐                              │
//! │  │ Device 1 │  │ Device 2 │  │ Device 3 │   at most                    │
//! │  │ connect  │  │ connect  │  │ connect  │   max_concurrent_devices     │
//! │  │ reconcile│  │ reconcile│  │ reconcile│   at a time (default 1)     │
//! │  │disconnect│  │disconnect│  │disconnect│                              │
//! │  └────┬─────┘  └────┬─────┘  └────┬─────┘                              │
//! │       └─────────────┼─────────────┘                                     │
//! │                     ▼  outcomes in store order                         │
//! │  FleetReport::aggregate                                                │
//! │       ├── all succeeded ──► Succeeded { total }                        │
//! │       └── any failed ─────► Failed { total, "Device <ip>: <why>" }     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! One failing terminal never stops the others. Writes made for the
//! terminals that succeeded stay in the store even when the report is
//! `Failed`.

use futures_util::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{info, warn};

use primesync_core::{Device, DeviceOutcome, FleetOperation, FleetReport};
use primesync_db::Database;

use crate::attendance::AttendanceReconciler;
use crate::config::SyncConfig;
use crate::error::SyncResult;
use crate::transport::TerminalTransport;
use crate::users::UserReconciler;

// =============================================================================
// Event Emitter Trait
// =============================================================================

/// Progress hooks for a presentation layer.
pub trait FleetEventEmitter: Send + Sync {
    /// A device is about to be contacted.
    fn device_started(&self, operation: FleetOperation, device: &Device);

    /// A device finished, successfully or not.
    fn device_finished(&self, operation: FleetOperation, device: &Device, outcome: &DeviceOutcome);
}

/// No-op event emitter.
pub struct NoOpEmitter;

impl FleetEventEmitter for NoOpEmitter {
    fn device_started(&self, _operation: FleetOperation, _device: &Device) {}
    fn device_finished(&self, _operation: FleetOperation, _device: &Device, _outcome: &DeviceOutcome) {}
}

// =============================================================================
// Fleet Sync
// =============================================================================

/// Runs fleet operations over the registered terminals.
pub struct FleetSync<T: TerminalTransport> {
    config: Arc<SyncConfig>,
    db: Database,
    transport: T,
    emitter: Arc<dyn FleetEventEmitter>,
}

impl<T: TerminalTransport> FleetSync<T> {
    /// Creates an orchestrator.
    pub fn new(config: SyncConfig, db: Database, transport: T) -> Self {
        Self::with_emitter(config, db, transport, Arc::new(NoOpEmitter))
    }

    /// Creates an orchestrator with progress hooks.
    pub fn with_emitter(
        config: SyncConfig,
        db: Database,
        transport: T,
        emitter: Arc<dyn FleetEventEmitter>,
    ) -> Self {
        FleetSync {
            config: Arc::new(config),
            db,
            transport,
            emitter,
        }
    }

    /// The transport in use.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Pulls punches from every terminal.
    pub async fn pull_attendance(&self) -> SyncResult<FleetReport> {
        self.run(FleetOperation::PullAttendance).await
    }

    /// Pulls users from every terminal.
    pub async fn pull_users(&self) -> SyncResult<FleetReport> {
        self.run(FleetOperation::PullUsers).await
    }

    /// Pushes each terminal's own users to it.
    pub async fn push_users(&self) -> SyncResult<FleetReport> {
        self.run(FleetOperation::PushUsers).await
    }

    /// Pushes users after a local create, update, delete or import.
    pub async fn sync_after_mutation(&self) -> SyncResult<FleetReport> {
        self.run(FleetOperation::SyncAfterMutation).await
    }

    /// Runs `operation` on every registered terminal.
    ///
    /// ## Errors
    /// Only a failure to read the device list is an error; everything that
    /// goes wrong on a terminal ends up in the report.
    pub async fn run(&self, operation: FleetOperation) -> SyncResult<FleetReport> {
        let devices = self.db.devices().list().await?;
        if devices.is_empty() {
            info!(%operation, "No devices registered");
            return Ok(FleetReport::NoDevices { operation });
        }

        let limit = self.config.fleet.max_concurrent_devices.max(1);
        info!(%operation, devices = devices.len(), concurrency = limit, "Starting fleet operation");

        let outcomes: Vec<DeviceOutcome> = stream::iter(devices.iter())
            .map(|device| self.run_device(operation, device))
            .buffered(limit)
            .collect()
            .await;

        let report = FleetReport::aggregate(
            operation,
            devices
                .iter()
                .map(|d| d.ip_address.as_str())
                .zip(outcomes.iter()),
        );

        if report.is_success() {
            info!(%operation, total = report.total(), "Fleet operation succeeded");
        } else {
            warn!(%operation, total = report.total(), "Fleet operation finished with failures");
        }
        Ok(report)
    }

    /// Runs `operation` against a single terminal.
    pub async fn run_device(&self, operation: FleetOperation, device: &Device) -> DeviceOutcome {
        self.emitter.device_started(operation, device);

        let settings = &self.config.terminal;
        let outcome = match operation {
            FleetOperation::PullAttendance => {
                AttendanceReconciler::new(&self.db, &self.transport, settings)
                    .pull(device)
                    .await
            }
            FleetOperation::PullUsers => {
                UserReconciler::new(&self.db, &self.transport, settings)
                    .pull(device)
                    .await
            }
            FleetOperation::PushUsers | FleetOperation::SyncAfterMutation => {
                UserReconciler::new(&self.db, &self.transport, settings)
                    .push(device)
                    .await
            }
        };

        self.emitter.device_finished(operation, device, &outcome);
        outcome
    }
}
