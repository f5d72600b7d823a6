//! # Attendance Reconciler
//!
//! Appends terminal punches to the local attendance ledger.
//!
//! ## Per-Punch Decision
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  PunchEvent { uid, timestamp, punch }                                  │
//! │       │                                                                 │
//! │       ├── uid has no local user ───────► skip, warn, unknown_uid += 1  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  INSERT ... ON CONFLICT(user_uid, timestamp, status) DO NOTHING        │
//! │       │                                                                 │
//! │       ├── row inserted ────────────────► inserted += 1                 │
//! │       └── already present ─────────────► duplicates += 1              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The reported count is the number of punches the terminal returned, not
//! the number appended, so repeating a pull reports the same count.

use tracing::{error, info, warn};

use primesync_core::{AttendanceCounters, Device, DeviceOutcome, PunchEvent};
use primesync_db::Database;

use crate::config::TerminalSettings;
use crate::error::SyncResult;
use crate::link::{open_device_link, TerminalLink};
use crate::transport::TerminalTransport;

/// Pulls punches from one terminal at a time.
pub struct AttendanceReconciler<'a, T: TerminalTransport> {
    db: &'a Database,
    transport: &'a T,
    settings: &'a TerminalSettings,
}

impl<'a, T: TerminalTransport> AttendanceReconciler<'a, T> {
    pub fn new(db: &'a Database, transport: &'a T, settings: &'a TerminalSettings) -> Self {
        AttendanceReconciler {
            db,
            transport,
            settings,
        }
    }

    /// Pulls every punch from `device` into the ledger.
    ///
    /// ## Returns
    /// * success with the number of punches the terminal reported, with
    ///   inserted / duplicate / unknown-uid counters attached
    /// * failure with a diagnostic when the terminal is unreachable or the
    ///   session breaks; punches appended before the break stay appended
    pub async fn pull(&self, device: &Device) -> DeviceOutcome {
        let mut link = match open_device_link(self.db, self.transport, self.settings, device).await {
            Ok(link) => link,
            Err(outcome) => return outcome,
        };

        let result = self.pull_from(&mut link, device).await;
        link.disconnect().await;

        match result {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(address = %device.ip_address, error = %e, "Error pulling attendance");
                DeviceOutcome::failed(format!("Error pulling attendance: {}", e))
            }
        }
    }

    async fn pull_from(
        &self,
        link: &mut TerminalLink<'a, T>,
        device: &Device,
    ) -> SyncResult<DeviceOutcome> {
        let events = link.fetch_attendance().await?;
        if events.is_empty() {
            return Ok(DeviceOutcome::succeeded(0, "No new attendance data found")
                .with_attendance(AttendanceCounters::default()));
        }

        let counters = self.apply(&events).await?;

        info!(
            address = %device.ip_address,
            count = events.len(),
            inserted = counters.inserted,
            duplicates = counters.duplicates,
            unknown_uid = counters.unknown_uid,
            "Pulled attendance from device"
        );
        Ok(DeviceOutcome::succeeded(
            events.len() as u64,
            format!("Pulled {} attendance records", events.len()),
        )
        .with_attendance(counters))
    }

    /// Applies a batch of punches to the ledger.
    pub async fn apply(&self, events: &[PunchEvent]) -> SyncResult<AttendanceCounters> {
        let users = self.db.users();
        let ledger = self.db.attendance();
        let mut counters = AttendanceCounters::default();

        for event in events {
            if !users.exists(event.uid).await? {
                warn!(uid = event.uid, "User with uid not found in local store, skipping punch");
                counters.unknown_uid += 1;
                continue;
            }

            if ledger.insert_if_absent(event).await? {
                counters.inserted += 1;
            } else {
                counters.duplicates += 1;
            }
        }

        Ok(counters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{enroll, register, test_db, FakeTerminal, FakeTransport};
    use chrono::NaiveDate;
    use primesync_core::PunchDirection;

    fn punch(uid: u32, hour: u32) -> PunchEvent {
        PunchEvent {
            uid,
            timestamp: NaiveDate::from_ymd_opt(2024, 3, 15)
                .unwrap()
                .and_hms_opt(hour, 0, 0)
                .unwrap(),
            punch: PunchDirection::In,
        }
    }

    #[tokio::test]
    async fn test_apply_counts_each_case() {
        let db = test_db().await;
        enroll(&db, 7, "Alice", None).await;

        let transport = FakeTransport::new();
        let settings = TerminalSettings::default();
        let reconciler = AttendanceReconciler::new(&db, &transport, &settings);

        let events = vec![punch(7, 8), punch(7, 8), punch(8, 9), punch(7, 17)];
        let counters = reconciler.apply(&events).await.unwrap();

        assert_eq!(counters.inserted, 2);
        assert_eq!(counters.duplicates, 1);
        assert_eq!(counters.unknown_uid, 1);
        assert_eq!(db.attendance().count().await.unwrap(), 2);
        assert_eq!(transport.total_connects(), 0);
    }

    #[tokio::test]
    async fn test_pull_counts_reported_punches() {
        let db = test_db().await;
        let device = register(&db, "10.0.0.5").await;
        enroll(&db, 7, "Alice", Some(&device)).await;

        let transport = FakeTransport::new();
        transport.install(
            "10.0.0.5",
            FakeTerminal {
                punches: vec![punch(7, 8), punch(7, 17), punch(99, 9)],
                ..Default::default()
            },
        );
        let settings = TerminalSettings::default();
        let reconciler = AttendanceReconciler::new(&db, &transport, &settings);

        let outcome = reconciler.pull(&device).await;
        assert!(outcome.success);
        assert_eq!(outcome.count, 3);
        assert_eq!(outcome.message, "Pulled 3 attendance records");
        assert_eq!(
            outcome.attendance,
            Some(AttendanceCounters {
                inserted: 2,
                duplicates: 0,
                unknown_uid: 1,
            })
        );

        let again = reconciler.pull(&device).await;
        assert_eq!(again.count, 3);
        assert_eq!(again.attendance.map(|c| c.duplicates), Some(2));
        assert_eq!(db.attendance().count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_pull_failure_reports_and_disconnects() {
        let db = test_db().await;
        let device = register(&db, "10.0.0.5").await;

        let transport = FakeTransport::new();
        transport.install(
            "10.0.0.5",
            FakeTerminal {
                fail_reads: true,
                ..Default::default()
            },
        );
        let settings = TerminalSettings::default();

        let outcome = AttendanceReconciler::new(&db, &transport, &settings)
            .pull(&device)
            .await;

        assert!(!outcome.success);
        assert_eq!(
            outcome.message,
            "Error pulling attendance: Protocol error: connection reset by terminal"
        );
        assert_eq!(transport.terminal("10.0.0.5").disconnects, 1);
    }

    #[tokio::test]
    async fn test_pull_empty_terminal() {
        let db = test_db().await;
        let device = register(&db, "10.0.0.5").await;
        let transport = FakeTransport::new();
        let settings = TerminalSettings::default();

        let outcome = AttendanceReconciler::new(&db, &transport, &settings)
            .pull(&device)
            .await;

        assert!(outcome.success);
        assert_eq!(outcome.message, "No new attendance data found");
    }
}
