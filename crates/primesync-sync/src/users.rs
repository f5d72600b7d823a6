//! # User Reconciler
//!
//! Merges terminal user lists into the local store (pull) and writes local
//! users back to their owning terminal (push).
//!
//! ## Pull
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  connect ──► fetch_users ──► for each TerminalUser:                    │
//! │                                 UserUpsert::from_terminal               │
//! │                                 users().upsert_from_device  (1 stmt)   │
//! │                                 identifier clash ──► warn, skip, next  │
//! │          ──► disconnect (always)                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Push
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  users().list_by_device(device) ── empty ──► success, 0, no connect    │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  connect ──► fetch_users (once) ──► for each local user:               │
//! │                                       upsert_user (create or replace)  │
//! │          ──► disconnect (always)                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Neither direction ever deletes.

use std::collections::HashSet;
use tracing::{debug, error, info, warn};

use primesync_core::{Device, DeviceOutcome, TerminalUser, UserUpsert};
use primesync_db::{Database, DbError, UpsertOutcome};

use crate::config::TerminalSettings;
use crate::error::SyncResult;
use crate::link::{open_device_link, TerminalLink};
use crate::transport::TerminalTransport;

/// Pull and push of user records against one terminal at a time.
pub struct UserReconciler<'a, T: TerminalTransport> {
    db: &'a Database,
    transport: &'a T,
    settings: &'a TerminalSettings,
}

impl<'a, T: TerminalTransport> UserReconciler<'a, T> {
    pub fn new(db: &'a Database, transport: &'a T, settings: &'a TerminalSettings) -> Self {
        UserReconciler {
            db,
            transport,
            settings,
        }
    }

    // =========================================================================
    // Pull
    // =========================================================================

    /// Pulls every user from `device` into the local store.
    ///
    /// ## Returns
    /// * success with the number of users the terminal reported
    /// * failure with a diagnostic when the terminal is unreachable or the
    ///   session breaks; users merged before the break stay merged
    pub async fn pull(&self, device: &Device) -> DeviceOutcome {
        let mut link = match self.open(device).await {
            Ok(link) => link,
            Err(outcome) => return outcome,
        };

        let result = self.pull_from(&mut link, device).await;
        link.disconnect().await;

        match result {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(address = %device.ip_address, error = %e, "Error pulling users");
                DeviceOutcome::failed(format!("Error pulling users: {}", e))
            }
        }
    }

    async fn pull_from(
        &self,
        link: &mut TerminalLink<'a, T>,
        device: &Device,
    ) -> SyncResult<DeviceOutcome> {
        let users = link.fetch_users().await?;
        if users.is_empty() {
            return Ok(DeviceOutcome::succeeded(0, "No users found on device"));
        }

        let repo = self.db.users();
        let (mut created, mut updated, mut skipped) = (0u64, 0u64, 0u64);
        for user in &users {
            let upsert = UserUpsert::from_terminal(user, &device.id);
            match repo.upsert_from_device(&upsert).await {
                Ok(UpsertOutcome::Created) => created += 1,
                Ok(UpsertOutcome::Updated) => updated += 1,
                Err(DbError::UniqueViolation { field, value }) => {
                    warn!(
                        address = %device.ip_address,
                        uid = user.uid,
                        %field,
                        %value,
                        "Skipping device user, identifier already in use"
                    );
                    skipped += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }

        info!(
            address = %device.ip_address,
            count = users.len(),
            created,
            updated,
            skipped,
            "Pulled users from device"
        );
        let message = if skipped == 0 {
            format!("Pulled {} users", users.len())
        } else {
            format!("Pulled {} users ({} skipped)", users.len(), skipped)
        };
        Ok(DeviceOutcome::succeeded(users.len() as u64, message))
    }

    // =========================================================================
    // Push
    // =========================================================================

    /// Pushes every local user owned by `device` to it.
    ///
    /// Does not contact the terminal when the device owns no users.
    pub async fn push(&self, device: &Device) -> DeviceOutcome {
        let users = match self.db.users().list_by_device(&device.id).await {
            Ok(users) => users,
            Err(e) => {
                error!(address = %device.ip_address, error = %e, "Error loading users to push");
                return DeviceOutcome::failed(format!("Error pushing users: {}", e));
            }
        };

        if users.is_empty() {
            debug!(address = %device.ip_address, "No local users owned by device");
            return DeviceOutcome::succeeded(0, "No users to push");
        }

        let mut link = match self.open(device).await {
            Ok(link) => link,
            Err(outcome) => return outcome,
        };

        let records: Vec<TerminalUser> = users.iter().map(TerminalUser::from_local).collect();
        let result = self.push_to(&mut link, &records).await;
        link.disconnect().await;

        match result {
            Ok(pushed) => {
                info!(address = %device.ip_address, count = pushed, "Pushed users to device");
                DeviceOutcome::succeeded(pushed, format!("Pushed {} users", pushed))
            }
            Err(e) => {
                error!(address = %device.ip_address, error = %e, "Error pushing users");
                DeviceOutcome::failed(format!("Error pushing users: {}", e))
            }
        }
    }

    async fn push_to(
        &self,
        link: &mut TerminalLink<'a, T>,
        records: &[TerminalUser],
    ) -> SyncResult<u64> {
        let on_device: HashSet<u32> = link
            .fetch_users()
            .await?
            .into_iter()
            .map(|u| u.uid)
            .collect();

        let mut pushed = 0u64;
        for record in records {
            if on_device.contains(&record.uid) {
                debug!(uid = record.uid, "Replacing user on device");
            } else {
                debug!(uid = record.uid, "Creating user on device");
            }
            link.upsert_user(record).await?;
            pushed += 1;
        }
        Ok(pushed)
    }

    // =========================================================================
    // Connection
    // =========================================================================

    /// Connects to `device` and records the resulting status. A failure is
    /// returned as the outcome the caller should report.
    async fn open(&self, device: &Device) -> Result<TerminalLink<'a, T>, DeviceOutcome> {
        open_device_link(self.db, self.transport, self.settings, device).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        enroll, enroll_as, register, terminal_user, test_db, FakeTerminal, FakeTransport,
    };

    #[tokio::test]
    async fn test_blank_name_keeps_local_name() {
        let db = test_db().await;
        let device = register(&db, "10.0.0.5").await;
        enroll(&db, 7, "Alice", None).await;

        let mut reported = terminal_user(7, "  ");
        reported.privilege = 14;
        let transport = FakeTransport::new();
        transport.install(
            "10.0.0.5",
            FakeTerminal {
                users: vec![reported],
                ..Default::default()
            },
        );

        let settings = TerminalSettings::default();
        let outcome = UserReconciler::new(&db, &transport, &settings)
            .pull(&device)
            .await;

        assert!(outcome.success);
        assert_eq!(outcome.message, "Pulled 1 users");

        let alice = db.users().get_by_uid(7).await.unwrap().unwrap();
        assert_eq!(alice.name, "Alice");
        assert_eq!(alice.user_id, "U007");
        assert_eq!(alice.privilege, 14);
        assert_eq!(alice.device_id.as_deref(), Some(device.id.as_str()));
    }

    #[tokio::test]
    async fn test_empty_terminal() {
        let db = test_db().await;
        let device = register(&db, "10.0.0.5").await;
        let transport = FakeTransport::new();

        let settings = TerminalSettings::default();
        let outcome = UserReconciler::new(&db, &transport, &settings)
            .pull(&device)
            .await;

        assert!(outcome.success);
        assert_eq!(outcome.count, 0);
        assert_eq!(outcome.message, "No users found on device");
        assert_eq!(transport.terminal("10.0.0.5").disconnects, 1);
    }

    #[tokio::test]
    async fn test_read_failure_still_disconnects() {
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
        let outcome = UserReconciler::new(&db, &transport, &settings)
            .pull(&device)
            .await;

        assert!(!outcome.success);
        assert!(outcome.message.starts_with("Error pulling users:"));
        let terminal = transport.terminal("10.0.0.5");
        assert_eq!(terminal.connects, 1);
        assert_eq!(terminal.disconnects, 1);
    }

    #[tokio::test]
    async fn test_push_without_owned_users_skips_terminal() {
        let db = test_db().await;
        let device = register(&db, "10.0.0.5").await;
        let other = register(&db, "10.0.0.6").await;
        enroll(&db, 7, "Alice", Some(&other)).await;
        enroll(&db, 9, "Unassigned", None).await;

        let transport = FakeTransport::new();
        let settings = TerminalSettings::default();
        let outcome = UserReconciler::new(&db, &transport, &settings)
            .push(&device)
            .await;

        assert!(outcome.success);
        assert_eq!(outcome.count, 0);
        assert_eq!(outcome.message, "No users to push");
        assert_eq!(transport.total_connects(), 0);
    }

    #[tokio::test]
    async fn test_push_creates_and_replaces() {
        let db = test_db().await;
        let device = register(&db, "10.0.0.5").await;
        enroll(&db, 7, "Alice", Some(&device)).await;
        enroll(&db, 8, "Bob", Some(&device)).await;

        let transport = FakeTransport::new();
        transport.install(
            "10.0.0.5",
            FakeTerminal {
                users: vec![terminal_user(7, "Old Name")],
                ..Default::default()
            },
        );

        let settings = TerminalSettings::default();
        let outcome = UserReconciler::new(&db, &transport, &settings)
            .push(&device)
            .await;

        assert!(outcome.success);
        assert_eq!(outcome.message, "Pushed 2 users");

        let terminal = transport.terminal("10.0.0.5");
        assert_eq!(terminal.users.len(), 2);
        assert_eq!(terminal.users[0].name, "Alice");
        assert_eq!(terminal.users[1].name, "Bob");
        assert_eq!(terminal.users[1].user_id, "U008");
        assert_eq!(terminal.disconnects, 1);
    }

    #[tokio::test]
    async fn test_pull_taken_user_id_does_not_stop_the_rest() {
        let db = test_db().await;
        let device = register(&db, "10.0.0.5").await;
        enroll_as(&db, 8, "Bob", "U007", None).await;

        let transport = FakeTransport::new();
        transport.install(
            "10.0.0.5",
            FakeTerminal {
                users: vec![terminal_user(7, "Carol"), terminal_user(9, "Dave")],
                ..Default::default()
            },
        );

        let settings = TerminalSettings::default();
        let outcome = UserReconciler::new(&db, &transport, &settings)
            .pull(&device)
            .await;

        assert!(outcome.success);
        assert_eq!(outcome.count, 2);
        assert_eq!(outcome.message, "Pulled 2 users");

        let carol = db.users().get_by_uid(7).await.unwrap().unwrap();
        assert_eq!(carol.user_id, "U007-7");
        let dave = db.users().get_by_uid(9).await.unwrap().unwrap();
        assert_eq!(dave.name, "Dave");
        assert_eq!(dave.user_id, "U009");
    }

    #[tokio::test]
    async fn test_pull_skips_user_whose_identifiers_are_all_taken() {
        let db = test_db().await;
        let device = register(&db, "10.0.0.5").await;
        enroll_as(&db, 8, "Bob", "U007", None).await;
        enroll_as(&db, 10, "Erin", "U007-7", None).await;

        let transport = FakeTransport::new();
        transport.install(
            "10.0.0.5",
            FakeTerminal {
                users: vec![terminal_user(7, "Carol"), terminal_user(9, "Dave")],
                ..Default::default()
            },
        );

        let settings = TerminalSettings::default();
        let outcome = UserReconciler::new(&db, &transport, &settings)
            .pull(&device)
            .await;

        assert!(outcome.success);
        assert_eq!(outcome.message, "Pulled 2 users (1 skipped)");
        assert!(db.users().get_by_uid(7).await.unwrap().is_none());
        assert!(db.users().get_by_uid(9).await.unwrap().is_some());
        assert_eq!(transport.terminal("10.0.0.5").disconnects, 1);
    }

    #[tokio::test]
    async fn test_push_write_failure_still_disconnects() {
        let db = test_db().await;
        let device = register(&db, "10.0.0.5").await;
        enroll(&db, 7, "Alice", Some(&device)).await;
        enroll(&db, 8, "Bob", Some(&device)).await;

        let transport = FakeTransport::new();
        transport.install(
            "10.0.0.5",
            FakeTerminal {
                fail_writes: true,
                ..Default::default()
            },
        );

        let settings = TerminalSettings::default();
        let outcome = UserReconciler::new(&db, &transport, &settings)
            .push(&device)
            .await;

        assert!(!outcome.success);
        assert_eq!(
            outcome.message,
            "Error pushing users: Protocol error: write rejected by terminal"
        );
        let terminal = transport.terminal("10.0.0.5");
        assert_eq!(terminal.connects, 1);
        assert_eq!(terminal.disconnects, 1);
        assert!(terminal.upserts.is_empty());
    }

    #[tokio::test]
    async fn test_push_read_failure_still_disconnects() {
        let db = test_db().await;
        let device = register(&db, "10.0.0.5").await;
        enroll(&db, 7, "Alice", Some(&device)).await;

        let transport = FakeTransport::new();
        transport.install(
            "10.0.0.5",
            FakeTerminal {
                fail_reads: true,
                ..Default::default()
            },
        );

        let settings = TerminalSettings::default();
        let outcome = UserReconciler::new(&db, &transport, &settings)
            .push(&device)
            .await;

        assert!(!outcome.success);
        assert!(outcome.message.starts_with("Error pushing users:"));
        let terminal = transport.terminal("10.0.0.5");
        assert_eq!(terminal.connects, 1);
        assert_eq!(terminal.disconnects, 1);
    }
}
