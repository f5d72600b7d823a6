//! In-memory terminals for reconciler and fleet tests.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use primesync_core::terminal::synthesize_user_id;
use primesync_core::{Device, NewDevice, NewUser, PunchDirection, PunchEvent, TerminalUser};
use primesync_db::{Database, DbConfig};

use crate::error::{SyncError, SyncResult};
use crate::transport::{TerminalEndpoint, TerminalTransport};

/// What one fake terminal holds and how it misbehaves.
#[derive(Debug, Default, Clone)]
pub struct FakeTerminal {
    pub users: Vec<TerminalUser>,
    pub punches: Vec<PunchEvent>,
    pub unreachable: bool,
    pub fail_reads: bool,
    pub fail_writes: bool,
    pub connects: u32,
    pub disconnects: u32,
    pub upserts: Vec<TerminalUser>,
}

/// Transport backed by a map of address -> terminal.
#[derive(Debug, Default, Clone)]
pub struct FakeTransport {
    terminals: Arc<Mutex<HashMap<String, FakeTerminal>>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces the terminal at `address`.
    pub fn install(&self, address: &str, terminal: FakeTerminal) {
        self.terminals
            .lock()
            .unwrap()
            .insert(address.to_string(), terminal);
    }

    /// Snapshot of the terminal at `address`.
    pub fn terminal(&self, address: &str) -> FakeTerminal {
        self.terminals
            .lock()
            .unwrap()
            .get(address)
            .cloned()
            .unwrap_or_default()
    }

    /// Connects made across every terminal.
    pub fn total_connects(&self) -> u32 {
        self.terminals.lock().unwrap().values().map(|t| t.connects).sum()
    }

    fn with<R>(&self, address: &str, f: impl FnOnce(&mut FakeTerminal) -> R) -> R {
        let mut terminals = self.terminals.lock().unwrap();
        f(terminals.entry(address.to_string()).or_default())
    }
}

#[async_trait]
impl TerminalTransport for FakeTransport {
    type Session = String;

    async fn connect(&self, endpoint: &TerminalEndpoint, timeout: Duration) -> SyncResult<String> {
        let unreachable = self.with(&endpoint.address, |t| {
            t.connects += 1;
            t.unreachable
        });
        if unreachable {
            return Err(SyncError::Timeout {
                address: endpoint.socket_addr(),
                secs: timeout.as_secs(),
            });
        }
        Ok(endpoint.address.clone())
    }

    async fn disconnect(&self, session: String) -> SyncResult<()> {
        self.with(&session, |t| t.disconnects += 1);
        Ok(())
    }

    async fn fetch_users(&self, session: &mut String) -> SyncResult<Vec<TerminalUser>> {
        self.with(session, |t| {
            if t.fail_reads {
                return Err(SyncError::Protocol("connection reset by terminal".into()));
            }
            Ok(t.users.clone())
        })
    }

    async fn fetch_attendance(&self, session: &mut String) -> SyncResult<Vec<PunchEvent>> {
        self.with(session, |t| {
            if t.fail_reads {
                return Err(SyncError::Protocol("connection reset by terminal".into()));
            }
            Ok(t.punches.clone())
        })
    }

    async fn upsert_user(&self, session: &mut String, user: &TerminalUser) -> SyncResult<()> {
        self.with(session, |t| {
            if t.fail_writes {
                return Err(SyncError::Protocol("write rejected by terminal".into()));
            }
            t.upserts.push(user.clone());
            match t.users.iter_mut().find(|u| u.uid == user.uid) {
                Some(existing) => *existing = user.clone(),
                None => t.users.push(user.clone()),
            }
            Ok(())
        })
    }
}

// =============================================================================
// Fixtures
// =============================================================================

pub async fn test_db() -> Database {
    Database::new(DbConfig::in_memory()).await.unwrap()
}

pub async fn register(db: &Database, address: &str) -> Device {
    db.devices().insert(&NewDevice::new(address)).await.unwrap()
}

pub async fn enroll(db: &Database, uid: u32, name: &str, device: Option<&Device>) {
    enroll_as(db, uid, name, &synthesize_user_id(uid), device).await;
}

pub async fn enroll_as(
    db: &Database,
    uid: u32,
    name: &str,
    user_id: &str,
    device: Option<&Device>,
) {
    db.users()
        .insert(&NewUser {
            uid,
            name: name.into(),
            privilege: 0,
            password: None,
            group_id: None,
            user_id: user_id.into(),
            card: None,
            device_id: device.map(|d| d.id.clone()),
        })
        .await
        .unwrap();
}

pub fn terminal_user(uid: u32, name: &str) -> TerminalUser {
    TerminalUser {
        uid,
        name: name.into(),
        privilege: 0,
        password: String::new(),
        card: None,
        group_id: String::new(),
        user_id: String::new(),
    }
}

pub fn punch(uid: u32, hour: u32, punch: PunchDirection) -> PunchEvent {
    PunchEvent {
        uid,
        timestamp: NaiveDate::from_ymd_opt(2024, 3, 15)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap(),
        punch,
    }
}
